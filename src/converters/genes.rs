// 🧬 Genes converter - one JSON object per gene
//
// Each gene carries its organism, chromosome location, synonyms, transcripts
// (with protein, CDS and parts) and an optional UniProt accession.

use super::compound_key;
use crate::entities::{EntityDraft, Handle, Kind, Scalar};
use crate::error::IngestResult;
use crate::parser::{InputLayout, Record, SourceKind};
use crate::processor::{IngestContext, RecordOutcome, RecordProcessor};
use sha2::{Digest, Sha256};

#[derive(Debug, Default)]
pub struct GenesConverter;

impl GenesConverter {
    pub fn new() -> Self {
        GenesConverter
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// `chromosome_1` -> `I`, `chromosome_2` -> `II`, `chromosome_3` -> `III`
pub fn chromosome_identifier(name: &str) -> &str {
    if name.eq_ignore_ascii_case("chromosome_1") {
        "I"
    } else if name.eq_ignore_ascii_case("chromosome_2") {
        "II"
    } else if name.eq_ignore_ascii_case("chromosome_3") {
        "III"
    } else {
        name
    }
}

pub fn strand(value: Option<&str>) -> i64 {
    match value {
        Some("forward") => 1,
        Some("reverse") => -1,
        _ => 0,
    }
}

/// Hex SHA-256 of the residues; the natural key of a Sequence
pub fn sequence_digest(residues: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(residues.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn with_coordinate(draft: EntityDraft, name: &str, value: Option<&str>) -> EntityDraft {
    match value {
        Some(v) => match v.parse::<i64>() {
            Ok(n) => draft.with(name, n),
            Err(_) => draft.with(name, Scalar::from(v)),
        },
        None => draft,
    }
}

fn chromosome(
    ctx: &mut IngestContext<'_>,
    location: Option<&Record>,
    organism: Option<Handle>,
) -> IngestResult<Option<Handle>> {
    let id = location
        .and_then(|l| l.scalar("chromosome_name"))
        .map(chromosome_identifier);

    ctx.intern_if_present(Kind::Chromosome, id, || {
        EntityDraft::new()
            .with_opt("primaryIdentifier", id)
            .with_opt_ref("organism", organism)
    })
}

fn location(
    ctx: &mut IngestContext<'_>,
    node: Option<&Record>,
    feature: Handle,
    feature_id: &str,
    organism: Option<Handle>,
) -> IngestResult<Option<Handle>> {
    let Some(node) = node else {
        return Ok(None);
    };

    let located_on = chromosome(ctx, Some(node), organism)?;
    let start = node.scalar("start_pos");
    let end = node.scalar("end_pos");
    let key = compound_key(&[
        Some(feature.kind.name()),
        Some(feature_id),
        node.scalar("chromosome_name").map(chromosome_identifier),
        start,
        end,
    ]);

    let handle = ctx.intern(Kind::Location, Some(key.as_str()), || {
        let draft = EntityDraft::new().with("identifier", key.as_str());
        let draft = with_coordinate(draft, "start", start);
        with_coordinate(draft, "end", end)
            .with("strand", strand(node.scalar("strand")))
            .with_opt("phase", node.scalar("phase"))
            .with_ref("feature", feature)
            .with_opt_ref("locatedOn", located_on)
    })?;
    Ok(Some(handle))
}

fn sequence(ctx: &mut IngestContext<'_>, residues: Option<&str>) -> IngestResult<Option<Handle>> {
    let Some(residues) = residues else {
        return Ok(None);
    };

    let digest = sequence_digest(residues);
    let handle = ctx.intern(Kind::Sequence, Some(digest.as_str()), || {
        EntityDraft::new()
            .with("digest", digest.as_str())
            .with("residues", residues)
            .with("length", residues.len() as i64)
    })?;
    Ok(Some(handle))
}

fn protein(
    ctx: &mut IngestContext<'_>,
    node: Option<&Record>,
    organism: Option<Handle>,
) -> IngestResult<Option<Handle>> {
    let Some(node) = node else {
        return Ok(None);
    };
    let Some(accession) = node.scalar("uniquename") else {
        return Ok(None);
    };

    let sequence = sequence(ctx, node.scalar("sequence"))?;
    let handle = ctx.intern(Kind::Protein, Some(accession), || {
        EntityDraft::new()
            .with("primaryAccession", accession)
            .with_opt("name", node.scalar("product"))
            .with_opt("molecularWeight", node.scalar("molecular_weight"))
            .with_opt_ref("sequence", sequence)
            .with_opt_ref("organism", organism)
    })?;
    Ok(Some(handle))
}

// ============================================================================
// GENE PARTS
// ============================================================================

fn part_kind(feature_type: Option<&str>) -> Option<(Kind, &'static str)> {
    match feature_type? {
        "exon" => Some((Kind::Exon, "exons")),
        "five_prime_utr" => Some((Kind::FivePrimeUtr, "UTRs")),
        "three_prime_utr" => Some((Kind::ThreePrimeUtr, "UTRs")),
        "cds_intron" => Some((Kind::Intron, "introns")),
        _ => None,
    }
}

fn parts(
    ctx: &mut IngestContext<'_>,
    transcript: &Record,
    gene: Handle,
    organism: Option<Handle>,
) -> IngestResult<()> {
    for part in transcript.nested("parts") {
        let Some((kind, relationship)) = part_kind(part.scalar("feature_type")) else {
            tracing::debug!(
                feature_type = part.scalar("feature_type").unwrap_or(""),
                "ignoring transcript part"
            );
            continue;
        };

        let id = match ctx.require_key(kind, part.scalar("uniquename")) {
            Ok(id) => id,
            Err(err) => {
                ctx.report_missing_key(&err);
                continue;
            }
        };

        let sequence = sequence(ctx, part.scalar("residues"))?;
        // Introns are not linked back to their gene
        let parent = (kind != Kind::Intron).then_some(gene);

        let feature = ctx.intern(kind, Some(id), || {
            EntityDraft::new()
                .with("primaryIdentifier", id)
                .with_opt_ref("organism", organism)
                .with_opt_ref("sequence", sequence)
                .with_opt_ref("gene", parent)
        })?;

        ctx.link(gene, relationship, feature)?;
        location(ctx, part.child("location"), feature, id, organism)?;
    }

    Ok(())
}

fn transcripts(
    ctx: &mut IngestContext<'_>,
    record: &Record,
    gene: Handle,
    organism: Option<Handle>,
) -> IngestResult<()> {
    for node in record.nested("transcripts") {
        parts(ctx, node, gene, organism)?;

        let id = match ctx.require_key(Kind::Transcript, node.scalar("uniquename")) {
            Ok(id) => id,
            Err(err) => {
                ctx.report_missing_key(&err);
                continue;
            }
        };

        let protein = protein(ctx, node.child("protein"), organism)?;
        let transcript = ctx.intern(Kind::Transcript, Some(id), || {
            EntityDraft::new()
                .with("primaryIdentifier", id)
                .with_opt("transcriptType", node.scalar("transcript_type"))
                .with_ref("gene", gene)
                .with_opt_ref("organism", organism)
                .with_opt_ref("protein", protein)
        })?;
        ctx.link(gene, "transcripts", transcript)?;
        location(ctx, node.child("location"), transcript, id, organism)?;

        let cds_id = format!("{}_CDS", id);
        let cds = ctx.intern(Kind::Cds, Some(cds_id.as_str()), || {
            EntityDraft::new()
                .with("primaryIdentifier", cds_id.as_str())
                .with_ref("transcript", transcript)
                .with_opt_ref("organism", organism)
        })?;
        location(ctx, node.child("cds_location"), cds, &cds_id, organism)?;
    }

    Ok(())
}

// ============================================================================
// PROCESSOR
// ============================================================================

impl RecordProcessor for GenesConverter {
    fn source(&self) -> SourceKind {
        SourceKind::Genes
    }

    fn layout(&self) -> InputLayout {
        InputLayout::JsonTree
    }

    fn process(&mut self, record: &Record, ctx: &mut IngestContext<'_>) -> IngestResult<RecordOutcome> {
        let gene_id = ctx.require_key(Kind::Gene, record.scalar("systematic_id"))?;

        let taxon = record.scalar("taxonid");
        let organism = ctx.intern_optional(Kind::Organism, taxon, || {
            EntityDraft::new().with_opt("taxonId", taxon)
        })?;

        let gene_location = record.child("location");
        let gene_chromosome = chromosome(ctx, gene_location, organism)?;

        let gene = ctx.intern(Kind::Gene, Some(gene_id), || {
            EntityDraft::new()
                .with("primaryIdentifier", gene_id)
                .with_opt("symbol", record.scalar("name"))
                .with_opt("name", record.scalar("product"))
                .with_opt("featureType", record.scalar("featureType"))
                .with_opt_ref("organism", organism)
                .with_opt_ref("chromosome", gene_chromosome)
        })?;
        location(ctx, gene_location, gene, gene_id, organism)?;

        for node in record.nested("synonyms") {
            let Some(value) = node.scalar("name") else {
                continue;
            };
            let synonym_type = node.scalar("type");
            let key = compound_key(&[Some(gene_id), Some(value), synonym_type]);

            let synonym = ctx.intern(Kind::Synonym, Some(key.as_str()), || {
                EntityDraft::new()
                    .with("identifier", key.as_str())
                    .with("value", value)
                    .with_opt("type", synonym_type)
                    .with_ref("subject", gene)
            })?;
            ctx.link(gene, "synonyms", synonym)?;
        }

        transcripts(ctx, record, gene, organism)?;

        let uniprot = record.scalar("uniprot_identifier");
        ctx.intern_if_present(Kind::UniProtEntry, uniprot, || {
            EntityDraft::new()
                .with_opt("primaryAccession", uniprot)
                .with_ref("gene", gene)
                .with_opt_ref("organism", organism)
        })?;

        Ok(RecordOutcome::Processed)
    }
}
