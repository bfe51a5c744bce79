// 🔗 Orthologues converter - pombe gene to partner-organism genes
//
// Rows: gene id, then `|`-separated homologue ids (or NONE). The partner
// organism comes from the file name.

use super::{compound_key, POMBE_TAXON_ID};
use crate::entities::{EntityDraft, Handle, Kind};
use crate::error::IngestResult;
use crate::parser::{ColumnLayout, InputLayout, Record, SourceKind};
use crate::processor::{FileDecision, IngestContext, RecordOutcome, RecordProcessor};

const COLUMNS: ColumnLayout = &[(0, "gene"), (1, "homologues")];

const ORTHOLOGUE_TYPE: &str = "orthologue";

/// Partner taxon id for an orthologue file name
pub fn partner_taxon(file_name: &str) -> Option<&'static str> {
    let name = file_name.to_lowercase();
    if name.contains("cerevisiae") {
        Some("4932")
    } else if name.contains("human") {
        Some("9606")
    } else {
        None
    }
}

#[derive(Debug, Default)]
pub struct OrthologuesConverter {
    /// (pombe organism, partner organism, partner taxon) of the current file
    organisms: Option<(Handle, Handle, &'static str)>,
}

impl OrthologuesConverter {
    pub fn new() -> Self {
        OrthologuesConverter::default()
    }

    fn organism(ctx: &mut IngestContext<'_>, taxon: &str) -> IngestResult<Handle> {
        ctx.intern(Kind::Organism, Some(taxon), || {
            EntityDraft::new().with("taxonId", taxon)
        })
    }

    /// Gene ids are only unique within an organism, so the taxon is part of the key
    fn gene(ctx: &mut IngestContext<'_>, id: &str, taxon: &str, organism: Handle) -> IngestResult<Handle> {
        let key = compound_key(&[Some(id), Some(taxon)]);
        ctx.intern(Kind::Gene, Some(key.as_str()), || {
            EntityDraft::new()
                .with("primaryIdentifier", id)
                .with_ref("organism", organism)
        })
    }
}

impl RecordProcessor for OrthologuesConverter {
    fn source(&self) -> SourceKind {
        SourceKind::Orthologues
    }

    fn layout(&self) -> InputLayout {
        InputLayout::Tsv(COLUMNS)
    }

    fn open_file(&mut self, name: &str, ctx: &mut IngestContext<'_>) -> IngestResult<FileDecision> {
        self.organisms = None;

        let Some(partner) = partner_taxon(name) else {
            return Ok(FileDecision::Skip(format!(
                "no partner organism for orthologue file {}",
                name
            )));
        };

        let pombe = Self::organism(ctx, POMBE_TAXON_ID)?;
        let partner_organism = Self::organism(ctx, partner)?;
        self.organisms = Some((pombe, partner_organism, partner));
        Ok(FileDecision::Process)
    }

    fn process(&mut self, record: &Record, ctx: &mut IngestContext<'_>) -> IngestResult<RecordOutcome> {
        let gene_id = ctx.require_key(Kind::Gene, record.scalar("gene"))?;

        let Some((pombe, partner, partner_taxon)) = self.organisms else {
            return Ok(RecordOutcome::Skipped("orthologue file was not opened".to_string()));
        };

        let Some(homologues) = record.scalar("homologues") else {
            return Ok(RecordOutcome::Skipped(format!(
                "no homologue column for {}",
                gene_id
            )));
        };
        if homologues == "NONE" {
            return Ok(RecordOutcome::Processed);
        }

        for homologue_id in homologues.split('|').map(str::trim).filter(|h| !h.is_empty()) {
            let gene = Self::gene(ctx, gene_id, POMBE_TAXON_ID, pombe)?;
            let other = Self::gene(ctx, homologue_id, partner_taxon, partner)?;

            let key = compound_key(&[Some(gene_id), Some(homologue_id)]);
            let homologue = ctx.intern(Kind::Homologue, Some(key.as_str()), || {
                EntityDraft::new()
                    .with("identifier", key.as_str())
                    .with("type", ORTHOLOGUE_TYPE)
                    .with_ref("gene", gene)
                    .with_ref("homologue", other)
            })?;
            ctx.link(gene, "homologues", homologue)?;
        }

        Ok(RecordOutcome::Processed)
    }
}
