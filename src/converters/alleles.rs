// 🧪 Alleles converter - phenotype annotation rows (tab separated)
//
// One row = one phenotype annotation of one allele of one gene. Alleles are
// identified by symbol + type + expression. The gene is optional: without it
// the allele is still loaded, unattached.

use super::{compound_key, pubmed_id};
use crate::entities::{EntityDraft, Kind};
use crate::error::IngestResult;
use crate::parser::{ColumnLayout, InputLayout, Record, SourceKind};
use crate::processor::{IngestContext, RecordOutcome, RecordProcessor};

const COLUMNS: ColumnLayout = &[
    (1, "gene"),
    (2, "fypo"),
    (4, "expression"),
    (8, "gene_symbol"),
    (9, "allele_symbol"),
    (11, "allele_type"),
    (12, "evidence"),
    (13, "conditions"),
    (14, "penetrance"),
    (15, "severity"),
    (16, "extension"),
    (17, "reference"),
];

#[derive(Debug, Default)]
pub struct AllelesConverter;

impl AllelesConverter {
    pub fn new() -> Self {
        AllelesConverter
    }
}

impl RecordProcessor for AllelesConverter {
    fn source(&self) -> SourceKind {
        SourceKind::Alleles
    }

    fn layout(&self) -> InputLayout {
        InputLayout::Tsv(COLUMNS)
    }

    fn process(&mut self, record: &Record, ctx: &mut IngestContext<'_>) -> IngestResult<RecordOutcome> {
        let symbol = ctx.require_key(Kind::Allele, record.scalar("allele_symbol"))?;
        let allele_type = record.scalar("allele_type");
        let expression = record.scalar("expression");
        let allele_key = compound_key(&[Some(symbol), allele_type, expression]);

        let gene_id = record.scalar("gene");
        let gene = ctx.intern_optional(Kind::Gene, gene_id, || {
            EntityDraft::new()
                .with_opt("primaryIdentifier", gene_id)
                .with_opt("symbol", record.scalar("gene_symbol"))
        })?;

        let allele = ctx.intern(Kind::Allele, Some(allele_key.as_str()), || {
            EntityDraft::new()
                .with("identifier", allele_key.as_str())
                .with("symbol", symbol)
                .with_opt("type", allele_type)
                .with_opt("expression", expression)
                .with_opt_ref("gene", gene)
        })?;

        if let Some(gene) = gene {
            ctx.link(gene, "alleles", allele)?;
        }

        // Vocabularies
        let fypo = record.scalar("fypo");
        let term = ctx.intern_if_present(Kind::PhenotypeTerm, fypo, || {
            EntityDraft::new().with_opt("identifier", fypo)
        })?;

        let severity_id = record.scalar("severity");
        let severity = ctx.intern_if_present(Kind::PhenotypeTerm, severity_id, || {
            EntityDraft::new().with_opt("identifier", severity_id)
        })?;

        let pmid = pubmed_id(record.scalar("reference"));
        let publication = ctx.intern_if_present(Kind::Publication, pmid, || {
            EntityDraft::new().with_opt("pubMedId", pmid)
        })?;

        let mut conditions = Vec::new();
        for id in record
            .scalar("conditions")
            .into_iter()
            .flat_map(|list| list.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty())
        {
            let condition = ctx.intern(Kind::Condition, Some(id), || {
                EntityDraft::new().with("identifier", id)
            })?;
            conditions.push(condition);
        }

        // One annotation per row, never merged
        let annotation = ctx.intern(Kind::PhenotypeAnnotation, None, || {
            EntityDraft::new()
                .with_opt("penetrance", record.scalar("penetrance"))
                .with_opt("evidence", record.scalar("evidence"))
                .with_opt("extension", record.scalar("extension"))
                .with_ref("allele", allele)
                .with_opt_ref("ontologyTerm", term)
                .with_opt_ref("severity", severity)
                .with_opt_ref("publication", publication)
        })?;

        ctx.link(allele, "phenotypeAnnotations", annotation)?;
        for condition in conditions {
            ctx.link(annotation, "conditions", condition)?;
        }

        Ok(RecordOutcome::Processed)
    }
}
