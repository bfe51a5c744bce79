// 🩺 Diseases converter - gene / MONDO term / reference rows
//
// A disease is one (MONDO term, reference) pair. Genes and publications
// accumulate on it across rows.

use super::{compound_key, pubmed_id};
use crate::entities::{EntityDraft, Kind};
use crate::error::IngestResult;
use crate::parser::{ColumnLayout, InputLayout, Record, SourceKind};
use crate::processor::{IngestContext, RecordOutcome, RecordProcessor};

const COLUMNS: ColumnLayout = &[(0, "gene"), (1, "symbol"), (2, "mondo"), (3, "reference")];

#[derive(Debug, Default)]
pub struct DiseasesConverter;

impl DiseasesConverter {
    pub fn new() -> Self {
        DiseasesConverter
    }
}

impl RecordProcessor for DiseasesConverter {
    fn source(&self) -> SourceKind {
        SourceKind::Diseases
    }

    fn layout(&self) -> InputLayout {
        InputLayout::Tsv(COLUMNS)
    }

    fn process(&mut self, record: &Record, ctx: &mut IngestContext<'_>) -> IngestResult<RecordOutcome> {
        let gene_id = ctx.require_key(Kind::Gene, record.scalar("gene"))?;
        let mondo_id = record.scalar("mondo");
        let reference = record.scalar("reference");

        let mondo = ctx.intern_if_present(Kind::MondoTerm, mondo_id, || {
            EntityDraft::new().with_opt("identifier", mondo_id)
        })?;

        let pmid = pubmed_id(reference);
        let publication = ctx.intern_if_present(Kind::Publication, pmid, || {
            EntityDraft::new().with_opt("pubMedId", pmid)
        })?;

        let key = compound_key(&[mondo_id, reference]);
        let disease = ctx.intern(Kind::Disease, Some(key.as_str()), || {
            EntityDraft::new()
                .with("identifier", key.as_str())
                .with_opt_ref("mondoTerm", mondo)
        })?;

        let gene = ctx.intern(Kind::Gene, Some(gene_id), || {
            EntityDraft::new()
                .with("primaryIdentifier", gene_id)
                .with_opt("symbol", record.scalar("symbol"))
        })?;

        if let Some(publication) = publication {
            ctx.link(disease, "publications", publication)?;
        }
        ctx.link(disease, "genes", gene)?;

        Ok(RecordOutcome::Processed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Harness;
    use super::*;
    use crate::entities::Scalar;
    use crate::parser::TsvSource;
    use crate::report::DiagnosticKind;

    fn load(text: &str) -> Harness {
        let records: Vec<Record> = TsvSource::new(std::io::Cursor::new(text.to_string()), "d.tsv", COLUMNS)
            .collect::<IngestResult<_>>()
            .unwrap();
        let mut converter = DiseasesConverter::new();
        Harness::new().run(&mut converter, "disease_association.tsv", &records)
    }

    #[test]
    fn test_disease_collects_genes() {
        let h = load(concat!(
            "#gene\tsymbol\tmondo\treference\n",
            "SPAC1\tcdc2\tMONDO:0005070\tPMID:1234\n",
            "SPAC2\tade6\tMONDO:0005070\tPMID:1234\n",
            "SPAC1\tcdc2\tMONDO:0005070\tPMID:1234\n",
            "SPAC2\tade6\tMONDO:0005070\tPB_REF:7\n",
        ));

        assert_eq!(h.created(Kind::MondoTerm).len(), 1);
        assert_eq!(h.created(Kind::Publication).len(), 1);
        assert_eq!(h.created(Kind::Disease).len(), 2);
        assert_eq!(h.created(Kind::Gene).len(), 2);

        let publication = &h.created(Kind::Publication)[0];
        assert_eq!(publication.attributes.get("pubMedId"), Some(&Scalar::from("1234")));

        let disease = h.find(Kind::Disease, "identifier", "MONDO:0005070|PMID:1234");
        let genes = h.persister.patches_for(disease.id, "genes");
        assert_eq!(genes.len(), 1);
        assert_eq!(genes[0].members.len(), 2);
        assert_eq!(h.persister.patches_for(disease.id, "publications")[0].members.len(), 1);

        let other = h.find(Kind::Disease, "identifier", "MONDO:0005070|PB_REF:7");
        assert!(h.persister.patches_for(other.id, "publications").is_empty());
    }

    #[test]
    fn test_missing_gene_skips_row() {
        let h = load("\tcdc2\tMONDO:1\tPMID:1\nSPAC1\t\tMONDO:1\tPMID:1\n");

        assert_eq!(h.diagnostics.len(), 1);
        assert_eq!(h.diagnostics[0].kind, DiagnosticKind::MissingKey);
        assert_eq!(h.created(Kind::Gene).len(), 1);
        assert_eq!(h.created(Kind::Disease).len(), 1);
    }
}
