// 🔄 Converters - one RecordProcessor per pombe data file
//
// Factory:
//   let source = detect_source(path)?;
//   let processor = get_processor(source);

pub mod alleles;
pub mod diseases;
pub mod genes;
pub mod orthologues;

pub use alleles::AllelesConverter;
pub use diseases::DiseasesConverter;
pub use genes::GenesConverter;
pub use orthologues::OrthologuesConverter;

use crate::parser::SourceKind;
use crate::processor::RecordProcessor;

/// Taxon id of S. pombe
pub const POMBE_TAXON_ID: &str = "4896";

pub fn get_processor(source: SourceKind) -> Box<dyn RecordProcessor> {
    match source {
        SourceKind::Alleles => Box::new(AllelesConverter::new()),
        SourceKind::Genes => Box::new(GenesConverter::new()),
        SourceKind::Orthologues => Box::new(OrthologuesConverter::new()),
        SourceKind::Diseases => Box::new(DiseasesConverter::new()),
    }
}

/// Natural key made of several fields; absent parts are empty
pub(crate) fn compound_key(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .map(|p| p.map(str::trim).unwrap_or(""))
        .collect::<Vec<_>>()
        .join("|")
}

/// PubMed id from a `PMID:nnnn` reference; other references yield None
pub(crate) fn pubmed_id(reference: Option<&str>) -> Option<&str> {
    let reference = reference?;
    let start = reference.find("PMID:")? + "PMID:".len();
    let id = reference[start..].trim();
    (!id.is_empty()).then_some(id)
}
