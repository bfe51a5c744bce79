// 🧬 Entity kinds - the closed set of things the loader can create
//
// Every kind shares the interning and accumulation machinery. What differs per
// kind (key field, scope, relationships) lives in the schema, not here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    Gene,
    Allele,
    PhenotypeTerm,
    Condition,
    PhenotypeAnnotation,
    Publication,
    Organism,
    Synonym,
    Chromosome,
    Location,
    Transcript,
    Exon,
    #[serde(rename = "FivePrimeUTR")]
    FivePrimeUtr,
    #[serde(rename = "ThreePrimeUTR")]
    ThreePrimeUtr,
    Intron,
    Protein,
    Sequence,
    #[serde(rename = "CDS")]
    Cds,
    UniProtEntry,
    Homologue,
    Disease,
    MondoTerm,
}

impl Kind {
    pub const ALL: [Kind; 22] = [
        Kind::Gene,
        Kind::Allele,
        Kind::PhenotypeTerm,
        Kind::Condition,
        Kind::PhenotypeAnnotation,
        Kind::Publication,
        Kind::Organism,
        Kind::Synonym,
        Kind::Chromosome,
        Kind::Location,
        Kind::Transcript,
        Kind::Exon,
        Kind::FivePrimeUtr,
        Kind::ThreePrimeUtr,
        Kind::Intron,
        Kind::Protein,
        Kind::Sequence,
        Kind::Cds,
        Kind::UniProtEntry,
        Kind::Homologue,
        Kind::Disease,
        Kind::MondoTerm,
    ];

    /// Class name used when the entity is persisted
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Gene => "Gene",
            Kind::Allele => "Allele",
            Kind::PhenotypeTerm => "PhenotypeTerm",
            Kind::Condition => "Condition",
            Kind::PhenotypeAnnotation => "PhenotypeAnnotation",
            Kind::Publication => "Publication",
            Kind::Organism => "Organism",
            Kind::Synonym => "Synonym",
            Kind::Chromosome => "Chromosome",
            Kind::Location => "Location",
            Kind::Transcript => "Transcript",
            Kind::Exon => "Exon",
            Kind::FivePrimeUtr => "FivePrimeUTR",
            Kind::ThreePrimeUtr => "ThreePrimeUTR",
            Kind::Intron => "Intron",
            Kind::Protein => "Protein",
            Kind::Sequence => "Sequence",
            Kind::Cds => "CDS",
            Kind::UniProtEntry => "UniProtEntry",
            Kind::Homologue => "Homologue",
            Kind::Disease => "Disease",
            Kind::MondoTerm => "MondoTerm",
        }
    }

    pub fn from_name(name: &str) -> Option<Kind> {
        Kind::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Kind::from_name(s).ok_or_else(|| format!("unknown entity kind: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trips_for_every_kind() {
        for kind in Kind::ALL {
            assert_eq!(Kind::from_name(kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_persisted_names_use_class_spelling() {
        assert_eq!(Kind::Cds.name(), "CDS");
        assert_eq!(Kind::FivePrimeUtr.to_string(), "FivePrimeUTR");
        assert_eq!("UniProtEntry".parse::<Kind>(), Ok(Kind::UniProtEntry));
        assert!("Widget".parse::<Kind>().is_err());
    }

    #[test]
    fn test_serde_matches_class_name() {
        let json = serde_json::to_string(&Kind::ThreePrimeUtr).unwrap();
        assert_eq!(json, "\"ThreePrimeUTR\"");
        let back: Kind = serde_json::from_str("\"CDS\"").unwrap();
        assert_eq!(back, Kind::Cds);
    }
}
