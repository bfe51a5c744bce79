// 📐 Schema - what each kind is keyed by and how kinds relate
//
// Declarations are data: the converters never decide scope or membership
// policy at the call site, they look it up here.

use crate::config::LoaderConfig;
use crate::entities::{EntityDraft, Handle, Kind};
use crate::error::{IngestError, IngestResult};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// POLICY TYPES
// ============================================================================

/// Lifetime over which natural keys of a kind are deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeLevel {
    /// One input file/stream
    File,
    /// The whole run (shared vocabularies)
    Run,
}

/// Whether repeated members of a multi-valued relationship are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    /// Every append is a member, duplicates included
    Sequence,
    /// A member already present is ignored on re-append
    Set,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Single-valued reference, set at creation time
    One,
    /// Multi-valued relationship, accumulated and patched at finalization
    Many,
}

// ============================================================================
// DECLARATIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct KindSpec {
    pub kind: Kind,
    /// Name of the field holding the natural key
    pub key_field: &'static str,
    /// When false, an absent key creates a fresh, non-interned entity
    pub key_required: bool,
    pub scope: ScopeLevel,
}

#[derive(Debug, Clone)]
pub struct RelationshipSpec {
    pub owner: Kind,
    pub name: &'static str,
    pub targets: Vec<Kind>,
    pub cardinality: Cardinality,
    pub membership: Membership,
}

impl RelationshipSpec {
    /// Qualified name, e.g. `Gene.alleles`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner, self.name)
    }

    pub fn accepts(&self, target: Kind) -> bool {
        self.targets.contains(&target)
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub struct Schema {
    /// Indexed by `Kind as usize`, one entry per kind
    kinds: Vec<KindSpec>,
    relationships: BTreeMap<Kind, BTreeMap<&'static str, RelationshipSpec>>,
}

impl Schema {
    /// Built-in declarations for the pombe data files
    pub fn new() -> Self {
        let mut schema = Schema {
            kinds: Vec::with_capacity(Kind::ALL.len()),
            relationships: BTreeMap::new(),
        };

        schema.register_core_kinds();
        schema.register_core_relationships();
        schema
    }

    /// Built-in declarations with the overrides of a loader config applied
    pub fn with_config(config: &LoaderConfig) -> Result<Self> {
        let mut schema = Schema::new();

        for (kind_name, level) in &config.scopes {
            let kind = Kind::from_name(kind_name)
                .ok_or_else(|| anyhow!("config names unknown kind `{}`", kind_name))?;
            schema.set_scope(kind, *level);
        }

        for (qualified, membership) in &config.relationships {
            let (owner_name, rel_name) = qualified.split_once('.').ok_or_else(|| {
                anyhow!(
                    "relationship `{}` must be written as Owner.relationship",
                    qualified
                )
            })?;
            let owner = Kind::from_name(owner_name)
                .ok_or_else(|| anyhow!("config names unknown kind `{}`", owner_name))?;
            schema
                .set_membership(owner, rel_name, *membership)
                .map_err(|e| anyhow!("{}", e))?;
        }

        Ok(schema)
    }

    fn register_core_kinds(&mut self) {
        use Kind::*;

        for kind in Kind::ALL {
            let (key_field, key_required, scope) = match kind {
                // Shared vocabularies live for the whole run
                PhenotypeTerm | Condition | MondoTerm => ("identifier", true, ScopeLevel::Run),
                Publication => ("pubMedId", true, ScopeLevel::Run),
                Organism => ("taxonId", true, ScopeLevel::Run),
                Chromosome => ("primaryIdentifier", true, ScopeLevel::Run),

                // One annotation per record, never merged
                PhenotypeAnnotation => ("identifier", false, ScopeLevel::File),

                Protein | UniProtEntry => ("primaryAccession", true, ScopeLevel::File),
                Sequence => ("digest", true, ScopeLevel::File),
                Allele | Synonym | Location | Homologue | Disease => {
                    ("identifier", true, ScopeLevel::File)
                }
                Gene | Transcript | Exon | FivePrimeUtr | ThreePrimeUtr | Intron | Cds => {
                    ("primaryIdentifier", true, ScopeLevel::File)
                }
            };

            self.kinds.push(KindSpec {
                kind,
                key_field,
                key_required,
                scope,
            });
        }
    }

    fn register_core_relationships(&mut self) {
        use Kind::*;
        const FEATURES: [Kind; 8] = [
            Gene,
            Transcript,
            Exon,
            FivePrimeUtr,
            ThreePrimeUtr,
            Intron,
            Cds,
            Protein,
        ];

        // ====================================================================
        // SINGLE-VALUED REFERENCES
        // ====================================================================

        let with_organism = [
            Gene,
            Chromosome,
            Transcript,
            Exon,
            FivePrimeUtr,
            ThreePrimeUtr,
            Intron,
            Protein,
            Cds,
            UniProtEntry,
        ];
        for owner in with_organism {
            self.one(owner, "organism", &[Organism]);
        }
        self.one(Gene, "chromosome", &[Chromosome]);
        self.one(Allele, "gene", &[Gene]);
        self.one(PhenotypeAnnotation, "allele", &[Allele]);
        self.one(PhenotypeAnnotation, "ontologyTerm", &[PhenotypeTerm]);
        self.one(PhenotypeAnnotation, "severity", &[PhenotypeTerm]);
        self.one(PhenotypeAnnotation, "publication", &[Publication]);
        self.one(Synonym, "subject", &FEATURES);
        self.one(Location, "feature", &FEATURES);
        self.one(Location, "locatedOn", &[Chromosome]);
        self.one(Transcript, "gene", &[Gene]);
        self.one(Transcript, "protein", &[Protein]);
        for owner in [Exon, FivePrimeUtr, ThreePrimeUtr] {
            self.one(owner, "gene", &[Gene]);
        }
        for owner in [Exon, FivePrimeUtr, ThreePrimeUtr, Intron, Protein] {
            self.one(owner, "sequence", &[Sequence]);
        }
        self.one(Cds, "transcript", &[Transcript]);
        self.one(UniProtEntry, "gene", &[Gene]);
        self.one(Homologue, "gene", &[Gene]);
        self.one(Homologue, "homologue", &[Gene]);
        self.one(Disease, "mondoTerm", &[MondoTerm]);

        // ====================================================================
        // MULTI-VALUED RELATIONSHIPS
        // ====================================================================

        self.many(Gene, "alleles", &[Allele], Membership::Set);
        self.many(Gene, "synonyms", &[Synonym], Membership::Sequence);
        self.many(Gene, "transcripts", &[Transcript], Membership::Sequence);
        self.many(Gene, "exons", &[Exon], Membership::Sequence);
        self.many(Gene, "UTRs", &[FivePrimeUtr, ThreePrimeUtr], Membership::Sequence);
        self.many(Gene, "introns", &[Intron], Membership::Sequence);
        self.many(Gene, "homologues", &[Homologue], Membership::Set);
        self.many(Allele, "phenotypeAnnotations", &[PhenotypeAnnotation], Membership::Sequence);
        self.many(PhenotypeAnnotation, "conditions", &[Condition], Membership::Set);
        self.many(Disease, "genes", &[Gene], Membership::Set);
        self.many(Disease, "publications", &[Publication], Membership::Set);
    }

    fn one(&mut self, owner: Kind, name: &'static str, targets: &[Kind]) {
        self.register(RelationshipSpec {
            owner,
            name,
            targets: targets.to_vec(),
            cardinality: Cardinality::One,
            membership: Membership::Sequence,
        });
    }

    fn many(&mut self, owner: Kind, name: &'static str, targets: &[Kind], membership: Membership) {
        self.register(RelationshipSpec {
            owner,
            name,
            targets: targets.to_vec(),
            cardinality: Cardinality::Many,
            membership,
        });
    }

    pub fn register(&mut self, spec: RelationshipSpec) {
        self.relationships
            .entry(spec.owner)
            .or_default()
            .insert(spec.name, spec);
    }

    // ========================================================================
    // LOOKUPS
    // ========================================================================

    pub fn kind(&self, kind: Kind) -> &KindSpec {
        &self.kinds[kind as usize]
    }

    pub fn scope_of(&self, kind: Kind) -> ScopeLevel {
        self.kind(kind).scope
    }

    pub fn relationship(&self, owner: Kind, name: &str) -> Option<&RelationshipSpec> {
        self.relationships.get(&owner)?.get(name)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipSpec> {
        self.relationships.values().flat_map(|by_name| by_name.values())
    }

    pub fn set_scope(&mut self, kind: Kind, scope: ScopeLevel) {
        self.kinds[kind as usize].scope = scope;
    }

    pub fn set_membership(
        &mut self,
        owner: Kind,
        name: &str,
        membership: Membership,
    ) -> Result<(), String> {
        match self
            .relationships
            .get_mut(&owner)
            .and_then(|by_name| by_name.get_mut(name))
        {
            Some(spec) if spec.cardinality == Cardinality::Many => {
                spec.membership = membership;
                Ok(())
            }
            Some(_) => Err(format!(
                "{}.{} is single-valued and has no membership policy",
                owner, name
            )),
            None => Err(format!("relationship {}.{} is not declared", owner, name)),
        }
    }

    // ========================================================================
    // VALIDATION
    // ========================================================================

    /// Check the single-valued references of a draft against the declarations
    pub fn check_draft(&self, kind: Kind, draft: &EntityDraft) -> IngestResult<()> {
        for (name, target) in &draft.refs {
            let spec = self.relationship(kind, name).ok_or_else(|| {
                IngestError::UndeclaredRelationship {
                    owner: kind,
                    relationship: name.clone(),
                }
            })?;

            if spec.cardinality != Cardinality::One {
                return Err(IngestError::CardinalityMismatch {
                    owner: kind,
                    relationship: name.clone(),
                    message: "multi-valued relationships must be accumulated".to_string(),
                });
            }

            if !spec.accepts(target.kind) {
                return Err(IngestError::CardinalityMismatch {
                    owner: kind,
                    relationship: name.clone(),
                    message: format!("target {} is not a declared target", target.kind),
                });
            }
        }

        Ok(())
    }

    /// Check a multi-valued edge and return its declaration
    pub fn check_edge(
        &self,
        owner: Handle,
        name: &str,
        member: Handle,
    ) -> IngestResult<&RelationshipSpec> {
        let spec = self.relationship(owner.kind, name).ok_or_else(|| {
            IngestError::UndeclaredRelationship {
                owner: owner.kind,
                relationship: name.to_string(),
            }
        })?;

        if spec.cardinality != Cardinality::Many {
            return Err(IngestError::CardinalityMismatch {
                owner: owner.kind,
                relationship: name.to_string(),
                message: "single-valued references are set at creation".to_string(),
            });
        }

        if !spec.accepts(member.kind) {
            return Err(IngestError::CardinalityMismatch {
                owner: owner.kind,
                relationship: name.to_string(),
                message: format!("member {} is not a declared target", member.kind),
            });
        }

        Ok(spec)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Identity;

    fn handle(kind: Kind, id: i64) -> Handle {
        Handle::new(kind, Identity(id))
    }

    #[test]
    fn test_every_kind_is_declared_in_order() {
        let schema = Schema::new();
        for kind in Kind::ALL {
            assert_eq!(schema.kind(kind).kind, kind);
        }
    }

    #[test]
    fn test_vocabularies_are_run_scoped() {
        let schema = Schema::new();
        assert_eq!(schema.scope_of(Kind::PhenotypeTerm), ScopeLevel::Run);
        assert_eq!(schema.scope_of(Kind::Organism), ScopeLevel::Run);
        assert_eq!(schema.scope_of(Kind::Gene), ScopeLevel::File);
        assert!(!schema.kind(Kind::PhenotypeAnnotation).key_required);
    }

    #[test]
    fn test_membership_is_declared_per_relationship() {
        let schema = Schema::new();
        let synonyms = schema.relationship(Kind::Gene, "synonyms").unwrap();
        assert_eq!(synonyms.membership, Membership::Sequence);
        assert_eq!(synonyms.qualified_name(), "Gene.synonyms");

        let genes = schema.relationship(Kind::Disease, "genes").unwrap();
        assert_eq!(genes.membership, Membership::Set);
    }

    #[test]
    fn test_check_edge_rejects_single_valued_and_unknown() {
        let schema = Schema::new();
        let gene = handle(Kind::Gene, 1);
        let allele = handle(Kind::Allele, 2);

        assert!(schema.check_edge(gene, "alleles", allele).is_ok());

        let err = schema.check_edge(allele, "gene", gene).unwrap_err();
        assert!(matches!(err, IngestError::CardinalityMismatch { .. }));

        let err = schema.check_edge(gene, "friends", allele).unwrap_err();
        assert!(matches!(err, IngestError::UndeclaredRelationship { .. }));

        let err = schema.check_edge(gene, "alleles", gene).unwrap_err();
        assert!(matches!(err, IngestError::CardinalityMismatch { .. }));
    }

    #[test]
    fn test_check_draft_validates_reference_targets() {
        let schema = Schema::new();
        let ok = EntityDraft::new().with_ref("gene", handle(Kind::Gene, 1));
        assert!(schema.check_draft(Kind::Allele, &ok).is_ok());

        let wrong_target = EntityDraft::new().with_ref("gene", handle(Kind::Organism, 1));
        assert!(schema.check_draft(Kind::Allele, &wrong_target).is_err());

        let collection = EntityDraft::new().with_ref("alleles", handle(Kind::Allele, 1));
        assert!(schema.check_draft(Kind::Gene, &collection).is_err());
    }

    #[test]
    fn test_with_config_applies_overrides() {
        let config = LoaderConfig::from_json(
            r#"{
                "scopes": { "Gene": "run" },
                "relationships": { "Gene.alleles": "sequence" }
            }"#,
        )
        .unwrap();

        let schema = Schema::with_config(&config).unwrap();
        assert_eq!(schema.scope_of(Kind::Gene), ScopeLevel::Run);
        assert_eq!(
            schema.relationship(Kind::Gene, "alleles").unwrap().membership,
            Membership::Sequence
        );
    }

    #[test]
    fn test_with_config_rejects_unknown_names() {
        let bad_kind = LoaderConfig::from_json(r#"{ "scopes": { "Widget": "run" } }"#).unwrap();
        assert!(Schema::with_config(&bad_kind).is_err());

        let bad_rel =
            LoaderConfig::from_json(r#"{ "relationships": { "Gene.friends": "set" } }"#).unwrap();
        assert!(Schema::with_config(&bad_rel).is_err());

        let single = LoaderConfig::from_json(r#"{ "relationships": { "Allele.gene": "set" } }"#)
            .unwrap();
        assert!(Schema::with_config(&single).is_err());
    }
}
