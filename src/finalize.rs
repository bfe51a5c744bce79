// 🏁 Finalization pass - turn buffered edges into collection patches
//
// Runs once per scope, after its input is exhausted. One patch per drained
// (owner, relationship) pair. A failed patch is recorded and the pass moves
// on to the next pair.

use crate::accumulator::{DrainedRelationship, RelationshipAccumulator};
use crate::persister::Persister;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchFailure {
    /// e.g. `Gene #12`
    pub owner: String,
    pub relationship: String,
    /// Members that were not written
    pub members: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalizeReport {
    pub scope: String,
    pub patches_issued: usize,
    pub members_written: usize,
    pub failures: Vec<PatchFailure>,
}

impl FinalizeReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct FinalizationPass<'p, P: Persister + ?Sized> {
    persister: &'p mut P,
    report: FinalizeReport,
}

impl<'p, P: Persister + ?Sized> FinalizationPass<'p, P> {
    pub fn new(scope: &str, persister: &'p mut P) -> Self {
        FinalizationPass {
            persister,
            report: FinalizeReport {
                scope: scope.to_string(),
                ..Default::default()
            },
        }
    }

    /// Drain the accumulator completely, patching every pair
    pub fn run(mut self, accumulator: &mut RelationshipAccumulator) -> FinalizeReport {
        for pair in accumulator.drain() {
            self.patch(pair);
        }

        tracing::info!(
            scope = %self.report.scope,
            patches = self.report.patches_issued,
            members = self.report.members_written,
            failures = self.report.failures.len(),
            "finalized scope"
        );
        self.report
    }

    fn patch(&mut self, pair: DrainedRelationship) {
        self.report.patches_issued += 1;

        match self
            .persister
            .patch_collection(pair.owner.id, pair.relationship, &pair.members)
        {
            Ok(()) => self.report.members_written += pair.members.len(),
            Err(err) => {
                let owner = format!("{} {}", pair.owner.kind, pair.owner.id);
                tracing::warn!(
                    owner = %owner,
                    relationship = pair.relationship,
                    members = pair.members.len(),
                    error = %err,
                    "collection patch failed"
                );
                self.report.failures.push(PatchFailure {
                    owner,
                    relationship: pair.relationship.to_string(),
                    members: pair.members.len(),
                    error: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Handle, Identity, Kind};
    use crate::persister::MemoryPersister;
    use crate::schema::Membership;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn owner(kind: Kind, id: i64) -> Handle {
        Handle::new(kind, Identity(id))
    }

    #[test]
    fn test_one_patch_per_pair() {
        let mut acc = RelationshipAccumulator::new("alleles.tsv");
        let g1 = owner(Kind::Gene, 1);
        let g2 = owner(Kind::Gene, 2);
        acc.append(g1, "alleles", Identity(10), Membership::Sequence)
            .unwrap();
        acc.append(g1, "alleles", Identity(11), Membership::Sequence)
            .unwrap();
        acc.append(g2, "alleles", Identity(12), Membership::Sequence)
            .unwrap();

        let mut persister = MemoryPersister::new();
        let report = FinalizationPass::new("alleles.tsv", &mut persister).run(&mut acc);

        assert_eq!(report.patches_issued, 2);
        assert_eq!(report.members_written, 3);
        assert!(report.is_clean());
        assert_eq!(
            persister.patches_for(Identity(1), "alleles")[0].members,
            vec![Identity(10), Identity(11)]
        );
        assert_eq!(
            persister.patches_for(Identity(2), "alleles")[0].members,
            vec![Identity(12)]
        );
    }

    #[test]
    fn test_failures_do_not_stop_the_pass() {
        let mut acc = RelationshipAccumulator::new("genes.json");
        let gene = owner(Kind::Gene, 1);
        acc.append(gene, "synonyms", Identity(5), Membership::Sequence)
            .unwrap();
        acc.append(gene, "transcripts", Identity(6), Membership::Sequence)
            .unwrap();
        acc.append(owner(Kind::Gene, 2), "synonyms", Identity(7), Membership::Sequence)
            .unwrap();

        let mut persister = MemoryPersister::new().fail_patches_of("synonyms");
        let report = FinalizationPass::new("genes.json", &mut persister).run(&mut acc);

        assert_eq!(report.patches_issued, 3);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.failures[0].owner, "Gene #1");
        assert_eq!(report.failures[1].owner, "Gene #2");
        assert_eq!(persister.patches().len(), 1);
        assert_eq!(persister.patches()[0].relationship, "transcripts");
    }

    #[test]
    fn test_empty_accumulator_issues_nothing() {
        let mut acc = RelationshipAccumulator::new("empty");
        let mut persister = MemoryPersister::new();
        let report = FinalizationPass::new("empty", &mut persister).run(&mut acc);

        assert_eq!(report.patches_issued, 0);
        assert!(persister.patches().is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_single_patch_per_touched_pair(
            input in prop::collection::vec((1i64..8, 0usize..3, 50i64..60), 0..60)
        ) {
            const NAMES: [&str; 3] = ["alleles", "synonyms", "exons"];
            let mut acc = RelationshipAccumulator::new("prop");
            let mut touched = HashSet::new();

            for (id, rel, member) in &input {
                acc.append(owner(Kind::Gene, *id), NAMES[*rel], Identity(*member), Membership::Sequence)
                    .unwrap();
                touched.insert((*id, NAMES[*rel]));
            }

            let mut persister = MemoryPersister::new();
            let report = FinalizationPass::new("prop", &mut persister).run(&mut acc);

            prop_assert_eq!(report.patches_issued, touched.len());
            prop_assert_eq!(report.members_written, input.len());
            for (id, name) in &touched {
                prop_assert_eq!(persister.patches_for(Identity(*id), name).len(), 1);
            }
        }
    }
}
