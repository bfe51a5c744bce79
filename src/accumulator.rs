// 🧺 Relationship accumulator - buffer multi-valued edges until end of stream
//
// Edges are grouped by owner (first-registration order) and, within an owner,
// by relationship (first-registration order). Members keep append order.
// Draining seals the accumulator and removes each pair as it is handed out,
// so a pair is yielded at most once and an unfinished drain loses nothing.

use crate::entities::{Handle, Identity};
use crate::error::{IngestError, IngestResult};
use crate::schema::Membership;
use std::collections::{HashMap, HashSet, VecDeque};

/// One owner's complete membership for one relationship
#[derive(Debug, Clone, PartialEq)]
pub struct DrainedRelationship {
    pub owner: Handle,
    pub relationship: &'static str,
    pub members: Vec<Identity>,
}

#[derive(Debug)]
struct Slot {
    relationship: &'static str,
    members: Vec<Identity>,
    /// Only populated for set-like relationships
    seen: Option<HashSet<Identity>>,
}

#[derive(Debug)]
struct OwnerEntry {
    owner: Handle,
    slots: VecDeque<Slot>,
}

#[derive(Debug)]
pub struct RelationshipAccumulator {
    scope: String,
    owners: VecDeque<OwnerEntry>,
    index: HashMap<Identity, usize>,
    edges: usize,
    sealed: bool,
}

impl RelationshipAccumulator {
    pub fn new(scope: impl Into<String>) -> Self {
        RelationshipAccumulator {
            scope: scope.into(),
            owners: VecDeque::new(),
            index: HashMap::new(),
            edges: 0,
            sealed: false,
        }
    }

    /// Record one edge. Returns false when a set-like relationship already
    /// held the member.
    pub fn append(
        &mut self,
        owner: Handle,
        relationship: &'static str,
        member: Identity,
        membership: Membership,
    ) -> IngestResult<bool> {
        if self.sealed {
            return Err(IngestError::ScopeClosed {
                scope: self.scope.clone(),
                operation: "append",
                target: format!("{}.{}", owner.kind, relationship),
            });
        }

        let position = match self.index.get(&owner.id) {
            Some(&position) => position,
            None => {
                self.owners.push_back(OwnerEntry {
                    owner,
                    slots: VecDeque::new(),
                });
                self.index.insert(owner.id, self.owners.len() - 1);
                self.owners.len() - 1
            }
        };
        let entry = &mut self.owners[position];

        let slot = match entry
            .slots
            .iter()
            .position(|s| s.relationship == relationship)
        {
            Some(i) => &mut entry.slots[i],
            None => {
                entry.slots.push_back(Slot {
                    relationship,
                    members: Vec::new(),
                    seen: match membership {
                        Membership::Set => Some(HashSet::new()),
                        Membership::Sequence => None,
                    },
                });
                let last = entry.slots.len() - 1;
                &mut entry.slots[last]
            }
        };

        if let Some(seen) = slot.seen.as_mut() {
            if !seen.insert(member) {
                return Ok(false);
            }
        }

        slot.members.push(member);
        self.edges += 1;
        Ok(true)
    }

    /// Edges currently buffered
    pub fn edge_count(&self) -> usize {
        self.edges
    }

    /// (owner, relationship) pairs currently buffered
    pub fn pair_count(&self) -> usize {
        self.owners.iter().map(|o| o.slots.len()).sum()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Seal without handing anything out. Buffered edges are dropped.
    pub fn discard(&mut self) -> usize {
        self.sealed = true;
        self.index.clear();
        let dropped = self.edges;
        self.owners.clear();
        self.edges = 0;
        dropped
    }

    /// Seal and hand out buffered pairs in order. A pair leaves the
    /// accumulator only when it is yielded; pairs left behind by a dropped
    /// iterator are handed out by the next `drain`.
    pub fn drain(&mut self) -> Drain<'_> {
        self.sealed = true;
        self.index.clear();
        Drain { accumulator: self }
    }

    fn pop_pair(&mut self) -> Option<DrainedRelationship> {
        loop {
            let entry = self.owners.front_mut()?;
            let Some(slot) = entry.slots.pop_front() else {
                self.owners.pop_front();
                continue;
            };
            let owner = entry.owner;
            if entry.slots.is_empty() {
                self.owners.pop_front();
            }
            if slot.members.is_empty() {
                continue;
            }

            self.edges -= slot.members.len();
            return Some(DrainedRelationship {
                owner,
                relationship: slot.relationship,
                members: slot.members,
            });
        }
    }
}

pub struct Drain<'a> {
    accumulator: &'a mut RelationshipAccumulator,
}

impl Iterator for Drain<'_> {
    type Item = DrainedRelationship;

    fn next(&mut self) -> Option<Self::Item> {
        self.accumulator.pop_pair()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Kind;
    use proptest::prelude::*;

    fn gene(id: i64) -> Handle {
        Handle::new(Kind::Gene, Identity(id))
    }

    #[test]
    fn test_groups_by_owner_in_first_registration_order() {
        let mut acc = RelationshipAccumulator::new("test");
        acc.append(gene(2), "alleles", Identity(10), Membership::Sequence)
            .unwrap();
        acc.append(gene(1), "alleles", Identity(11), Membership::Sequence)
            .unwrap();
        acc.append(gene(2), "synonyms", Identity(12), Membership::Sequence)
            .unwrap();
        acc.append(gene(2), "alleles", Identity(13), Membership::Sequence)
            .unwrap();

        let drained: Vec<_> = acc.drain().collect();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].owner, gene(2));
        assert_eq!(drained[0].relationship, "alleles");
        assert_eq!(drained[0].members, vec![Identity(10), Identity(13)]);
        assert_eq!(drained[1].relationship, "synonyms");
        assert_eq!(drained[2].owner, gene(1));
    }

    #[test]
    fn test_sequence_keeps_duplicates_and_set_drops_them() {
        let mut acc = RelationshipAccumulator::new("test");
        for _ in 0..2 {
            assert!(acc
                .append(gene(1), "alleles", Identity(5), Membership::Sequence)
                .unwrap());
        }
        assert!(acc
            .append(gene(1), "homologues", Identity(6), Membership::Set)
            .unwrap());
        assert!(!acc
            .append(gene(1), "homologues", Identity(6), Membership::Set)
            .unwrap());
        assert_eq!(acc.edge_count(), 3);

        let drained: Vec<_> = acc.drain().collect();
        assert_eq!(drained[0].members, vec![Identity(5), Identity(5)]);
        assert_eq!(drained[1].members, vec![Identity(6)]);
    }

    #[test]
    fn test_drain_is_destructive_and_seals() {
        let mut acc = RelationshipAccumulator::new("alleles.tsv");
        acc.append(gene(1), "alleles", Identity(2), Membership::Sequence)
            .unwrap();

        assert_eq!(acc.drain().count(), 1);
        assert_eq!(acc.drain().count(), 0);
        assert_eq!(acc.pair_count(), 0);
        assert!(acc.is_sealed());

        let err = acc
            .append(gene(1), "alleles", Identity(3), Membership::Sequence)
            .unwrap_err();
        match err {
            IngestError::ScopeClosed { scope, target, .. } => {
                assert_eq!(scope, "alleles.tsv");
                assert_eq!(target, "Gene.alleles");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unfinished_drain_keeps_the_rest() {
        let mut acc = RelationshipAccumulator::new("test");
        for owner in 1..=3 {
            acc.append(gene(owner), "alleles", Identity(9), Membership::Sequence)
                .unwrap();
        }

        let first: Vec<_> = acc.drain().take(1).collect();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].owner, gene(1));
        assert_eq!(acc.pair_count(), 2);
        assert_eq!(acc.edge_count(), 2);

        let rest: Vec<_> = acc.drain().collect();
        assert_eq!(rest.iter().map(|p| p.owner).collect::<Vec<_>>(), vec![gene(2), gene(3)]);
        assert_eq!(acc.pair_count(), 0);
        assert_eq!(acc.edge_count(), 0);
        assert!(acc.is_sealed());
    }

    #[test]
    fn test_discard_drops_everything() {
        let mut acc = RelationshipAccumulator::new("test");
        acc.append(gene(1), "alleles", Identity(2), Membership::Sequence)
            .unwrap();
        assert_eq!(acc.discard(), 1);
        assert_eq!(acc.drain().count(), 0);
        assert!(acc.is_sealed());
    }

    fn edges() -> impl Strategy<Value = Vec<(i64, bool, i64)>> {
        // (owner, which relationship, member)
        prop::collection::vec((1i64..6, any::<bool>(), 100i64..110), 0..80)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_every_edge_drained_in_order(input in edges()) {
            let mut acc = RelationshipAccumulator::new("prop");
            let mut expected: HashMap<(i64, &'static str), Vec<Identity>> = HashMap::new();

            for (owner, first, member) in &input {
                let name = if *first { "alleles" } else { "synonyms" };
                acc.append(gene(*owner), name, Identity(*member), Membership::Sequence).unwrap();
                expected.entry((*owner, name)).or_default().push(Identity(*member));
            }

            let drained: Vec<_> = acc.drain().collect();
            prop_assert_eq!(drained.len(), expected.len());
            for pair in drained {
                let want = expected.remove(&(pair.owner.id.0, pair.relationship));
                prop_assert_eq!(Some(pair.members), want);
            }
            prop_assert!(expected.is_empty());
        }

        #[test]
        fn prop_set_members_are_distinct(input in edges()) {
            let mut acc = RelationshipAccumulator::new("prop");
            let mut expected: HashMap<i64, Vec<Identity>> = HashMap::new();

            for (owner, _, member) in &input {
                acc.append(gene(*owner), "homologues", Identity(*member), Membership::Set).unwrap();
                let members = expected.entry(*owner).or_default();
                if !members.contains(&Identity(*member)) {
                    members.push(Identity(*member));
                }
            }

            for pair in acc.drain() {
                prop_assert_eq!(Some(&pair.members), expected.get(&pair.owner.id.0));
            }
        }
    }
}
