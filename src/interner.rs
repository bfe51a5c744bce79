// 🔑 Entity interner - get-or-create by (kind, natural key)
//
// The first occurrence of a key creates the entity through the persister and
// fixes its identity. Later occurrences get the stored identity back and their
// builder is never run.

use crate::entities::{EntityDraft, Identity, Kind};
use crate::error::{IngestError, IngestResult};
use crate::persister::Persister;
use crate::schema::KindSpec;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Per-kind creation counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InternStats {
    pub created: BTreeMap<Kind, usize>,
    pub reused: BTreeMap<Kind, usize>,
}

impl InternStats {
    pub fn created_of(&self, kind: Kind) -> usize {
        self.created.get(&kind).copied().unwrap_or(0)
    }

    pub fn reused_of(&self, kind: Kind) -> usize {
        self.reused.get(&kind).copied().unwrap_or(0)
    }

    pub fn total_created(&self) -> usize {
        self.created.values().sum()
    }

    pub fn merge(&mut self, other: &InternStats) {
        for (kind, n) in &other.created {
            *self.created.entry(*kind).or_insert(0) += n;
        }
        for (kind, n) in &other.reused {
            *self.reused.entry(*kind).or_insert(0) += n;
        }
    }
}

#[derive(Debug, Default)]
pub struct EntityInterner {
    keys: HashMap<Kind, HashMap<String, Identity>>,
    stats: InternStats,
}

impl EntityInterner {
    pub fn new() -> Self {
        EntityInterner::default()
    }

    /// Return the identity for `key`, creating the entity on first sight.
    ///
    /// A blank key is `MissingKey` when the kind requires one. When it does
    /// not, every call creates a fresh entity that is never interned.
    pub fn get_or_create<P, F>(
        &mut self,
        persister: &mut P,
        spec: &KindSpec,
        key: Option<&str>,
        build: F,
    ) -> IngestResult<Identity>
    where
        P: Persister + ?Sized,
        F: FnOnce() -> IngestResult<EntityDraft>,
    {
        let key = key.map(str::trim).filter(|k| !k.is_empty());

        let key = match key {
            Some(key) => key,
            None if spec.key_required => {
                return Err(IngestError::MissingKey {
                    kind: spec.kind,
                    field: spec.key_field,
                })
            }
            None => return self.create(persister, spec.kind, build),
        };

        if let Some(id) = self.lookup(spec.kind, key) {
            *self.stats.reused.entry(spec.kind).or_insert(0) += 1;
            return Ok(id);
        }

        let id = self.create(persister, spec.kind, build)?;
        self.keys
            .entry(spec.kind)
            .or_default()
            .insert(key.to_string(), id);
        Ok(id)
    }

    fn create<P, F>(&mut self, persister: &mut P, kind: Kind, build: F) -> IngestResult<Identity>
    where
        P: Persister + ?Sized,
        F: FnOnce() -> IngestResult<EntityDraft>,
    {
        let draft = build()?;
        let id = persister.create(kind, &draft.attributes, &draft.refs)?;
        *self.stats.created.entry(kind).or_insert(0) += 1;

        tracing::debug!(kind = %kind, id = %id, "created entity");
        Ok(id)
    }

    pub fn lookup(&self, kind: Kind, key: &str) -> Option<Identity> {
        self.keys.get(&kind)?.get(key.trim()).copied()
    }

    /// Number of interned keys across all kinds
    pub fn len(&self) -> usize {
        self.keys.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &InternStats {
        &self.stats
    }

    /// Release every key map, keeping the counters
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}
