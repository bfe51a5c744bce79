// 💾 Persister - the durable sink behind the engine
//
// The engine needs two operations: create an entity (assigning its identity)
// and, later, patch one multi-valued relationship of an owner with its full
// membership. Run-level audit events are optional.

use crate::entities::{Attributes, Identity, Kind, References};
use crate::error::PersistenceError;
use std::collections::HashSet;

pub trait Persister {
    /// Create an entity and return the identity assigned to it
    fn create(
        &mut self,
        kind: Kind,
        attributes: &Attributes,
        refs: &References,
    ) -> Result<Identity, PersistenceError>;

    /// Set the complete, ordered membership of one relationship of `owner`
    fn patch_collection(
        &mut self,
        owner: Identity,
        relationship: &str,
        members: &[Identity],
    ) -> Result<(), PersistenceError>;

    /// Audit hook for run-level events. Backends without an audit trail
    /// ignore it.
    fn record_event(
        &mut self,
        _event_type: &str,
        _subject: &str,
        _data: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }
}

impl<P: Persister + ?Sized> Persister for &mut P {
    fn create(
        &mut self,
        kind: Kind,
        attributes: &Attributes,
        refs: &References,
    ) -> Result<Identity, PersistenceError> {
        (**self).create(kind, attributes, refs)
    }

    fn patch_collection(
        &mut self,
        owner: Identity,
        relationship: &str,
        members: &[Identity],
    ) -> Result<(), PersistenceError> {
        (**self).patch_collection(owner, relationship, members)
    }

    fn record_event(
        &mut self,
        event_type: &str,
        subject: &str,
        data: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        (**self).record_event(event_type, subject, data)
    }
}

impl<P: Persister + ?Sized> Persister for Box<P> {
    fn create(
        &mut self,
        kind: Kind,
        attributes: &Attributes,
        refs: &References,
    ) -> Result<Identity, PersistenceError> {
        (**self).create(kind, attributes, refs)
    }

    fn patch_collection(
        &mut self,
        owner: Identity,
        relationship: &str,
        members: &[Identity],
    ) -> Result<(), PersistenceError> {
        (**self).patch_collection(owner, relationship, members)
    }

    fn record_event(
        &mut self,
        event_type: &str,
        subject: &str,
        data: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        (**self).record_event(event_type, subject, data)
    }
}

// ============================================================================
// IN-MEMORY PERSISTER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedEntity {
    pub id: Identity,
    pub kind: Kind,
    pub attributes: Attributes,
    pub refs: References,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPatch {
    pub owner: Identity,
    pub relationship: String,
    pub members: Vec<Identity>,
}

/// One successful call, in the order it happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create(Identity),
    Patch(Identity),
}

/// Records every call in order. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryPersister {
    next_id: i64,
    created: Vec<CreatedEntity>,
    patches: Vec<CollectionPatch>,
    history: Vec<Operation>,
    events: Vec<String>,
    fail_creates: HashSet<Kind>,
    fail_patches: HashSet<String>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        MemoryPersister::default()
    }

    /// Make every `create` of `kind` fail
    pub fn fail_create_of(mut self, kind: Kind) -> Self {
        self.fail_creates.insert(kind);
        self
    }

    /// Make every patch of `relationship` fail
    pub fn fail_patches_of(mut self, relationship: &str) -> Self {
        self.fail_patches.insert(relationship.to_string());
        self
    }

    pub fn created(&self) -> &[CreatedEntity] {
        &self.created
    }

    pub fn created_of(&self, kind: Kind) -> Vec<&CreatedEntity> {
        self.created.iter().filter(|e| e.kind == kind).collect()
    }

    pub fn entity(&self, id: Identity) -> Option<&CreatedEntity> {
        self.created.iter().find(|e| e.id == id)
    }

    pub fn patches(&self) -> &[CollectionPatch] {
        &self.patches
    }

    /// Event types recorded so far
    pub fn events(&self) -> &[String] {
        &self.events
    }

    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    pub fn patches_for(&self, owner: Identity, relationship: &str) -> Vec<&CollectionPatch> {
        self.patches
            .iter()
            .filter(|p| p.owner == owner && p.relationship == relationship)
            .collect()
    }
}

impl Persister for MemoryPersister {
    fn create(
        &mut self,
        kind: Kind,
        attributes: &Attributes,
        refs: &References,
    ) -> Result<Identity, PersistenceError> {
        if self.fail_creates.contains(&kind) {
            return Err(PersistenceError::create(format!(
                "refusing to create {}",
                kind
            )));
        }

        self.next_id += 1;
        let id = Identity(self.next_id);
        self.created.push(CreatedEntity {
            id,
            kind,
            attributes: attributes.clone(),
            refs: refs.clone(),
        });
        self.history.push(Operation::Create(id));
        Ok(id)
    }

    fn patch_collection(
        &mut self,
        owner: Identity,
        relationship: &str,
        members: &[Identity],
    ) -> Result<(), PersistenceError> {
        if self.fail_patches.contains(relationship) {
            return Err(PersistenceError::patch(format!(
                "refusing to patch {} of {}",
                relationship, owner
            )));
        }

        self.patches.push(CollectionPatch {
            owner,
            relationship: relationship.to_string(),
            members: members.to_vec(),
        });
        self.history.push(Operation::Patch(owner));
        Ok(())
    }

    fn record_event(
        &mut self,
        event_type: &str,
        _subject: &str,
        _data: &serde_json::Value,
    ) -> Result<(), PersistenceError> {
        self.events.push(event_type.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Scalar;

    #[test]
    fn test_identities_are_sequential() {
        let mut persister = MemoryPersister::new();
        let a = persister
            .create(Kind::Gene, &Attributes::new(), &References::new())
            .unwrap();
        let b = persister
            .create(Kind::Allele, &Attributes::new(), &References::new())
            .unwrap();

        assert_eq!(a, Identity(1));
        assert_eq!(b, Identity(2));
        assert_eq!(persister.created_of(Kind::Gene).len(), 1);
    }

    #[test]
    fn test_records_attributes_and_patches() {
        let mut persister = MemoryPersister::new();
        let mut attrs = Attributes::new();
        attrs.insert("symbol".to_string(), Scalar::from("cdc2"));

        let gene = persister
            .create(Kind::Gene, &attrs, &References::new())
            .unwrap();
        persister
            .patch_collection(gene, "alleles", &[Identity(9), Identity(8)])
            .unwrap();

        assert_eq!(persister.entity(gene).unwrap().attributes, attrs);
        let patches = persister.patches_for(gene, "alleles");
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].members, vec![Identity(9), Identity(8)]);
        assert_eq!(
            persister.history(),
            &[Operation::Create(gene), Operation::Patch(gene)]
        );
    }

    #[test]
    fn test_failure_injection() {
        let mut persister = MemoryPersister::new()
            .fail_create_of(Kind::Organism)
            .fail_patches_of("synonyms");

        assert!(persister
            .create(Kind::Organism, &Attributes::new(), &References::new())
            .is_err());
        assert!(persister
            .patch_collection(Identity(1), "synonyms", &[Identity(2)])
            .is_err());
        assert!(persister
            .patch_collection(Identity(1), "alleles", &[Identity(2)])
            .is_ok());
        assert!(persister.created().is_empty());
    }

    #[test]
    fn test_boxed_persister_forwards() {
        let mut boxed: Box<dyn Persister> = Box::new(MemoryPersister::new());
        let id = boxed
            .create(Kind::Gene, &Attributes::new(), &References::new())
            .unwrap();
        assert_eq!(id, Identity(1));
    }
}
