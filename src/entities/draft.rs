// 📦 Entity values - identities, scalars and the draft handed to a persister
//
// An entity's identity is assigned by the persister on first creation and
// never changes. Attribute values are first-write-wins: a draft is only
// built for the occurrence that actually creates the entity.

use super::kind::Kind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// IDENTITY
// ============================================================================

/// Persisted identity assigned by the persister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(pub i64);

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity together with the kind it was created as.
///
/// Returned by interning so relationship registration can check the owner
/// and member kinds against the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub kind: Kind,
    pub id: Identity,
}

impl Handle {
    pub fn new(kind: Kind, id: Identity) -> Self {
        Handle { kind, id }
    }
}

// ============================================================================
// SCALAR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

// ============================================================================
// ENTITY DRAFT
// ============================================================================

pub type Attributes = BTreeMap<String, Scalar>;
pub type References = BTreeMap<String, Handle>;

/// Attributes and single-valued references for an entity about to be created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityDraft {
    pub attributes: Attributes,
    pub refs: References,
}

impl EntityDraft {
    pub fn new() -> Self {
        EntityDraft::default()
    }

    /// Builder: set an attribute unconditionally
    pub fn with(mut self, name: &str, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Builder: set a text attribute only when it carries a value
    pub fn with_opt(mut self, name: &str, value: Option<&str>) -> Self {
        self.set_if_present(name, value);
        self
    }

    /// Builder: set a single-valued reference
    pub fn with_ref(mut self, name: &str, target: Handle) -> Self {
        self.refs.insert(name.to_string(), target);
        self
    }

    /// Builder: set a single-valued reference when the target was resolved
    pub fn with_opt_ref(mut self, name: &str, target: Option<Handle>) -> Self {
        if let Some(handle) = target {
            self.refs.insert(name.to_string(), handle);
        }
        self
    }

    pub fn set_if_present(&mut self, name: &str, value: Option<&str>) {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.attributes
                .insert(name.to_string(), Scalar::Text(v.to_string()));
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&Scalar> {
        self.attributes.get(name)
    }

    pub fn reference(&self, name: &str) -> Option<Handle> {
        self.refs.get(name).copied()
    }
}
