// Entity model
//
// Each entity has:
// - A kind from a closed set
// - A natural key deciding whether two records describe the same entity
// - A persisted identity assigned once, at first creation

pub mod draft;
pub mod kind;

pub use draft::{Attributes, EntityDraft, Handle, Identity, References, Scalar};
pub use kind::Kind;
