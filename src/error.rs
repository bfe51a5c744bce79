// ⚠️ Error taxonomy for the ingestion engine
//
// MissingKey is recovered locally (skip + diagnostic). Everything else aborts
// the scope it happened in.

use crate::entities::Kind;
use thiserror::Error;

/// Failure reported by a `Persister` backend.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{operation} failed: {message}")]
pub struct PersistenceError {
    /// "create" or "patch"
    pub operation: &'static str,
    pub message: String,
}

impl PersistenceError {
    pub fn create(message: impl Into<String>) -> Self {
        PersistenceError {
            operation: "create",
            message: message.into(),
        }
    }

    pub fn patch(message: impl Into<String>) -> Self {
        PersistenceError {
            operation: "patch",
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for PersistenceError {
    fn from(err: rusqlite::Error) -> Self {
        PersistenceError {
            operation: "sqlite",
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError {
            operation: "encode",
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("missing natural key `{field}` for {kind}")]
    MissingKey { kind: Kind, field: &'static str },

    #[error("scope `{scope}` is closed: {operation} on `{target}` after finalization began")]
    ScopeClosed {
        scope: String,
        operation: &'static str,
        target: String,
    },

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("malformed input in {source_name} at line {line}: {message}")]
    MalformedInput {
        source_name: String,
        line: usize,
        message: String,
    },

    #[error("relationship `{relationship}` is not declared for {owner}")]
    UndeclaredRelationship { owner: Kind, relationship: String },

    #[error("relationship `{owner}.{relationship}` cannot be used this way: {message}")]
    CardinalityMismatch {
        owner: Kind,
        relationship: String,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the error aborts the current scope.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, IngestError::MissingKey { .. })
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
