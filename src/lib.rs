// Pombe Loader - Core Library
// Entity interning and deferred relationship resolution for pombe data files.
// The CLI and the integration tests go through this crate.

pub mod accumulator;
pub mod config;
pub mod converters;
pub mod db;
pub mod entities;
pub mod error;
pub mod finalize;
pub mod interner;
pub mod parser;
pub mod persister;
pub mod pipeline;
pub mod processor;
pub mod report;
pub mod schema;
pub mod scope;

// Re-export commonly used types
pub use accumulator::{DrainedRelationship, RelationshipAccumulator};
pub use config::LoaderConfig;
pub use converters::{
    get_processor, AllelesConverter, DiseasesConverter, GenesConverter, OrthologuesConverter,
};
pub use db::{setup_database, Event, SqlitePersister};
pub use entities::{EntityDraft, Handle, Identity, Kind, Scalar};
pub use error::{IngestError, IngestResult, PersistenceError};
pub use finalize::{FinalizationPass, FinalizeReport, PatchFailure};
pub use interner::{EntityInterner, InternStats};
pub use parser::{detect_source, read_records, InputLayout, Record, SourceKind};
pub use persister::{MemoryPersister, Persister};
pub use pipeline::Loader;
pub use processor::{FileDecision, IngestContext, RecordOutcome, RecordProcessor};
pub use report::{Diagnostic, DiagnosticKind, FileReport, RunReport, Severity};
pub use schema::{Cardinality, KindSpec, Membership, RelationshipSpec, Schema, ScopeLevel};
pub use scope::{Scope, ScopeState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
