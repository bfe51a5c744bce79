// ⚙️ Record processing - the seam between converters and the engine
//
// A converter sees one record at a time through an IngestContext. The context
// routes interning to the scope that owns the kind, checks drafts and edges
// against the schema, and buffers multi-valued edges in the scope that owns
// the edge's owner kind.

use crate::entities::{EntityDraft, Handle, Kind};
use crate::error::{IngestError, IngestResult};
use crate::parser::{InputLayout, Record, SourceKind};
use crate::persister::Persister;
use crate::report::Diagnostic;
use crate::schema::{Schema, ScopeLevel};
use crate::scope::Scope;

// ============================================================================
// PROCESSOR TRAIT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FileDecision {
    Process,
    Skip(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Processed,
    Skipped(String),
}

/// One implementation per input source
pub trait RecordProcessor {
    fn source(&self) -> SourceKind;

    fn layout(&self) -> InputLayout;

    /// Called once per file, before its first record
    fn open_file(&mut self, _name: &str, _ctx: &mut IngestContext<'_>) -> IngestResult<FileDecision> {
        Ok(FileDecision::Process)
    }

    /// Turn one record into entities and edges.
    ///
    /// Returning `MissingKey` skips the record; any other error is fatal for
    /// the file.
    fn process(&mut self, record: &Record, ctx: &mut IngestContext<'_>) -> IngestResult<RecordOutcome>;
}

// ============================================================================
// INGEST CONTEXT
// ============================================================================

pub struct IngestContext<'a> {
    schema: &'a Schema,
    persister: &'a mut dyn Persister,
    file: &'a mut Scope,
    run: &'a mut Scope,
    diagnostics: &'a mut Vec<Diagnostic>,
    line: usize,
    edges: usize,
}

impl<'a> IngestContext<'a> {
    pub fn new(
        schema: &'a Schema,
        persister: &'a mut dyn Persister,
        file: &'a mut Scope,
        run: &'a mut Scope,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        IngestContext {
            schema,
            persister,
            file,
            run,
            diagnostics,
            line: 0,
            edges: 0,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn set_line(&mut self, line: usize) {
        self.line = line;
    }

    /// Edges buffered through this context
    pub fn edges_appended(&self) -> usize {
        self.edges
    }

    /// The key itself, or `MissingKey` for `kind`
    pub fn require_key<'k>(&self, kind: Kind, key: Option<&'k str>) -> IngestResult<&'k str> {
        key.map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| IngestError::MissingKey {
                kind,
                field: self.schema.kind(kind).key_field,
            })
    }

    /// Get or create an entity of `kind` in the scope that owns the kind
    pub fn intern<F>(&mut self, kind: Kind, key: Option<&str>, build: F) -> IngestResult<Handle>
    where
        F: FnOnce() -> EntityDraft,
    {
        let schema = self.schema;
        let spec = schema.kind(kind);
        let scope = match spec.scope {
            ScopeLevel::File => &mut *self.file,
            ScopeLevel::Run => &mut *self.run,
        };

        let id = scope.get_or_create(&mut *self.persister, spec, key, || {
            let draft = build();
            schema.check_draft(kind, &draft)?;
            Ok(draft)
        })?;

        Ok(Handle::new(kind, id))
    }

    /// Like `intern`, but a missing key becomes a diagnostic and `None`
    pub fn intern_optional<F>(
        &mut self,
        kind: Kind,
        key: Option<&str>,
        build: F,
    ) -> IngestResult<Option<Handle>>
    where
        F: FnOnce() -> EntityDraft,
    {
        match self.intern(kind, key, build) {
            Ok(handle) => Ok(Some(handle)),
            Err(err @ IngestError::MissingKey { .. }) => {
                self.report_missing_key(&err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Interning for optional references: an absent key is silently `None`
    pub fn intern_if_present<F>(
        &mut self,
        kind: Kind,
        key: Option<&str>,
        build: F,
    ) -> IngestResult<Option<Handle>>
    where
        F: FnOnce() -> EntityDraft,
    {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(key) => self.intern(kind, Some(key), build).map(Some),
            None => Ok(None),
        }
    }

    /// Buffer one edge of a multi-valued relationship
    pub fn link(&mut self, owner: Handle, relationship: &str, member: Handle) -> IngestResult<()> {
        let schema = self.schema;
        let spec = schema.check_edge(owner, relationship, member)?;

        let scope = match schema.scope_of(owner.kind) {
            ScopeLevel::File => &mut *self.file,
            ScopeLevel::Run => &mut *self.run,
        };

        if scope.append(owner, spec, member)? {
            self.edges += 1;
        }
        Ok(())
    }

    pub fn report_missing_key(&mut self, err: &IngestError) {
        tracing::warn!(line = self.line, error = %err, "missing natural key");
        self.diagnostics.push(Diagnostic::missing_key(self.line, err));
    }

    pub fn diagnose(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Identity;
    use crate::persister::MemoryPersister;
    use crate::report::DiagnosticKind;

    struct Fixture {
        schema: Schema,
        persister: MemoryPersister,
        file: Scope,
        run: Scope,
        diagnostics: Vec<Diagnostic>,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                schema: Schema::new(),
                persister: MemoryPersister::new(),
                file: Scope::new("test.tsv", ScopeLevel::File),
                run: Scope::new("vocabulary", ScopeLevel::Run),
                diagnostics: Vec::new(),
            }
        }

        fn ctx(&mut self) -> IngestContext<'_> {
            IngestContext::new(
                &self.schema,
                &mut self.persister,
                &mut self.file,
                &mut self.run,
                &mut self.diagnostics,
            )
        }
    }

    #[test]
    fn test_intern_routes_by_kind_scope() {
        let mut fx = Fixture::new();
        {
            let mut ctx = fx.ctx();
            ctx.intern(Kind::Gene, Some("G1"), EntityDraft::new).unwrap();
            ctx.intern(Kind::Organism, Some("4896"), EntityDraft::new)
                .unwrap();
        }

        assert_eq!(fx.file.interner().lookup(Kind::Gene, "G1"), Some(Identity(1)));
        assert_eq!(fx.file.interner().lookup(Kind::Organism, "4896"), None);
        assert_eq!(fx.run.interner().lookup(Kind::Organism, "4896"), Some(Identity(2)));
    }

    #[test]
    fn test_intern_rejects_bad_references() {
        let mut fx = Fixture::new();
        let mut ctx = fx.ctx();
        let organism = ctx
            .intern(Kind::Organism, Some("4896"), EntityDraft::new)
            .unwrap();

        let err = ctx
            .intern(Kind::Allele, Some("A1"), || {
                EntityDraft::new().with_ref("gene", organism)
            })
            .unwrap_err();
        assert!(matches!(err, IngestError::CardinalityMismatch { .. }));
    }

    #[test]
    fn test_intern_optional_records_diagnostic() {
        let mut fx = Fixture::new();
        {
            let mut ctx = fx.ctx();
            ctx.set_line(4);
            let gene = ctx
                .intern_optional(Kind::Gene, Some(""), EntityDraft::new)
                .unwrap();
            assert!(gene.is_none());

            let absent = ctx
                .intern_if_present(Kind::PhenotypeTerm, None, EntityDraft::new)
                .unwrap();
            assert!(absent.is_none());
        }

        assert_eq!(fx.diagnostics.len(), 1);
        assert_eq!(fx.diagnostics[0].kind, DiagnosticKind::MissingKey);
        assert_eq!(fx.diagnostics[0].line, Some(4));
        assert!(fx.persister.created().is_empty());
    }

    #[test]
    fn test_link_buffers_in_owner_scope() {
        let mut fx = Fixture::new();
        {
            let mut ctx = fx.ctx();
            let gene = ctx.intern(Kind::Gene, Some("G1"), EntityDraft::new).unwrap();
            let allele = ctx.intern(Kind::Allele, Some("A1"), EntityDraft::new).unwrap();
            ctx.link(gene, "alleles", allele).unwrap();
            // Gene.alleles is a set: the repeat is not buffered
            ctx.link(gene, "alleles", allele).unwrap();
            assert_eq!(ctx.edges_appended(), 1);

            let synonym = ctx.intern(Kind::Synonym, Some("G1|cdc2"), EntityDraft::new).unwrap();
            ctx.link(gene, "synonyms", synonym).unwrap();
            ctx.link(gene, "synonyms", synonym).unwrap();
            assert_eq!(ctx.edges_appended(), 3);

            let err = ctx.link(allele, "gene", gene).unwrap_err();
            assert!(matches!(err, IngestError::CardinalityMismatch { .. }));
        }

        assert_eq!(fx.file.pending_edges(), 3);
        assert_eq!(fx.run.pending_edges(), 0);
        assert!(fx.persister.patches().is_empty());
    }

    #[test]
    fn test_require_key() {
        let mut fx = Fixture::new();
        let ctx = fx.ctx();
        assert_eq!(ctx.require_key(Kind::Allele, Some(" ade6-M26 ")).unwrap(), "ade6-M26");

        let err = ctx.require_key(Kind::Allele, None).unwrap_err();
        assert!(matches!(
            err,
            IngestError::MissingKey {
                kind: Kind::Allele,
                field: "identifier"
            }
        ));
    }
}
