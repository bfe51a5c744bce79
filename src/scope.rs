// 🔒 Interning scope - one interner + one accumulator with a lifecycle
//
// Open -> Finalizing -> Closed. Interning and appends are only accepted while
// Open. A scope is finalized once, or abandoned without any patch.

use crate::accumulator::RelationshipAccumulator;
use crate::entities::{EntityDraft, Handle, Identity};
use crate::error::{IngestError, IngestResult};
use crate::finalize::{FinalizationPass, FinalizeReport};
use crate::interner::{EntityInterner, InternStats};
use crate::persister::Persister;
use crate::schema::{KindSpec, RelationshipSpec, ScopeLevel};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeState {
    Open,
    Finalizing,
    Closed,
}

#[derive(Debug)]
pub struct Scope {
    name: String,
    level: ScopeLevel,
    interner: EntityInterner,
    relationships: RelationshipAccumulator,
    state: ScopeState,
}

impl Scope {
    pub fn new(name: impl Into<String>, level: ScopeLevel) -> Self {
        let name = name.into();
        Scope {
            relationships: RelationshipAccumulator::new(name.clone()),
            name,
            level,
            interner: EntityInterner::new(),
            state: ScopeState::Open,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn level(&self) -> ScopeLevel {
        self.level
    }

    pub fn state(&self) -> ScopeState {
        self.state
    }

    pub fn stats(&self) -> &InternStats {
        self.interner.stats()
    }

    pub fn interner(&self) -> &EntityInterner {
        &self.interner
    }

    pub fn pending_edges(&self) -> usize {
        self.relationships.edge_count()
    }

    fn ensure_open(&self, operation: &'static str, target: impl FnOnce() -> String) -> IngestResult<()> {
        if self.state == ScopeState::Open {
            return Ok(());
        }
        Err(IngestError::ScopeClosed {
            scope: self.name.clone(),
            operation,
            target: target(),
        })
    }

    // ========================================================================
    // OPEN
    // ========================================================================

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
        self.ensure_open("get_or_create", || spec.kind.to_string())?;
        self.interner.get_or_create(persister, spec, key, build)
    }

    /// Buffer one edge of a multi-valued relationship
    pub fn append(
        &mut self,
        owner: Handle,
        spec: &RelationshipSpec,
        member: Handle,
    ) -> IngestResult<bool> {
        self.ensure_open("append", || spec.qualified_name())?;
        self.relationships
            .append(owner, spec.name, member.id, spec.membership)
    }

    // ========================================================================
    // FINALIZATION
    // ========================================================================

    /// Open -> Finalizing. Nothing is written yet.
    pub fn begin_finalize(&mut self) -> IngestResult<()> {
        self.ensure_open("finalize", || self.name.clone())?;
        self.state = ScopeState::Finalizing;
        Ok(())
    }

    /// Finalizing -> Closed: patch every buffered relationship
    pub fn complete_finalize<P: Persister + ?Sized>(
        &mut self,
        persister: &mut P,
    ) -> IngestResult<FinalizeReport> {
        if self.state != ScopeState::Finalizing {
            return Err(IngestError::ScopeClosed {
                scope: self.name.clone(),
                operation: "finalize",
                target: self.name.clone(),
            });
        }

        let report = FinalizationPass::new(&self.name, persister).run(&mut self.relationships);
        self.close();
        Ok(report)
    }

    pub fn finalize<P: Persister + ?Sized>(
        &mut self,
        persister: &mut P,
    ) -> IngestResult<FinalizeReport> {
        self.begin_finalize()?;
        self.complete_finalize(persister)
    }

    /// Close without patching. Returns how many buffered edges were dropped.
    pub fn abandon(&mut self) -> usize {
        let dropped = self.relationships.discard();
        self.close();
        if dropped > 0 {
            tracing::warn!(scope = %self.name, dropped, "abandoned scope with pending edges");
        }
        dropped
    }

    fn close(&mut self) {
        self.state = ScopeState::Closed;
        self.interner.clear();
    }
}
