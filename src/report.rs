// 📋 Reports - diagnostics and per-file / per-run summaries
//
// Recoverable problems never stop a load. They end up here, one diagnostic
// per occurrence, and the CLI prints them after each file.

use crate::entities::Kind;
use crate::error::IngestError;
use crate::finalize::FinalizeReport;
use crate::interner::InternStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    MissingKey,
    SkippedRecord,
    SkippedFile,
    PatchFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn missing_key(line: usize, err: &IngestError) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind: DiagnosticKind::MissingKey,
            line: Some(line),
            message: err.to_string(),
        }
    }

    pub fn skipped_record(line: usize, reason: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind: DiagnosticKind::SkippedRecord,
            line: Some(line),
            message: reason.into(),
        }
    }

    pub fn skipped_file(reason: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            kind: DiagnosticKind::SkippedFile,
            line: None,
            message: reason.into(),
        }
    }

    pub fn patch_failed(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::PatchFailed,
            line: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match self.line {
            Some(line) => write!(f, "{} (line {}): {}", level, line, self.message),
            None => write!(f, "{}: {}", level, self.message),
        }
    }
}

// ============================================================================
// FILE REPORT
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct FileReport {
    pub name: String,
    pub source: String,
    /// SHA-256 of the file contents, when loaded from disk
    pub digest: Option<String>,
    pub records_read: usize,
    pub records_processed: usize,
    pub records_skipped: usize,
    pub stats: InternStats,
    pub edges_appended: usize,
    pub finalize: FinalizeReport,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when a fatal error abandoned the file
    pub fatal: Option<String>,
}

impl FileReport {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        FileReport {
            name: name.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.diagnostics.iter().filter(|d| d.kind == kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.fatal.is_none() && self.finalize.failures.is_empty()
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
    /// Run-scoped vocabulary: creations and the end-of-run finalize
    pub vocabulary_stats: InternStats,
    pub vocabulary: Option<FinalizeReport>,
    pub aborted: Option<String>,
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
            vocabulary_stats: InternStats::default(),
            vocabulary: None,
            aborted: None,
        }
    }

    /// Entities created across every file and the vocabulary
    pub fn created_of(&self, kind: Kind) -> usize {
        self.files
            .iter()
            .map(|f| f.stats.created_of(kind))
            .sum::<usize>()
            + self.vocabulary_stats.created_of(kind)
    }

    pub fn patches_issued(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.finalize.patches_issued)
            .sum::<usize>()
            + self.vocabulary.as_ref().map_or(0, |v| v.patches_issued)
    }

    pub fn patch_failures(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.finalize.failures.len())
            .sum::<usize>()
            + self.vocabulary.as_ref().map_or(0, |v| v.failures.len())
    }

    pub fn diagnostics(&self) -> usize {
        self.files.iter().map(|f| f.diagnostics.len()).sum()
    }

    /// No fatal error and every patch went through
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.patch_failures() == 0
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
