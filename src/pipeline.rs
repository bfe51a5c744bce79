// 🚚 Loader - drives files through converters, one scope per file
//
// File-scoped kinds are interned and patched per file. Run-scoped kinds
// (shared vocabularies) live in one scope for the whole run and are patched
// by `finish`. A fatal error abandons the current file and the vocabulary
// without patching anything, and refuses further work.

use crate::config::LoaderConfig;
use crate::converters::get_processor;
use crate::error::{IngestError, IngestResult};
use crate::parser::{detect_source, read_records, Record, SourceKind};
use crate::persister::Persister;
use crate::processor::{FileDecision, IngestContext, RecordOutcome, RecordProcessor};
use crate::report::{Diagnostic, FileReport, RunReport};
use crate::schema::{Schema, ScopeLevel};
use crate::scope::Scope;
use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::rc::Rc;

const VOCABULARY_SCOPE: &str = "vocabulary";

pub struct Loader<P: Persister> {
    schema: Schema,
    persister: P,
    vocabulary: Scope,
    report: RunReport,
    row_limit: Option<usize>,
    started: bool,
    poisoned: Option<String>,
}

impl<P: Persister> Loader<P> {
    pub fn new(persister: P) -> Self {
        Self::with_schema(Schema::new(), persister)
    }

    pub fn with_schema(schema: Schema, persister: P) -> Self {
        Loader {
            schema,
            persister,
            vocabulary: Scope::new(VOCABULARY_SCOPE, ScopeLevel::Run),
            report: RunReport::new(),
            row_limit: None,
            started: false,
            poisoned: None,
        }
    }

    /// Schema overrides and row limit from a loader config
    pub fn from_config(config: &LoaderConfig, persister: P) -> anyhow::Result<Self> {
        let schema = Schema::with_config(config)?;
        Ok(Self::with_schema(schema, persister).with_row_limit(config.row_limit))
    }

    /// Builder: stop each file after `limit` records
    pub fn with_row_limit(mut self, limit: Option<usize>) -> Self {
        self.row_limit = limit;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn persister(&self) -> &P {
        &self.persister
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    // ========================================================================
    // LOADING
    // ========================================================================

    /// Load one file. The source is detected from the file name when not given.
    pub fn load_path(&mut self, path: &Path, source: Option<SourceKind>) -> anyhow::Result<&FileReport> {
        let source = match source {
            Some(source) => source,
            None => detect_source(path)?,
        };

        let file = File::open(path)
            .map_err(IngestError::Io)
            .with_context(|| format!("Failed to open input file: {}", path.display()))?;
        let digest = StreamDigest::default();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let mut processor = get_processor(source);
        let records: Box<dyn Iterator<Item = IngestResult<Record>>> =
            match read_records(digest.wrap(BufReader::new(file)), &name, processor.layout()) {
                Ok(stream) => stream,
                // Unparseable document: fatal, reported through the same path
                Err(err) => Box::new(std::iter::once(Err(err))),
            };

        let report = self
            .load_stream(&name, processor.as_mut(), records, Some(digest))
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(report)
    }

    /// Load an already-open record stream as one file
    pub fn load_records<I>(
        &mut self,
        name: &str,
        processor: &mut dyn RecordProcessor,
        records: I,
    ) -> IngestResult<&FileReport>
    where
        I: IntoIterator<Item = IngestResult<Record>>,
    {
        self.load_stream(name, processor, records, None)
    }

    fn load_stream<I>(
        &mut self,
        name: &str,
        processor: &mut dyn RecordProcessor,
        records: I,
        digest: Option<StreamDigest>,
    ) -> IngestResult<&FileReport>
    where
        I: IntoIterator<Item = IngestResult<Record>>,
    {
        if let Some(reason) = &self.poisoned {
            return Err(IngestError::ScopeClosed {
                scope: VOCABULARY_SCOPE.to_string(),
                operation: "load",
                target: format!("{} (run aborted: {})", name, reason),
            });
        }
        self.ensure_started();

        tracing::info!(file = name, source = %processor.source(), "loading file");

        let mut report = FileReport::new(name, processor.source().name());
        let mut scope = Scope::new(name, ScopeLevel::File);

        let scanned = self.scan(&mut scope, processor, records, &mut report);
        report.stats = scope.stats().clone();
        report.digest = digest.and_then(|d| d.finish());

        let outcome = match scanned {
            Ok(()) => scope.finalize(&mut self.persister).map(|finalized| {
                for failure in &finalized.failures {
                    report.diagnostics.push(Diagnostic::patch_failed(format!(
                        "{}.{} ({} members): {}",
                        failure.owner, failure.relationship, failure.members, failure.error
                    )));
                }
                report.finalize = finalized;
            }),
            Err(err) => Err(err),
        };

        if let Err(err) = outcome {
            scope.abandon();
            report.fatal = Some(err.to_string());
            self.poison(err.to_string());
            tracing::error!(file = name, error = %err, "load aborted");
            self.report.files.push(report);
            return Err(err);
        }

        tracing::info!(
            file = name,
            records = report.records_read,
            skipped = report.records_skipped,
            created = report.stats.total_created(),
            patches = report.finalize.patches_issued,
            "loaded file"
        );
        self.audit(
            "file_loaded",
            name,
            json!({
                "source": report.source,
                "digest": report.digest,
                "records_read": report.records_read,
                "records_skipped": report.records_skipped,
                "created": report.stats.total_created(),
                "patches": report.finalize.patches_issued,
                "patch_failures": report.finalize.failures.len(),
            }),
        );

        let index = self.report.files.len();
        self.report.files.push(report);
        Ok(&self.report.files[index])
    }

    fn scan<I>(
        &mut self,
        scope: &mut Scope,
        processor: &mut dyn RecordProcessor,
        records: I,
        report: &mut FileReport,
    ) -> IngestResult<()>
    where
        I: IntoIterator<Item = IngestResult<Record>>,
    {
        let mut ctx = IngestContext::new(
            &self.schema,
            &mut self.persister,
            scope,
            &mut self.vocabulary,
            &mut report.diagnostics,
        );

        if let FileDecision::Skip(reason) = processor.open_file(&report.name, &mut ctx)? {
            tracing::info!(file = %report.name, reason = %reason, "skipping file");
            ctx.diagnose(Diagnostic::skipped_file(reason));
            return Ok(());
        }

        for item in records {
            if self.row_limit.is_some_and(|limit| report.records_read >= limit) {
                tracing::debug!(file = %report.name, "row limit reached");
                break;
            }

            let record = item?;
            report.records_read += 1;
            ctx.set_line(record.line);

            match processor.process(&record, &mut ctx) {
                Ok(RecordOutcome::Processed) => report.records_processed += 1,
                Ok(RecordOutcome::Skipped(reason)) => {
                    report.records_skipped += 1;
                    ctx.diagnose(Diagnostic::skipped_record(record.line, reason));
                }
                Err(err) if !err.is_fatal() => {
                    report.records_skipped += 1;
                    ctx.report_missing_key(&err);
                }
                Err(err) => return Err(err),
            }
        }

        report.edges_appended = ctx.edges_appended();
        Ok(())
    }

    // ========================================================================
    // RUN LIFECYCLE
    // ========================================================================

    /// Abort the run: the vocabulary is discarded without patches
    pub fn abort(&mut self, reason: &str) {
        self.poison(reason.to_string());
    }

    fn poison(&mut self, reason: String) {
        if self.poisoned.is_none() {
            self.vocabulary.abandon();
            self.report.aborted = Some(reason.clone());
            self.poisoned = Some(reason);
        }
    }

    /// Finalize the vocabulary and close the run
    pub fn finish(mut self) -> (RunReport, P) {
        self.ensure_started();

        self.report.vocabulary_stats = self.vocabulary.stats().clone();
        if self.poisoned.is_none() {
            match self.vocabulary.finalize(&mut self.persister) {
                Ok(finalized) => self.report.vocabulary = Some(finalized),
                Err(err) => {
                    tracing::error!(error = %err, "vocabulary finalize failed");
                    self.report.aborted = Some(err.to_string());
                }
            }
        }

        self.report.finished_at = Some(Utc::now());
        tracing::info!(
            run_id = %self.report.run_id,
            files = self.report.files.len(),
            patches = self.report.patches_issued(),
            failures = self.report.patch_failures(),
            aborted = self.report.aborted.is_some(),
            "run finished"
        );

        let run_id = self.report.run_id.to_string();
        self.audit(
            "run_finished",
            &run_id,
            json!({
                "files": self.report.files.len(),
                "patches": self.report.patches_issued(),
                "patch_failures": self.report.patch_failures(),
                "aborted": self.report.aborted,
            }),
        );

        (self.report, self.persister)
    }

    fn ensure_started(&mut self) {
        if self.started {
            return;
        }
        self.started = true;

        let run_id = self.report.run_id.to_string();
        let started_at = self.report.started_at.to_rfc3339();
        self.audit("run_started", &run_id, json!({ "started_at": started_at }));
    }

    fn audit(&mut self, event_type: &str, subject: &str, data: serde_json::Value) {
        if let Err(err) = self.persister.record_event(event_type, subject, &data) {
            tracing::warn!(event = event_type, error = %err, "failed to record event");
        }
    }
}

// ============================================================================
// STREAMING DIGEST
// ============================================================================

#[derive(Default)]
struct DigestState {
    hasher: Sha256,
    complete: bool,
}

/// SHA-256 of the bytes handed out by a wrapped reader.
///
/// The handle is shared with the reader, which ends up inside the record
/// stream, so the digest can be read once the scan is over.
#[derive(Clone, Default)]
pub struct StreamDigest(Rc<RefCell<DigestState>>);

impl StreamDigest {
    pub fn wrap<R: Read>(&self, inner: R) -> DigestReader<R> {
        DigestReader {
            inner,
            digest: self.clone(),
        }
    }

    /// Hex digest, or `None` if the reader was not read to the end
    pub fn finish(&self) -> Option<String> {
        let state = self.0.borrow();
        state
            .complete
            .then(|| format!("{:x}", state.hasher.clone().finalize()))
    }
}

pub struct DigestReader<R> {
    inner: R,
    digest: StreamDigest,
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        let mut state = self.digest.0.borrow_mut();
        if n == 0 && !buf.is_empty() {
            state.complete = true;
        } else {
            state.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}
