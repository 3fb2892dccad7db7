//! Audit orchestrator: the main entry point for auditing a data file.
//!
//! Plans one task per (constraint, field), runs every task concurrently on a
//! rayon pool and merges their results in submission order: primary key
//! first, then not-null fields, then type checks for every field. Completion
//! order never affects the report.
//!
//! Every checker dispatch is wrapped in `catch_unwind` so that a panic in one
//! checker fails the run with [`AuditError::Internal`] instead of unwinding
//! through the pool (or the Python process).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use crate::cache::AuditCache;
use crate::checkers::{checkers_for, CheckContext};
use crate::config::AuditConfig;
use crate::error::AuditError;
use crate::line_source::{file_sha256, CancelToken, FileLineSource, LineSource};
use crate::schema::{load_schema, Field, Schema};
use crate::types::{AuditReport, CheckResult, ConstraintKind};

/// One planned unit of work: a constraint checked against one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditTask {
    pub constraint: ConstraintKind,
    pub field: Field,
}

/// Lifecycle of the most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
    Idle,
    Running,
    Collecting,
    Done,
}

impl AuditPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Collecting,
            3 => Self::Done,
            _ => Self::Idle,
        }
    }
}

/// The audit orchestrator.
///
/// Holds the configuration, the cancellation token shared with every task,
/// and the phase of the most recent run.
///
/// An engine tracks one run at a time: the phase and the cancellation token
/// belong to the engine, not to a run. Concurrent audits should each use
/// their own engine; sharing one makes `phase()` report whichever run wrote
/// last and lets `cancel()` stop all of them.
pub struct AuditEngine {
    config: AuditConfig,
    cancel: CancelToken,
    phase: AtomicU8,
}

impl AuditEngine {
    #[must_use]
    pub fn new(config: AuditConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
            phase: AtomicU8::new(AuditPhase::Idle as u8),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Phase of the current or most recent run.
    #[must_use]
    pub fn phase(&self) -> AuditPhase {
        AuditPhase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Token that cancels in-flight and future runs of this engine.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Rearm the engine after a cancellation.
    pub fn reset_cancel(&self) {
        self.cancel.reset();
    }

    fn set_phase(&self, phase: AuditPhase) {
        log::debug!("Audit phase: {:?}", phase);
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    /// Build the task list for `schema`, in merge order.
    #[must_use]
    pub fn plan(schema: &Schema) -> Vec<AuditTask> {
        let mut tasks = Vec::with_capacity(schema.width() + 1);

        if let Some(pk) = schema.primary_key_field() {
            tasks.push(AuditTask {
                constraint: ConstraintKind::PrimaryKey,
                field: pk.clone(),
            });
        }
        tasks.extend(schema.not_null_fields().map(|f| AuditTask {
            constraint: ConstraintKind::NotNull,
            field: f.clone(),
        }));
        tasks.extend(schema.all_fields().iter().map(|f| AuditTask {
            constraint: ConstraintKind::TypeMismatch,
            field: f.clone(),
        }));

        tasks
    }

    /// Load a schema file with the configured unknown-type policy, then audit
    /// `data_path` against it.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Schema`] for a bad schema, otherwise as
    /// [`AuditEngine::audit`].
    pub fn audit_files(
        &self,
        schema_path: &Path,
        data_path: &Path,
    ) -> Result<AuditReport, AuditError> {
        let schema = load_schema(schema_path, self.config.unknown_type_policy)?;
        self.audit(&schema, data_path)
    }

    /// Audit a data file on disk, consulting the audit cache when enabled.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Cancelled`] if the engine is cancelled, even when
    /// the cache holds a report. Returns [`AuditError::Io`] if the file cannot
    /// be read, and otherwise as [`AuditEngine::audit_source`].
    pub fn audit(&self, schema: &Schema, data_path: &Path) -> Result<AuditReport, AuditError> {
        if self.cancel.is_cancelled() {
            self.set_phase(AuditPhase::Idle);
            return Err(AuditError::Cancelled);
        }

        let data_file = data_path.display().to_string();
        let content_hash = match file_sha256(data_path) {
            Ok(h) => h,
            Err(e) => {
                self.set_phase(AuditPhase::Idle);
                return Err(e.into());
            }
        };
        let schema_hash = schema.schema_hash();

        let cache_dir = data_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut cache = AuditCache::new(cache_dir, &self.config);

        if let Some(hit) = cache.lookup(&data_file, &content_hash, &schema_hash) {
            log::info!("Audit of {} served from cache", data_file);
            let mut report = hit.clone();
            report.from_cache = true;
            self.set_phase(AuditPhase::Done);
            return Ok(report);
        }

        let mut report = self.audit_source(schema, &FileLineSource::new(data_path))?;
        report.data_file_hash = content_hash;

        cache.update(&data_file, &schema_hash, &report);
        cache.flush();

        Ok(report)
    }

    /// Run every planned task against `source` and merge the results.
    ///
    /// # Errors
    ///
    /// The first failed task in submission order fails the whole run; no
    /// partial report is produced.
    pub fn audit_source(
        &self,
        schema: &Schema,
        source: &dyn LineSource,
    ) -> Result<AuditReport, AuditError> {
        let start = Instant::now();
        let tasks = Self::plan(schema);
        let description = source.describe();

        log::info!(
            "Audit started for {} against table {} ({} tasks)",
            description,
            schema.table_name(),
            tasks.len()
        );
        self.set_phase(AuditPhase::Running);

        let outcomes = match self.run_tasks(&tasks, schema.separator(), source) {
            Ok(o) => o,
            Err(e) => {
                self.set_phase(AuditPhase::Idle);
                return Err(e);
            }
        };

        self.set_phase(AuditPhase::Collecting);
        let results = match outcomes.into_iter().collect::<Result<Vec<CheckResult>, _>>() {
            Ok(r) => r,
            Err(e) => {
                log::debug!("Audit of {} failed: {}", description, e);
                self.set_phase(AuditPhase::Idle);
                return Err(e);
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let report = AuditReport::from_results(
            schema.table_name(),
            &description,
            "",
            &results,
            elapsed_ms,
        );

        log::info!(
            "Audit completed for {} in {} ms: {} findings",
            description,
            elapsed_ms,
            report.total_findings
        );
        self.set_phase(AuditPhase::Done);

        Ok(report)
    }

    /// Execute tasks in parallel; outcomes come back in submission order.
    fn run_tasks(
        &self,
        tasks: &[AuditTask],
        separator: char,
        source: &dyn LineSource,
    ) -> Result<Vec<Result<CheckResult, AuditError>>, AuditError> {
        let cancel = &self.cancel;
        let run = || {
            tasks
                .par_iter()
                .map(|task| run_task(task, separator, source, cancel))
                .collect::<Vec<_>>()
        };

        if self.config.threads == 0 {
            return Ok(run());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| AuditError::ThreadPool(e.to_string()))?;
        Ok(pool.install(run))
    }
}

/// Run every checker of one task, each wrapped in `catch_unwind`.
fn run_task(
    task: &AuditTask,
    separator: char,
    source: &dyn LineSource,
    cancel: &CancelToken,
) -> Result<CheckResult, AuditError> {
    let ctx = CheckContext {
        source,
        field: &task.field,
        separator,
        cancel,
    };

    let mut groups = Vec::new();
    for checker in checkers_for(task.constraint) {
        match catch_unwind(AssertUnwindSafe(|| checker.check(&ctx))) {
            Ok(group) => groups.push(group?),
            Err(panic_info) => {
                let message = if let Some(s) = panic_info.downcast_ref::<String>() {
                    s.clone()
                } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                    (*s).to_owned()
                } else {
                    "unknown panic".to_owned()
                };
                return Err(AuditError::Internal {
                    check: checker.name().to_owned(),
                    field: task.field.name.clone(),
                    message,
                });
            }
        }
    }

    let result = CheckResult {
        constraint: task.constraint,
        field_name: task.field.name.clone(),
        groups,
    };
    log::debug!(
        "Task {} on {} finished with {} findings",
        task.constraint,
        task.field.name,
        result.finding_count()
    );
    Ok(result)
}
