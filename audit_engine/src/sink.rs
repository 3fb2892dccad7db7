//! Report sink: delivers a finished [`AuditReport`] to the audit log.
//!
//! Every finding is emitted at `info` through the `log` facade, in merge
//! order. When a log file is configured it is truncated and rewritten with
//! one message per line, so the file always describes the most recent run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AuditConfig;
use crate::reporter;
use crate::types::AuditReport;

/// What the caller should do next with the audited file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOutcome {
    /// No inconsistencies; the file may be loaded.
    Clean,
    /// The file has findings and must not be loaded.
    Inconsistent { findings: u32 },
}

#[derive(Debug, thiserror::Error)]
#[error("Failed to write audit log '{path}': {source}")]
pub struct SinkError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

/// Writes reports to the `log` facade and, optionally, an audit log file.
#[derive(Debug, Clone, Default)]
pub struct ReportSink {
    log_file: Option<PathBuf>,
}

impl ReportSink {
    /// A sink that only emits through the `log` facade.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that also rewrites `path` on every delivery.
    #[must_use]
    pub fn with_log_file(path: impl Into<PathBuf>) -> Self {
        Self {
            log_file: Some(path.into()),
        }
    }

    /// A sink writing to the configured `log_file`, if any.
    #[must_use]
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            log_file: config.log_file.as_ref().map(PathBuf::from),
        }
    }

    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Log every finding and classify the report.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the audit log file cannot be written.
    pub fn deliver(&self, report: &AuditReport) -> Result<SinkOutcome, SinkError> {
        for message in &report.messages {
            log::info!("{}", message);
        }

        if let Some(path) = &self.log_file {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| SinkError {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            fs::write(path, reporter::to_text(report)).map_err(|source| SinkError {
                path: path.display().to_string(),
                source,
            })?;
        }

        log::info!("{}", reporter::summary_line(report));

        if report.total_findings == 0 {
            Ok(SinkOutcome::Clean)
        } else {
            Ok(SinkOutcome::Inconsistent {
                findings: report.total_findings,
            })
        }
    }
}
