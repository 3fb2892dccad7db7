//! Error taxonomy for an audit run.
//!
//! Findings are never errors: they are collected into the
//! [`AuditReport`](crate::types::AuditReport). The variants here are the
//! fatal conditions that stop a run before or while checks execute.

use crate::line_source::LineSourceError;
use crate::schema::SchemaError;

/// Fatal failure of an audit run.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The schema is malformed or self-inconsistent.
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// The data file could not be opened or read.
    #[error(transparent)]
    Io(#[from] LineSourceError),

    /// The run was cancelled before all tasks settled.
    #[error("Audit cancelled")]
    Cancelled,

    /// A checker panicked.
    #[error("Internal error in check '{check}' for field '{field}': {message}")]
    Internal {
        check: String,
        field: String,
        message: String,
    },

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),
}

impl AuditError {
    /// Whether the failure came from the input file rather than the engine.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
