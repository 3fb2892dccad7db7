//! Flat-file audit engine: concurrent constraint checks for delimited data.
//!
//! A schema-definition file names a table's fields, their types and their
//! primary-key / not-null constraints. The engine audits a data file against
//! it by running one independent pass per (constraint, field) in parallel and
//! merging every finding, in a fixed order, into an [`AuditReport`]. A clean
//! file can then be loaded into SQLite.
//!
//! ```no_run
//! use std::path::Path;
//! use flatfile_audit_engine::{AuditConfig, AuditEngine};
//!
//! let engine = AuditEngine::new(AuditConfig::default());
//! let report = engine
//!     .audit_files(Path::new("V_Products.txt"), Path::new("Products.txt"))
//!     .unwrap();
//! println!("{} findings", report.total_findings);
//! ```
//!
//! With the `python` feature the crate also builds the
//! `flatfile_audit_engine` Python module via PyO3:
//! ```python
//! from flatfile_audit_engine import AuditEngine, AuditConfig, AuditReport
//! ```

// PyO3-generated code triggers this lint on PyResult return types, suppress globally.
#![allow(clippy::useless_conversion)]

pub mod cache;
pub mod checkers;
pub mod config;
pub mod engine;
pub mod error;
pub mod line_source;
pub mod loader;
#[cfg(feature = "python")]
pub mod pyo3_bindings;
pub mod reporter;
pub mod schema;
pub mod sink;
pub mod types;

pub use config::AuditConfig;
pub use engine::{AuditEngine, AuditPhase, AuditTask};
pub use error::AuditError;
pub use schema::{load_schema, Field, Schema, SchemaError, UnknownTypePolicy};
pub use types::{AuditReport, CheckResult, ConstraintKind, FieldType, FindingCounts};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The Python module exposed by this crate.
///
/// Importable as: `from flatfile_audit_engine import AuditEngine`
#[cfg(feature = "python")]
#[pymodule]
fn flatfile_audit_engine(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Initialize Rust logging → Python logging bridge
    pyo3_log::init();

    pyo3_bindings::register_module(m)?;

    Ok(())
}
