//! PyO3 bindings exposing the audit engine to Python.
//!
//! The Python module is importable as:
//! ```python
//! from flatfile_audit_engine import AuditEngine, AuditConfig, AuditReport, quick_audit
//! ```
//!
//! Schema problems raise `ValueError`, unreadable files raise `OSError`, and
//! every other failure raises `RuntimeError`.

use std::path::Path;

use pyo3::exceptions::{PyOSError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::AuditConfig;
use crate::engine::AuditEngine as RustAuditEngine;
use crate::error::AuditError;
use crate::loader::{load_audited_file, LoadError, SqliteLoader};
use crate::schema::load_schema;
use crate::sink::ReportSink;
use crate::types::{AuditReport, ConstraintKind, FieldType, FindingCounts};

fn audit_err(e: AuditError) -> PyErr {
    match e {
        AuditError::Schema(e) => PyValueError::new_err(e.to_string()),
        AuditError::Io(e) => PyOSError::new_err(e.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

fn load_err(e: LoadError) -> PyErr {
    match e {
        LoadError::Io(e) => PyOSError::new_err(e.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Python-facing AuditEngine wrapper.
///
/// Usage from Python:
/// ```python
/// from flatfile_audit_engine import AuditEngine, AuditConfig
/// engine = AuditEngine(AuditConfig())
/// report = engine.audit("V_Products.txt", "Products.txt")
/// ```
///
/// `phase` and `cancel()` apply to the whole engine. Threads auditing in
/// parallel should each create their own engine.
#[pyclass(name = "AuditEngine")]
pub struct PyAuditEngine {
    inner: RustAuditEngine,
}

#[pymethods]
impl PyAuditEngine {
    #[new]
    fn new(config: AuditConfig) -> Self {
        Self {
            inner: RustAuditEngine::new(config),
        }
    }

    /// Audit `data_path` against the schema file at `schema_path`.
    ///
    /// Findings are written to the configured log file, if any. The GIL is
    /// released while the checks run.
    fn audit(&self, py: Python<'_>, schema_path: &str, data_path: &str) -> PyResult<AuditReport> {
        let report = py
            .allow_threads(|| {
                self.inner
                    .audit_files(Path::new(schema_path), Path::new(data_path))
            })
            .map_err(audit_err)?;

        ReportSink::from_config(self.inner.config())
            .deliver(&report)
            .map_err(|e| PyOSError::new_err(e.to_string()))?;

        Ok(report)
    }

    /// Load an audited data file into the configured SQLite database.
    ///
    /// Returns the number of rows inserted.
    fn load(&self, report: AuditReport, schema_path: &str, data_path: &str) -> PyResult<usize> {
        let config = self.inner.config();
        let schema = load_schema(Path::new(schema_path), config.unknown_type_policy)
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        let mut loader = SqliteLoader::open(Path::new(&config.database.path)).map_err(load_err)?;
        load_audited_file(&report, &schema, Path::new(data_path), &mut loader).map_err(load_err)
    }

    /// Stop the running audit at the next line boundary.
    fn cancel(&self) {
        self.inner.cancel_token().cancel();
    }

    /// Rearm the engine after `cancel()`.
    fn reset_cancel(&self) {
        self.inner.reset_cancel();
    }

    /// Phase of the current or most recent run, e.g. `"done"`.
    #[getter]
    fn phase(&self) -> String {
        format!("{:?}", self.inner.phase()).to_lowercase()
    }

    fn __repr__(&self) -> String {
        format!("AuditEngine(threads={})", self.inner.config().threads)
    }
}

/// One-shot audit with default configuration.
///
/// Equivalent to `AuditEngine(AuditConfig()).audit(schema_path, data_path)`.
///
/// # Errors
///
/// Raises `ValueError` for a bad schema and `OSError` for unreadable files.
#[pyfunction]
pub fn quick_audit(py: Python<'_>, schema_path: &str, data_path: &str) -> PyResult<AuditReport> {
    let engine = RustAuditEngine::new(AuditConfig::default());
    py.allow_threads(|| engine.audit_files(Path::new(schema_path), Path::new(data_path)))
        .map_err(audit_err)
}

/// Register all PyO3 classes and functions into the Python module.
///
/// This is called from `lib.rs` to populate the module.
pub fn register_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyAuditEngine>()?;
    m.add_class::<AuditConfig>()?;
    m.add_class::<AuditReport>()?;
    m.add_class::<FindingCounts>()?;
    m.add_class::<ConstraintKind>()?;
    m.add_class::<FieldType>()?;
    m.add_function(wrap_pyfunction!(quick_audit, m)?)?;
    Ok(())
}
