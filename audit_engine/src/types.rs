//! Core type definitions for the flat-file audit engine.
//!
//! - [`FieldType`] is the closed set of column types a schema may declare
//! - [`ConstraintKind`] is the category of a check task and its result
//! - [`FindingGroup`] is one labelled list of messages from a single checker
//! - [`CheckResult`] is the output of one check task
//! - [`AuditReport`] is the merged, ordered result of a whole audit run

#[cfg(feature = "python")]
use pyo3::prelude::*;
use serde::{Deserialize, Serialize};

/// Declared type of a schema field.
///
/// Serialized as the upper-case names used in schema-definition files.
#[cfg_attr(feature = "python", pyclass(eq, eq_int))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    /// Single-quoted text, e.g. `'Widget'`.
    Text,
    /// Unsigned run of ASCII digits.
    Integer,
    /// Optionally negative number with an optional decimal point.
    Decimal,
}

impl FieldType {
    /// Parse a declared type name, case-insensitively.
    ///
    /// Returns `None` for anything other than `TEXT`, `INTEGER` or `DECIMAL`;
    /// the caller decides what an unknown name means.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Some(Self::Text),
            "INTEGER" => Some(Self::Integer),
            "DECIMAL" => Some(Self::Decimal),
            _ => None,
        }
    }

    /// Column type used when creating the target table.
    #[must_use]
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::Decimal => "DECIMAL",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// The category of a check task.
#[cfg_attr(feature = "python", pyclass(eq, eq_int))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Duplicate and null values in the primary-key field.
    PrimaryKey,
    /// Null/empty values in a not-null field.
    NotNull,
    /// Values that do not conform to the field's declared type.
    TypeMismatch,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryKey => write!(f, "primary_key"),
            Self::NotNull => write!(f, "not_null"),
            Self::TypeMismatch => write!(f, "type_mismatch"),
        }
    }
}

/// Which checker produced a [`FindingGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingLabel {
    /// Values seen more than once.
    Duplicates,
    /// Empty or quote-empty values.
    Nulls,
    /// Values failing the type pattern.
    TypeMismatches,
}

impl std::fmt::Display for FindingLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicates => write!(f, "duplicates"),
            Self::Nulls => write!(f, "nulls"),
            Self::TypeMismatches => write!(f, "type_mismatch"),
        }
    }
}

/// Messages produced by one checker over one full pass of the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingGroup {
    pub label: FindingLabel,
    pub messages: Vec<String>,
}

impl FindingGroup {
    #[must_use]
    pub fn new(label: FindingLabel, messages: Vec<String>) -> Self {
        Self { label, messages }
    }
}

/// Result of a single check task.
///
/// A primary-key result carries two groups, duplicates then nulls, kept apart
/// so the orchestrator can count them separately. Other kinds carry one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Kind of task that produced this result.
    pub constraint: ConstraintKind,

    /// Name of the field the task checked.
    pub field_name: String,

    /// Labelled message groups, in checker order.
    pub groups: Vec<FindingGroup>,
}

impl CheckResult {
    /// Messages of the group with the given label, or an empty slice.
    #[must_use]
    pub fn group(&self, label: FindingLabel) -> &[String] {
        self.groups
            .iter()
            .find(|g| g.label == label)
            .map(|g| g.messages.as_slice())
            .unwrap_or_default()
    }

    /// All messages, groups flattened in order.
    pub fn messages(&self) -> impl Iterator<Item = &String> {
        self.groups.iter().flat_map(|g| g.messages.iter())
    }

    /// Total number of findings across all groups.
    #[must_use]
    pub fn finding_count(&self) -> usize {
        self.groups.iter().map(|g| g.messages.len()).sum()
    }
}

/// Per-category finding counts for an audit run.
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingCounts {
    /// Duplicate messages from the primary-key task.
    pub duplicates: u32,

    /// Null messages from the primary-key task.
    pub primary_key_nulls: u32,

    /// Null messages from all not-null tasks.
    pub not_null: u32,

    /// Messages from all type-mismatch tasks.
    pub type_mismatches: u32,
}

impl FindingCounts {
    /// Add the groups of one check result to the tally.
    pub fn record(&mut self, result: &CheckResult) {
        for group in &result.groups {
            let n = group.messages.len() as u32;
            match (result.constraint, group.label) {
                (ConstraintKind::PrimaryKey, FindingLabel::Duplicates) => self.duplicates += n,
                (ConstraintKind::PrimaryKey, _) => self.primary_key_nulls += n,
                (ConstraintKind::NotNull, _) => self.not_null += n,
                (ConstraintKind::TypeMismatch, _) => self.type_mismatches += n,
            }
        }
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.duplicates + self.primary_key_nulls + self.not_null + self.type_mismatches
    }
}

/// Merged result of auditing one data file against one schema.
///
/// `messages` holds every finding from every task, in task submission order
/// (primary key, not-null fields, type checks), regardless of which task
/// finished first.
#[cfg_attr(feature = "python", pyclass(get_all))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Table the schema describes.
    pub table_name: String,

    /// Data file that was audited (or a description of an in-memory source).
    pub data_file: String,

    /// `sha256:<hex>` digest of the audited file, empty for in-memory sources.
    pub data_file_hash: String,

    /// Every finding, in merge order.
    pub messages: Vec<String>,

    /// Counts per finding category.
    pub counts: FindingCounts,

    /// Total number of findings.
    pub total_findings: u32,

    /// Number of check tasks that ran.
    pub tasks_run: u32,

    /// Wall-clock milliseconds elapsed for the run.
    pub elapsed_ms: u64,

    /// Whether the file is free of inconsistencies.
    pub passed: bool,

    /// Whether this report was served from the audit cache.
    pub from_cache: bool,
}

impl AuditReport {
    /// Merge check results, in the order given, into a report.
    #[must_use]
    pub fn from_results(
        table_name: &str,
        data_file: &str,
        data_file_hash: &str,
        results: &[CheckResult],
        elapsed_ms: u64,
    ) -> Self {
        let mut counts = FindingCounts::default();
        let mut messages = Vec::new();
        for result in results {
            counts.record(result);
            messages.extend(result.messages().cloned());
        }
        let total_findings = counts.total();

        Self {
            table_name: table_name.to_owned(),
            data_file: data_file.to_owned(),
            data_file_hash: data_file_hash.to_owned(),
            messages,
            counts,
            total_findings,
            tasks_run: results.len() as u32,
            elapsed_ms,
            passed: total_findings == 0,
            from_cache: false,
        }
    }
}

#[cfg(feature = "python")]
#[pymethods]
impl AuditReport {
    /// Serialize the report to pretty-printed JSON.
    fn to_json(&self) -> PyResult<String> {
        crate::reporter::to_json(self).map_err(|e| {
            pyo3::exceptions::PyValueError::new_err(format!("JSON serialization failed: {e}"))
        })
    }

    /// Render the report as audit log text.
    fn to_text(&self) -> String {
        crate::reporter::to_text(self)
    }

    fn __repr__(&self) -> String {
        format!(
            "AuditReport(table={:?}, passed={}, findings={}, tasks={}, elapsed_ms={})",
            self.table_name, self.passed, self.total_findings, self.tasks_run, self.elapsed_ms,
        )
    }
}
