//! Text and JSON rendering of an [`AuditReport`].
//!
//! 1. **Text**: the audit log format, one finding message per line in merge
//!    order. This is what the report sink writes to the log file.
//!
//! 2. **JSON**: the full report via `serde_json`, for machine consumers.

use crate::types::AuditReport;

/// Serialize an [`AuditReport`] to pretty-printed JSON.
///
/// # Errors
///
/// Returns an error message if serialization fails (should not happen for valid data).
pub fn to_json(report: &AuditReport) -> Result<String, String> {
    serde_json::to_string_pretty(report).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Render the findings as audit log text, one message per line.
///
/// A clean report renders as the empty string.
#[must_use]
pub fn to_text(report: &AuditReport) -> String {
    let mut out = String::with_capacity(report.messages.iter().map(|m| m.len() + 1).sum());
    for message in &report.messages {
        out.push_str(message);
        out.push('\n');
    }
    out
}

/// One-line outcome of a run, for logs and terminals.
#[must_use]
pub fn summary_line(report: &AuditReport) -> String {
    if report.passed {
        return format!(
            "{}: table {} is consistent ({} checks)",
            report.data_file, report.table_name, report.tasks_run
        );
    }

    let c = &report.counts;
    format!(
        "{}: {} findings for table {} (duplicates: {}, primary key nulls: {}, \
         not-null violations: {}, type mismatches: {})",
        report.data_file,
        report.total_findings,
        report.table_name,
        c.duplicates,
        c.primary_key_nulls,
        c.not_null,
        c.type_mismatches
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckResult, ConstraintKind, FindingGroup, FindingLabel};

    fn sample_report() -> AuditReport {
        let results = vec![
            CheckResult {
                constraint: ConstraintKind::PrimaryKey,
                field_name: "id".to_owned(),
                groups: vec![
                    FindingGroup::new(
                        FindingLabel::Duplicates,
                        vec!["Found 2 duplicates for id 1".to_owned()],
                    ),
                    FindingGroup::new(
                        FindingLabel::Nulls,
                        vec!["Found null/empty value for id (Column: 1): ,'z'".to_owned()],
                    ),
                ],
            },
            CheckResult {
                constraint: ConstraintKind::TypeMismatch,
                field_name: "name".to_owned(),
                groups: vec![FindingGroup::new(FindingLabel::TypeMismatches, vec![])],
            },
        ];
        AuditReport::from_results("T", "data.txt", "sha256:ab", &results, 3)
    }

    #[test]
    fn test_to_text_one_line_per_message() {
        let text = to_text(&sample_report());
        assert_eq!(
            text,
            "Found 2 duplicates for id 1\nFound null/empty value for id (Column: 1): ,'z'\n"
        );
    }

    #[test]
    fn test_to_text_clean_report_is_empty() {
        let report = AuditReport::from_results("T", "data.txt", "", &[], 0);
        assert_eq!(to_text(&report), "");
    }

    #[test]
    fn test_to_json_roundtrip_fields() {
        let json = to_json(&sample_report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["table_name"], "T");
        assert_eq!(value["total_findings"], 2);
        assert_eq!(value["counts"]["duplicates"], 1);
        assert_eq!(value["counts"]["primary_key_nulls"], 1);
        assert_eq!(value["passed"], false);
        assert_eq!(value["messages"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_summary_line() {
        let summary = summary_line(&sample_report());
        assert!(summary.starts_with("data.txt: 2 findings for table T"));
        assert!(summary.contains("duplicates: 1"));
        assert!(summary.contains("type mismatches: 0"));

        let clean = AuditReport::from_results("T", "data.txt", "", &[], 0);
        assert_eq!(
            summary_line(&clean),
            "data.txt: table T is consistent (0 checks)"
        );
    }
}
