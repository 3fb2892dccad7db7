//! Null/empty detection, used by both primary-key and not-null tasks.
//!
//! A value is null when it is empty. For every type except TEXT, the
//! two-character quote-empty marker `''` is null as well; for TEXT it is a
//! legitimate empty string.

use crate::checkers::{CheckContext, FieldChecker};
use crate::error::AuditError;
use crate::types::{FieldType, FindingGroup, FindingLabel};

/// Quote-empty marker treated as null for non-TEXT fields.
const QUOTE_EMPTY: &str = "''";

/// Reports `Found null/empty value for <field> (Column: <n>): <record>`.
pub struct NullChecker;

/// Whether `value` counts as null for a field of `field_type`.
#[must_use]
pub fn is_null(value: &str, field_type: FieldType) -> bool {
    match field_type {
        FieldType::Text => value.is_empty(),
        FieldType::Integer | FieldType::Decimal => value.is_empty() || value == QUOTE_EMPTY,
    }
}

impl FieldChecker for NullChecker {
    fn name(&self) -> &'static str {
        "null"
    }

    fn label(&self) -> FindingLabel {
        FindingLabel::Nulls
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<FindingGroup, AuditError> {
        let mut messages = Vec::new();

        for record in ctx.records()? {
            let record = record?;
            let null = ctx
                .project(&record)
                .is_some_and(|value| is_null(value, ctx.field.field_type));
            if null {
                messages.push(format!(
                    "Found null/empty value for {} (Column: {}): {record}",
                    ctx.field.name,
                    ctx.field.column()
                ));
            }
        }

        Ok(FindingGroup::new(self.label(), messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkers::test_support::run;

    fn check(lines: &[&str], index: usize, field_type: FieldType) -> Vec<String> {
        run(&NullChecker, lines, "id", index, field_type)
    }

    #[test]
    fn test_is_null() {
        assert!(is_null("", FieldType::Text));
        assert!(!is_null("''", FieldType::Text));
        assert!(is_null("", FieldType::Integer));
        assert!(is_null("''", FieldType::Integer));
        assert!(is_null("''", FieldType::Decimal));
        assert!(!is_null("0", FieldType::Integer));
        assert!(!is_null(" ", FieldType::Integer));
    }

    #[test]
    fn test_text_quote_empty_not_null() {
        assert!(check(&["1,''"], 1, FieldType::Text).is_empty());
    }

    #[test]
    fn test_integer_quote_empty_and_empty_are_null() {
        let msgs = check(&["'',x", ",y", "3,z"], 0, FieldType::Integer);
        assert_eq!(
            msgs,
            [
                "Found null/empty value for id (Column: 1): '',x",
                "Found null/empty value for id (Column: 1): ,y",
            ]
        );
    }

    #[test]
    fn test_message_reports_one_based_column() {
        let msgs = check(&["1,'a',"], 2, FieldType::Decimal);
        assert_eq!(msgs, ["Found null/empty value for id (Column: 3): 1,'a',"]);
    }

    #[test]
    fn test_blank_line_is_null_for_first_column() {
        let msgs = check(&["1", ""], 0, FieldType::Integer);
        assert_eq!(msgs, ["Found null/empty value for id (Column: 1): "]);
    }

    #[test]
    fn test_ragged_rows_excluded() {
        assert!(check(&["1", "2"], 1, FieldType::Integer).is_empty());
    }
}
