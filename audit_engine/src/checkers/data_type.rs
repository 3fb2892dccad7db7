//! Type conformance for every schema field.
//!
//! Empty values are skipped; reporting them is the null checker's job.
//!
//! | Type | Valid when |
//! |---|---|
//! | TEXT | starts and ends with `'` |
//! | INTEGER | one or more ASCII digits, nothing else |
//! | DECIMAL | matches `^-?[0-9]*\.?[0-9]+$` |

use regex::Regex;

use crate::checkers::{CheckContext, FieldChecker};
use crate::error::AuditError;
use crate::types::{FieldType, FindingGroup, FindingLabel};

/// Anchored numeric pattern for DECIMAL fields.
const DECIMAL_PATTERN: &str = r"^-?[0-9]*\.?[0-9]+$";

/// Reports `Incorrect data type for <field> (Column: <n>): <record>`.
pub struct TypeChecker {
    decimal: Regex,
}

impl TypeChecker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            decimal: Regex::new(DECIMAL_PATTERN).expect("decimal pattern regex is valid"),
        }
    }

    /// Whether a non-empty `value` conforms to `field_type`.
    #[must_use]
    pub fn conforms(&self, value: &str, field_type: FieldType) -> bool {
        match field_type {
            FieldType::Text => value.starts_with('\'') && value.ends_with('\''),
            FieldType::Integer => value.bytes().all(|b| b.is_ascii_digit()),
            FieldType::Decimal => self.decimal.is_match(value),
        }
    }
}

impl Default for TypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldChecker for TypeChecker {
    fn name(&self) -> &'static str {
        "data_type"
    }

    fn label(&self) -> FindingLabel {
        FindingLabel::TypeMismatches
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<FindingGroup, AuditError> {
        let mut messages = Vec::new();

        for record in ctx.records()? {
            let record = record?;
            let invalid = ctx
                .project(&record)
                .is_some_and(|v| !v.is_empty() && !self.conforms(v, ctx.field.field_type));
            if invalid {
                messages.push(format!(
                    "Incorrect data type for {} (Column: {}): {record}",
                    ctx.field.name,
                    ctx.field.column()
                ));
            }
        }

        Ok(FindingGroup::new(self.label(), messages))
    }
}
