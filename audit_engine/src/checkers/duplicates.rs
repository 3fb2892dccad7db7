//! Duplicate detection for the primary-key field.
//!
//! Counts every projected value and reports each value seen more than once,
//! in the order the values were first seen.

use std::collections::HashMap;

use crate::checkers::{CheckContext, FieldChecker};
use crate::error::AuditError;
use crate::types::{FindingGroup, FindingLabel};

/// Reports `Found <count> duplicates for <field> <value>`.
pub struct DuplicateChecker;

impl FieldChecker for DuplicateChecker {
    fn name(&self) -> &'static str {
        "duplicates"
    }

    fn label(&self) -> FindingLabel {
        FindingLabel::Duplicates
    }

    fn check(&self, ctx: &CheckContext<'_>) -> Result<FindingGroup, AuditError> {
        // value -> position in `counts`, so emission follows first-seen order
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<(String, u64)> = Vec::new();

        for record in ctx.records()? {
            let record = record?;
            let Some(value) = ctx.project(&record) else {
                continue;
            };
            match positions.get(value) {
                Some(&pos) => counts[pos].1 += 1,
                None => {
                    positions.insert(value.to_owned(), counts.len());
                    counts.push((value.to_owned(), 1));
                }
            }
        }

        let messages = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(value, count)| {
                format!("Found {count} duplicates for {} {value}", ctx.field.name)
            })
            .collect();

        Ok(FindingGroup::new(self.label(), messages))
    }
}
