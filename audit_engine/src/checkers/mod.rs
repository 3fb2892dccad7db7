//! Field checker trait definition and checker registry.
//!
//! Every checker implements [`FieldChecker`]: one field, one full pass over
//! its own traversal of the input. Checkers are stateless; all context is
//! passed via [`CheckContext`].
//!
//! The registry function [`checkers_for`] returns the checkers a task of a
//! given [`ConstraintKind`] runs, in the order their groups are reported.

pub mod data_type;
pub mod duplicates;
pub mod nulls;

use crate::error::AuditError;
use crate::line_source::{CancelToken, LineSource, Records};
use crate::schema::Field;
use crate::types::{ConstraintKind, FindingGroup, FindingLabel};

pub use data_type::TypeChecker;
pub use duplicates::DuplicateChecker;
pub use nulls::NullChecker;

/// Everything a checker needs for one pass.
pub struct CheckContext<'a> {
    /// Source to traverse. Each checker opens its own traversal.
    pub source: &'a dyn LineSource,
    /// Field under check.
    pub field: &'a Field,
    /// Column separator of the schema.
    pub separator: char,
    /// Cancellation flag of the enclosing run.
    pub cancel: &'a CancelToken,
}

impl<'a> CheckContext<'a> {
    /// Open a fresh traversal of the source for this pass.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the source cannot be opened.
    pub fn records(&self) -> Result<Records<'a>, AuditError> {
        Records::open(self.source, self.cancel)
    }

    /// Value of this context's field in `record`, if the record has it.
    #[must_use]
    pub fn project<'r>(&self, record: &'r str) -> Option<&'r str> {
        project(record, self.separator, self.field.index)
    }
}

/// Split `record` by `separator` and take the column at `index`.
///
/// Returns `None` for short rows; they contribute no value to any check.
#[must_use]
pub fn project(record: &str, separator: char, index: usize) -> Option<&str> {
    record.split(separator).nth(index)
}

/// Every checker implements this trait.
///
/// They must be `Send + Sync` to run on the rayon pool.
pub trait FieldChecker: Send + Sync {
    /// Unique name for this checker (used in logs and internal errors).
    fn name(&self) -> &'static str;

    /// Label of the message group this checker produces.
    fn label(&self) -> FindingLabel;

    /// Run one full pass over a fresh traversal of the source.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the source cannot be read, or
    /// [`AuditError::Cancelled`] if the run is cancelled mid-pass.
    fn check(&self, ctx: &CheckContext<'_>) -> Result<FindingGroup, AuditError>;
}

/// Build the checkers a task of `kind` runs.
///
/// A primary-key task reports duplicates before nulls.
#[must_use]
pub fn checkers_for(kind: ConstraintKind) -> Vec<Box<dyn FieldChecker>> {
    match kind {
        ConstraintKind::PrimaryKey => {
            vec![
                Box::new(DuplicateChecker) as Box<dyn FieldChecker>,
                Box::new(NullChecker),
            ]
        }
        ConstraintKind::NotNull => vec![Box::new(NullChecker)],
        ConstraintKind::TypeMismatch => vec![Box::new(TypeChecker::new())],
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::line_source::MemoryLineSource;
    use crate::types::FieldType;

    /// Run `checker` over `lines` for a field at `index`.
    pub fn run(
        checker: &dyn FieldChecker,
        lines: &[&str],
        name: &str,
        index: usize,
        field_type: FieldType,
    ) -> Vec<String> {
        let source = MemoryLineSource::new("test", lines.iter().map(|l| (*l).to_owned()).collect());
        let field = Field::new(name, index, field_type);
        let cancel = CancelToken::new();
        let ctx = CheckContext {
            source: &source,
            field: &field,
            separator: ',',
            cancel: &cancel,
        };
        checker.check(&ctx).unwrap().messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project() {
        assert_eq!(project("1,'a',2.5", ',', 0), Some("1"));
        assert_eq!(project("1,'a',2.5", ',', 2), Some("2.5"));
        assert_eq!(project("1,'a'", ',', 2), None);
        assert_eq!(project("1,,3", ',', 1), Some(""));
        assert_eq!(project("", ',', 0), Some(""));
        assert_eq!(project("a|b", '|', 1), Some("b"));
    }

    #[test]
    fn test_registry_per_kind() {
        let pk: Vec<_> = checkers_for(ConstraintKind::PrimaryKey)
            .iter()
            .map(|c| c.label())
            .collect();
        assert_eq!(pk, [FindingLabel::Duplicates, FindingLabel::Nulls]);

        let nn: Vec<_> = checkers_for(ConstraintKind::NotNull)
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(nn, ["null"]);

        let ty: Vec<_> = checkers_for(ConstraintKind::TypeMismatch)
            .iter()
            .map(|c| c.label())
            .collect();
        assert_eq!(ty, [FindingLabel::TypeMismatches]);
    }
}
