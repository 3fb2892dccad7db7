//! Schema model and schema-definition file parsing.
//!
//! A schema-definition file looks like:
//!
//! ```text
//! [Products]
//! Separator=,
//! DateFormat=%Y-%m-%d
//! Field1=ProductID, INTEGER
//! Field2=Name, TEXT
//! /--PrimaryKeyField -keyprop ProductID
//! /--NotNullField -keyprop Name
//! ```
//!
//! Field numbers in the file are 1-based; [`Field::index`] is 0-based.
//! Constraint directives name fields case-insensitively. Once built, a
//! [`Schema`] refers to its constraint fields by position, never by name.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::FieldType;

/// What to do with a declared type name that is not TEXT, INTEGER or DECIMAL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTypePolicy {
    /// Fail schema construction.
    #[default]
    Reject,
    /// Treat the field as DECIMAL and log a warning.
    Decimal,
}

/// Errors raised while building a schema. All are fatal for the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file '{0}': {1}")]
    ReadError(String, String),

    #[error("Schema has no table header ('[TableName]' expected on the first line)")]
    MissingTableName,

    #[error("Schema has no 'Separator=' line")]
    MissingSeparator,

    #[error("Separator must be exactly one character, got {0:?}")]
    InvalidSeparator(String),

    #[error("Schema defines no fields")]
    NoFields,

    #[error("Malformed field definition on line {line}: {text}")]
    MalformedField { line: usize, text: String },

    #[error("Unknown data type '{declared}' for field '{field}'")]
    UnknownType { field: String, declared: String },

    #[error("Fields '{first}' and '{second}' share index {index}")]
    DuplicateIndex {
        index: usize,
        first: String,
        second: String,
    },

    #[error("Field name '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("{constraint} references undefined field '{name}'")]
    UnknownField { constraint: String, name: String },

    #[error("Primary key declared twice ('{first}' and '{second}')")]
    DuplicatePrimaryKey { first: String, second: String },
}

/// One named, typed, positionally-indexed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    /// 0-based column ordinal within a record.
    pub index: usize,
    pub field_type: FieldType,
}

impl Field {
    #[must_use]
    pub fn new(name: &str, index: usize, field_type: FieldType) -> Self {
        Self {
            name: name.to_owned(),
            index,
            field_type,
        }
    }

    /// 1-based column number used in finding messages.
    #[must_use]
    pub fn column(&self) -> usize {
        self.index + 1
    }
}

/// Immutable description of a table's fields and constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    table_name: String,
    separator: char,
    date_format: Option<String>,
    fields: Vec<Field>,
    primary_key: Option<usize>,
    not_null: Vec<usize>,
}

impl Schema {
    /// Start building a schema programmatically.
    #[must_use]
    pub fn builder(table_name: &str, separator: char) -> SchemaBuilder {
        SchemaBuilder::new(table_name, separator)
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn separator(&self) -> char {
        self.separator
    }

    #[must_use]
    pub fn date_format(&self) -> Option<&str> {
        self.date_format.as_deref()
    }

    /// All fields in definition order.
    #[must_use]
    pub fn all_fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn primary_key_field(&self) -> Option<&Field> {
        self.primary_key.map(|pos| &self.fields[pos])
    }

    /// Not-null fields, deduplicated, in schema field order.
    pub fn not_null_fields(&self) -> impl Iterator<Item = &Field> {
        self.not_null.iter().map(|&pos| &self.fields[pos])
    }

    #[must_use]
    pub fn is_primary_key(&self, field: &Field) -> bool {
        self.primary_key_field() == Some(field)
    }

    #[must_use]
    pub fn is_not_null(&self, field: &Field) -> bool {
        self.not_null_fields().any(|f| f == field)
    }

    /// Number of columns a loaded row is padded to.
    #[must_use]
    pub fn width(&self) -> usize {
        self.fields.iter().map(|f| f.index + 1).max().unwrap_or(0)
    }

    /// Stable SHA-256 fingerprint of the schema, used for cache keys.
    #[must_use]
    pub fn schema_hash(&self) -> String {
        use sha2::{Digest, Sha256};

        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Parse a schema-definition document.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the document is malformed or inconsistent.
    pub fn parse_definition(text: &str, policy: UnknownTypePolicy) -> Result<Self, SchemaError> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim_end_matches('\r')))
            .filter(|(_, l)| !l.trim().is_empty());

        let table_name = match lines.next() {
            Some((_, header)) => parse_table_header(header)?,
            None => return Err(SchemaError::MissingTableName),
        };

        let mut separator: Option<char> = None;
        let mut date_format = None;
        let mut field_defs = Vec::new();
        let mut directives = Vec::new();

        for (line_no, line) in lines {
            if let Some(directive) = line.trim_start().strip_prefix("/--") {
                directives.push(directive.to_owned());
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::debug!("Ignoring schema line {line_no}: {line}");
                continue;
            };
            let key = key.trim();
            if key.eq_ignore_ascii_case("separator") {
                separator = Some(parse_separator(value)?);
            } else if key.eq_ignore_ascii_case("dateformat") {
                date_format = Some(value.trim().to_owned());
            } else if let Some(number) = strip_prefix_ignore_case(key, "field") {
                field_defs.push(parse_field_line(line_no, line, number, value, policy)?);
            } else {
                log::debug!("Ignoring unknown schema setting '{key}' on line {line_no}");
            }
        }

        let separator = separator.ok_or(SchemaError::MissingSeparator)?;
        let mut builder = SchemaBuilder::new(&table_name, separator);
        builder.date_format = date_format;
        for field in field_defs {
            builder = builder.field(field.index, &field.name, field.field_type);
        }

        for directive in directives {
            let (kind, name) = match directive.split_once("-keyprop") {
                Some((kind, name)) => (kind.trim(), name.trim()),
                None => {
                    log::debug!("Ignoring schema directive without -keyprop: /--{directive}");
                    continue;
                }
            };
            if kind.eq_ignore_ascii_case("PrimaryKeyField") {
                builder = builder.primary_key(name);
            } else if kind.eq_ignore_ascii_case("NotNullField") {
                builder = builder.not_null(name);
            } else {
                log::debug!("Ignoring unknown schema directive '{kind}'");
            }
        }

        builder.build()
    }
}

/// Read and parse a schema-definition file.
///
/// # Errors
///
/// Returns [`SchemaError::ReadError`] if the file cannot be read, or any
/// parse error from [`Schema::parse_definition`].
pub fn load_schema(path: &Path, policy: UnknownTypePolicy) -> Result<Schema, SchemaError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SchemaError::ReadError(path.display().to_string(), e.to_string()))?;
    Schema::parse_definition(&text, policy)
}

fn parse_table_header(line: &str) -> Result<String, SchemaError> {
    let name = line
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() {
        return Err(SchemaError::MissingTableName);
    }
    Ok(name.to_owned())
}

fn parse_separator(value: &str) -> Result<char, SchemaError> {
    if value == "\\t" || value.trim() == "\\t" {
        return Ok('\t');
    }
    let mut chars = value.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(c);
    }
    // Tolerate padding around a visible separator, e.g. "Separator= | ".
    let trimmed = value.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(SchemaError::InvalidSeparator(value.to_owned())),
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn parse_field_line(
    line_no: usize,
    line: &str,
    number: &str,
    value: &str,
    policy: UnknownTypePolicy,
) -> Result<Field, SchemaError> {
    let malformed = || SchemaError::MalformedField {
        line: line_no,
        text: line.to_owned(),
    };

    let number: usize = number.trim().parse().map_err(|_| malformed())?;
    let index = number.checked_sub(1).ok_or_else(malformed)?;

    let mut parts = value.split(',');
    let name = parts.next().map(str::trim).unwrap_or_default();
    let declared = parts.next().map(str::trim).unwrap_or_default();
    if name.is_empty() || declared.is_empty() {
        return Err(malformed());
    }

    let field_type = match FieldType::parse(declared) {
        Some(t) => t,
        None => match policy {
            UnknownTypePolicy::Reject => {
                return Err(SchemaError::UnknownType {
                    field: name.to_owned(),
                    declared: declared.to_owned(),
                })
            }
            UnknownTypePolicy::Decimal => {
                log::warn!(
                    "Field '{name}' declares unknown type '{declared}'; checking it as DECIMAL"
                );
                FieldType::Decimal
            }
        },
    };

    Ok(Field::new(name, index, field_type))
}

/// Incremental constructor for [`Schema`]; validation happens in [`build`].
///
/// [`build`]: SchemaBuilder::build
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    table_name: String,
    separator: char,
    date_format: Option<String>,
    fields: Vec<Field>,
    primary_keys: Vec<String>,
    not_null: Vec<String>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn new(table_name: &str, separator: char) -> Self {
        Self {
            table_name: table_name.to_owned(),
            separator,
            date_format: None,
            fields: Vec::new(),
            primary_keys: Vec::new(),
            not_null: Vec::new(),
        }
    }

    #[must_use]
    pub fn date_format(mut self, format: &str) -> Self {
        self.date_format = Some(format.to_owned());
        self
    }

    #[must_use]
    pub fn field(mut self, index: usize, name: &str, field_type: FieldType) -> Self {
        self.fields.push(Field::new(name, index, field_type));
        self
    }

    /// Mark a field as the primary key (matched case-insensitively at build).
    #[must_use]
    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_keys.push(name.to_owned());
        self
    }

    /// Mark a field as not-null (matched case-insensitively at build).
    #[must_use]
    pub fn not_null(mut self, name: &str) -> Self {
        self.not_null.push(name.to_owned());
        self
    }

    /// Validate and freeze the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the table name is empty, there are no
    /// fields, names or indices collide, or a constraint names an undefined
    /// field.
    pub fn build(self) -> Result<Schema, SchemaError> {
        if self.table_name.trim().is_empty() {
            return Err(SchemaError::MissingTableName);
        }
        if self.fields.is_empty() {
            return Err(SchemaError::NoFields);
        }

        let mut names = HashSet::new();
        for (pos, field) in self.fields.iter().enumerate() {
            if !names.insert(field.name.to_lowercase()) {
                return Err(SchemaError::DuplicateName(field.name.clone()));
            }
            if let Some(other) = self.fields[..pos].iter().find(|f| f.index == field.index) {
                return Err(SchemaError::DuplicateIndex {
                    index: field.index,
                    first: other.name.clone(),
                    second: field.name.clone(),
                });
            }
        }

        let resolve = |constraint: &str, name: &str| -> Result<usize, SchemaError> {
            self.fields
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(name.trim()))
                .ok_or_else(|| SchemaError::UnknownField {
                    constraint: constraint.to_owned(),
                    name: name.to_owned(),
                })
        };

        let mut primary_key: Option<usize> = None;
        for name in &self.primary_keys {
            let pos = resolve("PrimaryKeyField", name)?;
            match primary_key {
                Some(existing) if existing != pos => {
                    return Err(SchemaError::DuplicatePrimaryKey {
                        first: self.fields[existing].name.clone(),
                        second: self.fields[pos].name.clone(),
                    });
                }
                _ => primary_key = Some(pos),
            }
        }

        let mut not_null = Vec::new();
        for name in &self.not_null {
            let pos = resolve("NotNullField", name)?;
            if !not_null.contains(&pos) {
                not_null.push(pos);
            }
        }
        not_null.sort_unstable();

        Ok(Schema {
            table_name: self.table_name.trim().to_owned(),
            separator: self.separator,
            date_format: self.date_format,
            fields: self.fields,
            primary_key,
            not_null,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const PRODUCTS: &str = indoc! {"
        [Products]
        Separator=,
        DateFormat=%Y-%m-%d
        Field1=ProductID, INTEGER
        Field2=Name, TEXT
        Field3=Price, DECIMAL
        /--PrimaryKeyField -keyprop productid
        /--NotNullField -keyprop PRICE
        /--NotNullField -keyprop Name
    "};

    #[test]
    fn test_parse_definition() {
        let schema = Schema::parse_definition(PRODUCTS, UnknownTypePolicy::Reject).unwrap();
        assert_eq!(schema.table_name(), "Products");
        assert_eq!(schema.separator(), ',');
        assert_eq!(schema.date_format(), Some("%Y-%m-%d"));
        assert_eq!(schema.all_fields().len(), 3);
        assert_eq!(schema.all_fields()[0], Field::new("ProductID", 0, FieldType::Integer));
        assert_eq!(schema.all_fields()[2].field_type, FieldType::Decimal);
        assert_eq!(schema.primary_key_field().unwrap().name, "ProductID");
    }

    #[test]
    fn test_not_null_fields_in_schema_order() {
        let schema = Schema::parse_definition(PRODUCTS, UnknownTypePolicy::Reject).unwrap();
        let names: Vec<&str> = schema.not_null_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Name", "Price"]);
    }

    #[test]
    fn test_unknown_constraint_field() {
        let text = indoc! {"
            [T]
            Separator=|
            Field1=id, INTEGER
            /--NotNullField -keyprop missing
        "};
        let err = Schema::parse_definition(text, UnknownTypePolicy::Reject).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownField {
                constraint: "NotNullField".to_owned(),
                name: "missing".to_owned()
            }
        );
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let err = Schema::builder("T", ',')
            .field(0, "a", FieldType::Text)
            .field(0, "b", FieldType::Text)
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateIndex { index: 0, .. }));
    }

    #[test]
    fn test_duplicate_name_rejected_case_insensitive() {
        let err = Schema::builder("T", ',')
            .field(0, "Name", FieldType::Text)
            .field(1, "NAME", FieldType::Text)
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateName("NAME".to_owned()));
    }

    #[test]
    fn test_second_primary_key_rejected() {
        let err = Schema::builder("T", ',')
            .field(0, "a", FieldType::Integer)
            .field(1, "b", FieldType::Integer)
            .primary_key("a")
            .primary_key("b")
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicatePrimaryKey { .. }));
    }

    #[test]
    fn test_same_primary_key_declared_twice() {
        let schema = Schema::builder("T", ',')
            .field(0, "a", FieldType::Integer)
            .field(1, "b", FieldType::Integer)
            .primary_key("b")
            .primary_key("B")
            .build()
            .unwrap();
        assert_eq!(schema.primary_key_field().unwrap().name, "b");
    }

    #[test]
    fn test_repeated_not_null_deduplicated() {
        let schema = Schema::builder("T", ',')
            .field(0, "a", FieldType::Integer)
            .not_null("a")
            .not_null("A")
            .build()
            .unwrap();
        assert_eq!(schema.not_null_fields().count(), 1);
    }

    #[test]
    fn test_unknown_type_reject() {
        let text = "[T]\nSeparator=,\nField1=amount, MONEY\n";
        let err = Schema::parse_definition(text, UnknownTypePolicy::Reject).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownType {
                field: "amount".to_owned(),
                declared: "MONEY".to_owned()
            }
        );
    }

    #[test]
    fn test_unknown_type_as_decimal() {
        let text = "[T]\nSeparator=,\nField1=amount, MONEY\n";
        let schema = Schema::parse_definition(text, UnknownTypePolicy::Decimal).unwrap();
        assert_eq!(schema.all_fields()[0].field_type, FieldType::Decimal);
    }

    #[test]
    fn test_missing_header_and_separator() {
        assert_eq!(
            Schema::parse_definition("", UnknownTypePolicy::Reject).unwrap_err(),
            SchemaError::MissingTableName
        );
        assert_eq!(
            Schema::parse_definition("[T]\nField1=a, TEXT\n", UnknownTypePolicy::Reject)
                .unwrap_err(),
            SchemaError::MissingSeparator
        );
    }

    #[test]
    fn test_separator_variants() {
        assert_eq!(parse_separator(",").unwrap(), ',');
        assert_eq!(parse_separator(" ").unwrap(), ' ');
        assert_eq!(parse_separator(" | ").unwrap(), '|');
        assert_eq!(parse_separator("\\t").unwrap(), '\t');
        assert!(parse_separator(",,").is_err());
        assert!(parse_separator("").is_err());
    }

    #[test]
    fn test_malformed_field_lines() {
        let no_type = "[T]\nSeparator=,\nField1=a\n";
        assert!(matches!(
            Schema::parse_definition(no_type, UnknownTypePolicy::Reject),
            Err(SchemaError::MalformedField { line: 3, .. })
        ));
        let zero = "[T]\nSeparator=,\nField0=a, TEXT\n";
        assert!(matches!(
            Schema::parse_definition(zero, UnknownTypePolicy::Reject),
            Err(SchemaError::MalformedField { .. })
        ));
    }

    #[test]
    fn test_crlf_definition() {
        let text = "[T]\r\nSeparator=;\r\nField1=id, INTEGER\r\n/--PrimaryKeyField -keyprop id\r\n";
        let schema = Schema::parse_definition(text, UnknownTypePolicy::Reject).unwrap();
        assert_eq!(schema.separator(), ';');
        assert_eq!(schema.primary_key_field().unwrap().name, "id");
    }

    #[test]
    fn test_width_and_hash() {
        let a = Schema::builder("T", ',')
            .field(0, "id", FieldType::Integer)
            .field(3, "x", FieldType::Text)
            .build()
            .unwrap();
        assert_eq!(a.width(), 4);
        let b = Schema::builder("T", '|')
            .field(0, "id", FieldType::Integer)
            .field(3, "x", FieldType::Text)
            .build()
            .unwrap();
        assert_eq!(a.schema_hash(), a.clone().schema_hash());
        assert_ne!(a.schema_hash(), b.schema_hash());
    }

    #[test]
    fn test_load_schema_missing_file() {
        let err = load_schema(Path::new("/nonexistent/V_T.txt"), UnknownTypePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, SchemaError::ReadError(..)));
    }
}
