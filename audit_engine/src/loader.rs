//! Loading audited data into a relational table.
//!
//! Only a file whose audit came back clean is loaded, and only if its bytes
//! are still the ones that were audited. Values are prepared the way the
//! audit log describes them: `'` quoting stripped, empty columns as NULL,
//! missing columns as NULL. Each field takes the column at its own index, so
//! index gaps and definition order never shift values. Columns beyond the
//! widest field are passed through so the insert rejects the row; the whole
//! load then rolls back.

use std::path::Path;

use rusqlite::Connection;

use crate::line_source::{file_sha256, read_lines, LineSourceError};
use crate::schema::Schema;
use crate::types::AuditReport;

/// One prepared row: one value per schema field in definition order, `None`
/// for NULL, followed by any surplus columns.
pub type Row = Vec<Option<String>>;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Refusing to load: audit reported {findings} inconsistencies")]
    NotClean { findings: u32 },

    #[error("Refusing to load '{path}': file changed since it was audited")]
    FileChanged { path: String },

    #[error(transparent)]
    Io(#[from] LineSourceError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// A relational store that can receive audited rows.
pub trait TableLoader {
    /// Create the schema's table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Database`] if the statement fails.
    fn create_table(&mut self, schema: &Schema) -> Result<(), LoadError>;

    /// Insert rows atomically; returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Database`] if any row is rejected. No row is
    /// kept in that case.
    fn insert_rows(&mut self, schema: &Schema, rows: &[Row]) -> Result<usize, LoadError>;
}

/// [`TableLoader`] backed by a SQLite database file.
pub struct SqliteLoader {
    conn: Connection,
}

impl SqliteLoader {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// A private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Database`] if SQLite cannot allocate it.
    pub fn open_in_memory() -> Result<Self, LoadError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TableLoader for SqliteLoader {
    fn create_table(&mut self, schema: &Schema) -> Result<(), LoadError> {
        let sql = create_table_sql(schema);
        log::debug!("CREATE TABLE: {}", sql);
        self.conn.execute(&sql, [])?;
        log::info!("Table {} ready", schema.table_name());
        Ok(())
    }

    fn insert_rows(&mut self, schema: &Schema, rows: &[Row]) -> Result<usize, LoadError> {
        let columns: Vec<String> = schema
            .all_fields()
            .iter()
            .map(|f| quote_ident(&f.name))
            .collect();
        let width = columns.len();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(schema.table_name()),
            columns.join(", "),
            vec!["?"; width].join(", ")
        );

        let null: Option<String> = None;
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(&insert_sql)?;
            for row in rows {
                let padding = width.saturating_sub(row.len());
                let values = row.iter().chain(std::iter::repeat(&null).take(padding));
                stmt.execute(rusqlite::params_from_iter(values))?;
            }
        }
        tx.commit()?;

        log::info!("Inserted {} rows into {}", rows.len(), schema.table_name());
        Ok(rows.len())
    }
}

/// Quote an SQL identifier, doubling embedded quotes.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DDL for the schema's table, with its primary key and not-null constraints.
#[must_use]
pub fn create_table_sql(schema: &Schema) -> String {
    let columns: Vec<String> = schema
        .all_fields()
        .iter()
        .map(|f| {
            let mut column = format!("{} {}", quote_ident(&f.name), f.field_type.as_sql());
            if schema.is_primary_key(f) {
                column.push_str(" PRIMARY KEY");
            }
            if schema.is_not_null(f) {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(schema.table_name()),
        columns.join(", ")
    )
}

/// Split one data line into insertable values, one per schema field.
///
/// Blank lines yield `None`. Quote characters are stripped from every value;
/// a value that was empty before stripping, or a column the line does not
/// have, becomes NULL.
#[must_use]
pub fn prepare_row(line: &str, schema: &Schema) -> Option<Row> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let raw: Vec<&str> = line.split(schema.separator()).collect();
    let value = |v: &str| (!v.is_empty()).then(|| v.replace('\'', ""));

    let mut row: Row = schema
        .all_fields()
        .iter()
        .map(|f| raw.get(f.index).and_then(|v| value(*v)))
        .collect();
    row.extend(raw.iter().skip(schema.width()).map(|v| value(*v)));
    Some(row)
}

/// Read and prepare every row of a data file.
///
/// # Errors
///
/// Returns [`LoadError::Io`] if the file cannot be read.
pub fn read_rows(path: &Path, schema: &Schema) -> Result<Vec<Row>, LoadError> {
    let mut rows = Vec::new();
    for line in read_lines(path)? {
        let line = line.map_err(|source| LineSourceError {
            path: path.display().to_string(),
            source,
        })?;
        rows.extend(prepare_row(&line, schema));
    }
    Ok(rows)
}

/// Load `path` into `loader`, provided `report` cleared exactly these bytes.
///
/// # Errors
///
/// Returns [`LoadError::NotClean`] if the report has findings,
/// [`LoadError::FileChanged`] if the file no longer hashes to the audited
/// digest (or the report carries none), and otherwise the loader's errors.
pub fn load_audited_file(
    report: &AuditReport,
    schema: &Schema,
    path: &Path,
    loader: &mut dyn TableLoader,
) -> Result<usize, LoadError> {
    if report.total_findings > 0 {
        return Err(LoadError::NotClean {
            findings: report.total_findings,
        });
    }

    let current = file_sha256(path)?;
    if report.data_file_hash.is_empty() || current != report.data_file_hash {
        return Err(LoadError::FileChanged {
            path: path.display().to_string(),
        });
    }

    let rows = read_rows(path, schema)?;
    loader.create_table(schema)?;
    loader.insert_rows(schema, &rows)
}
