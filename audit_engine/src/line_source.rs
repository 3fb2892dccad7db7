//! Line sources: independent, ordered traversals of a data file.
//!
//! Every call to [`LineSource::open`] yields a fresh traversal. Check tasks
//! never share a read position: a [`FileLineSource`] opens a new handle per
//! call and a [`MemoryLineSource`] hands out a new iterator over an immutable
//! shared buffer.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::error::AuditError;

/// A lazy, finite sequence of lines with line terminators stripped.
pub type Lines = Box<dyn Iterator<Item = io::Result<String>> + Send>;

/// The data file could not be opened or read.
#[derive(Debug, thiserror::Error)]
#[error("Failed to read data file '{path}': {source}")]
pub struct LineSourceError {
    /// Path or description of the source.
    pub path: String,
    #[source]
    pub source: io::Error,
}

/// Something that can be traversed line by line, any number of times.
pub trait LineSource: Send + Sync {
    /// Human-readable location of the source, used in errors and reports.
    fn describe(&self) -> String;

    /// Start a new traversal from the first line.
    ///
    /// # Errors
    ///
    /// Returns [`LineSourceError`] if the underlying data cannot be opened.
    fn open(&self) -> Result<Lines, LineSourceError>;
}

/// Read a file lazily, one line per item, in file order.
///
/// `\n` and `\r\n` terminators are removed, as is a lone `\r` ending the
/// last line; nothing else is trimmed.
///
/// # Errors
///
/// Returns [`LineSourceError`] if the file cannot be opened.
pub fn read_lines(path: &Path) -> Result<Lines, LineSourceError> {
    let file = File::open(path).map_err(|source| LineSourceError {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Box::new(
        BufReader::new(file).lines().map(|line| line.map(strip_cr)),
    ))
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}

/// Compute the `sha256:<hex>` digest of a file's bytes.
///
/// # Errors
///
/// Returns [`LineSourceError`] if the file cannot be opened or read.
pub fn file_sha256(path: &Path) -> Result<String, LineSourceError> {
    let wrap = |source| LineSourceError {
        path: path.display().to_string(),
        source,
    };
    let mut file = File::open(path).map_err(wrap)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(wrap)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// A data file on disk. Each traversal opens its own handle.
#[derive(Debug, Clone)]
pub struct FileLineSource {
    path: PathBuf,
}

impl FileLineSource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LineSource for FileLineSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn open(&self) -> Result<Lines, LineSourceError> {
        read_lines(&self.path)
    }
}

/// Fully materialized lines shared read-only between traversals.
#[derive(Debug, Clone)]
pub struct MemoryLineSource {
    name: String,
    lines: Arc<[String]>,
}

impl MemoryLineSource {
    #[must_use]
    pub fn new(name: &str, lines: Vec<String>) -> Self {
        Self {
            name: name.to_owned(),
            lines: lines.into(),
        }
    }

    /// Split text into lines the same way a file traversal would.
    #[must_use]
    pub fn from_text(name: &str, text: &str) -> Self {
        Self::new(name, text.lines().map(|l| strip_cr(l.to_owned())).collect())
    }

    /// Load a file into memory in one pass.
    ///
    /// # Errors
    ///
    /// Returns [`LineSourceError`] if the file cannot be opened or read.
    pub fn load(path: &Path) -> Result<Self, LineSourceError> {
        let lines = read_lines(path)?
            .collect::<io::Result<Vec<String>>>()
            .map_err(|source| LineSourceError {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::new(&path.display().to_string(), lines))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl LineSource for MemoryLineSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn open(&self) -> Result<Lines, LineSourceError> {
        let lines = Arc::clone(&self.lines);
        Ok(Box::new(
            (0..lines.len()).map(move |i| Ok(lines[i].clone())),
        ))
    }
}

/// Shared cancellation flag for one audit run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every task holding this token to stop at its next line.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A check task's own traversal of a source.
///
/// Yields raw records; stops with [`AuditError::Cancelled`] at the first line
/// boundary after cancellation, and maps read failures to [`AuditError::Io`].
pub struct Records<'a> {
    lines: Lines,
    source: &'a dyn LineSource,
    cancel: &'a CancelToken,
    done: bool,
}

impl<'a> Records<'a> {
    /// Open a new traversal of `source`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Io`] if the source cannot be opened, or
    /// [`AuditError::Cancelled`] if the run was already cancelled.
    pub fn open(source: &'a dyn LineSource, cancel: &'a CancelToken) -> Result<Self, AuditError> {
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        Ok(Self {
            lines: source.open()?,
            source,
            cancel,
            done: false,
        })
    }
}

impl Iterator for Records<'_> {
    type Item = Result<String, AuditError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.done = true;
            return Some(Err(AuditError::Cancelled));
        }
        match self.lines.next()? {
            Ok(line) => Some(Ok(line)),
            Err(source) => {
                self.done = true;
                Some(Err(AuditError::Io(LineSourceError {
                    path: self.source.describe(),
                    source,
                })))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn collect(lines: Lines) -> Vec<String> {
        lines.map(Result::unwrap).collect()
    }

    #[test]
    fn test_read_lines_strips_terminators() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "1,'a'\r\n2,'b'\n3,'c'").unwrap();
        let lines = collect(read_lines(&path).unwrap());
        assert_eq!(lines, ["1,'a'", "2,'b'", "3,'c'"]);
    }

    #[test]
    fn test_carriage_return_before_eof_is_stripped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "1,'a'\r\n2,'b'\r").unwrap();
        let source = FileLineSource::new(&path);
        let cancel = CancelToken::new();
        let records: Vec<String> = Records::open(&source, &cancel)
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records, ["1,'a'", "2,'b'"]);

        let memory = MemoryLineSource::from_text("mem", "x\r\ny\r");
        assert_eq!(collect(memory.open().unwrap()), ["x", "y"]);
    }

    #[test]
    fn test_read_lines_keeps_inner_whitespace() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, " 1 ,x \n").unwrap();
        let lines = collect(read_lines(&path).unwrap());
        assert_eq!(lines, [" 1 ,x "]);
    }

    #[test]
    fn test_read_lines_missing_file() {
        let err = read_lines(Path::new("/nonexistent/data.txt")).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/data.txt"));
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_file_sha256() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_sha256(&path).unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(file_sha256(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn test_file_source_traversals_are_independent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "a\nb\nc\n").unwrap();
        let source = FileLineSource::new(&path);

        let mut first = source.open().unwrap();
        assert_eq!(first.next().unwrap().unwrap(), "a");
        let second = collect(source.open().unwrap());
        assert_eq!(second, ["a", "b", "c"]);
        assert_eq!(first.next().unwrap().unwrap(), "b");
    }

    #[test]
    fn test_memory_source_traversals_are_independent() {
        let source = MemoryLineSource::from_text("mem", "x\ny\n");
        let mut first = source.open().unwrap();
        assert_eq!(first.next().unwrap().unwrap(), "x");
        assert_eq!(collect(source.open().unwrap()), ["x", "y"]);
        assert_eq!(first.next().unwrap().unwrap(), "y");
        assert!(first.next().is_none());
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_memory_source_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, "1\n2\n").unwrap();
        let source = MemoryLineSource::load(&path).unwrap();
        assert_eq!(collect(source.open().unwrap()), ["1", "2"]);
    }

    #[test]
    fn test_records_stop_on_cancel() {
        let source = MemoryLineSource::from_text("mem", "a\nb\nc");
        let cancel = CancelToken::new();
        let mut records = Records::open(&source, &cancel).unwrap();
        assert_eq!(records.next().unwrap().unwrap(), "a");
        cancel.cancel();
        assert!(matches!(records.next(), Some(Err(AuditError::Cancelled))));
        assert!(records.next().is_none());
    }

    #[test]
    fn test_records_open_after_cancel() {
        let source = MemoryLineSource::from_text("mem", "a");
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            Records::open(&source, &cancel),
            Err(AuditError::Cancelled)
        ));
    }

    #[test]
    fn test_records_invalid_utf8_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.txt");
        fs::write(&path, b"ok\n\xff\xfe\n").unwrap();
        let source = FileLineSource::new(&path);
        let cancel = CancelToken::new();
        let items: Vec<_> = Records::open(&source, &cancel).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(&items[1], Err(e) if e.is_io()));
    }
}
