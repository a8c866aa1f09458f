//! Whole-file CSV persistence shared by the encoding store and the ledgers.
//!
//! Reads distinguish an absent file (`Ok(None)`) from one that exists but
//! cannot be parsed. Writes go to a temp file in the target directory and are
//! renamed over the target, so readers never observe a partial file.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unreadable record file {} (line {line}): {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }

    pub(crate) fn corrupt(path: &Path, line: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt { path: path.to_path_buf(), line, reason: reason.into() }
    }
}

/// A deserialized row and the 1-based line it came from.
pub(crate) struct Row<T> {
    pub line: u64,
    pub value: T,
}

/// Read every row of `path`, or `None` if the file does not exist.
pub(crate) fn read_rows<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<Vec<Row<T>>>, StorageError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);
    let headers = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let line = record.position().map_or(0, |p| p.line());
        let value = record
            .deserialize(Some(&headers))
            .map_err(|e| StorageError::corrupt(path, line, e.to_string()))?;
        rows.push(Row { line, value });
    }

    Ok(Some(rows))
}

/// Replace `path` with the given rows, header first.
pub(crate) fn write_rows<T, I>(path: &Path, rows: I) -> Result<(), StorageError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer.serialize(row).map_err(|e| csv_error(path, e))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| StorageError::io(path, e.into_error()))?;

    write_atomic(path, &bytes).map_err(|e| StorageError::io(path, e))
}

fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn csv_error(path: &Path, err: csv::Error) -> StorageError {
    let line = err.position().map_or(0, |p| p.line());
    match err.into_kind() {
        csv::ErrorKind::Io(e) => StorageError::io(path, e),
        kind => StorageError::corrupt(path, line, format!("{kind:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pair {
        key: String,
        value: u32,
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let rows = read_rows::<Pair>(&dir.path().join("absent.csv")).unwrap();
        assert!(rows.is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/pairs.csv");
        write_rows(&path, [Pair { key: "a".into(), value: 1 }, Pair { key: "b".into(), value: 2 }])
            .unwrap();

        let rows = read_rows::<Pair>(&path).unwrap().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value, Pair { key: "b".into(), value: 2 });
        assert_eq!(rows[1].line, 3);
        assert_eq!(fs::read_to_string(&path).unwrap(), "key,value\na,1\nb,2\n");
    }

    #[test]
    fn test_bad_row_is_corrupt_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        fs::write(&path, "key,value\na,1\nb,not-a-number\n").unwrap();

        match read_rows::<Pair>(&path) {
            Err(StorageError::Corrupt { line, .. }) => assert_eq!(line, 3),
            Err(e) => panic!("expected Corrupt, got {e}"),
            Ok(_) => panic!("expected Corrupt, got rows"),
        }
    }

    #[test]
    fn test_ragged_row_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        fs::write(&path, "key,value\na,1,extra\n").unwrap();
        assert!(matches!(read_rows::<Pair>(&path), Err(StorageError::Corrupt { .. })));
    }

    #[test]
    fn test_overwrite_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        write_rows(&path, [Pair { key: "a".into(), value: 1 }]).unwrap();
        write_rows(&path, [Pair { key: "z".into(), value: 9 }]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        let rows = read_rows::<Pair>(&path).unwrap().unwrap();
        assert_eq!(rows[0].value.key, "z");
    }
}
