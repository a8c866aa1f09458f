//! Encoding Store: named reference embeddings, in insertion order.

use crate::csvfile::{self, StorageError};
use crate::types::{Embedding, FaceRecord};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("embedding has {actual} dimensions, store holds {expected}-dimensional embeddings")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding is empty")]
    EmptyEmbedding,
    #[error("embedding contains a non-finite value ({value})")]
    NonFiniteEmbedding { value: f32 },
}

/// Repository of enrolled faces.
///
/// `load` on a never-written store returns an empty set. Names are not
/// unique: every record is independent evidence for its person.
pub trait EncodingStore {
    fn load(&self) -> Result<Vec<FaceRecord>, StoreError>;

    /// Add one record and persist the full set.
    fn append(&mut self, record: FaceRecord) -> Result<(), StoreError>;

    /// Overwrite the store with `records`.
    fn replace_all(&mut self, records: Vec<FaceRecord>) -> Result<(), StoreError>;
}

/// Reject sets that mix embedding lengths or hold empty or non-finite
/// embeddings; anything accepted here must load back.
fn check_records<'a>(
    expected: Option<usize>,
    records: impl IntoIterator<Item = &'a FaceRecord>,
) -> Result<(), StoreError> {
    let mut expected = expected;
    for record in records {
        let actual = record.embedding.len();
        if actual == 0 {
            return Err(StoreError::EmptyEmbedding);
        }
        if let Some(&value) = record.embedding.values.iter().find(|v| !v.is_finite()) {
            return Err(StoreError::NonFiniteEmbedding { value });
        }
        match expected {
            Some(expected) if expected != actual => {
                return Err(StoreError::DimensionMismatch { expected, actual });
            }
            _ => expected = Some(actual),
        }
    }
    Ok(())
}

/// On-disk row: `name,encoding` with the embedding space-separated.
#[derive(Serialize, Deserialize)]
struct EncodingRow {
    #[serde(alias = "Name")]
    name: String,
    #[serde(alias = "Encoding")]
    encoding: String,
}

impl From<&FaceRecord> for EncodingRow {
    fn from(record: &FaceRecord) -> Self {
        let encoding = record
            .embedding
            .values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        Self { name: record.name.clone(), encoding }
    }
}

/// Parse `0.1 -0.2 ...`; tolerates `[...]` wrapping and comma separators.
fn parse_encoding(raw: &str) -> Result<Vec<f32>, String> {
    let values = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<f32>().map_err(|e| format!("bad value {s:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    if values.is_empty() {
        return Err("empty encoding".into());
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(format!("non-finite value {bad}"));
    }
    Ok(values)
}

/// CSV-backed store, one row per record.
pub struct CsvEncodingStore {
    path: PathBuf,
}

impl CsvEncodingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, records: &[FaceRecord]) -> Result<(), StoreError> {
        csvfile::write_rows(&self.path, records.iter().map(EncodingRow::from))?;
        Ok(())
    }
}

impl EncodingStore for CsvEncodingStore {
    fn load(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let Some(rows) = csvfile::read_rows::<EncodingRow>(&self.path)? else {
            tracing::debug!(
                path = %self.path.display(),
                "encoding store absent, treating as empty"
            );
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(rows.len());
        let mut dim: Option<usize> = None;
        for row in rows {
            let values = parse_encoding(&row.value.encoding)
                .map_err(|reason| StorageError::corrupt(&self.path, row.line, reason))?;
            match dim {
                Some(expected) if expected != values.len() => {
                    return Err(StorageError::corrupt(
                        &self.path,
                        row.line,
                        format!(
                            "encoding has {} values, earlier rows have {expected}",
                            values.len()
                        ),
                    )
                    .into());
                }
                _ => dim = Some(values.len()),
            }
            records.push(FaceRecord::new(row.value.name, Embedding::new(values)));
        }

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "loaded encoding store"
        );
        Ok(records)
    }

    fn append(&mut self, record: FaceRecord) -> Result<(), StoreError> {
        let mut records = self.load()?;
        check_records(records.first().map(|r| r.embedding.len()), [&record])?;
        records.push(record);
        self.write(&records)?;

        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "encoding store updated"
        );
        Ok(())
    }

    fn replace_all(&mut self, records: Vec<FaceRecord>) -> Result<(), StoreError> {
        check_records(None, &records)?;
        self.write(&records)?;

        tracing::info!(
            path = %self.path.display(),
            records = records.len(),
            "encoding store replaced"
        );
        Ok(())
    }
}

/// In-process store for embedding callers and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryEncodingStore {
    records: Vec<FaceRecord>,
}

impl MemoryEncodingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl EncodingStore for MemoryEncodingStore {
    fn load(&self) -> Result<Vec<FaceRecord>, StoreError> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: FaceRecord) -> Result<(), StoreError> {
        check_records(self.records.first().map(|r| r.embedding.len()), [&record])?;
        self.records.push(record);
        Ok(())
    }

    fn replace_all(&mut self, records: Vec<FaceRecord>) -> Result<(), StoreError> {
        check_records(None, &records)?;
        self.records = records;
        Ok(())
    }
}
