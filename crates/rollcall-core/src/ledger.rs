//! Attendance Ledger: one CSV per calendar day, at most one entry per name.

use crate::csvfile::{self, StorageError};
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Day format used in ledger file names and on the command line.
pub const DATE_FORMAT: &str = "%d-%m-%Y";
const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("attendee name must not be empty")]
    EmptyName,
}

/// One attendee's first sighting on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    #[serde(alias = "Name")]
    pub name: String,
    #[serde(alias = "Timestamp", with = "hms")]
    pub time: NaiveTime,
}

/// Outcome of [`AttendanceLedger::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkOutcome {
    Marked,
    AlreadyMarked,
}

/// Per-day attendance repository.
pub trait AttendanceLedger {
    /// Record `name` at `time` on `date` unless it is already present that day.
    fn mark(
        &mut self,
        name: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<MarkOutcome, LedgerError>;

    /// Entries for `date` in the order they were marked; empty if none yet.
    fn view(&self, date: NaiveDate) -> Result<Vec<AttendanceEntry>, LedgerError>;
}

/// `Attendance_<DD-MM-YYYY>.csv`
pub fn ledger_file_name(date: NaiveDate) -> String {
    format!("Attendance_{}.csv", date.format(DATE_FORMAT))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
}

/// Directory of daily CSV ledgers.
pub struct CsvLedger {
    dir: PathBuf,
}

impl CsvLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(ledger_file_name(date))
    }

    fn read(&self, date: NaiveDate) -> Result<Vec<AttendanceEntry>, LedgerError> {
        let rows = csvfile::read_rows::<AttendanceEntry>(&self.path_for(date))?;
        Ok(rows.unwrap_or_default().into_iter().map(|row| row.value).collect())
    }
}

impl AttendanceLedger for CsvLedger {
    fn mark(
        &mut self,
        name: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<MarkOutcome, LedgerError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::EmptyName);
        }

        let mut entries = self.read(date)?;
        if entries.iter().any(|e| e.name == name) {
            tracing::debug!(name, date = %date.format(DATE_FORMAT), "attendance already marked");
            return Ok(MarkOutcome::AlreadyMarked);
        }

        // Stored at second precision.
        let time = time.with_nanosecond(0).unwrap_or(time);
        entries.push(AttendanceEntry { name: name.to_string(), time });
        csvfile::write_rows(&self.path_for(date), &entries)?;

        tracing::info!(
            name,
            date = %date.format(DATE_FORMAT),
            time = %time.format(TIME_FORMAT),
            "attendance marked"
        );
        Ok(MarkOutcome::Marked)
    }

    fn view(&self, date: NaiveDate) -> Result<Vec<AttendanceEntry>, LedgerError> {
        self.read(date)
    }
}

mod hms {
    use super::TIME_FORMAT;
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.trim().parse::<NaiveTime>().map_err(serde::de::Error::custom)
    }
}
