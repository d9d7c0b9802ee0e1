//! Attendance ledger — append-only CSV of `timestamp,name,status` rows.
//!
//! The ledger provides primitives only. [`Ledger::mark`] never checks for an
//! existing mark; callers check [`Ledger::already_marked_today`] first. The
//! at-most-once-per-day rule is best-effort and not enforced by storage.

use crate::types::STATUS_PRESENT;
use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Column order of the ledger file.
pub const LEDGER_HEADER: [&str; 3] = ["timestamp", "name", "status"];

/// ISO-8601 local datetime at second precision, e.g. `2024-01-01T09:00:00`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger storage corrupt: {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One attendance row. Fields missing from the file read as empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct AttendanceRecord {
    pub timestamp: String,
    pub name: String,
    pub status: String,
}

impl AttendanceRecord {
    /// True if the timestamp's date prefix is `date`.
    pub fn is_on(&self, date: NaiveDate) -> bool {
        self.timestamp
            .starts_with(&date.format(DATE_FORMAT).to_string())
    }
}

/// File-backed attendance ledger.
#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory and a header-only file if the ledger does not exist.
    pub fn ensure_storage(&self) -> Result<(), LedgerError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| self.io_err(source))?;
        }

        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(source) => return Err(self.io_err(source)),
        };

        if needs_header {
            let mut writer = csv::Writer::from_path(&self.path).map_err(|e| self.csv_err(e))?;
            writer
                .write_record(LEDGER_HEADER)
                .map_err(|e| self.csv_err(e))?;
            writer.flush().map_err(|source| self.io_err(source))?;
            tracing::debug!(path = %self.path.display(), "initialized attendance ledger");
        }
        Ok(())
    }

    /// All records in storage order, oldest first.
    pub fn load_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.ensure_storage()?;

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;

        let headers = reader.headers().map_err(|e| self.csv_err(e))?.clone();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let (Some(timestamp), Some(name)) = (column("timestamp"), column("name")) else {
            return Err(LedgerError::Corrupt {
                path: self.path.clone(),
                reason: "header must contain `timestamp` and `name` columns".to_string(),
            });
        };
        let status = column("status");

        // Short rows are padded with empty fields rather than rejected.
        let field = |row: &csv::StringRecord, idx: Option<usize>| {
            idx.and_then(|i| row.get(i)).unwrap_or_default().to_string()
        };

        reader
            .records()
            .map(|row| -> Result<AttendanceRecord, LedgerError> {
                let row = row.map_err(|e| self.csv_err(e))?;
                Ok(AttendanceRecord {
                    timestamp: field(&row, Some(timestamp)),
                    name: field(&row, Some(name)),
                    status: field(&row, status),
                })
            })
            .collect()
    }

    /// Records dated `date`, in storage order.
    pub fn load_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut records = self.load_all()?;
        records.retain(|r| r.is_on(date));
        Ok(records)
    }

    /// Records dated today (local time).
    pub fn load_today(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        self.load_on(Local::now().date_naive())
    }

    /// True if `name` (case-sensitive) has a record dated `date`.
    pub fn already_marked_on(&self, name: &str, date: NaiveDate) -> Result<bool, LedgerError> {
        Ok(self
            .load_all()?
            .iter()
            .any(|r| r.is_on(date) && r.name == name))
    }

    /// True if `name` has a record dated today (local time).
    pub fn already_marked_today(&self, name: &str) -> Result<bool, LedgerError> {
        self.already_marked_on(name, Local::now().date_naive())
    }

    /// Append a record stamped `at`, unconditionally.
    pub fn mark_at(
        &self,
        name: &str,
        status: &str,
        at: NaiveDateTime,
    ) -> Result<AttendanceRecord, LedgerError> {
        self.ensure_storage()?;

        let record = AttendanceRecord {
            timestamp: at.format(TIMESTAMP_FORMAT).to_string(),
            name: name.to_string(),
            status: status.to_string(),
        };

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_err(source))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.serialize(&record).map_err(|e| self.csv_err(e))?;
        writer.flush().map_err(|source| self.io_err(source))?;

        tracing::debug!(name, status, timestamp = %record.timestamp, "ledger row appended");
        Ok(record)
    }

    /// Append a record stamped with the current local time, unconditionally.
    pub fn mark(&self, name: &str, status: &str) -> Result<AttendanceRecord, LedgerError> {
        self.mark_at(name, status, Local::now().naive_local())
    }

    /// [`mark`](Self::mark) with the default `Present` status.
    pub fn mark_present(&self, name: &str) -> Result<AttendanceRecord, LedgerError> {
        self.mark(name, STATUS_PRESENT)
    }

    fn io_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, err: csv::Error) -> LedgerError {
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => self.io_err(source),
            _ => LedgerError::Corrupt {
                path: self.path.clone(),
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(dir: &TempDir) -> Ledger {
        Ledger::new(dir.path().join("data").join("attendance.csv"))
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_empty_ledger_then_one_mark() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);

        assert!(ledger.load_all().unwrap().is_empty());

        ledger
            .mark_at("Bob", "Present", at("2024-01-01T09:00:00"))
            .unwrap();
        let records = ledger.load_all().unwrap();
        assert_eq!(
            records,
            vec![AttendanceRecord {
                timestamp: "2024-01-01T09:00:00".into(),
                name: "Bob".into(),
                status: "Present".into(),
            }]
        );
    }

    #[test]
    fn test_storage_initialized_with_header() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger.ensure_storage().unwrap();
        let content = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(content, "timestamp,name,status\n");
    }

    #[test]
    fn test_marked_on_day_boundary() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .mark_at("Bob", "Present", at("2024-01-01T09:00:00"))
            .unwrap();

        assert!(ledger.already_marked_on("Bob", day("2024-01-01")).unwrap());
        assert!(!ledger.already_marked_on("Bob", day("2024-01-02")).unwrap());
    }

    #[test]
    fn test_load_on_filters_by_day() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .mark_at("Alice", "Present", at("2024-01-01T09:00:00"))
            .unwrap();
        ledger
            .mark_at("Bob", "Present", at("2024-01-02T09:00:00"))
            .unwrap();
        ledger
            .mark_at("Carol", "Present", at("2024-01-02T11:15:00"))
            .unwrap();

        let names: Vec<_> = ledger
            .load_on(day("2024-01-02"))
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["Bob".to_string(), "Carol".to_string()]);
        assert!(ledger.load_on(day("2024-01-03")).unwrap().is_empty());
    }

    #[test]
    fn test_name_match_is_case_sensitive() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .mark_at("Bob", "Present", at("2024-01-01T09:00:00"))
            .unwrap();
        assert!(!ledger.already_marked_on("bob", day("2024-01-01")).unwrap());
        assert!(!ledger.already_marked_on("Bobby", day("2024-01-01")).unwrap());
    }

    #[test]
    fn test_mark_then_already_marked_today() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        assert!(!ledger.already_marked_today("Alice").unwrap());
        assert!(!ledger.already_marked_today("Alice").unwrap());

        ledger.mark_present("Alice").unwrap();
        assert!(ledger.already_marked_today("Alice").unwrap());
        assert!(ledger.already_marked_today("Alice").unwrap());
    }

    #[test]
    fn test_mark_does_not_dedup() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .mark_at("Bob", "Present", at("2024-01-01T09:00:00"))
            .unwrap();
        ledger
            .mark_at("Bob", "Present", at("2024-01-01T10:00:00"))
            .unwrap();
        assert_eq!(ledger.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_records_keep_storage_order() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .mark_at("Carol", "Present", at("2024-01-02T08:00:00"))
            .unwrap();
        ledger
            .mark_at("Alice", "Late", at("2024-01-01T09:30:00"))
            .unwrap();

        let names: Vec<_> = ledger
            .load_all()
            .unwrap()
            .into_iter()
            .map(|r| (r.name, r.status))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Carol".to_string(), "Present".to_string()),
                ("Alice".to_string(), "Late".to_string())
            ]
        );
    }

    #[test]
    fn test_mark_timestamp_has_second_precision() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        let record = ledger.mark_present("Alice").unwrap();
        assert_eq!(record.timestamp.len(), "2024-01-01T09:00:00".len());
        assert!(NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT).is_ok());
        assert_eq!(record.status, "Present");
    }

    #[test]
    fn test_names_with_commas_survive() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        ledger
            .mark_at("Doe, Jane", "Present", at("2024-01-01T09:00:00"))
            .unwrap();
        let records = ledger.load_all().unwrap();
        assert_eq!(records[0].name, "Doe, Jane");
    }

    #[test]
    fn test_missing_fields_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        std::fs::write(
            ledger.path(),
            "timestamp,name,status\n2024-01-01T09:00:00,Bob\n",
        )
        .unwrap();

        let records = ledger.load_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Bob");
        assert_eq!(records[0].status, "");
    }

    #[test]
    fn test_reads_crlf_quoted_rows_with_short_row() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        std::fs::write(
            ledger.path(),
            "timestamp,name,status\r\n\
             2024-01-01T09:00:00,\"Doe, Jane\",Present\r\n\
             2024-01-01T09:05:00,Bob\r\n\
             \"2024-01-02T08:00:00\",\"Alice\",\"Late\"\r\n",
        )
        .unwrap();

        let records = ledger.load_all().unwrap();
        assert_eq!(
            records,
            vec![
                AttendanceRecord {
                    timestamp: "2024-01-01T09:00:00".into(),
                    name: "Doe, Jane".into(),
                    status: "Present".into(),
                },
                AttendanceRecord {
                    timestamp: "2024-01-01T09:05:00".into(),
                    name: "Bob".into(),
                    status: String::new(),
                },
                AttendanceRecord {
                    timestamp: "2024-01-02T08:00:00".into(),
                    name: "Alice".into(),
                    status: "Late".into(),
                },
            ]
        );
        assert!(ledger.already_marked_on("Bob", day("2024-01-01")).unwrap());
        assert!(!ledger.already_marked_on("Bob", day("2024-01-02")).unwrap());

        ledger
            .mark_at("Carol", "Present", at("2024-01-02T09:00:00"))
            .unwrap();
        assert_eq!(ledger.load_on(day("2024-01-02")).unwrap().len(), 2);
    }

    #[test]
    fn test_columns_located_by_header_name() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        std::fs::write(
            ledger.path(),
            "name,timestamp\nBob,2024-01-01T09:00:00\nAlice\n",
        )
        .unwrap();

        let records = ledger.load_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].timestamp, "2024-01-01T09:00:00");
        assert_eq!(records[0].status, "");
        assert_eq!(records[1].name, "Alice");
        assert_eq!(records[1].timestamp, "");
    }

    #[test]
    fn test_wrong_header_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        std::fs::write(ledger.path(), "when,who\n2024-01-01,Bob\n").unwrap();

        assert!(matches!(
            ledger.load_all(),
            Err(LedgerError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir);
        std::fs::create_dir_all(ledger.path().parent().unwrap()).unwrap();
        let mut bytes = b"timestamp,name,status\n2024-01-01T09:00:00,".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(b",Present\n");
        std::fs::write(ledger.path(), bytes).unwrap();

        assert!(matches!(
            ledger.already_marked_on("Bob", day("2024-01-01")),
            Err(LedgerError::Corrupt { .. })
        ));
    }
}
