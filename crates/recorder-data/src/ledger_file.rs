//! Durable append-only ledger file.
//!
//! The `patient_records` collection is stored as `patient_records.jsonl`:
//! one JSON-encoded [`Record`] per line, in append order. Every append is
//! flushed with `sync_data` before it is acknowledged.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use recorder_core::error::{RecorderError, Result};
use recorder_core::models::Record;

use crate::reader::load_records;

/// Name of the replicated record collection.
pub const COLLECTION_NAME: &str = "patient_records";

/// Size and modification time of the ledger file, used to detect writes
/// made by other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Handle to the on-disk ledger.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    /// Ledger for the default collection inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::at(data_dir.join(format!("{COLLECTION_NAME}.jsonl")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to stable storage.
    ///
    /// Returns the file length before the write, which is where the new line
    /// starts and what [`LedgerFile::truncate`] takes to undo it.
    pub fn append(&self, record: &Record) -> Result<u64> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| RecorderError::FileRead {
                path: self.path.clone(),
                source,
            })?;
        let start = file.metadata()?.len();
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(start)
    }

    /// Cut the file back to `len` bytes and flush.
    pub fn truncate(&self, len: u64) -> Result<()> {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|source| RecorderError::FileRead {
                path: self.path.clone(),
                source,
            })?;
        file.set_len(len)?;
        file.sync_data()?;
        Ok(())
    }

    /// Every record currently in the file, in append order.
    pub fn load(&self) -> Result<Vec<Record>> {
        load_records(&self.path)
    }

    /// Current fingerprint, or `None` when the file does not exist yet.
    pub fn fingerprint(&self) -> Option<FileFingerprint> {
        let meta = std::fs::metadata(&self.path).ok()?;
        Some(FileFingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use recorder_core::models::{Draft, SensorSample};
    use recorder_core::RecordBuilder;
    use tempfile::TempDir;

    fn record(builder: &RecordBuilder, name: &str, id: &str) -> Record {
        let mut draft = Draft::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        draft.full_name = name.to_string();
        draft.patient_id = id.to_string();
        builder
            .build(&draft, Some(&SensorSample::unknown(Utc::now())))
            .unwrap()
    }

    #[test]
    fn test_in_dir_uses_collection_name() {
        let file = LedgerFile::in_dir(Path::new("/data"));
        assert_eq!(file.path(), Path::new("/data/patient_records.jsonl"));
    }

    #[test]
    fn test_append_then_load_preserves_order() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::in_dir(&dir.path().join("nested"));
        let builder = RecordBuilder::new();

        let first = record(&builder, "Jane Doe", "P001");
        let second = record(&builder, "John Roe", "P002");
        file.append(&first).unwrap();
        file.append(&second).unwrap();

        let loaded = file.load().unwrap();
        assert_eq!(loaded, vec![first, second]);
    }

    #[test]
    fn test_fingerprint_changes_on_append() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::in_dir(dir.path());
        assert!(file.fingerprint().is_none());

        file.append(&record(&RecordBuilder::new(), "Jane Doe", "P001")).unwrap();
        let before = file.fingerprint().unwrap();
        file.append(&record(&RecordBuilder::new(), "John Roe", "P002")).unwrap();
        let after = file.fingerprint().unwrap();
        assert!(after.len > before.len);
    }

    #[test]
    fn test_truncate_undoes_last_append() {
        let dir = TempDir::new().unwrap();
        let file = LedgerFile::in_dir(dir.path());
        let builder = RecordBuilder::new();

        let kept = record(&builder, "Jane Doe", "P001");
        assert_eq!(file.append(&kept).unwrap(), 0);
        let start = file.append(&record(&builder, "John Roe", "P002")).unwrap();
        assert!(start > 0);

        file.truncate(start).unwrap();
        assert_eq!(file.load().unwrap(), vec![kept]);
        assert_eq!(file.fingerprint().unwrap().len, start);
    }
}
