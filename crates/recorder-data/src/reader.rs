//! JSONL reading for the recorder.
//!
//! Two consumers share the line format: the ledger file (one saved
//! [`Record`] per line) and the sensor bridge file (one raw payload per
//! line, appended as readings arrive).

use std::io::{BufRead, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use recorder_core::error::{RecorderError, Result};
use recorder_core::models::Record;
use tracing::{debug, warn};

// ── Ledger records ────────────────────────────────────────────────────────────

/// Load every record from a ledger file, in file (append) order.
///
/// A missing file is an empty ledger. Lines that fail to parse are skipped
/// with a warning so one torn write cannot hide the rest of the session.
pub fn load_records(path: &Path) -> Result<Vec<Record>> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RecorderError::FileRead {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (line_no, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|source| RecorderError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(
                    "Skipping unreadable record at {}:{}: {}",
                    path.display(),
                    line_no + 1,
                    e
                );
            }
        }
    }

    debug!(
        "Loaded {} records from {} ({} skipped)",
        records.len(),
        path.display(),
        skipped
    );

    Ok(records)
}

// ── JsonlTail ─────────────────────────────────────────────────────────────────

/// Incremental reader that follows an append-only JSONL file.
///
/// Each call to [`JsonlTail::read_new`] returns the JSON values on lines
/// completed since the previous call. A trailing partial line is held back
/// as raw bytes until its newline arrives, so a multi-byte character split
/// across two writes is decoded intact. If the file shrinks (rotated or
/// truncated) the tail restarts from the beginning.
pub struct JsonlTail {
    path: PathBuf,
    offset: u64,
    pending: Vec<u8>,
}

impl JsonlTail {
    /// Follow `path` from its first byte.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            pending: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read values appended since the last call.
    ///
    /// Lines that are not valid JSON are dropped (logged at debug); a file
    /// that does not exist yet yields nothing.
    pub fn read_new(&mut self) -> Result<Vec<serde_json::Value>> {
        let len = match std::fs::metadata(&self.path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if len < self.offset {
            debug!(path = %self.path.display(), "sensor file shrank; restarting tail");
            self.offset = 0;
            self.pending.clear();
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        let mut file = std::fs::File::open(&self.path).map_err(|source| RecorderError::FileRead {
            path: self.path.clone(),
            source,
        })?;
        file.seek(SeekFrom::Start(self.offset))?;
        let read = file.read_to_end(&mut self.pending)?;
        self.offset += read as u64;

        let mut values = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match serde_json::from_slice(&line) {
                Ok(value) => values.push(value),
                Err(e) => debug!(error = %e, "dropping unparsable sensor line"),
            }
        }

        Ok(values)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
