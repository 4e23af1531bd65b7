//! CSV export of ledger contents.
//!
//! Column policy: the header is the union of every record's column keys in
//! first-seen order, walking records in canonical (append) order. Records
//! that lack a column get an empty cell. The output is a pure function of
//! the ordered input, so re-exporting an unchanged ledger yields the same
//! text; only the file name (which embeds the export time) differs.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use recorder_core::error::{RecorderError, Result};
use recorder_core::models::Record;
use recorder_core::time_utils::epoch_millis;
use regex::Regex;
use tracing::info;

// ── Columns & CSV text ────────────────────────────────────────────────────────

/// Union of the records' column keys in first-seen order.
pub fn export_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for (key, _) in record.columns() {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }
    columns
}

/// Serialize records to CSV: one header record plus one record per ledger
/// entry, so N entries give N+1 CSV records.
///
/// Values are written verbatim and quoted per RFC 4180. A value holding a
/// line break stays inside its quotes, so that record spans more than one
/// physical line; count records with a CSV reader, not by lines. An empty
/// input produces a single empty header line.
pub fn to_csv(records: &[Record]) -> Result<String> {
    if records.is_empty() {
        return Ok("\n".to_string());
    }

    let columns = export_columns(records);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&columns).map_err(csv_error)?;

    for record in records {
        let cells = record.columns();
        let row = columns.iter().map(|column| {
            cells
                .iter()
                .find(|(key, _)| key == column)
                .map(|(_, value)| value.as_str())
                .unwrap_or("")
        });
        writer.write_record(row).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| RecorderError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| RecorderError::Csv(e.to_string()))
}

fn csv_error(e: csv::Error) -> RecorderError {
    RecorderError::Csv(e.to_string())
}

// ── File naming ───────────────────────────────────────────────────────────────

/// `session_export_<epoch-millis>.csv`
pub fn session_export_file_name(at: DateTime<Utc>) -> String {
    format!("session_export_{}.csv", epoch_millis(at))
}

/// `patient_data_<patientId>_<epoch-millis>.csv`, with the id made safe for
/// use in a file name.
pub fn patient_export_file_name(patient_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "patient_data_{}_{}.csv",
        sanitize_file_component(patient_id),
        epoch_millis(at)
    )
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_file_component(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("regex is valid"));
    let cleaned = re.replace_all(raw.trim(), "_").into_owned();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

// ── Exporter ──────────────────────────────────────────────────────────────────

/// Writes CSV exports into a target directory.
#[derive(Debug, Clone)]
pub struct Exporter {
    dir: PathBuf,
}

impl Exporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Export the whole session as `session_export_<millis>.csv`.
    ///
    /// Fails with [`RecorderError::EmptyExport`] when there is nothing to
    /// export; no file is written in that case.
    pub fn export_session(&self, records: &[Record], at: DateTime<Utc>) -> Result<PathBuf> {
        if records.is_empty() {
            return Err(RecorderError::EmptyExport);
        }
        let path = self.write(&session_export_file_name(at), &to_csv(records)?)?;
        info!(path = %path.display(), rows = records.len(), "session exported");
        Ok(path)
    }

    /// Export one patient's records as `patient_data_<id>_<millis>.csv`.
    pub fn export_patient(
        &self,
        records: &[Record],
        patient_id: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let selected: Vec<Record> = records
            .iter()
            .filter(|r| r.patient_id() == patient_id)
            .cloned()
            .collect();
        if selected.is_empty() {
            return Err(RecorderError::EmptyExport);
        }
        let path = self.write(
            &patient_export_file_name(patient_id, at),
            &to_csv(&selected)?,
        )?;
        info!(path = %path.display(), patient_id, rows = selected.len(), "patient exported");
        Ok(path)
    }

    /// Write via a temp file and rename so readers never see a partial CSV.
    fn write(&self, file_name: &str, contents: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        let tmp = path.with_extension("csv.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
