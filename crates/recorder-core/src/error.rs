use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the vitals recorder.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// Required identity fields are missing at save time.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A save was attempted without a captured sensor snapshot.
    #[error("Please capture sensor data before saving")]
    CaptureMissing,

    /// The ledger store did not acknowledge an append.
    #[error("Error saving data: {0}")]
    Persistence(String),

    /// A live-value payload was not a usable field map.
    #[error("Malformed sensor payload: {0}")]
    MalformedPayload(String),

    /// A capture-state action was requested from the wrong state.
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    /// A draft operation was requested but no new-entry session is open.
    #[error("No patient entry is open")]
    EntryNotOpen,

    /// A new entry was requested while another one is still open.
    #[error("A patient entry is already open")]
    EntryAlreadyOpen,

    /// A draft field received a value it cannot hold.
    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: String, value: String },

    /// A draft field name is not part of the form.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// An export was requested for an empty record selection.
    #[error("Nothing to export")]
    EmptyExport,

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RecorderError {
    /// `true` for errors resolved inside the core before any I/O is issued.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RecorderError::Validation(_)
                | RecorderError::CaptureMissing
                | RecorderError::InvalidTransition { .. }
                | RecorderError::EntryNotOpen
                | RecorderError::EntryAlreadyOpen
                | RecorderError::InvalidField { .. }
                | RecorderError::UnknownField(_)
        )
    }
}

/// Convenience alias used throughout the recorder crates.
pub type Result<T> = std::result::Result<T, RecorderError>;
