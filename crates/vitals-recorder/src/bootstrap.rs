use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use recorder_core::settings::{Settings, APP_DIR_NAME};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Directory bootstrap ────────────────────────────────────────────────────────

/// Ensure the application directories exist.
///
/// Creates `~/.vitals-recorder/` with its `logs/` subdirectory, plus the
/// configured data and export directories (which default to
/// `~/.vitals-recorder/data/` and `~/.vitals-recorder/exports/`).
pub fn ensure_directories(settings: &Settings) -> anyhow::Result<()> {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    ensure_directories_in(&home, &[settings.data_dir(), settings.export_dir()])
}

/// Create `<home>/.vitals-recorder/{logs}` and every directory in `extra`.
pub fn ensure_directories_in(home: &Path, extra: &[PathBuf]) -> anyhow::Result<()> {
    let app_dir = home.join(APP_DIR_NAME);
    std::fs::create_dir_all(&app_dir)?;
    std::fs::create_dir_all(app_dir.join("logs"))?;
    for dir in extra {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name onto an `EnvFilter` directive.
///
/// Unrecognised names are passed through so `RUST_LOG`-style directives
/// such as `recorder_runtime=trace` also work.
pub fn filter_directive(log_level: &str) -> String {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug".to_string(),
        "INFO" => "info".to_string(),
        "WARNING" => "warn".to_string(),
        "ERROR" | "CRITICAL" => "error".to_string(),
        _ => log_level.to_string(),
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Output goes to stderr, or is appended to `log_file` when one is given.
/// Falls back to `"info"` if the level string is not a valid directive.
pub fn setup_logging(log_level: &str, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_new(filter_directive(log_level)).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, stderr_layer) = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        None => {
            let layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_writer(std::io::stderr);
            (None, Some(layer))
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // ── ensure_directories ────────────────────────────────────────────────────

    #[test]
    fn test_ensure_directories_in_creates_tree() {
        let tmp = TempDir::new().expect("tempdir");
        let data = tmp.path().join("custom").join("data");
        let exports = tmp.path().join("exports");

        ensure_directories_in(tmp.path(), &[data.clone(), exports.clone()])
            .expect("ensure_directories_in should succeed");

        let app_dir = tmp.path().join(".vitals-recorder");
        assert!(app_dir.is_dir(), ".vitals-recorder dir must exist");
        assert!(app_dir.join("logs").is_dir(), "logs subdir must exist");
        assert!(data.is_dir(), "data dir must exist");
        assert!(exports.is_dir(), "exports dir must exist");
    }

    #[test]
    fn test_ensure_directories_in_is_idempotent() {
        let tmp = TempDir::new().expect("tempdir");
        ensure_directories_in(tmp.path(), &[]).expect("first run");
        ensure_directories_in(tmp.path(), &[]).expect("second run");
    }

    // ── filter_directive ──────────────────────────────────────────────────────

    #[test]
    fn test_filter_directive_maps_level_names() {
        assert_eq!(filter_directive("DEBUG"), "debug");
        assert_eq!(filter_directive("info"), "info");
        assert_eq!(filter_directive("WARNING"), "warn");
        assert_eq!(filter_directive("ERROR"), "error");
        assert_eq!(filter_directive("CRITICAL"), "error");
    }

    #[test]
    fn test_filter_directive_passes_through_directives() {
        assert_eq!(
            filter_directive("recorder_runtime=trace"),
            "recorder_runtime=trace"
        );
    }
}
