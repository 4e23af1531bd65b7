mod bootstrap;
mod console;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use recorder_core::settings::Settings;
use recorder_data::export::Exporter;
use recorder_data::ledger_file::LedgerFile;
use recorder_runtime::orchestrator::{RecordingSession, SessionConfig};
use recorder_runtime::sources::{JsonlSource, ManualSource};
use recorder_runtime::store::{FileLedgerStore, LedgerStore, MemoryLedgerStore};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories(&settings)?;
    bootstrap::setup_logging(&settings.log_level, settings.log_file.as_ref())?;

    tracing::info!("Vitals Recorder v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Mode: {}, Store: {}, Data: {}",
        settings.mode,
        settings.store,
        settings.data_dir().display()
    );

    match settings.mode.as_str() {
        "record" => run_record(&settings).await?,
        "export" => run_export(&settings)?,
        unknown => {
            eprintln!("Unknown mode: {}", unknown);
        }
    }

    Ok(())
}

/// Interactive capture session on the console.
async fn run_record(settings: &Settings) -> Result<()> {
    let poll_interval = Duration::from_millis(settings.poll_interval_ms);

    let store: Arc<dyn LedgerStore> = match settings.store.as_str() {
        "memory" => Arc::new(MemoryLedgerStore::new()),
        _ => Arc::new(FileLedgerStore::open(&settings.data_dir(), poll_interval).await?),
    };

    // Without a sensor file the manual source stays open so the feed keeps
    // running, but nothing is ever pushed and live values read as unknown.
    let (sensor_rx, _manual, source_handle) = match &settings.sensor_file {
        Some(path) => {
            let (rx, handle) = JsonlSource::new(path, poll_interval).start();
            (rx, None, Some(handle))
        }
        None => {
            tracing::warn!("no --sensor-file configured; live values will stay unknown");
            let (manual, rx) = ManualSource::new();
            (rx, Some(manual), None)
        }
    };

    let config = SessionConfig {
        export_dir: settings.export_dir(),
        survey_url: settings.survey_url.clone(),
        append_timeout: Duration::from_secs(settings.append_timeout_secs),
        visit_day: settings.visit_day.clone(),
    };

    let (session, events) = RecordingSession::start(sensor_rx, store, config)?;
    let result = console::run(session, events).await;

    if let Some(handle) = source_handle {
        handle.abort();
    }
    result
}

/// Write the persisted ledger (or one patient's slice of it) to CSV and exit.
fn run_export(settings: &Settings) -> Result<()> {
    let records = LedgerFile::in_dir(&settings.data_dir()).load()?;
    let exporter = Exporter::new(settings.export_dir());
    let now = chrono::Utc::now();

    let path = match &settings.patient_id {
        Some(id) => exporter.export_patient(&records, id, now)?,
        None => exporter.export_session(&records, now)?,
    };

    tracing::info!(records = records.len(), "export finished");
    println!("{}", path.display());
    Ok(())
}
