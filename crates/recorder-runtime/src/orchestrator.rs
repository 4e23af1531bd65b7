//! Recording session orchestrator.
//!
//! [`RecordingSession`] owns one sensor feed, one capture controller, one
//! draft and the session ledger, and turns user intents (open, edit,
//! capture, retake, save, cancel, export) into state changes. Everything the
//! front-end needs to redraw is sent back as [`SessionEvent`]s over an
//! `mpsc` channel, so the front-end holds no shared mutable state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use recorder_core::error::{RecorderError, Result};
use recorder_core::formatting::format_elapsed;
use recorder_core::models::{Draft, Record, SensorSample};
use recorder_core::settings::DEFAULT_SURVEY_URL;
use recorder_core::time_utils::today_utc;
use recorder_core::RecordBuilder;
use recorder_data::export::Exporter;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::capture::{CaptureController, CaptureStatus};
use crate::ledger::{SessionLedger, DEFAULT_APPEND_TIMEOUT};
use crate::sensor_feed::SensorFeed;
use crate::store::LedgerStore;
use crate::subscription::Subscription;

// ── Public types ──────────────────────────────────────────────────────────────

/// Notifications emitted to the front-end.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A new live sample was accepted by the feed.
    SensorUpdated(SensorSample),
    CaptureChanged(CaptureStatus),
    /// Ledger contents changed; records are in display order.
    LedgerChanged(Vec<Record>),
    ValidationFailed(String),
    CaptureMissing,
    SaveCompleted { record_id: i64, survey_url: String },
    /// Save was not acknowledged; the draft and snapshot are kept for retry.
    SaveFailed(String),
    ExportCompleted(PathBuf),
    ExportFailed(String),
}

/// Session-wide options.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub export_dir: PathBuf,
    pub survey_url: String,
    pub append_timeout: Duration,
    /// Visit-interval label for the first entry.
    pub visit_day: Option<String>,
}

impl SessionConfig {
    pub fn new(export_dir: impl Into<PathBuf>) -> Self {
        Self {
            export_dir: export_dir.into(),
            survey_url: DEFAULT_SURVEY_URL.to_string(),
            append_timeout: DEFAULT_APPEND_TIMEOUT,
            visit_day: None,
        }
    }
}

// ── RecordingSession ──────────────────────────────────────────────────────────

/// The single active capture session.
pub struct RecordingSession {
    config: SessionConfig,
    feed: SensorFeed,
    capture: CaptureController,
    builder: RecordBuilder,
    ledger: SessionLedger,
    exporter: Exporter,
    draft: Draft,
    entry_open: bool,
    started: Instant,
    events: mpsc::UnboundedSender<SessionEvent>,
    subscriptions: Vec<Subscription>,
}

impl RecordingSession {
    /// Start the feed over `sensor_source` and the ledger over `store`.
    ///
    /// Returns the session and the receiver for its events. Must be called
    /// from within a tokio runtime.
    pub fn start(
        sensor_source: mpsc::Receiver<Value>,
        store: Arc<dyn LedgerStore>,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut feed = SensorFeed::new();
        let mut ledger = SessionLedger::new(store, config.append_timeout);

        let sensor_tx = tx.clone();
        let sensor_sub = feed.subscribe(move |sample| {
            let _ = sensor_tx.send(SessionEvent::SensorUpdated(sample.clone()));
        });
        let ledger_tx = tx.clone();
        let ledger_sub = ledger.subscribe(move |records| {
            let display: Vec<Record> = records.iter().rev().cloned().collect();
            let _ = ledger_tx.send(SessionEvent::LedgerChanged(display));
        });

        feed.start(sensor_source)?;
        ledger.start()?;

        let mut draft = Draft::new(today_utc());
        if let Some(day) = config.visit_day.as_deref().filter(|d| !d.trim().is_empty()) {
            draft.visit_day = day.to_string();
        }

        tracing::info!(
            records = ledger.len(),
            started_at = %Utc::now(),
            export_dir = %config.export_dir.display(),
            "recording session started"
        );

        let session = Self {
            exporter: Exporter::new(config.export_dir.clone()),
            config,
            feed,
            capture: CaptureController::new(),
            builder: RecordBuilder::new(),
            ledger,
            draft,
            entry_open: false,
            started: Instant::now(),
            events: tx,
            subscriptions: vec![sensor_sub, ledger_sub],
        };
        Ok((session, rx))
    }

    // ── Entry lifecycle ───────────────────────────────────────────────────

    /// Open a new entry with a fresh draft.
    pub fn open_entry(&mut self) -> Result<()> {
        if self.entry_open {
            return Err(RecorderError::EntryAlreadyOpen);
        }
        self.draft.reset(today_utc());
        self.capture.reset();
        self.entry_open = true;
        tracing::debug!(visit_day = %self.draft.visit_day, "entry opened");
        Ok(())
    }

    /// Update one draft field by its form name.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.ensure_open()?;
        self.draft.set_field(name, value)
    }

    /// Abandon the open entry. No store operation is issued.
    pub fn cancel(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.close_entry();
        tracing::info!("entry cancelled");
        Ok(())
    }

    // ── Capture ───────────────────────────────────────────────────────────

    /// Freeze the current sensor value for the open entry.
    pub fn capture(&mut self) -> Result<SensorSample> {
        self.ensure_open()?;
        let snapshot = self.capture.capture(&self.feed)?.clone();
        self.emit(SessionEvent::CaptureChanged(CaptureStatus::Captured));
        Ok(snapshot)
    }

    /// Discard the snapshot so it can be captured again.
    pub fn retake(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.capture.retake()?;
        self.emit(SessionEvent::CaptureChanged(CaptureStatus::Idle));
        Ok(())
    }

    // ── Save ──────────────────────────────────────────────────────────────

    /// Build a record from the draft and snapshot and append it.
    ///
    /// Validation and capture errors are reported before any store call.
    /// A persistence failure keeps the entry open with its draft and
    /// snapshot intact. On success the entry is closed and the draft reset.
    pub async fn save(&mut self) -> Result<Record> {
        self.ensure_open()?;

        let record = match self.builder.build(&self.draft, self.capture.snapshot()) {
            Ok(record) => record,
            Err(e) => {
                match &e {
                    RecorderError::Validation(msg) => {
                        self.emit(SessionEvent::ValidationFailed(msg.clone()))
                    }
                    RecorderError::CaptureMissing => self.emit(SessionEvent::CaptureMissing),
                    _ => {}
                }
                tracing::debug!(error = %e, "save rejected locally");
                return Err(e);
            }
        };

        if let Err(e) = self.ledger.append(record.clone()).await {
            self.emit(SessionEvent::SaveFailed(e.to_string()));
            return Err(e);
        }

        self.close_entry();
        tracing::info!(id = record.id(), patient_id = record.patient_id(), "record saved");
        self.emit(SessionEvent::SaveCompleted {
            record_id: record.id(),
            survey_url: self.config.survey_url.clone(),
        });
        Ok(record)
    }

    // ── Export ────────────────────────────────────────────────────────────

    /// Write every record, in append order, to a session CSV.
    pub fn export_session(&self) -> Result<PathBuf> {
        let result = self
            .exporter
            .export_session(&self.ledger.contents(), Utc::now());
        self.report_export(result)
    }

    /// Write one patient's records to a per-patient CSV.
    pub fn export_patient(&self, patient_id: &str) -> Result<PathBuf> {
        let result = self
            .exporter
            .export_patient(&self.ledger.contents(), patient_id, Utc::now());
        self.report_export(result)
    }

    fn report_export(&self, result: Result<PathBuf>) -> Result<PathBuf> {
        match &result {
            Ok(path) => self.emit(SessionEvent::ExportCompleted(path.clone())),
            Err(e) => self.emit(SessionEvent::ExportFailed(e.to_string())),
        }
        result
    }

    // ── Read side ─────────────────────────────────────────────────────────

    /// The open entry's draft.
    pub fn draft(&self) -> Option<&Draft> {
        self.entry_open.then_some(&self.draft)
    }

    pub fn is_entry_open(&self) -> bool {
        self.entry_open
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.capture.status()
    }

    pub fn snapshot(&self) -> Option<&SensorSample> {
        self.capture.snapshot()
    }

    pub fn current_sample(&self) -> Option<SensorSample> {
        self.feed.current_value()
    }

    pub fn display_order(&self) -> Vec<Record> {
        self.ledger.display_order()
    }

    pub fn records(&self) -> Arc<Vec<Record>> {
        self.ledger.contents()
    }

    pub fn feed(&self) -> &SensorFeed {
        &self.feed
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Session clock as `HH:MM:SS`.
    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed())
    }

    /// Stop the feed and the ledger and release their subscriptions.
    pub async fn shutdown(mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe().await;
        }
        self.feed.stop().await;
        self.ledger.stop().await;
        tracing::info!(elapsed = %self.elapsed_display(), "recording session stopped");
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<()> {
        if self.entry_open {
            Ok(())
        } else {
            Err(RecorderError::EntryNotOpen)
        }
    }

    fn close_entry(&mut self) {
        self.draft.reset(today_utc());
        if self.capture.status() == CaptureStatus::Captured {
            self.capture.reset();
            self.emit(SessionEvent::CaptureChanged(CaptureStatus::Idle));
        }
        self.entry_open = false;
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("session event receiver dropped");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
