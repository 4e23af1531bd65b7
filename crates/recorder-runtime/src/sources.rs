//! Sensor source adapters.
//!
//! Each source produces the raw-payload channel consumed by
//! [`SensorFeed::start`](crate::sensor_feed::SensorFeed::start).

use std::path::PathBuf;
use std::time::Duration;

use recorder_core::error::{RecorderError, Result};
use recorder_data::reader::JsonlTail;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time;

/// Capacity of every source channel.
const SOURCE_BUFFER: usize = 64;

// ── JSONL file source ─────────────────────────────────────────────────────────

/// Follows a sensor bridge file that receives one JSON payload per line.
pub struct JsonlSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    /// Spawn the tail loop.
    ///
    /// Lines already in the file are skipped except the last one, so the
    /// feed starts from the most recent reading instead of replaying
    /// history. The loop exits when the receiver is dropped.
    pub fn start(self) -> (mpsc::Receiver<Value>, SourceHandle) {
        let (tx, rx) = mpsc::channel(SOURCE_BUFFER);
        let handle = tokio::spawn(async move {
            self.tail_loop(tx).await;
        });
        (rx, SourceHandle { handle })
    }

    async fn tail_loop(self, tx: mpsc::Sender<Value>) {
        tracing::info!(path = %self.path.display(), "following sensor file");
        let mut tail = JsonlTail::new(&self.path);

        let backlog = self.read(&mut tail);
        if let Some(latest) = backlog.into_iter().last() {
            if tx.send(latest).await.is_err() {
                return;
            }
        }

        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;

            if tx.is_closed() {
                tracing::debug!("sensor channel closed; exiting tail loop");
                break;
            }

            for value in self.read(&mut tail) {
                if tx.send(value).await.is_err() {
                    return;
                }
            }
        }
    }

    fn read(&self, tail: &mut JsonlTail) -> Vec<Value> {
        match tail.read_new() {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "sensor file read failed");
                Vec::new()
            }
        }
    }
}

// ── Manual source ─────────────────────────────────────────────────────────────

/// In-process source for embedding callers and tests.
#[derive(Debug, Clone)]
pub struct ManualSource {
    tx: mpsc::Sender<Value>,
}

impl ManualSource {
    pub fn new() -> (Self, mpsc::Receiver<Value>) {
        let (tx, rx) = mpsc::channel(SOURCE_BUFFER);
        (Self { tx }, rx)
    }

    /// Deliver one raw payload.
    pub async fn push(&self, payload: Value) -> Result<()> {
        self.tx
            .send(payload)
            .await
            .map_err(|_| RecorderError::InvalidTransition {
                action: "push a sensor payload",
                state: "stopped",
            })
    }
}

// ── SourceHandle ──────────────────────────────────────────────────────────────

/// Handle to a background source task. Dropping it leaves the task running
/// until its receiver goes away; [`SourceHandle::abort`] stops it at once.
pub struct SourceHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl SourceHandle {
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
