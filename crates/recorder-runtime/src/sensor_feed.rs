//! Live sensor feed.
//!
//! [`SensorFeed`] owns a single-slot mailbox holding the latest normalized
//! [`SensorSample`]. A background task drains raw payloads from a source
//! channel, normalizes them and overwrites the mailbox. Subscribers are
//! tasks following the mailbox, so each one sees the latest sample.
//! Malformed payloads are dropped silently and the previous value stays.
//! There is no history: only the most recent sample is ever visible.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use recorder_core::error::{RecorderError, Result};
use recorder_core::models::SensorSample;
use recorder_data::payload::normalize_payload;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::subscription::Subscription;

// ── FeedShared ────────────────────────────────────────────────────────────────

/// Mailbox reachable from both the feed handle and its ingest task.
struct FeedShared {
    latest: watch::Sender<Option<SensorSample>>,
}

impl FeedShared {
    fn seeded(sample: Option<SensorSample>) -> Self {
        let (latest, _) = watch::channel(sample);
        Self { latest }
    }

    fn publish_at(&self, raw: &Value, received_at: DateTime<Utc>) -> bool {
        match normalize_payload(raw) {
            Ok(normalized) => {
                debug!(
                    shape = ?normalized.shape,
                    fields = normalized.fields.len(),
                    "sensor payload accepted"
                );
                self.latest
                    .send_replace(Some(SensorSample::new(normalized.fields, received_at)));
                true
            }
            Err(e) => {
                debug!(error = %e, "ignoring sensor payload");
                false
            }
        }
    }
}

// ── SensorFeed ────────────────────────────────────────────────────────────────

/// Push-driven view of the live sensor channel.
///
/// Call [`SensorFeed::start`] with the receiving end of a source channel to
/// begin ingestion and [`SensorFeed::stop`] to tear it down.
pub struct SensorFeed {
    shared: Arc<FeedShared>,
    task: Option<JoinHandle<()>>,
}

impl SensorFeed {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FeedShared::seeded(None)),
            task: None,
        }
    }

    /// Spawn the ingest task over `source`.
    ///
    /// The task ends when every sender of `source` is dropped or when
    /// [`SensorFeed::stop`] is called.
    pub fn start(&mut self, mut source: mpsc::Receiver<Value>) -> Result<()> {
        if self.is_running() {
            return Err(RecorderError::InvalidTransition {
                action: "start the sensor feed",
                state: "running",
            });
        }

        let shared = Arc::clone(&self.shared);
        self.task = Some(tokio::spawn(async move {
            while let Some(raw) = source.recv().await {
                shared.publish_at(&raw, Utc::now());
            }
            debug!("sensor source closed; feed ingest finished");
        }));
        info!("sensor feed started");
        Ok(())
    }

    /// Stop ingestion and close the mailbox.
    ///
    /// Subscriber tasks finish once they have seen the last value; await
    /// [`Subscription::unsubscribe`] to wait for a specific one. The last
    /// value stays readable through [`SensorFeed::current_value`] and the
    /// feed can be started again.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    tracing::warn!(error = %e, "sensor feed task failed");
                }
            }
            info!("sensor feed stopped");
        }
        // Dropping the old sender closes every subscriber's receiver.
        self.shared = Arc::new(FeedShared::seeded(self.current_value()));
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Feed one raw payload directly, bypassing the source channel.
    ///
    /// Returns `false` when the payload was malformed and ignored.
    pub fn publish(&self, raw: &Value) -> bool {
        self.shared.publish_at(raw, Utc::now())
    }

    /// Register `handler` for accepted payloads published after this call.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SensorSample) + Send + 'static,
    {
        Subscription::follow(self.shared.latest.subscribe(), false, move |latest| {
            if let Some(sample) = latest {
                handler(sample);
            }
        })
    }

    /// The most recent sample, or `None` before the first delivery.
    pub fn current_value(&self) -> Option<SensorSample> {
        self.shared.latest.borrow().clone()
    }
}

impl Default for SensorFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SensorFeed {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use recorder_core::models::{SensorValue, VitalField};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn test_current_value_unknown_before_delivery() {
        let feed = SensorFeed::new();
        assert!(feed.current_value().is_none());
    }

    #[test]
    fn test_publish_keeps_only_latest() {
        let feed = SensorFeed::new();
        assert!(feed.publish(&json!({"heartRate": 70})));
        assert!(feed.publish(&json!({"heartRate": 75})));
        let sample = feed.current_value().unwrap();
        assert_eq!(sample.vital(VitalField::HeartRate), &SensorValue::Number(75.0));
    }

    #[test]
    fn test_malformed_payload_keeps_previous_value() {
        let feed = SensorFeed::new();
        feed.publish(&json!({"spo2": 98}));
        assert!(!feed.publish(&json!("not an object")));
        assert!(!feed.publish(&json!({})));
        let sample = feed.current_value().unwrap();
        assert_eq!(sample.vital(VitalField::Spo2), &SensorValue::Number(98.0));
    }

    #[test]
    fn test_nested_payload_is_unwrapped() {
        let feed = SensorFeed::new();
        feed.publish(&json!({"device": {"temperature": 36.6}}));
        let sample = feed.current_value().unwrap();
        assert_eq!(sample.vital(VitalField::Temperature), &SensorValue::Number(36.6));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_callbacks() {
        let feed = SensorFeed::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let sub = feed.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        feed.publish(&json!({"heartRate": 70}));
        wait_for(|| hits.load(Ordering::SeqCst) == 1).await;
        assert!(!feed.publish(&json!([1, 2])));
        sub.unsubscribe().await;
        feed.publish(&json!({"heartRate": 71}));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_subscriber_receives_sample() {
        let feed = SensorFeed::new();
        let got = Arc::new(std::sync::Mutex::new(None));
        let sink = Arc::clone(&got);
        let _sub = feed.subscribe(move |sample| {
            *sink.lock().unwrap() = Some(sample.vital(VitalField::Spo2).clone());
        });

        feed.publish(&json!({"readings": {"spo2": 97}}));
        wait_for(|| got.lock().unwrap().is_some()).await;
        assert_eq!(*got.lock().unwrap(), Some(SensorValue::Number(97.0)));
    }

    #[tokio::test]
    async fn test_start_ingests_from_source() {
        let (tx, rx) = mpsc::channel(8);
        let mut feed = SensorFeed::new();
        feed.start(rx).unwrap();

        tx.send(json!({"heartRate": 64})).await.unwrap();
        tx.send(json!(null)).await.unwrap();

        wait_for(|| feed.current_value().is_some()).await;
        let sample = feed.current_value().unwrap();
        assert_eq!(sample.vital(VitalField::HeartRate), &SensorValue::Number(64.0));

        feed.stop().await;
        assert!(!feed.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let (_tx, rx) = mpsc::channel(1);
        let (_tx2, rx2) = mpsc::channel(1);
        let mut feed = SensorFeed::new();
        feed.start(rx).unwrap();
        assert!(matches!(
            feed.start(rx2),
            Err(RecorderError::InvalidTransition { .. })
        ));
        feed.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_subscribers() {
        let (tx, rx) = mpsc::channel(8);
        let mut feed = SensorFeed::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let sub = feed.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        feed.start(rx).unwrap();

        tx.send(json!({"heartRate": 80})).await.unwrap();
        wait_for(|| hits.load(Ordering::SeqCst) == 1).await;

        feed.stop().await;
        wait_for(|| !sub.is_active()).await;
        assert!(tx.send(json!({"heartRate": 81})).await.is_err());
        feed.publish(&json!({"heartRate": 82}));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(
            feed.current_value().unwrap().vital(VitalField::HeartRate),
            &SensorValue::Number(82.0)
        );
    }
}
