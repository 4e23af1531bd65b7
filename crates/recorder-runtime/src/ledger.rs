//! Session ledger: the local, display-ordered view of a [`LedgerStore`].
//!
//! The ledger keeps the most recent full snapshot published by the store.
//! A record becomes visible only once the store has acknowledged it; a
//! failed or timed-out append leaves the cache untouched. Subscribers get
//! the entire contents on every change, never a diff.

use std::sync::Arc;
use std::time::Duration;

use recorder_core::error::{RecorderError, Result};
use recorder_core::models::Record;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::store::{LedgerSnapshot, LedgerStore};
use crate::subscription::Subscription;

/// Default bound on waiting for an append acknowledgment.
pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(10);

// ── LedgerCache ───────────────────────────────────────────────────────────────

/// Local copy of the store's contents; subscribers follow its channel.
struct LedgerCache {
    snapshot: watch::Sender<LedgerSnapshot>,
}

impl LedgerCache {
    fn new(initial: LedgerSnapshot) -> Self {
        let (snapshot, _) = watch::channel(initial);
        Self { snapshot }
    }

    /// Replace the cache when `incoming` is newer. Subscribers are woken
    /// only when it was replaced.
    fn apply(&self, incoming: LedgerSnapshot) -> bool {
        let replaced = self.snapshot.send_if_modified(|current| {
            if incoming.version <= current.version && current.version != 0 {
                return false;
            }
            *current = incoming;
            true
        });
        if replaced {
            debug!(records = self.records().len(), "ledger cache replaced");
        }
        replaced
    }

    fn records(&self) -> Arc<Vec<Record>> {
        Arc::clone(&self.snapshot.borrow().records)
    }
}

// ── SessionLedger ─────────────────────────────────────────────────────────────

/// Append-only ledger of saved records for the active session.
pub struct SessionLedger {
    store: Arc<dyn LedgerStore>,
    cache: Arc<LedgerCache>,
    append_timeout: Duration,
    task: Option<JoinHandle<()>>,
}

impl SessionLedger {
    /// Wrap `store`; the cache starts from its current contents.
    pub fn new(store: Arc<dyn LedgerStore>, append_timeout: Duration) -> Self {
        let initial = store.watch().borrow().clone();
        Self {
            store,
            cache: Arc::new(LedgerCache::new(initial)),
            append_timeout,
            task: None,
        }
    }

    /// Begin following the store's change stream.
    pub fn start(&mut self) -> Result<()> {
        if self.task.is_some() {
            return Err(RecorderError::InvalidTransition {
                action: "start the ledger",
                state: "running",
            });
        }

        let mut rx = self.store.watch();
        let cache = Arc::clone(&self.cache);
        self.task = Some(tokio::spawn(async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                cache.apply(snapshot);
                if rx.changed().await.is_err() {
                    debug!("ledger store closed; replication stream finished");
                    break;
                }
            }
        }));
        info!(records = self.len(), "session ledger started");
        Ok(())
    }

    /// Stop following the store and close the subscribers' channel.
    ///
    /// Subscriber tasks finish once they have seen the last contents. The
    /// cached contents stay readable.
    pub async fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "ledger replication task failed");
                }
            }
        }
        let last = self.cache.snapshot.borrow().clone();
        self.cache = Arc::new(LedgerCache::new(last));
    }

    /// Append `record` and wait for the store's acknowledgment.
    ///
    /// On success the record is in [`SessionLedger::contents`] before this
    /// returns. On failure, including a missed acknowledgment deadline, the
    /// error is [`RecorderError::Persistence`], the cache is unchanged, and
    /// the record never shows up later.
    pub async fn append(&self, record: Record) -> Result<()> {
        let id = record.id();
        let deadline = Instant::now() + self.append_timeout;

        let result = match self.store.append(record, deadline).await {
            Ok(()) => Ok(()),
            Err(RecorderError::Persistence(msg)) => Err(RecorderError::Persistence(msg)),
            Err(other) => Err(RecorderError::Persistence(other.to_string())),
        };

        match &result {
            Ok(()) => {
                let latest = self.store.watch().borrow().clone();
                self.cache.apply(latest);
                info!(id, "record appended to ledger");
            }
            Err(e) => warn!(
                id,
                timeout_secs = self.append_timeout.as_secs_f64(),
                error = %e,
                "ledger append failed"
            ),
        }
        result
    }

    /// Register `handler` for full-contents updates.
    ///
    /// The handler first receives the current contents, then the full
    /// contents after each change. Must be called from within a tokio
    /// runtime.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[Record]) + Send + 'static,
    {
        Subscription::follow(self.cache.snapshot.subscribe(), true, move |snapshot| {
            handler(snapshot.records.as_slice())
        })
    }

    /// Cached contents in canonical (append) order.
    pub fn contents(&self) -> Arc<Vec<Record>> {
        self.cache.records()
    }

    /// Cached contents, most recently appended first.
    pub fn display_order(&self) -> Vec<Record> {
        self.contents().iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.contents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SessionLedger {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
