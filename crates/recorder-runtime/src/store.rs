//! Ledger store backends.
//!
//! A [`LedgerStore`] is an append-only, replicated collection of records.
//! Writes resolve only once the store has acknowledged them; reads are a
//! `watch` stream that always carries the full current collection tagged
//! with a monotonically increasing version.
//!
//! An append carries a deadline. A write that misses it is never published
//! and is rolled back if it already reached storage, so a timed-out save
//! cannot surface later.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use recorder_core::error::{RecorderError, Result};
use recorder_core::models::Record;
use recorder_data::ledger_file::{FileFingerprint, LedgerFile};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ── Public types ──────────────────────────────────────────────────────────────

/// Full contents of a store at one point in its change order.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub version: u64,
    pub records: Arc<Vec<Record>>,
}

impl LedgerSnapshot {
    fn appended(&self, record: Record) -> Self {
        let mut records = Vec::with_capacity(self.records.len() + 1);
        records.extend(self.records.iter().cloned());
        records.push(record);
        Self {
            version: self.version + 1,
            records: Arc::new(records),
        }
    }
}

/// Future returned by [`LedgerStore::append`].
pub type AppendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Durable, replicated, append-only record collection.
pub trait LedgerStore: Send + Sync {
    /// Append `record`, resolving once the store acknowledges it.
    ///
    /// A write not acknowledged by `deadline` fails and must never become
    /// visible afterwards. Errors are [`RecorderError::Persistence`]
    /// carrying the store's message.
    fn append(&self, record: Record, deadline: Instant) -> AppendFuture<'_>;

    /// Receiver for full-contents snapshots, in the store's change order.
    fn watch(&self) -> watch::Receiver<LedgerSnapshot>;
}

// ── FileLedgerStore ───────────────────────────────────────────────────────────

struct FileInner {
    file: LedgerFile,
    tx: watch::Sender<LedgerSnapshot>,
    /// Fingerprint of the file as last published; also serializes writers
    /// against the replication poller.
    seen: Mutex<Option<FileFingerprint>>,
}

fn not_acknowledged() -> RecorderError {
    RecorderError::Persistence("write not acknowledged before the deadline".to_string())
}

impl FileInner {
    /// Write, fsync, and publish `record`.
    ///
    /// Holds the `seen` lock for the whole write, so the poller never sees a
    /// line that is about to be rolled back.
    async fn append(&self, record: Record, deadline: Instant) -> Result<()> {
        let mut seen = self.seen.lock().await;
        if Instant::now() >= deadline {
            return Err(not_acknowledged());
        }

        let file = self.file.clone();
        let to_write = record.clone();
        let mut write = tokio::task::spawn_blocking(move || file.append(&to_write));

        let waited = tokio::time::timeout_at(deadline, &mut write).await;
        let start = match waited {
            Ok(joined) => joined
                .map_err(|e| RecorderError::Persistence(e.to_string()))?
                .map_err(|e| RecorderError::Persistence(e.to_string()))?,
            Err(_) => {
                // The blocking write cannot be cancelled; wait for it, then undo it.
                if let Ok(Ok(start)) = write.await {
                    let file = self.file.clone();
                    match tokio::task::spawn_blocking(move || file.truncate(start)).await {
                        Ok(Ok(())) => debug!(id = record.id(), "late ledger write rolled back"),
                        Ok(Err(e)) => warn!(error = %e, "rolling back late ledger write failed"),
                        Err(e) => warn!(error = %e, "rolling back late ledger write failed"),
                    }
                }
                *seen = self.file.fingerprint();
                return Err(not_acknowledged());
            }
        };

        *seen = self.file.fingerprint();
        self.tx.send_modify(|snapshot| *snapshot = snapshot.appended(record));
        debug!(path = %self.file.path().display(), offset = start, "ledger append acknowledged");
        Ok(())
    }

    /// Reload the file if something else changed it and publish the result.
    async fn replicate(&self) -> Result<bool> {
        let mut seen = self.seen.lock().await;
        let current = self.file.fingerprint();
        if current == *seen {
            return Ok(false);
        }

        let file = self.file.clone();
        let records = tokio::task::spawn_blocking(move || file.load())
            .await
            .map_err(|e| RecorderError::Other(e.into()))??;

        *seen = current;
        let count = records.len();
        self.tx.send_modify(|snapshot| {
            *snapshot = LedgerSnapshot {
                version: snapshot.version + 1,
                records: Arc::new(records),
            }
        });
        debug!(count, "ledger reloaded after external change");
        Ok(true)
    }
}

/// Ledger persisted as `patient_records.jsonl` in the data directory.
///
/// Appends are fsynced before they are acknowledged. A poller watches the
/// file's size and modification time and republishes the full contents when
/// another writer changes it.
pub struct FileLedgerStore {
    inner: Arc<FileInner>,
    poller: JoinHandle<()>,
}

impl FileLedgerStore {
    /// Open the ledger in `data_dir` and start replication polling.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn open(data_dir: &Path, poll_interval: Duration) -> Result<Self> {
        let file = LedgerFile::in_dir(data_dir);
        let fingerprint = file.fingerprint();
        let loader = file.clone();
        let records = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| RecorderError::Other(e.into()))??;

        info!(
            path = %file.path().display(),
            records = records.len(),
            "ledger opened"
        );

        let (tx, _) = watch::channel(LedgerSnapshot {
            version: 0,
            records: Arc::new(records),
        });
        let inner = Arc::new(FileInner {
            file,
            tx,
            seen: Mutex::new(fingerprint),
        });

        let poller = tokio::spawn(replication_loop(Arc::clone(&inner), poll_interval));
        Ok(Self { inner, poller })
    }

    pub fn path(&self) -> &Path {
        self.inner.file.path()
    }
}

async fn replication_loop(inner: Arc<FileInner>, poll_interval: Duration) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = inner.replicate().await {
            warn!(error = %e, "ledger replication read failed");
        }
    }
}

impl LedgerStore for FileLedgerStore {
    /// The write runs on its own task, so dropping the returned future does
    /// not abandon it halfway; it still either publishes or rolls back.
    fn append(&self, record: Record, deadline: Instant) -> AppendFuture<'_> {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.append(record, deadline).await });
        Box::pin(async move {
            task.await
                .map_err(|e| RecorderError::Persistence(e.to_string()))?
        })
    }

    fn watch(&self) -> watch::Receiver<LedgerSnapshot> {
        self.inner.tx.subscribe()
    }
}

impl Drop for FileLedgerStore {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

// ── MemoryLedgerStore ─────────────────────────────────────────────────────────

/// In-process store.
///
/// [`MemoryLedgerStore::set_available`] switches acknowledgments off so the
/// failure path can be exercised; [`MemoryLedgerStore::with_ack_delay`]
/// slows them down to exercise timeouts.
pub struct MemoryLedgerStore {
    tx: watch::Sender<LedgerSnapshot>,
    available: AtomicBool,
    ack_delay: Duration,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(LedgerSnapshot::default());
        Self {
            tx,
            available: AtomicBool::new(true),
            ack_delay: Duration::ZERO,
        }
    }

    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Apply a write made by another writer.
    pub fn replicate(&self, record: Record) {
        self.tx.send_modify(|snapshot| *snapshot = snapshot.appended(record));
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn append(&self, record: Record, deadline: Instant) -> AppendFuture<'_> {
        Box::pin(async move {
            if !self.ack_delay.is_zero()
                && tokio::time::timeout_at(deadline, tokio::time::sleep(self.ack_delay))
                    .await
                    .is_err()
            {
                return Err(not_acknowledged());
            }
            if !self.available.load(Ordering::SeqCst) {
                return Err(RecorderError::Persistence(
                    "ledger store unavailable".to_string(),
                ));
            }
            self.tx.send_modify(|snapshot| *snapshot = snapshot.appended(record));
            Ok(())
        })
    }

    fn watch(&self) -> watch::Receiver<LedgerSnapshot> {
        self.tx.subscribe()
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

    fn record(builder: &RecordBuilder, id: &str) -> Record {
        let mut draft = Draft::new(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        draft.full_name = "Jane Doe".to_string();
        draft.patient_id = id.to_string();
        builder
            .build(&draft, Some(&SensorSample::unknown(Utc::now())))
            .unwrap()
    }

    fn soon() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    // ── MemoryLedgerStore ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_memory_append_publishes_full_snapshot() {
        let store = MemoryLedgerStore::new();
        let builder = RecordBuilder::new();
        let mut rx = store.watch();

        store.append(record(&builder, "P001"), soon()).await.unwrap();
        store.append(record(&builder, "P002"), soon()).await.unwrap();

        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.version, 2);
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[0].patient_id(), "P001");
    }

    #[tokio::test]
    async fn test_memory_unavailable_rejects_append() {
        let store = MemoryLedgerStore::new();
        store.set_available(false);
        let err = store
            .append(record(&RecordBuilder::new(), "P001"), soon())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Persistence(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_memory_replicate_counts_as_change() {
        let store = MemoryLedgerStore::new();
        let mut rx = store.watch();
        store.replicate(record(&RecordBuilder::new(), "REMOTE"));
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().records[0].patient_id(), "REMOTE");
    }

    // ── FileLedgerStore ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_file_store_persists_and_reopens() {
        let dir = TempDir::new().unwrap();
        let builder = RecordBuilder::new();
        {
            let store = FileLedgerStore::open(dir.path(), Duration::from_secs(60))
                .await
                .unwrap();
            store.append(record(&builder, "P001"), soon()).await.unwrap();
            store.append(record(&builder, "P002"), soon()).await.unwrap();
            assert_eq!(store.watch().borrow().records.len(), 2);
        }

        let reopened = FileLedgerStore::open(dir.path(), Duration::from_secs(60))
            .await
            .unwrap();
        let snapshot = reopened.watch().borrow().clone();
        assert_eq!(snapshot.records.len(), 2);
        assert_eq!(snapshot.records[1].patient_id(), "P002");
    }

    #[tokio::test]
    async fn test_file_store_picks_up_other_writer() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::open(dir.path(), Duration::from_millis(20))
            .await
            .unwrap();
        let mut rx = store.watch();

        LedgerFile::in_dir(dir.path())
            .append(&record(&RecordBuilder::new(), "OTHER"))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("replication timed out")
            .unwrap();
        assert_eq!(rx.borrow().records[0].patient_id(), "OTHER");
    }

    #[tokio::test]
    async fn test_file_store_own_append_not_republished() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::open(dir.path(), Duration::from_millis(10))
            .await
            .unwrap();
        store.append(record(&RecordBuilder::new(), "P001"), soon()).await.unwrap();
        let version = store.watch().borrow().version;

        tokio::time::sleep(Duration::from_millis(60)).await;
        let snapshot = store.watch().borrow().clone();
        assert_eq!(snapshot.version, version);
        assert_eq!(snapshot.records.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_write_failure_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = FileLedgerStore::open(dir.path(), Duration::from_secs(60))
            .await
            .unwrap();
        // A directory squatting on the ledger path makes every append fail.
        std::fs::create_dir(store.path()).unwrap();

        let err = store
            .append(record(&RecordBuilder::new(), "P001"), soon())
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Persistence(_)));
        assert!(store.watch().borrow().records.is_empty());
    }

    #[tokio::test]
    async fn test_memory_late_ack_is_never_applied() {
        let store = MemoryLedgerStore::new().with_ack_delay(Duration::from_millis(100));
        let deadline = Instant::now() + Duration::from_millis(10);
        let err = store
            .append(record(&RecordBuilder::new(), "P001"), deadline)
            .await
            .unwrap_err();
        assert!(matches!(err, RecorderError::Persistence(_)));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_write_past_deadline_never_lands() {
        let dir = TempDir::new().unwrap();
        let builder = RecordBuilder::new();
        let store = FileLedgerStore::open(dir.path(), Duration::from_millis(10))
            .await
            .unwrap();
        store.append(record(&builder, "P001"), soon()).await.unwrap();

        let err = store
            .append(record(&builder, "LATE"), Instant::now())
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Error saving data: write not acknowledged before the deadline"
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.watch().borrow().records.len(), 1);
        let on_disk = LedgerFile::in_dir(dir.path()).load().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].patient_id(), "P001");
    }
}
