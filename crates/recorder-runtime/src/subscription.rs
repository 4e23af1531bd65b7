//! Subscriber tasks over `watch` channels.
//!
//! Each subscription is its own task waiting on a receiver of the source
//! channel; the handler runs on that task with the newest value. A slow
//! handler sees the latest value, never a backlog. The task ends when the
//! subscription is released or when the source channel closes.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Registration token returned by `subscribe`.
///
/// Await [`Subscription::unsubscribe`] for a deterministic release: once it
/// returns, the handler is never called again. Dropping the token aborts the
/// task without waiting for a call already in progress.
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Spawn a task that calls `handler` for each value published on `rx`
    /// after this call. With `replay_current` the value current at spawn
    /// time is delivered first.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn follow<T, F>(
        mut rx: watch::Receiver<T>,
        replay_current: bool,
        handler: F,
    ) -> Self
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            if replay_current {
                let value = rx.borrow_and_update().clone();
                handler(&value);
            }
            while rx.changed().await.is_ok() {
                // Clone out so the channel lock is not held across the call.
                let value = rx.borrow_and_update().clone();
                handler(&value);
            }
            debug!("subscription source closed");
        });
        Self { task: Some(task) }
    }

    /// Stop deliveries and wait until the subscriber task has finished.
    pub async fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "subscriber task failed");
                }
            }
        }
    }

    /// `false` once released or once the source has closed.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
