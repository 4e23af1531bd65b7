//! Record building and the save-time validation gate.
//!
//! [`RecordBuilder`] merges a [`Draft`] with a frozen [`SensorSample`] into
//! an immutable [`Record`]. It performs no I/O; persisting the result is the
//! caller's job.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

use crate::calculations::draft_bmi;
use crate::error::{RecorderError, Result};
use crate::models::{Draft, Record, SensorSample};
use crate::time_utils::epoch_millis;

// ── IdSequence ────────────────────────────────────────────────────────────────

/// Time-based identifier source.
///
/// Ids are the save time in epoch milliseconds, bumped by one whenever two
/// saves land in the same millisecond (or the clock steps backwards), so the
/// sequence is strictly increasing.
#[derive(Debug, Default)]
pub struct IdSequence {
    last: AtomicI64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id for a save happening at `now_ms`.
    pub fn next_at(&self, now_ms: i64) -> i64 {
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(current + 1);
            match self
                .last
                .compare_exchange_weak(current, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => current = actual,
            }
        }
    }
}

// ── RecordBuilder ─────────────────────────────────────────────────────────────

/// Builds finalized records from a draft and a captured snapshot.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    ids: IdSequence,
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the identity fields required at save time.
    ///
    /// Fails with [`RecorderError::Validation`] when the full name or the
    /// patient id is empty (whitespace counts as empty).
    pub fn validate(draft: &Draft) -> Result<()> {
        let name_missing = draft.full_name.trim().is_empty();
        let id_missing = draft.patient_id.trim().is_empty();
        match (name_missing, id_missing) {
            (false, false) => Ok(()),
            (true, false) => Err(RecorderError::Validation("full name is required".to_string())),
            (false, true) => Err(RecorderError::Validation("patient id is required".to_string())),
            (true, true) => Err(RecorderError::Validation(
                "full name and patient id are required".to_string(),
            )),
        }
    }

    /// Build a record stamped with the current wall-clock time.
    pub fn build(&self, draft: &Draft, snapshot: Option<&SensorSample>) -> Result<Record> {
        self.build_at(draft, snapshot, Utc::now())
    }

    /// Build a record as of `now`.
    ///
    /// Validation runs first, so a missing name or id is reported whatever
    /// the capture state; a missing snapshot then fails with
    /// [`RecorderError::CaptureMissing`].
    pub fn build_at(
        &self,
        draft: &Draft,
        snapshot: Option<&SensorSample>,
        now: DateTime<Utc>,
    ) -> Result<Record> {
        Self::validate(draft)?;
        let snapshot = snapshot.ok_or(RecorderError::CaptureMissing)?;

        let id = self.ids.next_at(epoch_millis(now));
        let bmi = draft_bmi(draft);

        tracing::debug!(id, patient_id = %draft.patient_id, %bmi, "record built");

        Ok(Record::new(id, now, draft.clone(), bmi, snapshot.clone()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
