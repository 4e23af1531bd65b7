//! Two-state capture controller.
//!
//! `Idle --capture--> Captured --retake--> Idle`. A capture deep-copies the
//! feed's current value and stamps it with the capture time; the copy is
//! owned by the controller, so later feed updates cannot reach it.

use chrono::{DateTime, Utc};
use recorder_core::error::{RecorderError, Result};
use recorder_core::models::SensorSample;
use tracing::{debug, info};

use crate::sensor_feed::SensorFeed;

/// Observable capture state, without the snapshot payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Idle,
    Captured,
}

impl CaptureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Captured => "captured",
        }
    }
}

impl std::fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
enum CaptureState {
    #[default]
    Idle,
    Captured(SensorSample),
}

/// Freezes the live sensor value into a snapshot on demand.
#[derive(Debug, Clone, Default)]
pub struct CaptureController {
    state: CaptureState,
}

impl CaptureController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture whatever `feed` holds right now.
    pub fn capture(&mut self, feed: &SensorFeed) -> Result<&SensorSample> {
        self.capture_at(feed.current_value().as_ref(), Utc::now())
    }

    /// Capture `current` as of `now`.
    ///
    /// With no value ever received the snapshot carries every vital as
    /// unknown. Fails with [`RecorderError::InvalidTransition`] when a
    /// snapshot is already held.
    pub fn capture_at(
        &mut self,
        current: Option<&SensorSample>,
        now: DateTime<Utc>,
    ) -> Result<&SensorSample> {
        if let CaptureState::Captured(_) = self.state {
            return Err(RecorderError::InvalidTransition {
                action: "capture",
                state: "captured",
            });
        }

        let snapshot = match current {
            Some(sample) => sample.restamped(now),
            None => {
                debug!("capturing before any sensor value arrived");
                SensorSample::unknown(now)
            }
        };
        info!(fields = snapshot.fields.len(), "sensor values captured");

        self.state = CaptureState::Captured(snapshot);
        self.snapshot().ok_or(RecorderError::CaptureMissing)
    }

    /// Discard the snapshot and return to idle.
    pub fn retake(&mut self) -> Result<()> {
        match self.state {
            CaptureState::Captured(_) => {
                self.state = CaptureState::Idle;
                debug!("snapshot discarded for retake");
                Ok(())
            }
            CaptureState::Idle => Err(RecorderError::InvalidTransition {
                action: "retake",
                state: "idle",
            }),
        }
    }

    /// Return to idle from any state.
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
    }

    pub fn snapshot(&self) -> Option<&SensorSample> {
        match &self.state {
            CaptureState::Captured(snapshot) => Some(snapshot),
            CaptureState::Idle => None,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        match self.state {
            CaptureState::Idle => CaptureStatus::Idle,
            CaptureState::Captured(_) => CaptureStatus::Captured,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
