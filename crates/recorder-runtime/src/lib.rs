//! Runtime layer for the vitals recorder.
//!
//! Tokio services for the live sensor feed, the capture state machine, the
//! replicated session ledger and the recording-session orchestrator that
//! ties them together.

pub mod capture;
pub mod ledger;
pub mod orchestrator;
pub mod sensor_feed;
pub mod sources;
pub mod store;
pub mod subscription;

pub use recorder_core as core;
pub use recorder_data as data;
