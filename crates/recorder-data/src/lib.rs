//! Data layer for the vitals recorder.
//!
//! Normalizes raw sensor payloads, reads and appends the JSONL ledger file,
//! follows the sensor bridge file, and renders CSV exports.

pub mod export;
pub mod ledger_file;
pub mod payload;
pub mod reader;

pub use recorder_core as core;
