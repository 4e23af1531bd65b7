//! Domain layer for the vitals recorder.
//!
//! Sensor samples, patient drafts and saved records, the record-building
//! validation gate, BMI, the error taxonomy, and CLI settings.

pub mod builder;
pub mod calculations;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod time_utils;

pub use builder::RecordBuilder;
pub use error::{RecorderError, Result};
pub use models::{Bmi, Draft, Record, SensorFields, SensorSample, SensorValue, VitalField};
