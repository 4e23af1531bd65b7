//! Normalization of raw live-value payloads into [`SensorFields`].
//!
//! The sensor bridge publishes either a flat field map or a field map
//! wrapped one level deep. The accepted shapes are:
//!
//! | Shape   | Example                                       | Sample taken from      |
//! |---------|-----------------------------------------------|------------------------|
//! | flat    | `{"heartRate": 72, "spo2": 98}`               | the object itself      |
//! | wrapped | `{"device-1": {"heartRate": 72}}`             | the single inner map   |
//! | keyed   | `{"-Na1": {...}, "-Na2": {...}}`              | the greatest key's map |
//!
//! An object counts as wrapped/keyed only when *every* value is an object;
//! a flat map that merely contains a structured value stays flat and the
//! structured value is dropped. Keyed collections use the greatest key
//! because push-style keys sort chronologically.

use recorder_core::error::{RecorderError, Result};
use recorder_core::models::{SensorFields, SensorValue};
use serde_json::{Map, Value};
use tracing::debug;

// ── Public types ──────────────────────────────────────────────────────────────

/// Which wire shape a payload was recognised as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadShape {
    Flat,
    /// Single-key wrapper; holds the outer key.
    Wrapped(String),
    /// Multi-entry keyed collection; holds the key that was selected.
    Keyed(String),
}

/// A payload reduced to its sensor fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    pub fields: SensorFields,
    pub shape: PayloadShape,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Normalize a raw payload.
///
/// Fails with [`RecorderError::MalformedPayload`] when the payload is not an
/// object, is empty, or carries no scalar field at all. Callers treat that
/// error as silent and keep their previous value.
pub fn normalize_payload(raw: &Value) -> Result<NormalizedPayload> {
    let Some(outer) = raw.as_object() else {
        return Err(malformed("payload must be a JSON object"));
    };
    if outer.is_empty() {
        return Err(malformed("payload is empty"));
    }

    let all_nested = outer.values().all(Value::is_object);

    let (inner, shape) = if all_nested {
        let Some((key, value)) = outer.iter().max_by(|a, b| a.0.cmp(b.0)) else {
            return Err(malformed("payload is empty"));
        };
        let shape = if outer.len() == 1 {
            PayloadShape::Wrapped(key.clone())
        } else {
            PayloadShape::Keyed(key.clone())
        };
        match value.as_object() {
            Some(map) => (map, shape),
            None => return Err(malformed("nested payload is not an object")),
        }
    } else {
        (outer, PayloadShape::Flat)
    };

    let fields = scalar_fields(inner);
    if fields.is_empty() {
        return Err(malformed("payload has no scalar fields"));
    }

    Ok(NormalizedPayload {
        fields: SensorFields::canonical(fields),
        shape,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn malformed(reason: &str) -> RecorderError {
    RecorderError::MalformedPayload(reason.to_string())
}

/// Keep scalar entries, dropping arrays and objects.
fn scalar_fields(map: &Map<String, Value>) -> Vec<(String, SensorValue)> {
    map.iter()
        .filter_map(|(key, value)| match SensorValue::from_json(value) {
            Some(v) => Some((key.clone(), v)),
            None => {
                debug!(key = %key, "dropping structured sensor field");
                None
            }
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
