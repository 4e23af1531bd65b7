//! Timestamp helpers shared by record columns, ids and export file names.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Today's calendar date in UTC, used as the default visit date.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Render a timestamp as ISO-8601 with millisecond precision and a `Z`
/// suffix, e.g. `2024-03-01T09:30:00.000Z`.
pub fn to_iso(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}
