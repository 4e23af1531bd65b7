use std::time::Duration;

use crate::models::{SensorSample, SensorValue, VitalField};

/// Format an elapsed duration as a zero-padded `HH:MM:SS` clock.
///
/// Hours keep growing past 99 rather than wrapping.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use recorder_core::formatting::format_elapsed;
///
/// assert_eq!(format_elapsed(Duration::from_secs(0)), "00:00:00");
/// assert_eq!(format_elapsed(Duration::from_secs(3_725)), "01:02:05");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Format one vital with its unit, e.g. `"72 bpm"`. Unknown values render
/// as `"--"` followed by the unit.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use recorder_core::formatting::format_vital;
/// use recorder_core::models::{SensorSample, VitalField};
///
/// let sample = SensorSample::unknown(Utc::now());
/// assert_eq!(format_vital(&sample, VitalField::HeartRate), "-- bpm");
/// ```
pub fn format_vital(sample: &SensorSample, field: VitalField) -> String {
    format!("{} {}", display_value(sample.vital(field)), field.unit())
}

/// Format blood pressure as `"systolic/diastolic mmHg"`, using `--` for a
/// missing half.
pub fn format_blood_pressure(sample: &SensorSample) -> String {
    format!(
        "{}/{} mmHg",
        display_value(sample.vital(VitalField::Systolic)),
        display_value(sample.vital(VitalField::Diastolic))
    )
}

/// One line per vital, blood pressure merged, for text front-ends.
pub fn format_sample_lines(sample: &SensorSample) -> Vec<String> {
    let mut lines = Vec::with_capacity(VitalField::ALL.len());
    for field in VitalField::ALL {
        match field {
            VitalField::Systolic => {
                lines.push(format!("{:<14} {}", "Blood Pressure", format_blood_pressure(sample)))
            }
            VitalField::Diastolic => {}
            _ => lines.push(format!("{:<14} {}", field.label(), format_vital(sample, field))),
        }
    }
    lines
}

fn display_value(value: &SensorValue) -> String {
    match value {
        SensorValue::Unknown => "--".to_string(),
        other => other.to_string(),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
