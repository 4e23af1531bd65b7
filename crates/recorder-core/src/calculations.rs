use crate::models::{Bmi, Draft};

/// Compute body-mass index from height (cm) and weight (kg).
///
/// `BMI = weight_kg / (height_cm / 100)²`, rounded to one decimal place.
/// Returns [`Bmi::Unavailable`] when either input is missing, non-positive or
/// not finite.
///
/// # Examples
///
/// ```
/// use recorder_core::calculations::body_mass_index;
/// use recorder_core::models::Bmi;
///
/// assert_eq!(body_mass_index(Some(165.0), Some(60.0)), Bmi::Value(22.0));
/// assert_eq!(body_mass_index(None, Some(60.0)), Bmi::Unavailable);
/// ```
pub fn body_mass_index(height_cm: Option<f64>, weight_kg: Option<f64>) -> Bmi {
    let (Some(h), Some(w)) = (height_cm, weight_kg) else {
        return Bmi::Unavailable;
    };
    if !(h.is_finite() && w.is_finite()) || h <= 0.0 || w <= 0.0 {
        return Bmi::Unavailable;
    }
    let metres = h / 100.0;
    let raw = w / (metres * metres);
    if !raw.is_finite() {
        return Bmi::Unavailable;
    }
    Bmi::Value(round_to_tenth(raw))
}

/// BMI for a draft's current height and weight.
pub fn draft_bmi(draft: &Draft) -> Bmi {
    body_mass_index(draft.height_cm, draft.weight_kg)
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
