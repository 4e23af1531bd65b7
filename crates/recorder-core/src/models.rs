use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{RecorderError, Result};
use crate::time_utils;

// ── Vital fields ──────────────────────────────────────────────────────────────

/// The vital signs the bedside sensor is expected to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VitalField {
    HeartRate,
    Systolic,
    Diastolic,
    Temperature,
    Spo2,
    Glucose,
    Activity,
    Acetone,
}

impl VitalField {
    /// Every canonical field, in display order.
    pub const ALL: [VitalField; 8] = [
        VitalField::HeartRate,
        VitalField::Systolic,
        VitalField::Diastolic,
        VitalField::Temperature,
        VitalField::Spo2,
        VitalField::Glucose,
        VitalField::Activity,
        VitalField::Acetone,
    ];

    /// Wire name used by the sensor payload and the export columns.
    pub fn key(self) -> &'static str {
        match self {
            VitalField::HeartRate => "heartRate",
            VitalField::Systolic => "systolic",
            VitalField::Diastolic => "diastolic",
            VitalField::Temperature => "temperature",
            VitalField::Spo2 => "spo2",
            VitalField::Glucose => "glucose",
            VitalField::Activity => "activity",
            VitalField::Acetone => "acetone",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            VitalField::HeartRate => "Heart Rate",
            VitalField::Systolic => "Systolic",
            VitalField::Diastolic => "Diastolic",
            VitalField::Temperature => "Temperature",
            VitalField::Spo2 => "SpO2",
            VitalField::Glucose => "Glucose",
            VitalField::Activity => "Activity",
            VitalField::Acetone => "Acetone",
        }
    }

    /// Measurement unit shown next to the value.
    pub fn unit(self) -> &'static str {
        match self {
            VitalField::HeartRate => "bpm",
            VitalField::Systolic | VitalField::Diastolic => "mmHg",
            VitalField::Temperature => "°C",
            VitalField::Spo2 => "%",
            VitalField::Glucose => "mg/dL",
            VitalField::Activity => "lvl",
            VitalField::Acetone => "mmol/L",
        }
    }

    /// Look up a canonical field by its wire name.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

// ── SensorValue ───────────────────────────────────────────────────────────────

/// A single reading inside a sensor payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorValue {
    Number(f64),
    Text(String),
    /// No value has been observed for this field.
    Unknown,
}

impl SensorValue {
    /// Convert a scalar JSON value. Arrays and objects yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(SensorValue::Unknown),
            serde_json::Value::Number(n) => Some(n.as_f64().map_or(SensorValue::Unknown, SensorValue::Number)),
            serde_json::Value::String(s) => Some(SensorValue::Text(s.clone())),
            serde_json::Value::Bool(b) => Some(SensorValue::Text(b.to_string())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    /// The numeric reading, if there is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SensorValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, SensorValue::Unknown)
    }
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Number(n) => write!(f, "{}", n),
            SensorValue::Text(s) => f.write_str(s),
            SensorValue::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for SensorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SensorValue::Number(n) => serializer.serialize_f64(*n),
            SensorValue::Text(s) => serializer.serialize_str(s),
            SensorValue::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for SensorValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        SensorValue::from_json(&value)
            .ok_or_else(|| serde::de::Error::custom("sensor values must be scalars"))
    }
}

// ── SensorFields ──────────────────────────────────────────────────────────────

/// Ordered map of sensor field name → value.
///
/// Order is significant: it drives the export column order. Canonical vitals
/// come first (see [`SensorFields::canonical`]), extra device fields after.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorFields {
    entries: Vec<(String, SensorValue)>,
}

impl SensorFields {
    /// An empty field map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every canonical vital set to [`SensorValue::Unknown`].
    pub fn unknown() -> Self {
        Self {
            entries: VitalField::ALL
                .iter()
                .map(|f| (f.key().to_string(), SensorValue::Unknown))
                .collect(),
        }
    }

    /// Build a field map in canonical order: every [`VitalField`] first
    /// (`Unknown` when absent), then the remaining keys sorted by name.
    pub fn canonical<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, SensorValue)>,
    {
        let mut extras: Vec<(String, SensorValue)> = Vec::new();
        let mut fields = Self::unknown();
        for (key, value) in entries {
            if VitalField::from_key(&key).is_some() {
                fields.insert(key, value);
            } else {
                extras.push((key, value));
            }
        }
        extras.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in extras {
            fields.insert(key, value);
        }
        fields
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: SensorValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&SensorValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for SensorFields {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SensorFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct FieldsVisitor;

        impl<'de> Visitor<'de> for FieldsVisitor {
            type Value = SensorFields;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of sensor field values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut fields = SensorFields::new();
                while let Some((key, value)) = access.next_entry::<String, SensorValue>()? {
                    fields.insert(key, value);
                }
                Ok(fields)
            }
        }

        deserializer.deserialize_map(FieldsVisitor)
    }
}

// ── SensorSample ──────────────────────────────────────────────────────────────

/// One normalized set of vital-sign values plus the time it was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub fields: SensorFields,
    pub timestamp: DateTime<Utc>,
}

impl SensorSample {
    pub fn new(fields: SensorFields, timestamp: DateTime<Utc>) -> Self {
        Self { fields, timestamp }
    }

    /// A sample with every canonical vital unknown.
    pub fn unknown(timestamp: DateTime<Utc>) -> Self {
        Self::new(SensorFields::unknown(), timestamp)
    }

    /// Value for a canonical vital; `Unknown` when absent.
    pub fn vital(&self, field: VitalField) -> &SensorValue {
        self.fields.get(field.key()).unwrap_or(&SensorValue::Unknown)
    }

    /// Deep copy carrying a new timestamp.
    pub fn restamped(&self, timestamp: DateTime<Utc>) -> Self {
        Self::new(self.fields.clone(), timestamp)
    }
}

// ── Draft enums ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Gender {
    #[default]
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            "other" | "o" => Ok(Gender::Other),
            _ => Err(()),
        }
    }
}

/// Yes/No answer used by the medical-history questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum YesNo {
    #[default]
    No,
    Yes,
}

impl YesNo {
    pub fn as_str(self) -> &'static str {
        match self {
            YesNo::No => "No",
            YesNo::Yes => "Yes",
        }
    }
}

impl FromStr for YesNo {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Ok(YesNo::Yes),
            "no" | "n" | "false" | "0" => Ok(YesNo::No),
            _ => Err(()),
        }
    }
}

// ── Draft ─────────────────────────────────────────────────────────────────────

/// Default visit-interval label for a fresh session.
pub const DEFAULT_VISIT_DAY: &str = "Day 1";

/// Form keys of a draft, in form order. These are also the export column
/// names for the draft part of a record.
pub const DRAFT_KEYS: [&str; 17] = [
    "fullName",
    "patientId",
    "age",
    "gender",
    "height",
    "weight",
    "visitDay",
    "visitDate",
    "hba1c",
    "glucose_fg",
    "glucose_pg",
    "hypertensive",
    "family_hypertension",
    "cardiovascular_disease",
    "stroke",
    "family_diabetes",
    "diabetic",
];

/// Mutable working state for one in-progress patient entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub full_name: String,
    pub patient_id: String,
    pub age: Option<u32>,
    pub gender: Gender,
    /// Height in centimetres.
    pub height_cm: Option<f64>,
    /// Weight in kilograms.
    pub weight_kg: Option<f64>,
    /// Visit-interval label such as `"Day 1"`.
    pub visit_day: String,
    pub visit_date: NaiveDate,
    pub hba1c: Option<f64>,
    /// Fasting glucose (mg/dL).
    pub glucose_fasting: Option<f64>,
    /// Post-prandial glucose (mg/dL).
    pub glucose_post: Option<f64>,
    pub hypertensive: YesNo,
    pub family_hypertension: YesNo,
    pub cardiovascular_disease: YesNo,
    pub stroke: YesNo,
    pub family_diabetes: YesNo,
    pub diabetic: YesNo,
}

impl Draft {
    /// A blank draft dated `visit_date`.
    pub fn new(visit_date: NaiveDate) -> Self {
        Self {
            full_name: String::new(),
            patient_id: String::new(),
            age: None,
            gender: Gender::Male,
            height_cm: None,
            weight_kg: None,
            visit_day: DEFAULT_VISIT_DAY.to_string(),
            visit_date,
            hba1c: None,
            glucose_fasting: None,
            glucose_post: None,
            hypertensive: YesNo::No,
            family_hypertension: YesNo::No,
            cardiovascular_disease: YesNo::No,
            stroke: YesNo::No,
            family_diabetes: YesNo::No,
            diabetic: YesNo::No,
        }
    }

    /// Clear the draft back to defaults, keeping the visit-day label so the
    /// next patient in the same interval does not have to re-enter it.
    pub fn reset(&mut self, visit_date: NaiveDate) {
        let visit_day = std::mem::take(&mut self.visit_day);
        *self = Self::new(visit_date);
        if !visit_day.trim().is_empty() {
            self.visit_day = visit_day;
        }
    }

    /// Apply a form update by wire name.
    ///
    /// Empty values clear optional numeric fields. Unknown names fail with
    /// [`RecorderError::UnknownField`]; unparsable values with
    /// [`RecorderError::InvalidField`].
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        let raw = value.trim();
        match name {
            "fullName" => self.full_name = raw.to_string(),
            "patientId" => self.patient_id = raw.to_string(),
            "age" => self.age = parse_optional(name, raw)?,
            "gender" => self.gender = parse_enum(name, raw)?,
            "height" => self.height_cm = parse_optional(name, raw)?,
            "weight" => self.weight_kg = parse_optional(name, raw)?,
            "visitDay" => self.visit_day = raw.to_string(),
            "visitDate" => {
                self.visit_date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_| invalid(name, raw))?
            }
            "hba1c" => self.hba1c = parse_optional(name, raw)?,
            "glucose_fg" => self.glucose_fasting = parse_optional(name, raw)?,
            "glucose_pg" => self.glucose_post = parse_optional(name, raw)?,
            "hypertensive" => self.hypertensive = parse_enum(name, raw)?,
            "family_hypertension" => self.family_hypertension = parse_enum(name, raw)?,
            "cardiovascular_disease" => self.cardiovascular_disease = parse_enum(name, raw)?,
            "stroke" => self.stroke = parse_enum(name, raw)?,
            "family_diabetes" => self.family_diabetes = parse_enum(name, raw)?,
            "diabetic" => self.diabetic = parse_enum(name, raw)?,
            other => return Err(RecorderError::UnknownField(other.to_string())),
        }
        Ok(())
    }

    /// The draft as `(key, text)` pairs in [`DRAFT_KEYS`] order.
    pub fn columns(&self) -> Vec<(&'static str, String)> {
        let values = [
            self.full_name.clone(),
            self.patient_id.clone(),
            optional_text(self.age),
            self.gender.as_str().to_string(),
            optional_text(self.height_cm),
            optional_text(self.weight_kg),
            self.visit_day.clone(),
            self.visit_date.format("%Y-%m-%d").to_string(),
            optional_text(self.hba1c),
            optional_text(self.glucose_fasting),
            optional_text(self.glucose_post),
            self.hypertensive.as_str().to_string(),
            self.family_hypertension.as_str().to_string(),
            self.cardiovascular_disease.as_str().to_string(),
            self.stroke.as_str().to_string(),
            self.family_diabetes.as_str().to_string(),
            self.diabetic.as_str().to_string(),
        ];
        DRAFT_KEYS.into_iter().zip(values).collect()
    }
}

impl Default for Draft {
    fn default() -> Self {
        Self::new(time_utils::today_utc())
    }
}

fn invalid(field: &str, value: &str) -> RecorderError {
    RecorderError::InvalidField {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn parse_optional<T: FromStr>(field: &str, raw: &str) -> Result<Option<T>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<T>().map(Some).map_err(|_| invalid(field, raw))
}

fn parse_enum<T: FromStr>(field: &str, raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| invalid(field, raw))
}

fn optional_text<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

// ── Bmi ───────────────────────────────────────────────────────────────────────

/// Body-mass index rounded to one decimal place.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Bmi {
    Value(f64),
    /// Height or weight missing or non-positive.
    Unavailable,
}

impl Bmi {
    pub fn value(self) -> Option<f64> {
        match self {
            Bmi::Value(v) => Some(v),
            Bmi::Unavailable => None,
        }
    }
}

impl From<Option<f64>> for Bmi {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Bmi::Unavailable, Bmi::Value)
    }
}

impl From<Bmi> for Option<f64> {
    fn from(bmi: Bmi) -> Self {
        bmi.value()
    }
}

impl fmt::Display for Bmi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bmi::Value(v) => write!(f, "{:.1}", v),
            Bmi::Unavailable => f.write_str("--"),
        }
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// Export column names owned by the record itself; sensor keys that collide
/// with these are not exported.
pub const RECORD_KEYS: [&str; 4] = ["id", "timestamp", "bmi", "capturedAt"];

/// An immutable, validated, saved patient entry.
///
/// Only [`crate::builder::RecordBuilder`] creates records; the fields are
/// read through accessors so a record cannot change after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: i64,
    timestamp: DateTime<Utc>,
    draft: Draft,
    bmi: Bmi,
    snapshot: SensorSample,
}

impl Record {
    pub(crate) fn new(
        id: i64,
        timestamp: DateTime<Utc>,
        draft: Draft,
        bmi: Bmi,
        snapshot: SensorSample,
    ) -> Self {
        Self {
            id,
            timestamp,
            draft,
            bmi,
            snapshot,
        }
    }

    /// Time-based identifier, strictly increasing per builder.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// When the record was saved.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    pub fn bmi(&self) -> Bmi {
        self.bmi
    }

    /// The frozen sensor snapshot; its timestamp is the capture time.
    pub fn snapshot(&self) -> &SensorSample {
        &self.snapshot
    }

    pub fn patient_id(&self) -> &str {
        &self.draft.patient_id
    }

    pub fn full_name(&self) -> &str {
        &self.draft.full_name
    }

    /// Flatten the record into ordered `(column, text)` pairs:
    /// `id`, `timestamp`, the draft keys, `bmi`, the sensor keys,
    /// `capturedAt`.
    pub fn columns(&self) -> Vec<(String, String)> {
        let mut columns: Vec<(String, String)> = Vec::with_capacity(DRAFT_KEYS.len() + self.snapshot.fields.len() + 4);
        columns.push(("id".to_string(), self.id.to_string()));
        columns.push(("timestamp".to_string(), time_utils::to_iso(self.timestamp)));
        for (key, value) in self.draft.columns() {
            columns.push((key.to_string(), value));
        }
        columns.push(("bmi".to_string(), self.bmi.to_string()));
        for (key, value) in self.snapshot.fields.iter() {
            if RECORD_KEYS.contains(&key) || DRAFT_KEYS.contains(&key) {
                continue;
            }
            columns.push((key.to_string(), value.to_string()));
        }
        columns.push(("capturedAt".to_string(), time_utils::to_iso(self.snapshot.timestamp)));
        columns
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    // ── VitalField ────────────────────────────────────────────────────────

    #[test]
    fn test_vital_field_keys_round_trip() {
        for field in VitalField::ALL {
            assert_eq!(VitalField::from_key(field.key()), Some(field));
        }
        assert_eq!(VitalField::from_key("pulse"), None);
    }

    #[test]
    fn test_vital_field_units() {
        assert_eq!(VitalField::HeartRate.unit(), "bpm");
        assert_eq!(VitalField::Systolic.unit(), "mmHg");
        assert_eq!(VitalField::Acetone.unit(), "mmol/L");
    }

    // ── SensorValue ───────────────────────────────────────────────────────

    #[test]
    fn test_sensor_value_from_json() {
        assert_eq!(SensorValue::from_json(&json!(72)), Some(SensorValue::Number(72.0)));
        assert_eq!(
            SensorValue::from_json(&json!("ok")),
            Some(SensorValue::Text("ok".to_string()))
        );
        assert_eq!(SensorValue::from_json(&json!(null)), Some(SensorValue::Unknown));
        assert_eq!(SensorValue::from_json(&json!({"a": 1})), None);
        assert_eq!(SensorValue::from_json(&json!([1, 2])), None);
    }

    #[test]
    fn test_sensor_value_display() {
        assert_eq!(SensorValue::Number(72.0).to_string(), "72");
        assert_eq!(SensorValue::Number(36.6).to_string(), "36.6");
        assert_eq!(SensorValue::Unknown.to_string(), "unknown");
    }

    // ── SensorFields ──────────────────────────────────────────────────────

    #[test]
    fn test_unknown_fields_cover_every_vital() {
        let fields = SensorFields::unknown();
        assert_eq!(fields.len(), VitalField::ALL.len());
        assert!(fields.iter().all(|(_, v)| v.is_unknown()));
    }

    #[test]
    fn test_canonical_orders_vitals_then_sorted_extras() {
        let fields = SensorFields::canonical(vec![
            ("zeta".to_string(), SensorValue::Number(1.0)),
            ("spo2".to_string(), SensorValue::Number(98.0)),
            ("alpha".to_string(), SensorValue::Number(2.0)),
            ("heartRate".to_string(), SensorValue::Number(72.0)),
        ]);
        let keys: Vec<&str> = fields.keys().collect();
        assert_eq!(
            keys,
            vec![
                "heartRate",
                "systolic",
                "diastolic",
                "temperature",
                "spo2",
                "glucose",
                "activity",
                "acetone",
                "alpha",
                "zeta"
            ]
        );
        assert_eq!(fields.get("spo2"), Some(&SensorValue::Number(98.0)));
        assert_eq!(fields.get("systolic"), Some(&SensorValue::Unknown));
    }

    #[test]
    fn test_fields_serde_preserves_order() {
        let fields = SensorFields::canonical(vec![("heartRate".to_string(), SensorValue::Number(80.0))]);
        let json = serde_json::to_string(&fields).unwrap();
        assert!(json.starts_with("{\"heartRate\":80.0,\"systolic\":null"));
        let back: SensorFields = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fields);
    }

    // ── Draft ─────────────────────────────────────────────────────────────

    #[test]
    fn test_draft_defaults() {
        let draft = Draft::new(date(2024, 3, 1));
        assert_eq!(draft.gender, Gender::Male);
        assert_eq!(draft.visit_day, "Day 1");
        assert_eq!(draft.diabetic, YesNo::No);
        assert!(draft.full_name.is_empty());
    }

    #[test]
    fn test_set_field_parses_typed_values() {
        let mut draft = Draft::new(date(2024, 3, 1));
        draft.set_field("fullName", "  Jane Doe ").unwrap();
        draft.set_field("height", "165").unwrap();
        draft.set_field("weight", "60.5").unwrap();
        draft.set_field("age", "42").unwrap();
        draft.set_field("gender", "female").unwrap();
        draft.set_field("stroke", "Yes").unwrap();
        draft.set_field("visitDate", "2024-05-06").unwrap();

        assert_eq!(draft.full_name, "Jane Doe");
        assert_eq!(draft.height_cm, Some(165.0));
        assert_eq!(draft.weight_kg, Some(60.5));
        assert_eq!(draft.age, Some(42));
        assert_eq!(draft.gender, Gender::Female);
        assert_eq!(draft.stroke, YesNo::Yes);
        assert_eq!(draft.visit_date, date(2024, 5, 6));
    }

    #[test]
    fn test_set_field_empty_clears_optional() {
        let mut draft = Draft::new(date(2024, 3, 1));
        draft.set_field("hba1c", "6.1").unwrap();
        draft.set_field("hba1c", "").unwrap();
        assert_eq!(draft.hba1c, None);
    }

    #[test]
    fn test_set_field_rejects_bad_values() {
        let mut draft = Draft::new(date(2024, 3, 1));
        assert!(matches!(
            draft.set_field("height", "tall"),
            Err(RecorderError::InvalidField { .. })
        ));
        assert!(matches!(
            draft.set_field("diabetic", "maybe"),
            Err(RecorderError::InvalidField { .. })
        ));
        assert!(matches!(
            draft.set_field("shoeSize", "42"),
            Err(RecorderError::UnknownField(_))
        ));
    }

    #[test]
    fn test_reset_keeps_visit_day() {
        let mut draft = Draft::new(date(2024, 3, 1));
        draft.set_field("fullName", "Jane").unwrap();
        draft.set_field("visitDay", "Day 7").unwrap();
        draft.reset(date(2024, 3, 2));
        assert!(draft.full_name.is_empty());
        assert_eq!(draft.visit_day, "Day 7");
        assert_eq!(draft.visit_date, date(2024, 3, 2));
    }

    #[test]
    fn test_draft_columns_follow_form_order() {
        let draft = Draft::new(date(2024, 3, 1));
        let keys: Vec<&str> = draft.columns().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, DRAFT_KEYS.to_vec());
    }

    // ── Bmi ───────────────────────────────────────────────────────────────

    #[test]
    fn test_bmi_display() {
        assert_eq!(Bmi::Value(22.0).to_string(), "22.0");
        assert_eq!(Bmi::Unavailable.to_string(), "--");
    }

    #[test]
    fn test_bmi_serializes_as_optional_number() {
        assert_eq!(serde_json::to_value(Bmi::Value(22.0)).unwrap(), json!(22.0));
        assert_eq!(serde_json::to_value(Bmi::Unavailable).unwrap(), json!(null));
    }

    // ── Record ────────────────────────────────────────────────────────────

    #[test]
    fn test_record_columns_layout() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let mut fields = SensorFields::canonical(vec![("heartRate".to_string(), SensorValue::Number(72.0))]);
        fields.insert("id", SensorValue::Number(5.0));
        let record = Record::new(
            1,
            at,
            Draft::new(date(2024, 3, 1)),
            Bmi::Unavailable,
            SensorSample::new(fields, at),
        );

        let columns = record.columns();
        assert_eq!(columns[0], ("id".to_string(), "1".to_string()));
        assert_eq!(columns[1].0, "timestamp");
        assert_eq!(columns[2].0, "fullName");
        assert_eq!(columns[19], ("bmi".to_string(), "--".to_string()));
        assert_eq!(columns[20], ("heartRate".to_string(), "72".to_string()));
        assert_eq!(columns.last().map(|c| c.0.as_str()), Some("capturedAt"));
        // The colliding sensor "id" is not exported a second time.
        assert_eq!(columns.iter().filter(|(k, _)| k == "id").count(), 1);
    }

    #[test]
    fn test_record_json_round_trip_keeps_sensor_order() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let record = Record::new(
            7,
            at,
            Draft::new(date(2024, 3, 1)),
            Bmi::Value(22.0),
            SensorSample::unknown(at),
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.columns(), record.columns());
    }
}
