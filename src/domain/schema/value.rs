use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

/// One flat incoming record. Field order is the order the fields arrived in.
pub type Record = serde_json::Map<String, JsonValue>;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];

/// A record field classified into the shapes the engine knows how to store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Timestamp(NaiveDateTime),
    Text(String),
    /// Arrays and objects. Stored as their JSON text.
    Complex(JsonValue),
}

impl FieldValue {
    /// Classifies a raw JSON value. Booleans are checked before numbers,
    /// integral numbers before floating ones, and strings are promoted to
    /// timestamps only when they look like and parse as a date/time.
    pub fn classify(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Boolean(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                // u64 above i64::MAX and every float land here
                None => FieldValue::Real(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => match parse_timestamp(s) {
                Some(ts) => FieldValue::Timestamp(ts),
                None => FieldValue::Text(s.clone()),
            },
            JsonValue::Array(_) | JsonValue::Object(_) => FieldValue::Complex(value.clone()),
        }
    }

    /// Text form used when a value has to be bound as a string.
    pub fn to_text(&self) -> Option<String> {
        match self {
            FieldValue::Null => None,
            FieldValue::Boolean(b) => Some(b.to_string()),
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Real(f) => Some(f.to_string()),
            FieldValue::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            FieldValue::Text(s) => Some(s.clone()),
            FieldValue::Complex(v) => Some(v.to_string()),
        }
    }
}

/// Parses a date/time string. Only strings of at least ten characters that
/// contain `-` or `/` are considered; offsets are normalized to UTC.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.chars().count() < 10 || !(s.contains('-') || s.contains('/')) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}
