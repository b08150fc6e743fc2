use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One raw reading object. Field order is preserved so the report keeps the
/// upstream column order.
pub type Reading = Map<String, Value>;

/// Body of the meter readings endpoint.
///
/// `readings` is `None` when the field is missing or the request failed; the
/// report pipeline treats both as "nothing for this meter".
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ReadingsResponse {
    #[serde(default, deserialize_with = "readings_field")]
    pub readings: Option<Vec<Reading>>,
}

impl ReadingsResponse {
    pub fn with_readings(readings: Vec<Reading>) -> Self {
        Self {
            readings: Some(readings),
        }
    }

    /// Readings whose `value` is present and not null.
    pub fn valid_readings(&self) -> impl Iterator<Item = &Reading> {
        self.readings
            .iter()
            .flatten()
            .filter(|r| r.get("value").is_some_and(|v| !v.is_null()))
    }
}

/// Non-object entries in the array are dropped rather than failing the whole
/// response.
fn readings_field<'de, D>(deserializer: D) -> Result<Option<Vec<Reading>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?;
    Ok(raw.map(|items| {
        items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }))
}

/// A raw sample from the temperature (raw data) endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureSample {
    /// Epoch milliseconds.
    pub time_ms: Option<f64>,
    pub value: Option<f64>,
}

impl TemperatureSample {
    pub fn new(time_ms: Option<f64>, value: Option<f64>) -> Self {
        Self { time_ms, value }
    }

    /// Build a sample from a raw `{time, value}` object. Numeric strings are
    /// accepted for `value`; anything else non-numeric becomes `None`.
    pub fn from_raw(raw: &Value) -> Self {
        Self {
            time_ms: raw.get("time").and_then(Value::as_f64),
            value: raw.get("value").and_then(numeric_value),
        }
    }
}

/// Interpret a JSON value as a number the way the reports do: numbers as-is,
/// strings when they parse as a float.
pub fn numeric_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Query window passed verbatim as `start_date` / `end_date`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: String,
    pub end: String,
}

impl DateWindow {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}
