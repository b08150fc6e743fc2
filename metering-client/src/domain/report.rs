use serde::Serialize;
use serde_json::Value;

use super::{MeterProperties, Reading, SiteInfo};

/// One row of the meter report: the upstream reading plus its meter, site
/// and temperature context.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    /// Reading fields as received, minus `time` / `timestamp`, with `date`
    /// replaced by the normalized timestamp (or null).
    pub reading: Reading,
    pub meter_id: String,
    pub meter_name: String,
    pub site_id: String,
    pub meter_properties: MeterProperties,
    pub site_info: SiteInfo,
    /// Mean daily temperature for the reading's day.
    pub mdt: Option<f64>,
    /// Cooling degree days derived from `mdt`.
    pub cdd: Option<f64>,
}

impl OutputRecord {
    /// Normalized `YYYY-MM-DD HH:MM:SS` timestamp, if one could be resolved.
    pub fn date(&self) -> Option<&str> {
        self.reading.get("date").and_then(Value::as_str)
    }
}

/// A consecutive pair of readings whose difference exceeded the threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyRecord {
    pub meter_name: String,
    pub meter_id: String,
    pub site_name: String,
    pub previous_value: f64,
    pub current_value: f64,
    pub delta: f64,
    pub previous_time: String,
    pub current_time: String,
}

impl AnomalyRecord {
    pub const COLUMNS: [&'static str; 8] = [
        "meter_name",
        "meter_id",
        "site_name",
        "previous_value",
        "current_value",
        "delta",
        "previous_time",
        "current_time",
    ];
}
