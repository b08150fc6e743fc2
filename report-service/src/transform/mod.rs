pub mod temperature;
pub mod timestamp;

pub use temperature::TemperatureByDay;

use metering_client::domain::{Meter, MeterProperties, OutputRecord, Reading, SiteInfo};
use serde_json::Value;

/// Cooling degree days: `max(0, mdt - base)`, undefined without a temperature.
pub fn cooling_degree_days(mdt: Option<f64>, base: f64) -> Option<f64> {
    mdt.map(|t| (t - base).max(0.0))
}

/// Everything a reading is joined with on its way into the report.
pub struct MeterContext<'a> {
    pub meter: &'a Meter,
    pub properties: &'a MeterProperties,
    pub site: &'a SiteInfo,
    pub temperatures: &'a TemperatureByDay,
    pub cdd_base: f64,
}

/// Pure join of one reading with its meter context.
///
/// Rules:
/// - `date` becomes `YYYY-MM-DD HH:MM:SS` (or null when no timestamp resolves).
/// - `time` and `timestamp` are dropped; other fields are kept in order.
/// - `mdt` is looked up by the first 10 characters of `date`.
pub fn enrich_reading(reading: &Reading, ctx: &MeterContext<'_>) -> OutputRecord {
    let date = timestamp::resolve_reading_timestamp(reading).and_then(timestamp::format_report_timestamp);
    if date.is_none() && has_raw_timestamp(reading) {
        tracing::debug!(
            meter_id = %ctx.meter.meter_id,
            meter_name = %ctx.meter.name,
            "could not parse reading timestamp, keeping reading with null date"
        );
    }

    let mut fields = reading.clone();
    fields.insert(
        "date".to_string(),
        date.clone().map_or(Value::Null, Value::String),
    );
    fields.shift_remove("time");
    fields.shift_remove("timestamp");

    let mdt = date
        .as_deref()
        .and_then(|d| d.get(..10))
        .and_then(|day| ctx.temperatures.mean_for_day(day));

    OutputRecord {
        reading: fields,
        meter_id: ctx.meter.meter_id.clone(),
        meter_name: ctx.meter.name.clone(),
        site_id: ctx.meter.site_id.clone(),
        meter_properties: ctx.properties.clone(),
        site_info: ctx.site.clone(),
        mdt,
        cdd: cooling_degree_days(mdt, ctx.cdd_base),
    }
}

fn has_raw_timestamp(reading: &Reading) -> bool {
    ["date", "time", "timestamp"]
        .iter()
        .any(|k| reading.get(*k).is_some_and(|v| !v.is_null()))
}
