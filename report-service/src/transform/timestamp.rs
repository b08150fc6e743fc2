use metering_client::domain::Reading;
use serde_json::Value;
use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    macros::format_description,
    Date, OffsetDateTime, PrimitiveDateTime, Time,
};

/// Parse an ISO-8601 timestamp as sent by the readings endpoint.
///
/// Zulu and explicit offsets are kept as given. Timestamps without an offset
/// (and bare dates) are taken as UTC.
pub fn parse_iso_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(dt);
    }
    if let Ok(dt) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Some(dt);
    }
    if let Ok(dt) = PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")) {
        return Some(dt.assume_utc());
    }
    if let Ok(dt) = PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Some(dt.assume_utc());
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| PrimitiveDateTime::new(d, Time::MIDNIGHT).assume_utc())
}

/// Convert epoch milliseconds to a UTC timestamp.
pub fn epoch_millis_to_utc(ms: f64) -> Option<OffsetDateTime> {
    if !ms.is_finite() {
        return None;
    }

    // Whole milliseconds go through integer math so second boundaries do not
    // drift under float rounding.
    let nanos = if ms.fract() == 0.0 && ms.abs() < i64::MAX as f64 {
        i128::from(ms as i64) * 1_000_000
    } else {
        (ms.trunc() as i128) * 1_000_000 + (ms.fract() * 1_000_000.0) as i128
    };
    OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// `YYYY-MM-DD HH:MM:SS`, the report's timestamp format.
pub fn format_report_timestamp(dt: OffsetDateTime) -> Option<String> {
    dt.format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .ok()
}

/// `YYYY-MM-DD` of the timestamp in its own offset.
pub fn format_day(dt: OffsetDateTime) -> Option<String> {
    dt.format(format_description!("[year]-[month]-[day]")).ok()
}

/// Resolve the canonical timestamp of a reading.
///
/// A non-empty ISO `date` string wins; otherwise a numeric epoch-ms `time`
/// (or `timestamp`) field is used.
pub fn resolve_reading_timestamp(reading: &Reading) -> Option<OffsetDateTime> {
    if let Some(dt) = reading
        .get("date")
        .and_then(Value::as_str)
        .and_then(parse_iso_timestamp)
    {
        return Some(dt);
    }

    epoch_field(reading, "time")
        .or_else(|| epoch_field(reading, "timestamp"))
        .and_then(epoch_millis_to_utc)
}

fn epoch_field(reading: &Reading, key: &str) -> Option<f64> {
    match reading.get(key)? {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}
