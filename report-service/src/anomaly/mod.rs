//! Faulty meter detection: flags consecutive readings whose values jump by
//! more than a fixed threshold.

use std::time::Duration;

use metering_client::{
    domain::{numeric_value, AnomalyRecord, DateWindow, Meter, Reading},
    MeteringApi,
};
use serde_json::Value;

use crate::config::AnomalyConfig;
use crate::pipeline::PipelineError;
use crate::transform::timestamp::{epoch_millis_to_utc, format_report_timestamp, resolve_reading_timestamp};

const INVALID_TIMESTAMP: &str = "Invalid timestamp";
const UNKNOWN_SITE: &str = "Unknown";

/// Display form of a reading's time: ISO strings as received, epoch
/// milliseconds as UTC `YYYY-MM-DD HH:MM:SS`.
pub fn display_time(reading: &Reading) -> String {
    match reading.get("date") {
        Some(Value::String(s)) => return s.clone(),
        Some(Value::Number(n)) => {
            return n
                .as_f64()
                .and_then(epoch_millis_to_utc)
                .and_then(format_report_timestamp)
                .unwrap_or_else(|| INVALID_TIMESTAMP.to_string());
        }
        _ => {}
    }

    ["time", "timestamp"]
        .iter()
        .find_map(|k| reading.get(*k).and_then(Value::as_f64))
        .and_then(epoch_millis_to_utc)
        .and_then(format_report_timestamp)
        .unwrap_or_else(|| INVALID_TIMESTAMP.to_string())
}

/// Compare each numeric reading with the previous numeric one.
///
/// Readings whose value does not parse are skipped and leave the previous
/// value untouched.
pub fn scan_readings(meter: &Meter, site_name: &str, readings: &[Reading], threshold: f64) -> Vec<AnomalyRecord> {
    let mut anomalies = Vec::new();
    let mut previous: Option<(f64, String)> = None;

    for reading in readings {
        let Some(value) = reading.get("value").and_then(numeric_value) else {
            continue;
        };
        let time = display_time(reading);

        if let Some((prev_value, prev_time)) = &previous {
            let delta = (value - prev_value).abs();
            if delta > threshold {
                anomalies.push(AnomalyRecord {
                    meter_name: meter.name.clone(),
                    meter_id: meter.meter_id.clone(),
                    site_name: site_name.to_string(),
                    previous_value: *prev_value,
                    current_value: value,
                    delta,
                    previous_time: prev_time.clone(),
                    current_time: time.clone(),
                });
            }
        }

        previous = Some((value, time));
    }

    anomalies
}

/// Stable sort by resolved timestamp; readings without one keep their
/// relative order at the end.
pub fn sort_chronologically(readings: &mut [Reading]) {
    readings.sort_by_cached_key(|r| {
        let ts = resolve_reading_timestamp(r);
        (ts.is_none(), ts)
    });
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyScan {
    pub anomalies: Vec<AnomalyRecord>,
    pub meters_scanned: usize,
    pub meters_excluded: usize,
}

/// Walks every matching meter once for a single window. No fallback window.
pub struct AnomalyScanner<'a, A: ?Sized> {
    api: &'a A,
    cfg: &'a AnomalyConfig,
}

impl<'a, A> AnomalyScanner<'a, A>
where
    A: MeteringApi + ?Sized,
{
    pub fn new(api: &'a A, cfg: &'a AnomalyConfig) -> Self {
        Self { api, cfg }
    }

    pub async fn run(&self, window: &DateWindow) -> Result<AnomalyScan, PipelineError> {
        let token = self.api.authenticate().await.map_err(PipelineError::Auth)?;
        tracing::info!("authenticated with metering API");

        let meters = self
            .api
            .search_meters(&token, &self.cfg.meter_query)
            .await
            .map_err(PipelineError::MeterList)?;
        tracing::info!(meters = meters.len(), "scanning meters");

        let delay = Duration::from_millis(self.cfg.inter_meter_delay_ms);
        let mut scan = AnomalyScan::default();

        for (i, meter) in meters.iter().enumerate() {
            if !meter.name_matches_any(&self.cfg.name_keywords) {
                tracing::debug!(meter_id = %meter.meter_id, meter_name = %meter.name, "meter name not in scan set, skipping");
                scan.meters_excluded += 1;
                continue;
            }

            if scan.meters_scanned > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let site = self.api.site_info(&token, &meter.site_id).await;
            let site_name = site.name().unwrap_or(UNKNOWN_SITE);

            let mut readings = self
                .api
                .meter_readings(&token, &meter.meter_id, window)
                .await
                .readings
                .unwrap_or_default();
            if self.cfg.sort_chronologically {
                sort_chronologically(&mut readings);
            }

            let found = scan_readings(meter, site_name, &readings, self.cfg.delta_threshold);
            if !found.is_empty() {
                metrics::counter!("anomalies_flagged_total").increment(found.len() as u64);
                tracing::warn!(
                    meter_id = %meter.meter_id,
                    meter_name = %meter.name,
                    site_name,
                    anomalies = found.len(),
                    "abnormal jumps detected"
                );
            }
            tracing::info!(
                position = i + 1,
                total = meters.len(),
                meter_id = %meter.meter_id,
                readings = readings.len(),
                "checked meter"
            );

            scan.meters_scanned += 1;
            scan.anomalies.extend(found);
        }

        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeApi;
    use serde_json::json;

    const T: f64 = 1_000_000.0;

    fn meter() -> Meter {
        Meter {
            meter_id: "m-1".to_string(),
            site_id: "s-1".to_string(),
            name: "ENG boiler".to_string(),
        }
    }

    fn readings(v: Value) -> Vec<Reading> {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn single_step_is_flagged_once() {
        let rs = readings(json!([
            {"value": 100, "date": "t1"},
            {"value": 100, "date": "t2"},
            {"value": 100.0 + T + 1.0, "date": "t3"},
            {"value": 100.0 + T + 1.0, "date": "t4"}
        ]));

        let found = scan_readings(&meter(), "Plant", &rs, T);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].previous_value, 100.0);
        assert_eq!(found[0].current_value, 100.0 + T + 1.0);
        assert_eq!(found[0].delta, T + 1.0);
        assert_eq!(found[0].previous_time, "t2");
        assert_eq!(found[0].current_time, "t3");
        assert_eq!(found[0].site_name, "Plant");
    }

    #[test]
    fn spike_and_return_flags_both_edges() {
        let rs = readings(json!([
            {"value": 100, "date": "t1"},
            {"value": 100, "date": "t2"},
            {"value": 100.0 + T + 1.0, "date": "t3"},
            {"value": 100, "date": "t4"}
        ]));

        let found = scan_readings(&meter(), "Plant", &rs, T);

        assert_eq!(found.len(), 2);
        assert_eq!((found[0].previous_time.as_str(), found[0].current_time.as_str()), ("t2", "t3"));
        assert_eq!((found[1].previous_time.as_str(), found[1].current_time.as_str()), ("t3", "t4"));
    }

    #[test]
    fn delta_equal_to_threshold_is_not_flagged() {
        let rs = readings(json!([{"value": 0}, {"value": T}]));
        assert!(scan_readings(&meter(), "Plant", &rs, T).is_empty());
    }

    #[test]
    fn non_numeric_values_do_not_break_the_chain() {
        let rs = readings(json!([
            {"value": 100, "date": "t1"},
            {"value": "n/a", "date": "t2"},
            {"value": null, "date": "t3"},
            {"value": "2000101", "date": "t4"}
        ]));

        let found = scan_readings(&meter(), "Plant", &rs, T);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].previous_value, 100.0);
        assert_eq!(found[0].previous_time, "t1");
        assert_eq!(found[0].current_value, 2_000_101.0);
        assert_eq!(found[0].current_time, "t4");
    }

    #[test]
    fn display_time_handles_each_representation() {
        let rs = readings(json!([
            {"date": "2024-06-01T00:00:00.000Z"},
            {"date": 1_717_236_930_000u64},
            {"time": 1_717_200_000_000u64},
            {"date": null}
        ]));

        assert_eq!(display_time(&rs[0]), "2024-06-01T00:00:00.000Z");
        assert_eq!(display_time(&rs[1]), "2024-06-01 10:15:30");
        assert_eq!(display_time(&rs[2]), "2024-06-01 00:00:00");
        assert_eq!(display_time(&rs[3]), "Invalid timestamp");
    }

    #[test]
    fn chronological_sort_is_stable_and_puts_unknown_last() {
        let mut rs = readings(json!([
            {"seq": 1, "date": "2024-06-03T00:00:00Z"},
            {"seq": 2},
            {"seq": 3, "time": 1_717_200_000_000u64},
            {"seq": 4, "date": "2024-06-02T00:00:00Z"},
            {"seq": 5}
        ]));

        sort_chronologically(&mut rs);

        let order: Vec<i64> = rs.iter().map(|r| r["seq"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![3, 4, 1, 2, 5]);
    }

    #[tokio::test]
    async fn scanner_only_checks_keyword_meters() {
        let api = FakeApi::default()
            .with_meter("m-1", "s-1", "pwr feed")
            .with_meter("m-2", "s-1", "GAS boiler")
            .with_meter("m-3", "s-2", "ENG 2")
            .with_site("s-1", json!({"name": "HQ"}))
            .with_readings("m-1", "2024-06-01T00:00:00.000Z", json!({"readings": [{"value": 0}, {"value": 5_000_000}]}))
            .with_readings("m-2", "2024-06-01T00:00:00.000Z", json!({"readings": [{"value": 0}, {"value": 5_000_000}]}))
            .with_readings("m-3", "2024-06-01T00:00:00.000Z", json!({"readings": [{"value": 0}, {"value": 9_000_000}]}));
        let cfg = AnomalyConfig {
            inter_meter_delay_ms: 0,
            ..AnomalyConfig::default()
        };

        let scan = AnomalyScanner::new(&api, &cfg).run(&cfg.window).await.unwrap();

        assert_eq!(scan.meters_scanned, 2);
        assert_eq!(scan.meters_excluded, 1);
        assert_eq!(scan.anomalies.len(), 2);
        assert_eq!(scan.anomalies[0].meter_id, "m-1");
        assert_eq!(scan.anomalies[0].site_name, "HQ");
        assert_eq!(scan.anomalies[1].meter_id, "m-3");
        assert_eq!(scan.anomalies[1].site_name, "Unknown");

        let scanned: Vec<String> = api.readings_calls().into_iter().map(|(m, _)| m).collect();
        assert_eq!(scanned, vec!["m-1", "m-3"]);
        assert_eq!(api.search_queries(), vec!["PWR or ENG"]);
    }

    #[tokio::test(start_paused = true)]
    async fn scanned_meters_are_paced_and_excluded_ones_are_not() {
        let api = FakeApi::default()
            .with_meter("m-1", "s-1", "PWR 1")
            .with_meter("m-2", "s-1", "GAS")
            .with_meter("m-3", "s-1", "PWR 2")
            .with_meter("m-4", "s-1", "ENG 1");
        let cfg = AnomalyConfig {
            inter_meter_delay_ms: 300,
            ..AnomalyConfig::default()
        };

        let started = tokio::time::Instant::now();
        let scan = AnomalyScanner::new(&api, &cfg).run(&cfg.window).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(scan.meters_scanned, 3);
        assert!(elapsed >= Duration::from_millis(600), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(900), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn scanner_does_not_retry_with_another_window() {
        let api = FakeApi::default().with_meter("m-1", "s-1", "PWR");
        let cfg = AnomalyConfig {
            inter_meter_delay_ms: 0,
            ..AnomalyConfig::default()
        };

        let scan = AnomalyScanner::new(&api, &cfg).run(&cfg.window).await.unwrap();

        assert!(scan.anomalies.is_empty());
        assert_eq!(api.readings_calls().len(), 1);
    }
}
