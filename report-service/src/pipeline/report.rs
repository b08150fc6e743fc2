use std::time::Duration;

use metering_client::{
    domain::{DateWindow, Meter, MeterProperties, OutputRecord, SiteInfo},
    AccessToken, MeteringApi,
};

use super::PipelineError;
use crate::config::ReportConfig;
use crate::transform::{enrich_reading, MeterContext, TemperatureByDay};

/// Result of one pass over all meters for a single window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttemptOutcome {
    pub records: Vec<OutputRecord>,
    pub skipped_meter_ids: Vec<String>,
}

/// A finished collection run, after the optional fallback pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRun {
    pub records: Vec<OutputRecord>,
    pub skipped_meter_ids: Vec<String>,
    /// Window the records came from.
    pub window: DateWindow,
    pub used_fallback: bool,
}

/// Joins meters, readings, site/property bags and temperatures into report
/// records. Meters are processed one after another with a fixed pause in
/// between to stay under the upstream rate limit.
pub struct ReportPipeline<'a, A: ?Sized> {
    api: &'a A,
    cfg: &'a ReportConfig,
}

impl<'a, A> ReportPipeline<'a, A>
where
    A: MeteringApi + ?Sized,
{
    pub fn new(api: &'a A, cfg: &'a ReportConfig) -> Self {
        Self { api, cfg }
    }

    /// Authenticate, list meters, run [`attempt`](Self::attempt) for `window`
    /// and, if that produced no records, once more for the fallback window.
    pub async fn run(&self, window: &DateWindow) -> Result<ReportRun, PipelineError> {
        let token = self.api.authenticate().await.map_err(PipelineError::Auth)?;
        tracing::info!("authenticated with metering API");

        let meters = self
            .api
            .search_meters(&token, &self.cfg.meter_query)
            .await
            .map_err(PipelineError::MeterList)?;
        tracing::info!(meters = meters.len(), query = %self.cfg.meter_query, "found meters");

        let first = self.attempt(&token, &meters, window).await;
        if !first.records.is_empty() {
            return Ok(ReportRun {
                records: first.records,
                skipped_meter_ids: first.skipped_meter_ids,
                window: window.clone(),
                used_fallback: false,
            });
        }

        let fallback = &self.cfg.fallback_window;
        tracing::warn!(
            %window,
            %fallback,
            skipped = first.skipped_meter_ids.len(),
            "no readings collected, retrying with fallback window"
        );
        metrics::counter!("report_fallback_attempts_total").increment(1);

        let second = self.attempt(&token, &meters, fallback).await;
        if second.records.is_empty() {
            tracing::warn!(%fallback, "fallback window produced no readings either, report will be empty");
        }

        Ok(ReportRun {
            records: second.records,
            skipped_meter_ids: second.skipped_meter_ids,
            window: fallback.clone(),
            used_fallback: true,
        })
    }

    /// One sequential pass over `meters`. Never fails: meters without usable
    /// readings are listed in `skipped_meter_ids`.
    pub async fn attempt(&self, token: &AccessToken, meters: &[Meter], window: &DateWindow) -> AttemptOutcome {
        let delay = Duration::from_millis(self.cfg.inter_meter_delay_ms);
        let mut outcome = AttemptOutcome::default();

        for (i, meter) in meters.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.collect_meter(token, meter, window).await {
                Some(records) => {
                    tracing::debug!(
                        meter_id = %meter.meter_id,
                        rows = records.len(),
                        position = i + 1,
                        total = meters.len(),
                        "collected meter readings"
                    );
                    metrics::counter!("report_records_total").increment(records.len() as u64);
                    outcome.records.extend(records);
                }
                None => {
                    metrics::counter!("report_meters_skipped_total").increment(1);
                    outcome.skipped_meter_ids.push(meter.meter_id.clone());
                }
            }
        }

        tracing::info!(
            %window,
            rows = outcome.records.len(),
            skipped = outcome.skipped_meter_ids.len(),
            "meter pass finished"
        );
        outcome
    }

    /// `None` when the meter has nothing to contribute.
    async fn collect_meter(
        &self,
        token: &AccessToken,
        meter: &Meter,
        window: &DateWindow,
    ) -> Option<Vec<OutputRecord>> {
        let properties = self.api.meter_properties(token, &meter.meter_id).await;
        let site = if meter.site_id.is_empty() {
            SiteInfo::default()
        } else {
            self.api.site_info(token, &meter.site_id).await
        };
        let temperatures = self.temperatures_for(token, meter, &properties, window).await;

        let resp = self.api.meter_readings(token, &meter.meter_id, window).await;
        if resp.readings.is_none() {
            tracing::warn!(
                meter_id = %meter.meter_id,
                site_id = %meter.site_id,
                meter_name = %meter.name,
                "no readings in response, skipping meter"
            );
            return None;
        }

        let valid: Vec<_> = resp.valid_readings().collect();
        if valid.is_empty() {
            tracing::warn!(
                meter_id = %meter.meter_id,
                site_id = %meter.site_id,
                meter_name = %meter.name,
                "all readings have null values, skipping meter"
            );
            return None;
        }

        let ctx = MeterContext {
            meter,
            properties: &properties,
            site: &site,
            temperatures: &temperatures,
            cdd_base: self.cfg.cdd_base_temperature,
        };
        Some(valid.into_iter().map(|r| enrich_reading(r, &ctx)).collect())
    }

    /// Missing and denylisted import codes never reach the temperature endpoint.
    async fn temperatures_for(
        &self,
        token: &AccessToken,
        meter: &Meter,
        properties: &MeterProperties,
        window: &DateWindow,
    ) -> TemperatureByDay {
        let Some(import_code) = properties.import_code() else {
            tracing::debug!(meter_id = %meter.meter_id, "meter has no import code, no temperature data");
            return TemperatureByDay::default();
        };

        if self.cfg.temperature_denylist.iter().any(|c| c == &import_code) {
            tracing::info!(
                meter_id = %meter.meter_id,
                import_code = %import_code,
                "import code is denylisted, skipping temperature lookup"
            );
            return TemperatureByDay::default();
        }

        let samples = self.api.temperature_series(token, &import_code, window).await;
        TemperatureByDay::from_samples(&samples)
    }
}
