pub mod report;

pub use report::{AttemptOutcome, ReportPipeline, ReportRun};

use std::path::{Path, PathBuf};

use metering_client::{domain::DateWindow, ApiError, MeteringApi};

use crate::anomaly::AnomalyScanner;
use crate::config::{AnomalyConfig, ReportConfig};
use crate::sinks::{self, PublishError, PublishReceipt, Publisher};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("authentication failed: {0}")]
    Auth(#[source] ApiError),
    #[error("meter search failed: {0}")]
    MeterList(#[source] ApiError),
    #[error("failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),
}

/// What a finished report job produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub rows: usize,
    pub skipped_meter_ids: Vec<String>,
    pub window: DateWindow,
    pub used_fallback: bool,
    pub output_path: PathBuf,
    pub receipt: PublishReceipt,
}

/// What a finished faulty-meter scan produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalySummary {
    pub anomalies: usize,
    pub meters_scanned: usize,
    pub meters_excluded: usize,
    pub output_path: PathBuf,
    pub receipt: PublishReceipt,
}

/// Collect the meter report, write it and publish it.
///
/// Authentication and meter-list failures abort before anything is written.
/// Once collection succeeds a file is always written and published, even
/// when it holds no rows.
pub async fn run_report<A, P>(
    api: &A,
    publisher: &P,
    cfg: &ReportConfig,
    window: &DateWindow,
) -> Result<ReportSummary, PipelineError>
where
    A: MeteringApi + ?Sized,
    P: Publisher + ?Sized,
{
    let run = ReportPipeline::new(api, cfg).run(window).await?;

    let rows = sinks::write_report_csv(&cfg.output_path, &run.records).map_err(|source| {
        PipelineError::Output {
            path: cfg.output_path.clone(),
            source,
        }
    })?;
    if rows == 0 {
        tracing::warn!(
            path = %cfg.output_path.display(),
            window = %run.window,
            "no data collected, writing empty report"
        );
    } else {
        tracing::info!(rows, path = %cfg.output_path.display(), "saved report");
    }

    let receipt = publish_artifact(publisher, &cfg.output_path, &cfg.publish_name).await?;

    Ok(ReportSummary {
        rows,
        skipped_meter_ids: run.skipped_meter_ids,
        window: run.window,
        used_fallback: run.used_fallback,
        output_path: cfg.output_path.clone(),
        receipt,
    })
}

/// Scan meters for abnormal jumps, write the findings and publish them.
pub async fn run_anomaly_scan<A, P>(
    api: &A,
    publisher: &P,
    cfg: &AnomalyConfig,
    window: &DateWindow,
) -> Result<AnomalySummary, PipelineError>
where
    A: MeteringApi + ?Sized,
    P: Publisher + ?Sized,
{
    let scan = AnomalyScanner::new(api, cfg).run(window).await?;

    let anomalies = sinks::write_anomaly_csv(&cfg.output_path, &scan.anomalies).map_err(|source| {
        PipelineError::Output {
            path: cfg.output_path.clone(),
            source,
        }
    })?;
    if anomalies == 0 {
        tracing::info!(path = %cfg.output_path.display(), "no spikes detected");
    } else {
        tracing::warn!(anomalies, path = %cfg.output_path.display(), "faulty meters with abnormal jumps found");
    }

    let receipt = publish_artifact(publisher, &cfg.output_path, &cfg.publish_name).await?;

    Ok(AnomalySummary {
        anomalies,
        meters_scanned: scan.meters_scanned,
        meters_excluded: scan.meters_excluded,
        output_path: cfg.output_path.clone(),
        receipt,
    })
}

async fn publish_artifact<P>(publisher: &P, path: &Path, name: &str) -> Result<PublishReceipt, PipelineError>
where
    P: Publisher + ?Sized,
{
    match publisher.publish(path, name).await {
        Ok(receipt) => {
            tracing::info!(name, location = %receipt.location, "published artifact");
            Ok(receipt)
        }
        Err(e) => {
            metrics::counter!("publish_failures_total").increment(1);
            tracing::error!(name, path = %path.display(), error = %e, "publishing artifact failed");
            Err(e.into())
        }
    }
}
