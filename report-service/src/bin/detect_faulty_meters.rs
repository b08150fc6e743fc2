use anyhow::{bail, Result};
use metering_client::{domain::DateWindow, C3Client};
use report_service::{config::AppConfig, metrics_server, observability, pipeline, sinks::ConfiguredPublisher};

/// Usage: detect_faulty_meters [<start> <end>]
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let window = match args.as_slice() {
        [] => cfg.anomaly.window.clone(),
        [start, end] => DateWindow::new(start.as_str(), end.as_str()),
        _ => bail!("usage: detect_faulty_meters [<start> <end>]"),
    };

    let api = C3Client::new(cfg.api.clone())?;
    let publisher = ConfiguredPublisher::from_config(&cfg.publish)?;

    let summary = pipeline::run_anomaly_scan(&api, &publisher, &cfg.anomaly, &window).await?;
    tracing::info!(
        anomalies = summary.anomalies,
        meters_scanned = summary.meters_scanned,
        meters_excluded = summary.meters_excluded,
        location = %summary.receipt.location,
        "faulty meter scan complete"
    );

    Ok(())
}
