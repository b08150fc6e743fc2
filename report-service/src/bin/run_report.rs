use anyhow::{bail, Result};
use metering_client::{domain::DateWindow, C3Client};
use report_service::{config::AppConfig, metrics_server, observability, pipeline, sinks::ConfiguredPublisher};

/// Usage: run_report [<start> <end>]
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let window = match args.as_slice() {
        [] => cfg.report.window.clone(),
        [start, end] => DateWindow::new(start.as_str(), end.as_str()),
        _ => bail!("usage: run_report [<start> <end>]"),
    };

    let api = C3Client::new(cfg.api.clone())?;
    let publisher = ConfiguredPublisher::from_config(&cfg.publish)?;

    let summary = pipeline::run_report(&api, &publisher, &cfg.report, &window).await?;
    tracing::info!(
        rows = summary.rows,
        skipped = summary.skipped_meter_ids.len(),
        window = %summary.window,
        used_fallback = summary.used_fallback,
        location = %summary.receipt.location,
        "report complete"
    );

    Ok(())
}
