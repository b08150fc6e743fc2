use std::sync::Arc;

use anyhow::Result;
use metering_client::C3Client;
use report_service::{
    config::AppConfig,
    metrics_server, observability,
    server::{self, AppState},
    sinks::ConfiguredPublisher,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let api = C3Client::new(cfg.api.clone())?;
    let publisher = ConfiguredPublisher::from_config(&cfg.publish)?;
    let bind_addr = cfg.http.bind_addr.clone();

    let state = AppState::new(cfg, Arc::new(api), Arc::new(publisher));
    server::serve(&bind_addr, state).await
}
