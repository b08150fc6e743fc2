//! Trigger, status and download endpoints for the two jobs.

use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metering_client::{domain::DateWindow, MeteringApi};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::config::AppConfig;
use crate::pipeline;
use crate::sinks::Publisher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub api: Arc<dyn MeteringApi>,
    pub publisher: Arc<dyn Publisher>,
    report_running: Arc<AtomicBool>,
    scan_running: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: AppConfig, api: Arc<dyn MeteringApi>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config: Arc::new(config),
            api,
            publisher,
            report_running: Arc::new(AtomicBool::new(false)),
            scan_running: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Clears a job's running flag when the job task ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl RunningGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WindowParams {
    start: Option<String>,
    end: Option<String>,
}

impl WindowParams {
    fn resolve(self, default: &DateWindow) -> DateWindow {
        DateWindow::new(
            self.start.unwrap_or_else(|| default.start.clone()),
            self.end.unwrap_or_else(|| default.end.clone()),
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/run", post(trigger_report))
        .route("/scan", post(trigger_scan))
        .route("/report.csv", get(download_report))
        .route("/faulty_meters.csv", get(download_faulty_meters))
        .route("/status", get(status))
        .with_state(state)
}

pub async fn serve(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .with_context(|| format!("invalid http bind address {bind_addr}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "report service listening");

    axum::serve(listener, router(state).into_make_service()).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({"status": "C3ntinel report service is running"}))
}

async fn trigger_report(State(state): State<AppState>, Query(params): Query<WindowParams>) -> Response {
    let window = params.resolve(&state.config.report.window);
    let Some(guard) = RunningGuard::acquire(&state.report_running) else {
        return conflict("a report run is already in progress");
    };
    metrics::counter!("http_job_triggers_total", "job" => "report").increment(1);

    let response = accepted("report generation started", &window);
    tokio::spawn(async move {
        let _guard = guard;
        match pipeline::run_report(
            state.api.as_ref(),
            state.publisher.as_ref(),
            &state.config.report,
            &window,
        )
        .await
        {
            Ok(summary) => tracing::info!(
                rows = summary.rows,
                skipped = summary.skipped_meter_ids.len(),
                used_fallback = summary.used_fallback,
                location = %summary.receipt.location,
                "report run finished"
            ),
            Err(e) => tracing::error!(error = %e, "report run failed"),
        }
    });

    response
}

async fn trigger_scan(State(state): State<AppState>, Query(params): Query<WindowParams>) -> Response {
    let window = params.resolve(&state.config.anomaly.window);
    let Some(guard) = RunningGuard::acquire(&state.scan_running) else {
        return conflict("a faulty meter scan is already in progress");
    };
    metrics::counter!("http_job_triggers_total", "job" => "scan").increment(1);

    let response = accepted("faulty meter scan started", &window);
    tokio::spawn(async move {
        let _guard = guard;
        match pipeline::run_anomaly_scan(
            state.api.as_ref(),
            state.publisher.as_ref(),
            &state.config.anomaly,
            &window,
        )
        .await
        {
            Ok(summary) => tracing::info!(
                anomalies = summary.anomalies,
                meters_scanned = summary.meters_scanned,
                location = %summary.receipt.location,
                "faulty meter scan finished"
            ),
            Err(e) => tracing::error!(error = %e, "faulty meter scan failed"),
        }
    });

    response
}

async fn download_report(State(state): State<AppState>) -> Response {
    stream_csv(state.config.report.output_path.clone(), "report not found").await
}

async fn download_faulty_meters(State(state): State<AppState>) -> Response {
    stream_csv(state.config.anomaly.output_path.clone(), "faulty meter report not found").await
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report_exists = tokio::fs::try_exists(&state.config.report.output_path)
        .await
        .unwrap_or(false);
    let anomaly_exists = tokio::fs::try_exists(&state.config.anomaly.output_path)
        .await
        .unwrap_or(false);

    Json(json!({
        "report_exists": report_exists,
        "report_path": state.config.report.output_path.display().to_string(),
        "report_running": state.report_running.load(Ordering::Acquire),
        "faulty_meters_exists": anomaly_exists,
        "faulty_meters_path": state.config.anomaly.output_path.display().to_string(),
        "scan_running": state.scan_running.load(Ordering::Acquire),
    }))
}

async fn stream_csv(path: PathBuf, missing: &str) -> Response {
    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "artifact not available");
            return (StatusCode::NOT_FOUND, Json(json!({"error": missing}))).into_response();
        }
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.csv".to_string());

    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

fn accepted(message: &str, window: &DateWindow) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "message": message,
            "start": window.start,
            "end": window.end,
        })),
    )
        .into_response()
}

fn conflict(message: &str) -> Response {
    (StatusCode::CONFLICT, Json(json!({"error": message}))).into_response()
}
