use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "report_service=info,metering_client=info";

/// Install the global `fmt` subscriber. A non-empty, valid `RUST_LOG`
/// replaces the crate defaults entirely.
pub fn init_tracing() {
    let filter = env_filter(std::env::var("RUST_LOG").ok().as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}
