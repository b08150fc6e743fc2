use metering_client::{domain::DateWindow, ClientSettings};
use serde::Deserialize;
use std::{fs, path::PathBuf};

/// Upstream requests per meter are paced at least this far apart.
pub const MIN_INTER_METER_DELAY_MS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_query")]
    pub meter_query: String,
    #[serde(default = "default_report_window")]
    pub window: DateWindow,
    /// Queried once more when `window` yields no records at all.
    #[serde(default = "default_fallback_window")]
    pub fallback_window: DateWindow,
    #[serde(default = "default_report_delay_ms")]
    pub inter_meter_delay_ms: u64,
    /// Import codes whose temperature feed is known to be unusable.
    #[serde(default)]
    pub temperature_denylist: Vec<String>,
    #[serde(default = "default_cdd_base")]
    pub cdd_base_temperature: f64,
    #[serde(default = "default_report_output")]
    pub output_path: PathBuf,
    #[serde(default = "default_report_publish_name")]
    pub publish_name: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            meter_query: default_report_query(),
            window: default_report_window(),
            fallback_window: default_fallback_window(),
            inter_meter_delay_ms: default_report_delay_ms(),
            temperature_denylist: Vec::new(),
            cdd_base_temperature: default_cdd_base(),
            output_path: default_report_output(),
            publish_name: default_report_publish_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    #[serde(default = "default_anomaly_query")]
    pub meter_query: String,
    /// A meter is scanned only if its name contains one of these (case-insensitive).
    #[serde(default = "default_name_keywords")]
    pub name_keywords: Vec<String>,
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: f64,
    #[serde(default = "default_anomaly_window")]
    pub window: DateWindow,
    #[serde(default = "default_anomaly_delay_ms")]
    pub inter_meter_delay_ms: u64,
    /// Sort readings by timestamp before comparing neighbours instead of
    /// trusting the upstream order.
    #[serde(default)]
    pub sort_chronologically: bool,
    #[serde(default = "default_anomaly_output")]
    pub output_path: PathBuf,
    #[serde(default = "default_anomaly_publish_name")]
    pub publish_name: String,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            meter_query: default_anomaly_query(),
            name_keywords: default_name_keywords(),
            delta_threshold: default_delta_threshold(),
            window: default_anomaly_window(),
            inter_meter_delay_ms: default_anomaly_delay_ms(),
            sort_chronologically: false,
            output_path: default_anomaly_output(),
            publish_name: default_anomaly_publish_name(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishKind {
    Directory,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    pub kind: PublishKind,
    /// Destination folder for `kind = "directory"`.
    pub directory: Option<PathBuf>,
    /// Upload base URL for `kind = "http"`; files are PUT to `{url}/{name}`.
    pub url: Option<String>,
    pub bearer_token: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            kind: PublishKind::Directory,
            directory: Some(PathBuf::from("published")),
            url: None,
            bearer_token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ClientSettings,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("REPORT_CONFIG").unwrap_or_else(|_| "report-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {path}: {e}"))?;
        let mut cfg = Self::from_toml_str(&contents)?;

        if let Ok(id) = env::var("C3_CLIENT_ID") {
            cfg.api.client_id = id;
        }
        if let Ok(secret) = env::var("C3_CLIENT_SECRET") {
            cfg.api.client_secret = secret;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.report.inter_meter_delay_ms >= MIN_INTER_METER_DELAY_MS,
            "report.inter_meter_delay_ms must be at least {MIN_INTER_METER_DELAY_MS}"
        );
        anyhow::ensure!(
            self.anomaly.inter_meter_delay_ms >= MIN_INTER_METER_DELAY_MS,
            "anomaly.inter_meter_delay_ms must be at least {MIN_INTER_METER_DELAY_MS}"
        );
        anyhow::ensure!(
            !self.anomaly.name_keywords.is_empty(),
            "anomaly.name_keywords must not be empty"
        );
        anyhow::ensure!(
            self.anomaly.delta_threshold.is_finite() && self.anomaly.delta_threshold >= 0.0,
            "anomaly.delta_threshold must be a non-negative number"
        );
        match self.publish.kind {
            PublishKind::Directory => anyhow::ensure!(
                self.publish.directory.is_some(),
                "publish.directory is required for kind = \"directory\""
            ),
            PublishKind::Http => anyhow::ensure!(
                self.publish.url.is_some(),
                "publish.url is required for kind = \"http\""
            ),
        }
        Ok(())
    }
}

fn default_report_query() -> String {
    "is:cumulative".to_string()
}

fn default_report_window() -> DateWindow {
    DateWindow::new("2024-06-01T00:00:00.000Z", "2025-06-01T00:00:00.000Z")
}

fn default_fallback_window() -> DateWindow {
    DateWindow::new("2024-01-01T00:00:00.000Z", "2025-01-01T00:00:00.000Z")
}

fn default_report_delay_ms() -> u64 {
    500
}

fn default_cdd_base() -> f64 {
    18.0
}

fn default_report_output() -> PathBuf {
    PathBuf::from("public/latest_ceentiel_report.csv")
}

fn default_report_publish_name() -> String {
    "latest_ceentiel_report.csv".to_string()
}

fn default_anomaly_query() -> String {
    "PWR or ENG".to_string()
}

fn default_name_keywords() -> Vec<String> {
    vec!["ENG".to_string(), "PWR".to_string()]
}

fn default_delta_threshold() -> f64 {
    1_000_000.0
}

fn default_anomaly_window() -> DateWindow {
    DateWindow::new("2024-06-01T00:00:00.000Z", "2024-07-08T00:00:00.000Z")
}

fn default_anomaly_delay_ms() -> u64 {
    300
}

fn default_anomaly_output() -> PathBuf {
    PathBuf::from("public/faulty_meter_deltas.csv")
}

fn default_anomaly_publish_name() -> String {
    "faulty_meter_deltas.csv".to_string()
}
