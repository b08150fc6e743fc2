pub mod c3;

pub use c3::C3Client;

use serde::Deserialize;

use crate::domain::{DateWindow, Meter, MeterProperties, ReadingsResponse, SiteInfo, TemperatureSample};
use crate::error::ApiError;

/// Bearer token obtained from the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Read-only operations against the upstream metering API.
///
/// Authentication and the meter search are fatal for a run and return errors.
/// The per-entity lookups never fail: transport errors and non-2xx answers
/// come back as empty values, which callers treat as "nothing available".
#[async_trait::async_trait]
pub trait MeteringApi: Send + Sync {
    async fn authenticate(&self) -> Result<AccessToken, ApiError>;

    async fn search_meters(&self, token: &AccessToken, query: &str) -> Result<Vec<Meter>, ApiError>;

    async fn meter_readings(
        &self,
        token: &AccessToken,
        meter_id: &str,
        window: &DateWindow,
    ) -> ReadingsResponse;

    async fn meter_properties(&self, token: &AccessToken, meter_id: &str) -> MeterProperties;

    async fn site_info(&self, token: &AccessToken, site_id: &str) -> SiteInfo;

    async fn temperature_series(
        &self,
        token: &AccessToken,
        import_code: &str,
        window: &DateWindow,
    ) -> Vec<TemperatureSample>;
}

/// Connection settings for [`C3Client`].
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_url: default_auth_url(),
            client_id: String::new(),
            client_secret: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.c3ntinel.com/2".to_string()
}

fn default_auth_url() -> String {
    "https://auth.c3ntinel.com/sso/oauth/token".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}
