//! In-memory fakes shared by the unit tests.

use std::{
    collections::HashMap,
    path::Path,
    sync::Mutex,
};

use metering_client::{
    domain::{DateWindow, Meter, MeterProperties, ReadingsResponse, SiteInfo, TemperatureSample},
    AccessToken, ApiError, MeteringApi,
};
use serde_json::Value;

use crate::sinks::{PublishError, PublishReceipt, Publisher};

#[derive(Default)]
pub struct FakeApi {
    pub fail_auth: bool,
    pub fail_search: bool,
    pub meters: Vec<Meter>,
    /// Keyed by (meter id, window start).
    pub readings: HashMap<(String, String), ReadingsResponse>,
    pub properties: HashMap<String, MeterProperties>,
    pub sites: HashMap<String, SiteInfo>,
    pub temperatures: HashMap<String, Vec<TemperatureSample>>,
    pub temperature_calls: Mutex<Vec<String>>,
    pub readings_calls: Mutex<Vec<(String, DateWindow)>>,
    pub search_queries: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn with_meter(mut self, meter_id: &str, site_id: &str, name: &str) -> Self {
        self.meters.push(Meter {
            meter_id: meter_id.to_string(),
            site_id: site_id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// `body` is the raw readings endpoint response.
    pub fn with_readings(mut self, meter_id: &str, window_start: &str, body: Value) -> Self {
        let resp: ReadingsResponse = serde_json::from_value(body).unwrap();
        self.readings
            .insert((meter_id.to_string(), window_start.to_string()), resp);
        self
    }

    pub fn with_properties(mut self, meter_id: &str, body: Value) -> Self {
        self.properties
            .insert(meter_id.to_string(), serde_json::from_value(body).unwrap());
        self
    }

    pub fn with_site(mut self, site_id: &str, body: Value) -> Self {
        self.sites
            .insert(site_id.to_string(), serde_json::from_value(body).unwrap());
        self
    }

    pub fn with_temperatures(mut self, import_code: &str, samples: Vec<TemperatureSample>) -> Self {
        self.temperatures.insert(import_code.to_string(), samples);
        self
    }

    pub fn temperature_calls(&self) -> Vec<String> {
        self.temperature_calls.lock().unwrap().clone()
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.search_queries.lock().unwrap().clone()
    }

    pub fn readings_calls(&self) -> Vec<(String, DateWindow)> {
        self.readings_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MeteringApi for FakeApi {
    async fn authenticate(&self) -> Result<AccessToken, ApiError> {
        if self.fail_auth {
            return Err(ApiError::MissingField {
                endpoint: "fake-auth".to_string(),
                field: "access_token",
            });
        }
        Ok(AccessToken::new("fake-token"))
    }

    async fn search_meters(&self, _token: &AccessToken, query: &str) -> Result<Vec<Meter>, ApiError> {
        self.search_queries.lock().unwrap().push(query.to_string());
        if self.fail_search {
            return Err(ApiError::MissingField {
                endpoint: "fake-search".to_string(),
                field: "_embedded.meters",
            });
        }
        Ok(self.meters.clone())
    }

    async fn meter_readings(
        &self,
        _token: &AccessToken,
        meter_id: &str,
        window: &DateWindow,
    ) -> ReadingsResponse {
        self.readings_calls
            .lock()
            .unwrap()
            .push((meter_id.to_string(), window.clone()));
        self.readings
            .get(&(meter_id.to_string(), window.start.clone()))
            .cloned()
            .unwrap_or_default()
    }

    async fn meter_properties(&self, _token: &AccessToken, meter_id: &str) -> MeterProperties {
        self.properties.get(meter_id).cloned().unwrap_or_default()
    }

    async fn site_info(&self, _token: &AccessToken, site_id: &str) -> SiteInfo {
        self.sites.get(site_id).cloned().unwrap_or_default()
    }

    async fn temperature_series(
        &self,
        _token: &AccessToken,
        import_code: &str,
        _window: &DateWindow,
    ) -> Vec<TemperatureSample> {
        self.temperature_calls
            .lock()
            .unwrap()
            .push(import_code.to_string());
        self.temperatures.get(import_code).cloned().unwrap_or_default()
    }
}

/// Records every publish call; optionally fails them.
#[derive(Default)]
pub struct RecordingPublisher {
    pub fail: bool,
    pub published: Mutex<Vec<(String, String)>>,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, path: &Path, name: &str) -> Result<PublishReceipt, PublishError> {
        if self.fail {
            return Err(PublishError::Rejected {
                name: name.to_string(),
                reason: "publisher configured to fail".to_string(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|source| PublishError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.published
            .lock()
            .unwrap()
            .push((name.to_string(), contents));
        Ok(PublishReceipt {
            name: name.to_string(),
            location: format!("memory://{name}"),
        })
    }
}
