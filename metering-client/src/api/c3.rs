use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;

use super::{AccessToken, ClientSettings, MeteringApi};
use crate::domain::{DateWindow, Meter, MeterProperties, ReadingsResponse, SiteInfo, TemperatureSample};
use crate::error::ApiError;

/// `reqwest` client for the C3NTINEL v2 API.
pub struct C3Client {
    http: reqwest::Client,
    settings: ClientSettings,
}

impl C3Client {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self { http, settings })
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.settings.base_url, path)
    }

    async fn get_json(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, ApiError> {
        let endpoint = self.url(path);
        let resp = self
            .http
            .get(&endpoint)
            .header(AUTHORIZATION, format!("Bearer {}", token.secret()))
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        read_json(endpoint, resp).await
    }

    pub async fn fetch_readings(
        &self,
        token: &AccessToken,
        meter_id: &str,
        window: &DateWindow,
    ) -> Result<ReadingsResponse, ApiError> {
        let path = format!("meter/{meter_id}/readings");
        let body = self
            .get_json(
                token,
                &path,
                &[("start_date", window.start.as_str()), ("end_date", window.end.as_str())],
            )
            .await?;
        serde_json::from_value(body).map_err(|source| ApiError::Decode {
            endpoint: self.url(&path),
            source,
        })
    }

    pub async fn fetch_properties(
        &self,
        token: &AccessToken,
        meter_id: &str,
    ) -> Result<MeterProperties, ApiError> {
        let path = format!("meter/{meter_id}/properties/current");
        let body = self.get_json(token, &path, &[]).await?;
        serde_json::from_value(body).map_err(|source| ApiError::Decode {
            endpoint: self.url(&path),
            source,
        })
    }

    pub async fn fetch_site_info(&self, token: &AccessToken, site_id: &str) -> Result<SiteInfo, ApiError> {
        let path = format!("site/{site_id}");
        let body = self.get_json(token, &path, &[]).await?;
        serde_json::from_value(body).map_err(|source| ApiError::Decode {
            endpoint: self.url(&path),
            source,
        })
    }

    pub async fn fetch_temperature_series(
        &self,
        token: &AccessToken,
        import_code: &str,
        window: &DateWindow,
    ) -> Result<Vec<TemperatureSample>, ApiError> {
        let body = self
            .get_json(
                token,
                "rawdata",
                &[
                    ("import_code", import_code),
                    ("start_date", window.start.as_str()),
                    ("end_date", window.end.as_str()),
                ],
            )
            .await?;
        Ok(temperature_samples(&body))
    }
}

#[async_trait::async_trait]
impl MeteringApi for C3Client {
    async fn authenticate(&self) -> Result<AccessToken, ApiError> {
        let endpoint = self.settings.auth_url.clone();
        let resp = self
            .http
            .post(&endpoint)
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let body = read_json(endpoint.clone(), resp).await?;
        body.get("access_token")
            .and_then(Value::as_str)
            .map(AccessToken::new)
            .ok_or(ApiError::MissingField {
                endpoint,
                field: "access_token",
            })
    }

    async fn search_meters(&self, token: &AccessToken, query: &str) -> Result<Vec<Meter>, ApiError> {
        let body = self.get_json(token, "meter/search", &[("query", query)]).await?;
        meters_from_search(self.url("meter/search"), body)
    }

    async fn meter_readings(
        &self,
        token: &AccessToken,
        meter_id: &str,
        window: &DateWindow,
    ) -> ReadingsResponse {
        match self.fetch_readings(token, meter_id, window).await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(meter_id, error = %e, "could not fetch meter readings");
                ReadingsResponse::default()
            }
        }
    }

    async fn meter_properties(&self, token: &AccessToken, meter_id: &str) -> MeterProperties {
        match self.fetch_properties(token, meter_id).await {
            Ok(props) => props,
            Err(e) => {
                tracing::warn!(meter_id, error = %e, "could not fetch meter properties");
                MeterProperties::default()
            }
        }
    }

    async fn site_info(&self, token: &AccessToken, site_id: &str) -> SiteInfo {
        match self.fetch_site_info(token, site_id).await {
            Ok(site) => site,
            Err(e) => {
                tracing::warn!(site_id, error = %e, "could not fetch site info");
                SiteInfo::default()
            }
        }
    }

    async fn temperature_series(
        &self,
        token: &AccessToken,
        import_code: &str,
        window: &DateWindow,
    ) -> Vec<TemperatureSample> {
        match self.fetch_temperature_series(token, import_code, window).await {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(import_code, error = %e, "could not fetch raw temperature data");
                Vec::new()
            }
        }
    }
}

async fn read_json(endpoint: String, resp: reqwest::Response) -> Result<Value, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        return Err(ApiError::Status { endpoint, status });
    }

    let bytes = resp.bytes().await.map_err(|source| ApiError::Transport {
        endpoint: endpoint.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| ApiError::Decode { endpoint, source })
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Meters live under `_embedded.meters` in the search response. Entries that
/// do not decode are logged and dropped.
fn meters_from_search(endpoint: String, mut body: Value) -> Result<Vec<Meter>, ApiError> {
    let Some(Value::Array(entries)) = body
        .get_mut("_embedded")
        .and_then(|e| e.get_mut("meters"))
        .map(Value::take)
    else {
        return Err(ApiError::MissingField {
            endpoint,
            field: "_embedded.meters",
        });
    };

    let meters = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Meter>(entry) {
            Ok(meter) => Some(meter),
            Err(e) => {
                tracing::warn!(%endpoint, index, error = %e, "skipping malformed meter entry");
                None
            }
        })
        .collect();
    Ok(meters)
}

fn temperature_samples(body: &Value) -> Vec<TemperatureSample> {
    body.get("readings")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(TemperatureSample::from_raw).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_url_handles_slashes() {
        assert_eq!(
            join_url("https://api.example.com/2/", "/meter/search"),
            "https://api.example.com/2/meter/search"
        );
        assert_eq!(join_url("https://api.example.com/2", "site/9"), "https://api.example.com/2/site/9");
    }

    #[test]
    fn meters_are_read_from_embedded_list() {
        let body = json!({
            "_embedded": {
                "meters": [
                    {"meterId": 1, "siteId": 10, "name": "PWR main"},
                    {"meterId": "2", "siteId": "11", "name": "ENG spare"}
                ]
            },
            "page": {"size": 2}
        });

        let meters = meters_from_search("search".to_string(), body).unwrap();
        assert_eq!(meters.len(), 2);
        assert_eq!(meters[0].meter_id, "1");
        assert_eq!(meters[1].site_id, "11");
    }

    #[test]
    fn malformed_meter_entries_are_skipped() {
        let body = json!({
            "_embedded": {
                "meters": [
                    {"meterId": 1, "siteId": 10, "name": "PWR main"},
                    {"siteId": 11, "name": "orphan without id"},
                    {"meterId": {"nested": true}, "name": "object id"},
                    "not an object",
                    {"meterId": "4", "name": "ENG spare"}
                ]
            }
        });

        let meters = meters_from_search("search".to_string(), body).unwrap();
        let ids: Vec<&str> = meters.iter().map(|m| m.meter_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
    }

    #[test]
    fn missing_embedded_meters_is_an_error() {
        let res = meters_from_search("search".to_string(), json!({"page": {}}));
        assert!(matches!(res, Err(ApiError::MissingField { field: "_embedded.meters", .. })));
    }

    #[test]
    fn temperature_samples_tolerate_missing_readings() {
        assert!(temperature_samples(&json!({})).is_empty());

        let samples = temperature_samples(&json!({
            "readings": [
                {"time": 1717200000000u64, "value": 20.0},
                {"value": 19.0}
            ]
        }));
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].time_ms, None);
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("super-secret");
        assert_eq!(format!("{token:?}"), "AccessToken(***)");
        assert_eq!(token.secret(), "super-secret");
    }

    // Local axum stand-in for the upstream API.

    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        extract::{Form, Query, State},
        http::{header, HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };

    const JUNE_1_MS: u64 = 1_717_200_000_000;

    #[derive(Clone, Default)]
    struct Seen {
        token_form: Arc<Mutex<HashMap<String, String>>>,
        bearer: Arc<Mutex<Vec<String>>>,
        queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    }

    impl Seen {
        fn record(&self, headers: &HeaderMap, query: HashMap<String, String>) {
            if let Some(v) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
                self.bearer.lock().unwrap().push(v.to_string());
            }
            self.queries.lock().unwrap().push(query);
        }
    }

    async fn token(State(seen): State<Seen>, Form(form): Form<HashMap<String, String>>) -> Json<Value> {
        *seen.token_form.lock().unwrap() = form;
        Json(json!({"access_token": "stub-token", "token_type": "bearer"}))
    }

    async fn search(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.record(&headers, q);
        Json(json!({"_embedded": {"meters": [{"meterId": 7, "siteId": 70, "name": "PWR stub"}]}}))
    }

    async fn readings(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.record(&headers, q);
        Json(json!({"readings": [{"time": JUNE_1_MS, "value": 5}]}))
    }

    async fn properties(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.record(&headers, q);
        Json(json!({"importCode": "T-7"}))
    }

    async fn site(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.record(&headers, q);
        Json(json!({"name": "Stub site"}))
    }

    async fn rawdata(
        State(seen): State<Seen>,
        headers: HeaderMap,
        Query(q): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        seen.record(&headers, q);
        Json(json!({"readings": [{"time": JUNE_1_MS, "value": 21.5}]}))
    }

    fn healthy_upstream(seen: Seen) -> Router {
        Router::new()
            .route("/oauth/token", post(token))
            .route("/2/meter/search", get(search))
            .route("/2/meter/:id/readings", get(readings))
            .route("/2/meter/:id/properties/current", get(properties))
            .route("/2/site/:id", get(site))
            .route("/2/rawdata", get(rawdata))
            .with_state(seen)
    }

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app.into_make_service()).await;
        });
        format!("http://{addr}")
    }

    fn settings(base: &str) -> ClientSettings {
        ClientSettings {
            base_url: format!("{base}/2"),
            auth_url: format!("{base}/oauth/token"),
            client_id: "id-1".to_string(),
            client_secret: "secret-1".to_string(),
            request_timeout_secs: 5,
        }
    }

    fn june() -> DateWindow {
        DateWindow::new("2024-06-01T00:00:00.000Z", "2024-07-01T00:00:00.000Z")
    }

    #[tokio::test]
    async fn client_sends_credentials_and_bearer_token() {
        let seen = Seen::default();
        let base = spawn_upstream(healthy_upstream(seen.clone())).await;
        let client = C3Client::new(settings(&base)).unwrap();

        let token = client.authenticate().await.unwrap();
        assert_eq!(token.secret(), "stub-token");
        let form = seen.token_form.lock().unwrap().clone();
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_id"], "id-1");
        assert_eq!(form["client_secret"], "secret-1");

        let meters = client.search_meters(&token, "is:cumulative").await.unwrap();
        assert_eq!(meters.len(), 1);
        assert_eq!(meters[0].meter_id, "7");
        assert_eq!(meters[0].site_id, "70");

        let resp = client.meter_readings(&token, "7", &june()).await;
        assert_eq!(resp.readings.map(|r| r.len()), Some(1));

        let props = client.meter_properties(&token, "7").await;
        assert_eq!(props.import_code().as_deref(), Some("T-7"));

        let site_info = client.site_info(&token, "70").await;
        assert_eq!(site_info.name(), Some("Stub site"));

        let temps = client.temperature_series(&token, "T-7", &june()).await;
        assert_eq!(temps, vec![TemperatureSample::new(Some(JUNE_1_MS as f64), Some(21.5))]);

        let bearer = seen.bearer.lock().unwrap().clone();
        assert_eq!(bearer.len(), 5);
        assert!(bearer.iter().all(|b| b == "Bearer stub-token"));

        let queries = seen.queries.lock().unwrap().clone();
        assert_eq!(queries[0]["query"], "is:cumulative");
        assert_eq!(queries[1]["start_date"], "2024-06-01T00:00:00.000Z");
        assert_eq!(queries[1]["end_date"], "2024-07-01T00:00:00.000Z");
        assert_eq!(queries[4]["import_code"], "T-7");
        assert_eq!(queries[4]["start_date"], "2024-06-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn server_errors_fail_auth_and_search_but_empty_per_entity_lookups() {
        let app = Router::new().fallback(|| async { StatusCode::INTERNAL_SERVER_ERROR });
        let base = spawn_upstream(app).await;
        let client = C3Client::new(settings(&base)).unwrap();
        let token = AccessToken::new("unused");

        assert!(matches!(client.authenticate().await, Err(ApiError::Status { .. })));
        assert!(matches!(
            client.search_meters(&token, "is:cumulative").await,
            Err(ApiError::Status { .. })
        ));

        assert!(client.meter_readings(&token, "7", &june()).await.readings.is_none());
        assert!(client.meter_properties(&token, "7").await.is_empty());
        assert!(client.site_info(&token, "70").await.is_empty());
        assert!(client.temperature_series(&token, "T-7", &june()).await.is_empty());
    }

    #[tokio::test]
    async fn token_response_without_access_token_is_an_error() {
        let app = Router::new().route("/oauth/token", post(|| async { Json(json!({"token_type": "bearer"})) }));
        let base = spawn_upstream(app).await;
        let client = C3Client::new(settings(&base)).unwrap();

        let res = client.authenticate().await;
        assert!(matches!(res, Err(ApiError::MissingField { field: "access_token", .. })));
    }
}
