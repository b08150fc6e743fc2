/// Errors raised while talking to the upstream metering API.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with status {status}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },
    #[error("invalid response body from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("response from {endpoint} is missing '{field}'")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}
