//! Domain types and HTTP client for the C3NTINEL metering API.

pub mod api;
pub mod domain;
pub mod error;

pub use api::{AccessToken, C3Client, ClientSettings, MeteringApi};
pub use error::ApiError;
