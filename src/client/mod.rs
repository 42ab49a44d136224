use anyhow::{anyhow, Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::storage::entities::MeasurementEntity;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Client for the measurement api. The base url is taken from CLICKSPAN_API
/// for setups where the server listens on a non-default address.
pub struct ApiClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

impl ApiClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("CLICKSPAN_API").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self::new(base_url)
    }

    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: Client::builder()
                .build()
                .context("failed to build HTTP client")?,
        })
    }

    /// Registers one measured duration. The server answers with the stored
    /// measurement including its assigned id and creation time.
    pub async fn register(&self, elapsed_ms: f64) -> Result<MeasurementEntity> {
        let response = self
            .client
            .post(format!("{}/api/register", self.base_url))
            .json(&serde_json::json!({ "elapsedMs": elapsed_ms }))
            .send()
            .await
            .context("failed to reach the measurement server")?;

        Self::decode(response, StatusCode::CREATED).await
    }

    /// Retrieves the full history in insertion order.
    pub async fn list(&self) -> Result<Vec<MeasurementEntity>> {
        let response = self
            .client
            .get(format!("{}/api/registers", self.base_url))
            .send()
            .await
            .context("failed to reach the measurement server")?;

        Self::decode(response, StatusCode::OK).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        expected: StatusCode,
    ) -> Result<T> {
        let status = response.status();
        if status != expected {
            let message = response
                .json::<ApiError>()
                .await
                .map(|e| e.error)
                .unwrap_or_else(|_| format!("server answered with status {status}"));
            return Err(anyhow!(message));
        }

        response
            .json::<T>()
            .await
            .context("failed to decode server response")
    }
}
