//! HTTP client shared by the API sources

use marketflow_core::BatchError;
use std::time::Duration;

/// Errors raised while extracting a source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("API key for {0} is not set")]
    MissingAccessKey(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Failed to extract data from API. Status code: {status}. Response: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected payload: {0}")]
    Payload(String),

    #[error("Invalid batch: {0}")]
    Batch(#[from] BatchError),
}

/// Authenticated GET client for one API endpoint
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
}

impl ApiClient {
    /// Create a client; `service` names the API in error messages
    pub fn new(
        service: &str,
        base_url: impl Into<String>,
        access_key: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let access_key = access_key.into();
        if access_key.trim().is_empty() {
            return Err(SourceError::MissingAccessKey(service.to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Http(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            access_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET the endpoint with `access_key` plus the given query parameters
    pub async fn get_json(&self, params: &[(&str, String)]) -> Result<serde_json::Value, SourceError> {
        let mut query: Vec<(&str, &str)> = vec![("access_key", self.access_key.as_str())];
        query.extend(params.iter().map(|(k, v)| (*k, v.as_str())));

        tracing::debug!(url = %self.base_url, "Requesting API payload");

        let response = self
            .http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SourceError::Payload(e.to_string()))
    }
}
