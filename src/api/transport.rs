//! HTTP transport abstraction.
//!
//! The session executor talks to a [`HttpTransport`] rather than to reqwest
//! directly, so tests can script responses with [`super::mock::MockTransport`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use uuid::Uuid;

use super::envelope::HttpResponse;
use super::error::ApiError;
use super::request::{ApiRequest, Method};
use crate::config::ApiConfig;

/// Correlates client log lines with server-side request logs
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Trait abstracting a single HTTP round trip
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send `request`, attaching `bearer` as an `Authorization` header when given.
    ///
    /// Any HTTP status is a successful round trip; only I/O failures are errors.
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError>;
}

/// Transport backed by a shared reqwest client
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create from the `[api]` config section
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        bearer: Option<&str>,
    ) -> Result<HttpResponse, ApiError> {
        let url = request.url(&self.base_url)?;
        let request_id = Uuid::new_v4();
        debug!(%request_id, method = request.method.as_str(), path = %request.path, "sending request");

        let mut builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Put => self.client.put(url),
        }
        .header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        debug!(%request_id, status, path = %request.path, "received response");
        Ok(HttpResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trimmed() {
        let transport = ReqwestTransport::new("https://example.com/api/v1/", Duration::from_secs(5))
            .unwrap();
        assert_eq!(transport.base_url(), "https://example.com/api/v1");
    }

    #[test]
    fn test_from_config() {
        let transport = ReqwestTransport::from_config(&ApiConfig::default()).unwrap();
        assert_eq!(transport.base_url(), "https://upneeepaaa.com/API/api/v1");
    }
}
