//! HTTP client seam used to fetch the issuer's signing certificates.
//!
//! The key cache only needs `GET url -> (status, headers, body)`. Production
//! code uses [`reqwest::Client`]; tests can plug in an in-process fake.

use crate::errors::KeyCacheError;
use async_trait::async_trait;
use std::time::Duration;

/// Default timeout for the bundled `reqwest` client.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the bundled `reqwest` client.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,

    /// Response headers as (name, value) pairs.
    pub headers: Vec<(String, String)>,

    /// Response body.
    pub body: String,
}

impl HttpResponse {
    /// Create a response with no headers.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of the named header. Names compare case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal HTTP client abstraction.
///
/// Timeouts and cancellation are the implementation's responsibility; the
/// key cache imposes none of its own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET request and buffer the whole response.
    ///
    /// # Errors
    ///
    /// Returns `KeyCacheError::Transport` if no response could be obtained.
    /// Non-2xx statuses are NOT errors at this layer.
    async fn get(&self, url: &str) -> Result<HttpResponse, KeyCacheError>;
}

#[async_trait]
impl HttpClient for reqwest::Client {
    async fn get(&self, url: &str) -> Result<HttpResponse, KeyCacheError> {
        let response = reqwest::Client::get(self, url).send().await.map_err(|e| {
            tracing::error!(target: "verifier.http", error = %e, "GET request failed");
            KeyCacheError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.text().await.map_err(|e| {
            tracing::error!(target: "verifier.http", error = %e, "Failed to read response body");
            KeyCacheError::Transport(e.to_string())
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Build the `reqwest` client used by the binary.
///
/// Falls back to a default client if the builder fails.
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(target: "verifier.http", error = %e, "Failed to build HTTP client with custom config, using defaults");
            reqwest::Client::new()
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(200, "{}").with_header("Cache-Control", "max-age=60");

        assert_eq!(response.header("cache-control"), Some("max-age=60"));
        assert_eq!(response.header("CACHE-CONTROL"), Some("max-age=60"));
        assert!(response.header("etag").is_none());
    }

    #[tokio::test]
    async fn test_reqwest_client_buffers_status_headers_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/certs"))
            .respond_with(
                ResponseTemplate::new(503)
                    .insert_header("cache-control", "public, max-age=120")
                    .set_body_string("unavailable"),
            )
            .mount(&mock_server)
            .await;

        let client = build_http_client(DEFAULT_HTTP_TIMEOUT);
        let response = HttpClient::get(&client, &format!("{}/certs", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.header("Cache-Control"), Some("public, max-age=120"));
        assert_eq!(response.body, "unavailable");
    }

    #[tokio::test]
    async fn test_reqwest_client_transport_error() {
        let client = build_http_client(Duration::from_secs(1));

        // Port 1 on localhost is never listening.
        let result = HttpClient::get(&client, "http://127.0.0.1:1/certs").await;

        assert!(matches!(result, Err(KeyCacheError::Transport(_))));
    }
}
