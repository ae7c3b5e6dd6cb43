//! Mock key distribution endpoint for integration tests
//!
//! Wraps a wiremock `MockServer` that publishes `{kid: certificate PEM}`
//! with a `Cache-Control` header, the way the securetoken service does.

use crate::crypto_fixtures::{key_set_json, TestKey};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock server publishes keys under.
pub const TEST_KEYS_PATH: &str = "/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Mock key distribution endpoint.
///
/// Mocks are matched in mount order, so call [`reset`](Self::reset) before
/// changing what the endpoint serves.
///
/// # Example
/// ```rust,ignore
/// let keys = MockKeyServer::start().await;
/// keys.serve_keys(&[&TEST_KEY_1], 3600).await;
/// let cache = KeyCache::with_url(keys.keys_url());
/// ```
pub struct MockKeyServer {
    server: MockServer,
}

impl MockKeyServer {
    /// Start a server on a random local port with nothing mounted.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full URL of the key endpoint.
    pub fn keys_url(&self) -> String {
        format!("{}{}", self.server.uri(), TEST_KEYS_PATH)
    }

    /// Underlying wiremock server, for custom mocks.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Serve `keys` with `Cache-Control: public, max-age=<max_age_secs>`.
    pub async fn serve_keys(&self, keys: &[&TestKey], max_age_secs: u64) {
        Self::keys_mock(keys, max_age_secs).mount(&self.server).await;
    }

    /// Like [`serve_keys`](Self::serve_keys), but fail the test on drop
    /// unless the endpoint is hit exactly `calls` times.
    pub async fn serve_keys_expecting(&self, keys: &[&TestKey], max_age_secs: u64, calls: u64) {
        Self::keys_mock(keys, max_age_secs)
            .expect(calls)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` with no `Cache-Control` header at all.
    pub async fn serve_keys_without_cache_control(&self, keys: &[&TestKey]) {
        Mock::given(method("GET"))
            .and(path(TEST_KEYS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(key_set_json(keys)))
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status` and a short body.
    pub async fn serve_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path(TEST_KEYS_PATH))
            .respond_with(ResponseTemplate::new(status).set_body_string("key service unavailable"))
            .mount(&self.server)
            .await;
    }

    /// Answer every request with a 200 and `body` verbatim.
    pub async fn serve_raw(&self, body: &str, cache_control: &str) {
        Mock::given(method("GET"))
            .and(path(TEST_KEYS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("cache-control", cache_control),
            )
            .mount(&self.server)
            .await;
    }

    /// Remove every mounted mock.
    pub async fn reset(&self) {
        self.server.reset().await;
    }

    /// Number of requests the endpoint has received.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    fn keys_mock(keys: &[&TestKey], max_age_secs: u64) -> Mock {
        Mock::given(method("GET"))
            .and(path(TEST_KEYS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(key_set_json(keys))
                    .insert_header(
                        "cache-control",
                        format!("public, max-age={max_age_secs}, must-revalidate, no-transform")
                            .as_str(),
                    ),
            )
    }
}
