//! Cache of the issuer's signing keys.
//!
//! The issuer publishes its current signing certificates as a JSON object of
//! key ID to PEM-encoded X.509 certificate. The response's
//! `Cache-Control: max-age=<seconds>` is the only refresh signal.
//!
//! # Concurrency
//!
//! A single async mutex is held across "check expiry -> refresh -> snapshot".
//! Concurrent callers that arrive during a refresh wait for it and then see
//! the new set, so there is at most one fetch per expiry. Snapshots are
//! `Arc<[SigningKey]>` and are never mutated; a refresh replaces the whole
//! set.
//!
//! # Availability
//!
//! A failed refresh never discards keys: if anything is cached, the stale
//! set is served and the error is only logged. The error reaches the caller
//! only when nothing has ever been fetched successfully.

use crate::errors::KeyCacheError;
use crate::http::HttpClient;
use jsonwebtoken::DecodingKey;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::instrument;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;

/// Endpoint publishing the ID token signing certificates.
pub const DEFAULT_PUBLIC_KEYS_URL: &str =
    "https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";

/// Upper bound applied to `max-age` so expiry arithmetic cannot overflow.
const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// An issuer RSA public key and its key ID.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    key: DecodingKey,
}

impl SigningKey {
    /// Key ID the issuer published this certificate under.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Key material for RS256 verification.
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// Result of a successful fetch, before it is installed in the cache.
#[derive(Debug)]
pub struct FetchedKeys {
    /// Keys in key ID order.
    pub keys: Vec<SigningKey>,

    /// How long the keys may be cached.
    pub ttl: Duration,
}

/// Mutable cache state. Only touched with the mutex held.
struct CacheState {
    keys: Arc<[SigningKey]>,

    /// `None` until the first successful refresh.
    expires_at: Option<Instant>,
}

impl CacheState {
    fn is_fresh(&self, now: Instant) -> bool {
        !self.keys.is_empty() && self.expires_at.is_some_and(|expires_at| now < expires_at)
    }

    fn install(&mut self, fetched: FetchedKeys) {
        let now = Instant::now();
        self.keys = fetched.keys.into();
        self.expires_at = Some(now + fetched.ttl.min(MAX_CACHE_TTL));
    }
}

/// Process-wide cache of the issuer's signing keys.
///
/// Construct once at startup and share via `Arc` with every verifier.
pub struct KeyCache {
    keys_url: String,
    state: Mutex<CacheState>,
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCache")
            .field("keys_url", &self.keys_url)
            .finish_non_exhaustive()
    }
}

impl KeyCache {
    /// Create an empty cache for the default key endpoint.
    pub fn new() -> Self {
        Self::with_url(DEFAULT_PUBLIC_KEYS_URL)
    }

    /// Create an empty cache for a custom key endpoint.
    pub fn with_url(keys_url: impl Into<String>) -> Self {
        Self {
            keys_url: keys_url.into(),
            state: Mutex::new(CacheState {
                keys: Arc::from(Vec::new()),
                expires_at: None,
            }),
        }
    }

    /// URL the keys are fetched from.
    pub fn keys_url(&self) -> &str {
        &self.keys_url
    }

    /// Return the current signing keys, refreshing them first if they are
    /// missing or expired.
    ///
    /// # Errors
    ///
    /// Returns the refresh error only when the cache has never been
    /// populated. With keys cached, a failed refresh serves the stale set.
    #[instrument(skip_all, fields(url = %self.keys_url))]
    pub async fn get_keys(
        &self,
        http: &dyn HttpClient,
    ) -> Result<Arc<[SigningKey]>, KeyCacheError> {
        let mut state = self.state.lock().await;

        if state.is_fresh(Instant::now()) {
            tracing::debug!(target: "verifier.keys", key_count = state.keys.len(), "Public key cache hit");
            return Ok(Arc::clone(&state.keys));
        }

        match fetch_keys(http, &self.keys_url).await {
            Ok(fetched) => {
                tracing::info!(
                    target: "verifier.keys",
                    key_count = fetched.keys.len(),
                    ttl_secs = fetched.ttl.as_secs(),
                    "Public key cache refreshed"
                );
                state.install(fetched);
                Ok(Arc::clone(&state.keys))
            }
            // expires_at stays in the past, so the next call retries the fetch.
            Err(e) if !state.keys.is_empty() => {
                tracing::warn!(
                    target: "verifier.keys",
                    error = %e,
                    key_count = state.keys.len(),
                    "Public key refresh failed, serving stale keys"
                );
                Ok(Arc::clone(&state.keys))
            }
            Err(e) => {
                tracing::error!(target: "verifier.keys", error = %e, "Public key fetch failed with empty cache");
                Err(e)
            }
        }
    }

    /// Refresh regardless of expiry.
    ///
    /// # Errors
    ///
    /// Any refresh error is returned and the cached keys are left untouched.
    #[instrument(skip_all, fields(url = %self.keys_url))]
    pub async fn force_refresh(
        &self,
        http: &dyn HttpClient,
    ) -> Result<Arc<[SigningKey]>, KeyCacheError> {
        let mut state = self.state.lock().await;
        let fetched = fetch_keys(http, &self.keys_url).await?;
        tracing::info!(
            target: "verifier.keys",
            key_count = fetched.keys.len(),
            ttl_secs = fetched.ttl.as_secs(),
            "Public key cache force-refreshed"
        );
        state.install(fetched);
        Ok(Arc::clone(&state.keys))
    }

    /// Whether keys are cached and within their TTL.
    pub async fn is_fresh(&self) -> bool {
        self.state.lock().await.is_fresh(Instant::now())
    }
}

/// Fetch and parse the key set. Has no cache side effects; the caller
/// decides what to do with the outcome.
///
/// # Errors
///
/// - `Transport` - the request failed
/// - `UnexpectedStatus` - status other than 200
/// - `InvalidKeySet` / `KeyParse` - body could not be turned into RSA keys
/// - `MissingTtl` - no usable `max-age`
pub async fn fetch_keys(http: &dyn HttpClient, url: &str) -> Result<FetchedKeys, KeyCacheError> {
    tracing::debug!(target: "verifier.keys", url = %url, "Fetching public keys");

    let response = http.get(url).await?;

    if response.status != 200 {
        tracing::error!(
            target: "verifier.keys",
            status = response.status,
            "Public key endpoint returned error"
        );
        return Err(KeyCacheError::UnexpectedStatus {
            status: response.status,
            body: response.body,
        });
    }

    let keys = parse_public_keys(&response.body)?;
    let ttl = find_max_age(response.header("cache-control"))?;

    Ok(FetchedKeys { keys, ttl })
}

/// Parse a `{ kid: pem_certificate }` document. All or nothing: one bad
/// certificate fails the whole set.
///
/// # Errors
///
/// `InvalidKeySet` if the body is not a non-empty JSON object of strings,
/// `KeyParse` if any certificate is unusable.
pub fn parse_public_keys(body: &str) -> Result<Vec<SigningKey>, KeyCacheError> {
    let entries: BTreeMap<String, String> = serde_json::from_str(body).map_err(|e| {
        tracing::error!(target: "verifier.keys", error = %e, "Failed to parse public key response");
        KeyCacheError::InvalidKeySet(e.to_string())
    })?;

    if entries.is_empty() {
        return Err(KeyCacheError::InvalidKeySet(
            "response contains no keys".to_string(),
        ));
    }

    entries
        .iter()
        .map(|(kid, pem)| parse_public_key(kid, pem))
        .collect()
}

/// Extract the RSA public key from one PEM-encoded X.509 certificate.
///
/// # Errors
///
/// `KeyParse` if the PEM is malformed, the certificate cannot be parsed,
/// or its key is not RSA.
pub fn parse_public_key(kid: &str, pem: &str) -> Result<SigningKey, KeyCacheError> {
    let key_error = |reason: String| KeyCacheError::KeyParse {
        kid: kid.to_string(),
        reason,
    };

    let (_, pem) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| key_error(format!("invalid PEM: {e}")))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| key_error(format!("invalid certificate: {e}")))?;

    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => {}
        Ok(_) => return Err(key_error("certificate is not a RSA key".to_string())),
        Err(e) => return Err(key_error(format!("invalid public key: {e}"))),
    }

    Ok(SigningKey {
        kid: kid.to_string(),
        key: DecodingKey::from_rsa_der(&spki.subject_public_key.data),
    })
}

/// Find `max-age=<seconds>` in a `Cache-Control` value.
///
/// Directives are comma-separated and trimmed; the directive name match is
/// case-sensitive and the first one wins, even if its value is invalid.
///
/// # Errors
///
/// `MissingTtl` if the header is absent, has no `max-age`, or the value is
/// not a base-10 integer.
pub fn find_max_age(cache_control: Option<&str>) -> Result<Duration, KeyCacheError> {
    let value = cache_control
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .ok_or(KeyCacheError::MissingTtl)?;

    let seconds: u64 = value.parse().map_err(|e| {
        tracing::error!(target: "verifier.keys", value = %value, error = %e, "Invalid max-age directive");
        KeyCacheError::MissingTtl
    })?;

    Ok(Duration::from_secs(seconds))
}
