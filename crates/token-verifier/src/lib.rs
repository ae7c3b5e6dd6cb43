//! Token Verifier Library
//!
//! Verifies RS256 ID tokens issued by the securetoken service:
//!
//! - [`KeyCache`] fetches the issuer's X.509 signing certificates, honors
//!   the response's `Cache-Control: max-age`, and keeps serving the last
//!   good keys when a refresh fails.
//! - [`TokenVerifier`] checks the signature against every cached key and
//!   validates the claims, producing a [`Token`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = Arc::new(KeyCache::new());
//! let http = Arc::new(build_http_client(DEFAULT_HTTP_TIMEOUT));
//! let verifier = TokenVerifier::new("my-project", cache, http);
//!
//! let token = verifier.verify(&raw_token).await?;
//! println!("uid = {}", token.uid);
//! ```

pub mod auth;
pub mod config;
pub mod errors;
pub mod http;

pub use auth::claims::Token;
pub use auth::keys::{KeyCache, SigningKey, DEFAULT_PUBLIC_KEYS_URL};
pub use auth::verifier::TokenVerifier;
pub use config::{Config, ConfigError};
pub use errors::{KeyCacheError, VerificationError};
pub use http::{build_http_client, HttpClient, HttpResponse, DEFAULT_HTTP_TIMEOUT};
