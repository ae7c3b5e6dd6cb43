//! Error types for ID token verification.
//!
//! Every failure is a distinct variant so callers can branch on *why* a
//! token was rejected. Messages carry expected vs. actual values where that
//! helps diagnose misconfiguration (wrong project, clock skew, expired
//! token), but never the token itself.

use thiserror::Error;

/// Appended to audience/issuer mismatches.
const PROJECT_ID_HINT: &str = "make sure the ID token comes from the same project as the \
     configuration used to verify it";

/// Appended to most claim failures.
const VERIFY_TOKEN_HINT: &str = "see https://firebase.google.com/docs/auth/admin/verify-id-tokens \
     for details on how to retrieve a valid ID token";

/// Errors raised while fetching or parsing the issuer's signing keys.
///
/// When the cache already holds keys these are logged and the stale set is
/// served instead; they only reach the caller when the cache is empty or on
/// an explicit [`force_refresh`](crate::auth::keys::KeyCache::force_refresh).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyCacheError {
    /// The key endpoint could not be reached.
    #[error("failed to contact the public key endpoint: {0}")]
    Transport(String),

    /// The key endpoint answered with something other than 200 OK.
    #[error("invalid response ({status}) while retrieving public keys: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// The body is not a JSON object of key ID to PEM certificate.
    #[error("invalid public key set: {0}")]
    InvalidKeySet(String),

    /// A certificate could not be turned into an RSA public key.
    #[error("failed to parse public key {kid:?}: {reason}")]
    KeyParse { kid: String, reason: String },

    /// No usable `max-age` directive in the `Cache-Control` header.
    #[error("could not find expiry time from HTTP headers")]
    MissingTtl,
}

/// Errors returned by [`TokenVerifier::verify`](crate::auth::verifier::TokenVerifier::verify).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The verifier is not usable as configured (e.g. no project id).
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("ID token must be a non-empty string")]
    EmptyToken,

    /// Token exceeds the size limit and was not decoded.
    ///
    /// This limit is local to the verifier and stricter than the issuer's
    /// rules: a correctly signed token over the limit is still rejected.
    #[error("ID token exceeds the maximum allowed size of {max} bytes")]
    TokenTooLarge { max: usize },

    /// Not a valid three-segment compact serialization.
    #[error("ID token is malformed: {0}")]
    MalformedToken(String),

    /// Signing keys were unavailable and nothing was cached.
    #[error("failed to obtain public keys: {0}")]
    KeyFetch(#[from] KeyCacheError),

    /// No cached key validates the signature.
    #[error("failed to verify token signature. kid = {}", .kid.as_deref().unwrap_or(""))]
    SignatureVerification { kid: Option<String> },

    #[error("expected an ID token but got a custom token")]
    CustomTokenGiven,

    #[error("ID token has no 'kid' header")]
    MissingKeyId,

    #[error(
        "ID token has invalid algorithm; expected 'RS256' but got {found:?}; {}",
        VERIFY_TOKEN_HINT
    )]
    UnsupportedAlgorithm { found: String },

    #[error(
        "ID token has invalid 'aud' (audience) claim; expected {expected:?} but got {actual:?}; \
         {}; {}",
        PROJECT_ID_HINT,
        VERIFY_TOKEN_HINT
    )]
    AudienceMismatch { expected: String, actual: String },

    #[error(
        "ID token has invalid 'iss' (issuer) claim; expected {expected:?} but got {actual:?}; \
         {}; {}",
        PROJECT_ID_HINT,
        VERIFY_TOKEN_HINT
    )]
    IssuerMismatch { expected: String, actual: String },

    #[error("ID token issued at future timestamp: {issued_at}")]
    TokenNotYetValid { issued_at: i64 },

    #[error("ID token has expired at: {expires}")]
    TokenExpired { expires: i64 },

    #[error("ID token has empty 'sub' (subject) claim; {}", VERIFY_TOKEN_HINT)]
    EmptySubject,

    #[error(
        "ID token has a 'sub' (subject) claim longer than {max} characters; {}",
        VERIFY_TOKEN_HINT
    )]
    SubjectTooLong { max: usize },
}

impl VerificationError {
    /// Whether the failure came from the token's claims rather than its
    /// structure, signature, or the key endpoint.
    pub fn is_claims_error(&self) -> bool {
        matches!(
            self,
            VerificationError::CustomTokenGiven
                | VerificationError::MissingKeyId
                | VerificationError::UnsupportedAlgorithm { .. }
                | VerificationError::AudienceMismatch { .. }
                | VerificationError::IssuerMismatch { .. }
                | VerificationError::TokenNotYetValid { .. }
                | VerificationError::TokenExpired { .. }
                | VerificationError::EmptySubject
                | VerificationError::SubjectTooLong { .. }
        )
    }
}
