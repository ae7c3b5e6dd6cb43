//! ID token verification pipeline.
//!
//! parse -> fetch keys (cached) -> RS256 signature against each key ->
//! extract claims -> validate claims -> `Token`.
//!
//! Every step either advances or rejects; nothing is retried within a call.

use crate::auth::claims::{extract_claims, validate_claims, Token};
use crate::auth::jwt::{parse_token, ParsedToken};
use crate::auth::keys::{KeyCache, SigningKey};
use crate::errors::VerificationError;
use crate::http::HttpClient;
use jsonwebtoken::Algorithm;
use std::fmt;
use std::sync::Arc;
use tracing::instrument;

/// Verifies ID tokens for one project.
///
/// Cheap to construct; share the `KeyCache` between verifiers so the whole
/// process fetches keys at most once per expiry.
pub struct TokenVerifier {
    project_id: String,
    key_cache: Arc<KeyCache>,
    http_client: Arc<dyn HttpClient>,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("project_id", &self.project_id)
            .field("key_cache", &self.key_cache)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Create a verifier.
    ///
    /// # Arguments
    ///
    /// * `project_id` - Expected audience; the issuer must be `ISSUER_PREFIX` + this
    /// * `key_cache` - Shared signing-key cache
    /// * `http_client` - Client used when the cache needs refreshing
    pub fn new(
        project_id: impl Into<String>,
        key_cache: Arc<KeyCache>,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            key_cache,
            http_client,
        }
    }

    /// Project id tokens are checked against.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Verify a token and return its claims.
    ///
    /// # Errors
    ///
    /// - `Configuration` - no project id configured
    /// - `EmptyToken` - `token` is empty
    /// - `TokenTooLarge` / `MalformedToken` - structural problems
    /// - `KeyFetch` - keys unavailable and nothing cached
    /// - `SignatureVerification` - no cached key validates the signature
    /// - any claims error, see [`validate_claims_at`](crate::auth::claims::validate_claims_at)
    #[instrument(skip_all)]
    pub async fn verify(&self, token: &str) -> Result<Token, VerificationError> {
        if self.project_id.is_empty() {
            return Err(VerificationError::Configuration(
                "project id not available".to_string(),
            ));
        }
        if token.is_empty() {
            return Err(VerificationError::EmptyToken);
        }

        let parsed = parse_token(token)?;

        let keys = self.key_cache.get_keys(self.http_client.as_ref()).await?;
        let signer = verify_signature(&parsed, &keys)?;
        if parsed.header.key_id.as_deref() != Some(signer.kid()) {
            tracing::debug!(
                target: "verifier.token",
                claimed_kid = ?parsed.header.key_id,
                matched_kid = %signer.kid(),
                "Signature matched a key other than the claimed kid"
            );
        }

        let ParsedToken { header, claims, .. } = parsed;
        let mut verified = extract_claims(claims);
        validate_claims(&header, &verified, &self.project_id)?;

        verified.uid = verified.subject.clone();
        tracing::debug!(target: "verifier.token", "Token verified successfully");
        Ok(verified)
    }
}

/// Find the first key whose RS256 signature check passes.
///
/// Every key is tried in order; the token's `kid` is advisory and is only
/// reported on failure.
///
/// # Errors
///
/// `SignatureVerification` carrying the token's claimed `kid` if no key
/// matches.
pub fn verify_signature<'k>(
    parsed: &ParsedToken,
    keys: &'k [SigningKey],
) -> Result<&'k SigningKey, VerificationError> {
    let message = parsed.signing_input.as_bytes();

    for key in keys {
        match jsonwebtoken::crypto::verify(
            &parsed.signature,
            message,
            key.decoding_key(),
            Algorithm::RS256,
        ) {
            Ok(true) => return Ok(key),
            Ok(false) => {}
            Err(e) => {
                tracing::trace!(target: "verifier.token", kid = %key.kid(), error = %e, "Signature check errored");
            }
        }
    }

    tracing::debug!(
        target: "verifier.token",
        claimed_kid = ?parsed.header.key_id,
        tried_kids = ?keys.iter().map(SigningKey::kid).collect::<Vec<_>>(),
        "No cached key validates the token signature"
    );
    Err(VerificationError::SignatureVerification {
        kid: parsed.header.key_id.clone(),
    })
}
