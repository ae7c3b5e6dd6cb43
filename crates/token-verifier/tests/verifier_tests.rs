//! Token verification integration tests.
//!
//! Verifies real RS256 tokens against a mocked key distribution endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use token_verifier::{
    build_http_client, Config, HttpClient, KeyCache, KeyCacheError, TokenVerifier,
    VerificationError,
};
use verifier_test_utils::{
    MockKeyServer, TestKey, TestTokenBuilder, TEST_KEY_1, TEST_KEY_2, TEST_PROJECT_ID,
};

/// A verifier wired to its own mock key endpoint and cache.
struct TestVerifier {
    keys: MockKeyServer,
    cache: Arc<KeyCache>,
    verifier: TokenVerifier,
}

impl TestVerifier {
    async fn start(project_id: &str) -> Self {
        let keys = MockKeyServer::start().await;
        let cache = Arc::new(KeyCache::with_url(keys.keys_url()));
        let verifier = TokenVerifier::new(
            project_id,
            Arc::clone(&cache),
            Arc::new(reqwest::Client::new()),
        );
        Self {
            keys,
            cache,
            verifier,
        }
    }

    async fn serving(keys: &[&TestKey], max_age_secs: u64) -> Self {
        let this = Self::start(TEST_PROJECT_ID).await;
        this.keys.serve_keys(keys, max_age_secs).await;
        this
    }
}

#[tokio::test]
async fn test_valid_token_round_trip() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let now = Utc::now().timestamp();
    let raw = TestTokenBuilder::new("proj1")
        .for_subject("user-42")
        .issued_at(now - 10)
        .expires_at(now + 3600)
        .sign(&TEST_KEY_1);

    let token = ctx.verifier.verify(&raw).await?;

    assert_eq!(token.uid, "user-42");
    assert_eq!(token.subject, "user-42");
    assert_eq!(token.audience, "proj1");
    assert_eq!(token.issuer, "https://securetoken.google.com/proj1");
    assert_eq!(token.issued_at, now - 10);
    assert_eq!(token.expires, now + 3600);
    assert!(token.claims.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_verification_is_idempotent_and_cached() -> Result<()> {
    let ctx = TestVerifier::start(TEST_PROJECT_ID).await;
    ctx.keys.serve_keys_expecting(&[&TEST_KEY_1], 3600, 1).await;
    let raw = TestTokenBuilder::new("proj1").sign(&TEST_KEY_1);

    let first = ctx.verifier.verify(&raw).await?;
    let second = ctx.verifier.verify(&raw).await?;

    assert_eq!(first, second);
    assert!(ctx.cache.is_fresh().await);
    Ok(())
}

#[tokio::test]
async fn test_custom_claims_preserved_and_reserved_names_stripped() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .for_subject("alice")
        .with_claim("uid", json!("legacy-uid"))
        .with_claim("admin", json!(true))
        .with_claim(
            "firebase",
            json!({"sign_in_provider": "password", "identities": {"email": ["a@example.com"]}}),
        )
        .sign(&TEST_KEY_1);

    let token = ctx.verifier.verify(&raw).await?;

    assert_eq!(token.uid, "alice");
    assert_eq!(token.claims.len(), 2);
    assert_eq!(token.claims.get("admin"), Some(&json!(true)));
    assert_eq!(
        token
            .claims
            .get("firebase")
            .and_then(|f| f.get("sign_in_provider")),
        Some(&json!("password"))
    );
    for reserved in ["iss", "aud", "exp", "iat", "sub", "uid"] {
        assert!(!token.claims.contains_key(reserved), "{reserved} leaked");
    }
    Ok(())
}

#[tokio::test]
async fn test_audience_array_uses_first_entry() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .with_audience(json!(["proj1", "other"]))
        .sign(&TEST_KEY_1);

    let token = ctx.verifier.verify(&raw).await?;

    assert_eq!(token.audience, "proj1");
    Ok(())
}

#[tokio::test]
async fn test_hs256_header_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .with_alg("HS256")
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::UnsupportedAlgorithm {
            found: "HS256".to_string()
        }
    );
}

#[tokio::test]
async fn test_custom_token_given() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .as_custom_token()
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(result.unwrap_err(), VerificationError::CustomTokenGiven);
}

#[tokio::test]
async fn test_missing_kid() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .without_kid()
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(result.unwrap_err(), VerificationError::MissingKeyId);
}

#[tokio::test]
async fn test_audience_checked_before_expiry() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let now = Utc::now().timestamp();
    let raw = TestTokenBuilder::new("proj1")
        .with_audience(json!("someone-else"))
        .issued_at(now - 7200)
        .expires_at(now - 3600)
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::AudienceMismatch {
            expected: "proj1".to_string(),
            actual: "someone-else".to_string(),
        }
    );
}

#[tokio::test]
async fn test_token_for_other_project_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj2").sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert!(matches!(
        result,
        Err(VerificationError::AudienceMismatch { .. })
    ));
}

#[tokio::test]
async fn test_wrong_issuer_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .with_issuer("https://evil.example.com/proj1")
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::IssuerMismatch {
            expected: "https://securetoken.google.com/proj1".to_string(),
            actual: "https://evil.example.com/proj1".to_string(),
        }
    );
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let now = Utc::now().timestamp();
    let raw = TestTokenBuilder::new("proj1")
        .issued_at(now - 7200)
        .expires_at(now - 60)
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::TokenExpired { expires: now - 60 }
    );
}

#[tokio::test]
async fn test_future_issued_at_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let future = Utc::now().timestamp() + 600;
    let raw = TestTokenBuilder::new("proj1")
        .issued_at(future)
        .sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::TokenNotYetValid { issued_at: future }
    );
}

#[tokio::test]
async fn test_subject_rules() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;

    let raw = TestTokenBuilder::new("proj1")
        .for_subject("")
        .sign(&TEST_KEY_1);
    assert_eq!(
        ctx.verifier.verify(&raw).await.unwrap_err(),
        VerificationError::EmptySubject
    );

    let raw = TestTokenBuilder::new("proj1")
        .without_claim("sub")
        .sign(&TEST_KEY_1);
    assert_eq!(
        ctx.verifier.verify(&raw).await.unwrap_err(),
        VerificationError::EmptySubject
    );

    let raw = TestTokenBuilder::new("proj1")
        .for_subject(&"a".repeat(129))
        .sign(&TEST_KEY_1);
    assert_eq!(
        ctx.verifier.verify(&raw).await.unwrap_err(),
        VerificationError::SubjectTooLong { max: 128 }
    );

    let raw = TestTokenBuilder::new("proj1")
        .for_subject(&"a".repeat(128))
        .sign(&TEST_KEY_1);
    assert!(ctx.verifier.verify(&raw).await.is_ok());
}

#[tokio::test]
async fn test_unknown_signing_key_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1").sign(&TEST_KEY_2);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::SignatureVerification {
            kid: Some("k2".to_string())
        }
    );
}

#[tokio::test]
async fn test_tampered_claims_rejected() {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let genuine = TestTokenBuilder::new("proj1")
        .for_subject("alice")
        .sign(&TEST_KEY_1);
    let forged_claims = TestTokenBuilder::new("proj1").for_subject("mallory").build();
    let mut parts = genuine.split('.');
    let header = parts.next().unwrap();
    parts.next();
    let signature = parts.next().unwrap();
    let forged = format!(
        "{header}.{}.{signature}",
        verifier_test_utils::encode_segment(&forged_claims)
    );

    let result = ctx.verifier.verify(&forged).await;

    assert!(matches!(
        result,
        Err(VerificationError::SignatureVerification { .. })
    ));
}

#[tokio::test]
async fn test_kid_is_advisory() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1, &TEST_KEY_2], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .with_kid("some-rotated-id")
        .sign(&TEST_KEY_2);

    let token = ctx.verifier.verify(&raw).await?;

    assert_eq!(token.uid, "user-1234");
    Ok(())
}

#[tokio::test]
async fn test_key_rotation_replaces_key_set() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 0).await;
    let old = TestTokenBuilder::new("proj1").sign(&TEST_KEY_1);
    let new = TestTokenBuilder::new("proj1").sign(&TEST_KEY_2);
    ctx.verifier.verify(&old).await?;

    ctx.keys.reset().await;
    ctx.keys.serve_keys(&[&TEST_KEY_2], 3600).await;

    ctx.verifier.verify(&new).await?;
    assert!(matches!(
        ctx.verifier.verify(&old).await,
        Err(VerificationError::SignatureVerification { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_stale_keys_served_when_refresh_fails() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 0).await;
    let raw = TestTokenBuilder::new("proj1").sign(&TEST_KEY_1);
    ctx.verifier.verify(&raw).await?;

    ctx.keys.reset().await;
    ctx.keys.serve_status(500).await;

    let token = ctx.verifier.verify(&raw).await?;

    assert_eq!(token.uid, "user-1234");
    assert!(!ctx.cache.is_fresh().await);
    assert!(ctx.keys.request_count().await >= 1);
    Ok(())
}

#[tokio::test]
async fn test_first_fetch_failure_propagates() {
    let ctx = TestVerifier::start(TEST_PROJECT_ID).await;
    ctx.keys.serve_status(503).await;
    let raw = TestTokenBuilder::new("proj1").sign(&TEST_KEY_1);

    let result = ctx.verifier.verify(&raw).await;

    assert_eq!(
        result.unwrap_err(),
        VerificationError::KeyFetch(KeyCacheError::UnexpectedStatus {
            status: 503,
            body: "key service unavailable".to_string(),
        })
    );
}

#[tokio::test]
async fn test_structural_rejections_do_not_fetch_keys() {
    let ctx = TestVerifier::start(TEST_PROJECT_ID).await;
    ctx.keys.serve_keys_expecting(&[&TEST_KEY_1], 3600, 0).await;

    assert_eq!(
        ctx.verifier.verify("").await.unwrap_err(),
        VerificationError::EmptyToken
    );
    assert!(matches!(
        ctx.verifier.verify("not-a-token").await,
        Err(VerificationError::MalformedToken(_))
    ));
    assert!(matches!(
        ctx.verifier.verify(&"a".repeat(9000)).await,
        Err(VerificationError::TokenTooLarge { .. })
    ));
}

#[tokio::test]
async fn test_verifiers_share_one_cache() -> Result<()> {
    let keys = MockKeyServer::start().await;
    keys.serve_keys_expecting(&[&TEST_KEY_1], 3600, 1).await;
    let cache = Arc::new(KeyCache::with_url(keys.keys_url()));
    let http: Arc<dyn HttpClient> = Arc::new(reqwest::Client::new());
    let proj1 = TokenVerifier::new("proj1", Arc::clone(&cache), Arc::clone(&http));
    let proj2 = TokenVerifier::new("proj2", Arc::clone(&cache), http);

    proj1
        .verify(&TestTokenBuilder::new("proj1").sign(&TEST_KEY_1))
        .await?;
    proj2
        .verify(&TestTokenBuilder::new("proj2").sign(&TEST_KEY_1))
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_verifier_from_config() -> Result<()> {
    let keys = MockKeyServer::start().await;
    keys.serve_keys(&[&TEST_KEY_1], 3600).await;
    let vars: HashMap<String, String> = [
        ("GOOGLE_CLOUD_PROJECT", "proj1".to_string()),
        ("ID_TOKEN_PUBLIC_KEYS_URL", keys.keys_url()),
        ("ID_TOKEN_HTTP_TIMEOUT_SECONDS", "2".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    let config = Config::from_vars(&vars)?;

    let verifier = TokenVerifier::new(
        config.project_id.unwrap_or_default(),
        Arc::new(KeyCache::with_url(config.public_keys_url)),
        Arc::new(build_http_client(config.http_timeout)),
    );
    let token = verifier
        .verify(&TestTokenBuilder::new("proj1").sign(&TEST_KEY_1))
        .await?;

    let json = serde_json::to_value(&token)?;
    assert_eq!(json.get("sub"), Some(&json!("user-1234")));
    assert_eq!(json.get("uid"), Some(&json!("user-1234")));
    assert_eq!(json.get("aud"), Some(&json!("proj1")));
    Ok(())
}

#[tokio::test]
async fn test_debug_output_redacts_subject() -> Result<()> {
    let ctx = TestVerifier::serving(&[&TEST_KEY_1], 3600).await;
    let raw = TestTokenBuilder::new("proj1")
        .for_subject("very-private-user")
        .sign(&TEST_KEY_1);

    let token = ctx.verifier.verify(&raw).await?;
    let debug = format!("{token:?}");

    assert!(!debug.contains("very-private-user"));
    assert!(debug.contains("[REDACTED]"));
    Ok(())
}
