//! Builder for signed test ID tokens
//!
//! Tokens are assembled by hand rather than through `jsonwebtoken::encode`
//! so tests can put anything in the header (wrong `alg`, missing `kid`)
//! while still carrying a genuine RS256 signature.

use crate::crypto_fixtures::TestKey;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey};
use serde_json::{json, Map, Value};

/// Issuer prefix used by the securetoken service.
pub const TEST_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Audience carried by custom (minting) tokens.
pub const TEST_CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Project id used by default throughout the tests.
pub const TEST_PROJECT_ID: &str = "proj1";

/// Subject used when none is set.
pub const TEST_SUBJECT: &str = "user-1234";

enum KidChoice {
    FromKey,
    Explicit(String),
    Omitted,
}

/// Builder for creating signed test ID tokens
///
/// Defaults produce a token that verifies for `project_id`: issued a minute
/// ago, valid for an hour, `alg` RS256 and `kid` of the signing key.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new("proj1")
///     .for_subject("alice")
///     .with_claim("admin", json!(true))
///     .sign(&TEST_KEY_1);
/// ```
pub struct TestTokenBuilder {
    alg: String,
    kid: KidChoice,
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a builder for a valid token of `project_id`.
    pub fn new(project_id: &str) -> Self {
        let now = Utc::now();
        let claims = json!({
            "iss": format!("{TEST_ISSUER_PREFIX}{project_id}"),
            "aud": project_id,
            "sub": TEST_SUBJECT,
            "iat": (now - Duration::seconds(60)).timestamp(),
            "exp": (now + Duration::seconds(3600)).timestamp(),
        });
        let Value::Object(claims) = claims else {
            unreachable!("json! object literal");
        };
        Self {
            alg: "RS256".to_string(),
            kid: KidChoice::FromKey,
            claims,
        }
    }

    /// Set the header `alg`. The token is still signed with RS256.
    pub fn with_alg(mut self, alg: &str) -> Self {
        self.alg = alg.to_string();
        self
    }

    /// Set the header `kid` instead of using the signing key's.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = KidChoice::Explicit(kid.to_string());
        self
    }

    /// Leave `kid` out of the header.
    pub fn without_kid(mut self) -> Self {
        self.kid = KidChoice::Omitted;
        self
    }

    /// Set the subject.
    pub fn for_subject(self, subject: &str) -> Self {
        self.with_claim("sub", json!(subject))
    }

    /// Set the audience (string or array).
    pub fn with_audience(self, audience: Value) -> Self {
        self.with_claim("aud", audience)
    }

    /// Set the issuer.
    pub fn with_issuer(self, issuer: &str) -> Self {
        self.with_claim("iss", json!(issuer))
    }

    /// Make this look like a custom (minting) token: custom-token audience
    /// and no `kid`.
    pub fn as_custom_token(self) -> Self {
        self.with_audience(json!(TEST_CUSTOM_TOKEN_AUDIENCE))
            .without_kid()
    }

    /// Set the issued-at timestamp.
    pub fn issued_at(self, timestamp: i64) -> Self {
        self.with_claim("iat", json!(timestamp))
    }

    /// Set the expiry timestamp.
    pub fn expires_at(self, timestamp: i64) -> Self {
        self.with_claim("exp", json!(timestamp))
    }

    /// Set expiration in seconds from now (negative for the past).
    pub fn expires_in(self, seconds: i64) -> Self {
        self.expires_at((Utc::now() + Duration::seconds(seconds)).timestamp())
    }

    /// Set or replace any claim.
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim.
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claim set as a JSON value
    pub fn build(&self) -> Value {
        Value::Object(self.claims.clone())
    }

    /// Assemble and sign the token with `key`.
    ///
    /// # Panics
    ///
    /// If the fixture private key cannot be loaded.
    pub fn sign(self, key: &TestKey) -> String {
        let mut header = Map::new();
        header.insert("alg".to_string(), json!(self.alg));
        header.insert("typ".to_string(), json!("JWT"));
        match &self.kid {
            KidChoice::FromKey => {
                header.insert("kid".to_string(), json!(key.kid));
            }
            KidChoice::Explicit(kid) => {
                header.insert("kid".to_string(), json!(kid));
            }
            KidChoice::Omitted => {}
        }

        let signing_input = format!(
            "{}.{}",
            encode_segment(&Value::Object(header)),
            encode_segment(&self.build())
        );
        sign_input(&signing_input, key)
    }
}

/// base64url (no padding) of the JSON serialization.
pub fn encode_segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(value.to_string())
}

/// RS256-sign `signing_input` and return the complete compact token.
///
/// # Panics
///
/// If the fixture private key cannot be loaded.
pub fn sign_input(signing_input: &str, key: &TestKey) -> String {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key_pem.as_bytes())
        .expect("fixture private key must load");
    let signature =
        jsonwebtoken::crypto::sign(signing_input.as_bytes(), &encoding_key, Algorithm::RS256)
            .expect("RS256 signing must succeed");
    format!("{signing_input}.{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto_fixtures::TEST_KEY_1;

    fn decode_segment(segment: &str) -> Value {
        let bytes = URL_SAFE_NO_PAD.decode(segment).expect("base64url");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[test]
    fn test_builder_creates_valid_claims() {
        let claims = TestTokenBuilder::new("proj1").for_subject("alice").build();

        assert_eq!(claims.get("sub"), Some(&json!("alice")));
        assert_eq!(claims.get("aud"), Some(&json!("proj1")));
        assert_eq!(
            claims.get("iss"),
            Some(&json!("https://securetoken.google.com/proj1"))
        );
        let iat = claims.get("iat").and_then(Value::as_i64).expect("iat");
        let exp = claims.get("exp").and_then(Value::as_i64).expect("exp");
        assert!(iat < exp);
    }

    #[test]
    fn test_sign_produces_three_segments_with_key_kid() {
        let token = TestTokenBuilder::new("proj1").sign(&TEST_KEY_1);
        let parts: Vec<&str> = token.split('.').collect();

        assert_eq!(parts.len(), 3);
        let header = decode_segment(parts.first().expect("header"));
        assert_eq!(header.get("alg"), Some(&json!("RS256")));
        assert_eq!(header.get("kid"), Some(&json!("k1")));
    }

    #[test]
    fn test_header_overrides() {
        let token = TestTokenBuilder::new("proj1")
            .with_alg("HS256")
            .without_kid()
            .sign(&TEST_KEY_1);
        let header = decode_segment(token.split('.').next().expect("header"));

        assert_eq!(header.get("alg"), Some(&json!("HS256")));
        assert!(header.get("kid").is_none());
    }

    #[test]
    fn test_without_claim() {
        let claims = TestTokenBuilder::new("proj1").without_claim("sub").build();
        assert!(claims.get("sub").is_none());
    }
}
