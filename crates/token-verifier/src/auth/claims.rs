//! Verified ID token record and claims validation.
//!
//! The `subject`/`uid` fields are redacted in Debug output to prevent
//! exposure in logs.

use crate::auth::jwt::TokenHeader;
use crate::errors::VerificationError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Issuer is this prefix followed by the project id.
pub const ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// Audience carried by custom (minting) tokens. Only used to produce a more
/// helpful error when one is passed in place of an ID token.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
    "https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";

/// Only accepted signing algorithm.
pub const EXPECTED_ALGORITHM: &str = "RS256";

/// Longest subject the issuer will mint, in bytes.
pub const MAX_SUBJECT_LEN: usize = 128;

/// Claim names that never appear in [`Token::claims`].
pub const RESERVED_CLAIMS: [&str; 6] = ["iss", "aud", "exp", "iat", "sub", "uid"];

/// A verified ID token.
///
/// Only produced by successful verification. `uid` always equals `subject`.
#[derive(Clone, PartialEq, Serialize)]
pub struct Token {
    /// `iss` claim.
    #[serde(rename = "iss")]
    pub issuer: String,

    /// `aud` claim (first entry if the token carried an array).
    #[serde(rename = "aud")]
    pub audience: String,

    /// `exp` claim (Unix epoch seconds).
    #[serde(rename = "exp")]
    pub expires: i64,

    /// `iat` claim (Unix epoch seconds).
    #[serde(rename = "iat")]
    pub issued_at: i64,

    /// `sub` claim - redacted in Debug output.
    #[serde(rename = "sub")]
    pub subject: String,

    /// User id; same value as `subject`.
    pub uid: String,

    /// Everything else in the claim set.
    pub claims: Map<String, Value>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expires", &self.expires)
            .field("issued_at", &self.issued_at)
            .field("subject", &"[REDACTED]")
            .field("uid", &"[REDACTED]")
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Split a raw claim set into the standard fields and custom claims.
///
/// Standard claims of the wrong type are treated as absent. `uid` is left
/// empty; it is only filled in once validation succeeds.
pub fn extract_claims(mut claims: Map<String, Value>) -> Token {
    let issuer = claims
        .get("iss")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let audience = match claims.get("aud") {
        Some(Value::String(aud)) => aud.clone(),
        Some(Value::Array(auds)) => auds
            .first()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    };
    let expires = claims.get("exp").map(numeric_date).unwrap_or_default();
    let issued_at = claims.get("iat").map(numeric_date).unwrap_or_default();
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    for name in RESERVED_CLAIMS {
        claims.remove(name);
    }

    Token {
        issuer,
        audience,
        expires,
        issued_at,
        subject,
        uid: String::new(),
        claims,
    }
}

/// NumericDate as whole seconds. Fractions are truncated; non-numbers are 0.
fn numeric_date(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
        .unwrap_or_default()
}

/// Validate header and claims against the expected project.
///
/// # Errors
///
/// See [`validate_claims_at`].
pub fn validate_claims(
    header: &TokenHeader,
    token: &Token,
    project_id: &str,
) -> Result<(), VerificationError> {
    validate_claims_at(header, token, project_id, chrono::Utc::now().timestamp())
}

/// Deterministic claims validation against an explicit `now`.
///
/// Checks run in a fixed order and stop at the first failure, so the error
/// names whatever looks most wrong:
///
/// 1. `kid` present (`CustomTokenGiven` if the audience is the custom-token
///    audience, else `MissingKeyId`)
/// 2. `alg` is RS256
/// 3. audience is the project id
/// 4. issuer is `ISSUER_PREFIX` + project id
/// 5. not issued in the future
/// 6. not expired
/// 7. subject non-empty
/// 8. subject at most `MAX_SUBJECT_LEN` bytes
///
/// # Errors
///
/// The `VerificationError` variant for the first failed check.
pub fn validate_claims_at(
    header: &TokenHeader,
    token: &Token,
    project_id: &str,
    now: i64,
) -> Result<(), VerificationError> {
    let result = check_claims(header, token, project_id, now);
    if let Err(e) = &result {
        tracing::debug!(target: "verifier.claims", error = %e, "Token rejected by claims validation");
    }
    result
}

fn check_claims(
    header: &TokenHeader,
    token: &Token,
    project_id: &str,
    now: i64,
) -> Result<(), VerificationError> {
    if header.key_id.is_none() {
        if token.audience == CUSTOM_TOKEN_AUDIENCE {
            return Err(VerificationError::CustomTokenGiven);
        }
        return Err(VerificationError::MissingKeyId);
    }

    let algorithm = header.algorithm.as_deref().unwrap_or_default();
    if algorithm != EXPECTED_ALGORITHM {
        return Err(VerificationError::UnsupportedAlgorithm {
            found: algorithm.to_string(),
        });
    }

    if token.audience != project_id {
        return Err(VerificationError::AudienceMismatch {
            expected: project_id.to_string(),
            actual: token.audience.clone(),
        });
    }

    let expected_issuer = format!("{ISSUER_PREFIX}{project_id}");
    if token.issuer != expected_issuer {
        return Err(VerificationError::IssuerMismatch {
            expected: expected_issuer,
            actual: token.issuer.clone(),
        });
    }

    if token.issued_at > now {
        return Err(VerificationError::TokenNotYetValid {
            issued_at: token.issued_at,
        });
    }

    if token.expires < now {
        return Err(VerificationError::TokenExpired {
            expires: token.expires,
        });
    }

    if token.subject.is_empty() {
        return Err(VerificationError::EmptySubject);
    }

    if token.subject.len() > MAX_SUBJECT_LEN {
        return Err(VerificationError::SubjectTooLong {
            max: MAX_SUBJECT_LEN,
        });
    }

    Ok(())
}
