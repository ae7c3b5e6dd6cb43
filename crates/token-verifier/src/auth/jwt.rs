//! Compact-serialization parsing for ID tokens.
//!
//! Splits `header.claims.signature`, decodes the header and claim set, and
//! keeps the signing input so the signature can be checked against each
//! cached key. Nothing here is trusted until the signature verifies.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any decoding
//! - `kid` and `alg` are read but not acted on here; claims validation
//!   reports their absence/mismatch with a specific error

use crate::errors::VerificationError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Value};

/// Maximum allowed token size in bytes (8KB).
///
/// Typical ID tokens are 800-1200 bytes. Anything above this is rejected
/// before base64 decoding or JSON parsing. The issuer sets no such limit, so
/// a genuine token carrying very large custom claims is rejected here too.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Protected header fields the verifier cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHeader {
    /// Key ID (`kid`). `None` if absent, empty, or not a string.
    pub key_id: Option<String>,

    /// Algorithm (`alg`). `None` if absent or not a string.
    pub algorithm: Option<String>,
}

/// A token split into its parts. Exists only for the duration of a
/// verification call.
#[derive(Debug, Clone)]
pub struct ParsedToken {
    /// Decoded protected header.
    pub header: TokenHeader,

    /// Raw claim set (JSON object).
    pub claims: Map<String, Value>,

    /// `header.claims` exactly as received; this is what was signed.
    pub signing_input: String,

    /// Signature segment, still base64url encoded.
    pub signature: String,
}

/// Parse a compact-serialized token.
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - wrong segment count, bad base64url, or a header or
///   claim set that is not a JSON object
pub fn parse_token(token: &str) -> Result<ParsedToken, VerificationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "verifier.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(VerificationError::TokenTooLarge {
            max: MAX_JWT_SIZE_BYTES,
        });
    }

    let mut parts = token.split('.');
    let (Some(header_part), Some(claims_part), Some(signature_part), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(
            target: "verifier.jwt",
            parts = token.split('.').count(),
            "Token rejected: invalid compact serialization"
        );
        return Err(VerificationError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let header_json = decode_json_object(header_part, "header")?;
    let claims = decode_json_object(claims_part, "claim set")?;

    if signature_part.is_empty() {
        return Err(VerificationError::MalformedToken(
            "signature segment is empty".to_string(),
        ));
    }
    URL_SAFE_NO_PAD.decode(signature_part).map_err(|e| {
        tracing::debug!(target: "verifier.jwt", error = %e, "Failed to decode signature base64");
        VerificationError::MalformedToken("signature is not valid base64url".to_string())
    })?;

    let header = TokenHeader {
        key_id: header_json
            .get("kid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string),
        algorithm: header_json
            .get("alg")
            .and_then(Value::as_str)
            .map(ToString::to_string),
    };

    Ok(ParsedToken {
        header,
        claims,
        signing_input: format!("{header_part}.{claims_part}"),
        signature: signature_part.to_string(),
    })
}

fn decode_json_object(segment: &str, what: &str) -> Result<Map<String, Value>, VerificationError> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "verifier.jwt", error = %e, segment = what, "Failed to decode base64");
        VerificationError::MalformedToken(format!("{what} is not valid base64url"))
    })?;

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(VerificationError::MalformedToken(format!(
            "{what} is not a JSON object"
        ))),
        Err(e) => {
            tracing::debug!(target: "verifier.jwt", error = %e, segment = what, "Failed to parse JSON");
            Err(VerificationError::MalformedToken(format!(
                "{what} is not valid JSON"
            )))
        }
    }
}
