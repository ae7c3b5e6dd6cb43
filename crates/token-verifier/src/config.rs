//! Token verifier configuration.
//!
//! Configuration is loaded from environment variables. Nothing here is
//! secret; the project id and key URL are public values.

use crate::auth::keys::DEFAULT_PUBLIC_KEYS_URL;
use crate::http::DEFAULT_HTTP_TIMEOUT;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the Firebase config (inline JSON or a path).
pub const FIREBASE_CONFIG_VAR: &str = "FIREBASE_CONFIG";

/// Token verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Project tokens must be issued for. `None` is allowed at load time;
    /// verification then fails with a configuration error.
    pub project_id: Option<String>,

    /// Key distribution endpoint.
    pub public_keys_url: String,

    /// Timeout for key fetches (default: 10s).
    pub http_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid FIREBASE_CONFIG: {0}")]
    InvalidFirebaseConfig(String),

    #[error("Invalid HTTP timeout configuration: {0}")]
    InvalidHttpTimeout(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let project_id = resolve_project_id(vars)?;

        let public_keys_url = vars
            .get("ID_TOKEN_PUBLIC_KEYS_URL")
            .filter(|url| !url.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_PUBLIC_KEYS_URL.to_string());

        // Parse HTTP timeout with validation
        let http_timeout = if let Some(value_str) = vars.get("ID_TOKEN_HTTP_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidHttpTimeout(format!(
                    "ID_TOKEN_HTTP_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidHttpTimeout(
                    "ID_TOKEN_HTTP_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_HTTP_TIMEOUT
        };

        Ok(Config {
            project_id,
            public_keys_url,
            http_timeout,
        })
    }
}

/// First non-empty of `FIREBASE_CONFIG.projectId`, `GOOGLE_CLOUD_PROJECT`,
/// `GCLOUD_PROJECT`.
fn resolve_project_id(vars: &HashMap<String, String>) -> Result<Option<String>, ConfigError> {
    if let Some(raw) = vars.get(FIREBASE_CONFIG_VAR).filter(|v| !v.trim().is_empty()) {
        if let Some(project_id) = firebase_config_project_id(raw)? {
            return Ok(Some(project_id));
        }
    }

    Ok(["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]
        .iter()
        .filter_map(|name| vars.get(*name))
        .find(|value| !value.is_empty())
        .cloned())
}

/// `projectId` from a Firebase config that is either inline JSON or a path
/// to a JSON file.
fn firebase_config_project_id(raw: &str) -> Result<Option<String>, ConfigError> {
    let trimmed = raw.trim();
    let contents = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        std::fs::read_to_string(trimmed).map_err(|e| {
            ConfigError::InvalidFirebaseConfig(format!("failed to read '{}': {}", trimmed, e))
        })?
    };

    let json: Value = serde_json::from_str(&contents)
        .map_err(|e| ConfigError::InvalidFirebaseConfig(format!("not valid JSON: {}", e)))?;

    Ok(json
        .get("projectId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(ToString::to_string))
}
