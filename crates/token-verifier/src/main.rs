//! verify-id-token
//!
//! Verifies one ID token and prints its claims as JSON.
//!
//! The token is taken from the first argument, or read from stdin when no
//! argument is given. Exit status is 0 on success and 1 on any failure.
//! Logs go to stderr so stdout carries only the verified token.

use anyhow::Context;
use std::process::ExitCode;
use std::sync::Arc;
use token_verifier::{build_http_client, Config, KeyCache, Token, TokenVerifier};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset. Covers the binary's own events and
/// every `verifier.*` target the library logs under.
const DEFAULT_LOG_FILTER: &str = "verify_id_token=info,verifier=info";

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(token) => match serde_json::to_string_pretty(&token) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to serialize verified token: {}", e);
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            error!("Token verification failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run() -> anyhow::Result<Token> {
    let config = Config::from_env().context("failed to load configuration")?;

    info!(
        project_id = ?config.project_id,
        public_keys_url = %config.public_keys_url,
        http_timeout_seconds = config.http_timeout.as_secs(),
        "Configuration loaded"
    );

    let token = read_token().await?;

    let verifier = TokenVerifier::new(
        config.project_id.unwrap_or_default(),
        Arc::new(KeyCache::with_url(config.public_keys_url)),
        Arc::new(build_http_client(config.http_timeout)),
    );

    Ok(verifier.verify(&token).await?)
}

/// Token from the first argument, else all of stdin. Surrounding
/// whitespace is dropped.
async fn read_token() -> anyhow::Result<String> {
    if let Some(arg) = std::env::args().nth(1) {
        return Ok(arg.trim().to_string());
    }

    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("failed to read token from stdin")?;
    Ok(input.trim().to_string())
}
