//! Subcommand implementations

pub mod exchange;
pub mod keys;
pub mod market;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::{info, warn};

use dca_core::bitaroo::{auth::ENV_API_KEY, ApiCredential, ExchangeGateway};
use dca_core::vault::Vault;
use dca_core::{AppConfig, ResilientClient};

/// Environment variable holding a sealed API key token.
pub const ENV_SEALED_API_KEY: &str = "BITAROO_SEALED_API_KEY";

/// Where the exchange API key comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct CredentialArgs {
    /// Sealed API key token, opened with the configured encryption keys
    /// (falls back to BITAROO_SEALED_API_KEY, then plaintext BITAROO_API_KEY)
    #[arg(long)]
    pub sealed: Option<String>,
}

pub fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = AppConfig::load(path.as_deref())?;
    if let Some(path) = path {
        info!("Loaded configuration from: {}", path.display());
    }
    Ok(config)
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to start async runtime")
}

/// Attach the user-facing message and kind to a library error.
pub fn describe(err: impl Into<dca_core::Error>) -> anyhow::Error {
    let err = err.into();
    let summary = format!("{} [{}]", err.user_message(), err.kind());
    anyhow::Error::new(err).context(summary)
}

/// Build the exchange gateway from a sealed token or the plaintext env key.
pub fn exchange_gateway(
    config: &AppConfig,
    args: &CredentialArgs,
    client: ResilientClient,
) -> Result<ExchangeGateway> {
    let sealed = args
        .sealed
        .clone()
        .or_else(|| std::env::var(ENV_SEALED_API_KEY).ok())
        .filter(|token| !token.trim().is_empty());

    let Some(token) = sealed else {
        let credential = ApiCredential::from_env().with_context(|| {
            format!(
                "No API key: pass --sealed, or set {} or {}",
                ENV_SEALED_API_KEY, ENV_API_KEY
            )
        })?;
        return config.exchange_gateway(credential, client);
    };

    let vault = Vault::from_env().map_err(describe)?;
    let (gateway, rotated) =
        ExchangeGateway::from_sealed(&vault, Some(&token), client).map_err(describe)?;
    if let Some(rotated) = rotated {
        warn!("Sealed API key is not under the primary key; store the rotated token instead");
        eprintln!("Rotated token: {}", rotated);
    }

    let gateway = gateway
        .with_base_url(&config.exchange.base_url)
        .context("Invalid exchange base URL")?
        .with_policy(config.exchange.retry.policy());
    Ok(gateway)
}
