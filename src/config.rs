//! Configuration management
//!
//! Handles loading and parsing of the JSON configuration file with
//! environment variable overrides for endpoints and cache freshness.
//! Encryption keys never live in this file; see [`crate::vault::KeySource`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::bitaroo::{self, ApiCredential, ExchangeGateway};
use crate::common::{ResilientClient, RetryPolicy};
use crate::market::{self, MarketCache, MarketDataGateway};

pub const ENV_EXCHANGE_BASE_URL: &str = "DCA_EXCHANGE_BASE_URL";
pub const ENV_MARKET_BASE_URL: &str = "DCA_MARKET_BASE_URL";
pub const ENV_CACHE_TTL_SECS: &str = "DCA_CACHE_TTL_SECS";

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub market: MarketConfig,
}

impl AppConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let mut config: AppConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Config file if given, defaults otherwise; env overrides apply to both.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let mut config = AppConfig::default();
                config.apply_env_overrides()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup(ENV_EXCHANGE_BASE_URL) {
            self.exchange.base_url = url;
        }
        if let Some(url) = lookup(ENV_MARKET_BASE_URL) {
            self.market.base_url = url;
        }
        if let Some(ttl) = lookup(ENV_CACHE_TTL_SECS) {
            self.market.cache_ttl_secs = ttl
                .trim()
                .parse()
                .with_context(|| {
                    format!("{} must be a whole number of seconds", ENV_CACHE_TTL_SECS)
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.exchange.base_url).context("exchange.base_url is not a valid URL")?;
        url::Url::parse(&self.market.base_url).context("market.base_url is not a valid URL")?;
        anyhow::ensure!(
            self.exchange.retry.max_attempts >= 1,
            "exchange.retry.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.market.retry.max_attempts >= 1,
            "market.retry.max_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.market.cache_ttl_secs > 0,
            "market.cache_ttl_secs must be positive"
        );
        Ok(())
    }

    /// Exchange gateway for `credential` over a shared client.
    pub fn exchange_gateway(
        &self,
        credential: ApiCredential,
        client: ResilientClient,
    ) -> Result<ExchangeGateway> {
        let gateway = ExchangeGateway::with_client(credential, client)
            .with_base_url(&self.exchange.base_url)
            .context("Invalid exchange base URL")?
            .with_policy(self.exchange.retry.policy());
        Ok(gateway)
    }

    /// Market data gateway with a fresh cache over a shared client.
    pub fn market_gateway(&self, client: ResilientClient) -> Result<MarketDataGateway> {
        let cache = Arc::new(MarketCache::new(self.market.cache_ttl()));
        let gateway = MarketDataGateway::with_client(client, cache)
            .with_base_url(&self.market.base_url)
            .context("Invalid market data base URL")?
            .with_policy(self.market.retry.policy());
        Ok(gateway)
    }
}

/// Exchange configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub base_url: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            base_url: bitaroo::DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

/// Market data provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub base_url: String,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Freshness window for cached prices
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    market::DEFAULT_CACHE_TTL.as_secs()
}

impl MarketConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        MarketConfig {
            base_url: market::DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// Retry settings as they appear in the file; see [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub attempt_timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Server `Retry-After` hints above this stop retrying
    pub max_retry_after_secs: u64,
    /// Extra statuses treated as transient, e.g. 500
    pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        RetryConfig {
            max_attempts: policy.max_attempts,
            attempt_timeout_ms: policy.attempt_timeout.as_millis() as u64,
            initial_backoff_ms: policy.initial_backoff.as_millis() as u64,
            max_backoff_ms: policy.max_backoff.as_millis() as u64,
            max_retry_after_secs: policy.max_retry_after.as_secs(),
            retryable_statuses: policy.retryable_statuses,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_timeout(Duration::from_millis(self.attempt_timeout_ms))
            .with_initial_backoff(Duration::from_millis(self.initial_backoff_ms))
            .with_max_backoff(Duration::from_millis(self.max_backoff_ms))
            .with_max_retry_after(Duration::from_secs(self.max_retry_after_secs))
            .with_retryable_statuses(self.retryable_statuses.clone())
    }
}
