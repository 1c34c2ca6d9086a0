//! DCA Core
//!
//! The credential and transport core of a dollar-cost-averaging dashboard:
//! an authenticated, versioned credential vault and a resilient client for
//! the exchange and market-data APIs.
//!
//! # Credential Vault
//! ```no_run
//! use dca_core::vault::{KeySource, Vault};
//!
//! fn main() -> anyhow::Result<()> {
//!     let vault = Vault::new(KeySource::from_env().resolve()?);
//!     let sealed = vault.encrypt("key-id.secret")?;
//!     let opened = vault.rotate_if_needed(&sealed.to_string())?;
//!     assert!(opened.rotated.is_none());
//!     Ok(())
//! }
//! ```
//!
//! ## Exchange Example
//! ```no_run
//! use dca_core::bitaroo::{ApiCredential, ExchangeGateway};
//! use rust_decimal_macros::dec;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let gateway = ExchangeGateway::new(ApiCredential::new("key-id.secret"));
//!     let price = gateway.current_price().await?;
//!     println!("BTC/AUD mid: {}", price.mid);
//!     let order = gateway.buy_with_fiat(dec!(100), dec!(1)).await?;
//!     println!("Order placed: {}", order.order_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Market Data Example
//! ```no_run
//! use dca_core::market::MarketDataGateway;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let market = MarketDataGateway::new();
//!     let snapshot = market.market_snapshot(None).await?;
//!     println!("price={} ma200={:?} rsi14={:?}", snapshot.price, snapshot.ma200, snapshot.rsi14);
//!     Ok(())
//! }
//! ```

pub mod bitaroo;
pub mod common;
pub mod config;
pub mod error;
pub mod indicators;
pub mod market;
pub mod vault;

pub use config::AppConfig;
pub use error::{Error, Result};

pub use bitaroo::ExchangeGateway;
pub use common::{ClientError, ErrorKind, ResilientClient, RetryPolicy};
pub use market::MarketDataGateway;
pub use vault::{Ciphertext, KeySource, Keyring, Vault};
