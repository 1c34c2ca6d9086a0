//! Market data gateway: cached spot price, daily history and the indicator snapshot.

pub mod client;
pub mod types;

pub use client::{MarketCache, MarketDataGateway, DEFAULT_BASE_URL, DEFAULT_CACHE_TTL, HISTORY_DAYS};
pub use types::{MarketChart, MarketSnapshot, SimplePrice};
