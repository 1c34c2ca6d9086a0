//! Bitaroo exchange gateway
//!
//! BTC/AUD spot trading over the Bitaroo REST API with bearer-token auth.
//! All calls go through [`ResilientClient`](crate::common::ResilientClient)
//! and every response is schema-checked before it is returned.

pub mod auth;
pub mod client;
pub mod types;

pub use auth::ApiCredential;
pub use client::{
    fiat_buy_terms, ExchangeGateway, DEFAULT_BASE_URL, DEFAULT_SLIPPAGE_PERCENT,
    MAX_SLIPPAGE_PERCENT,
};
pub use types::{
    Balance, CreateOrderParams, CreateOrderResponse, CurrentPrice, FiatBuy, Order, OrderFilter,
    OrderId, OrderSide, OrderStatus, OrderType, Orderbook, PriceLevel, TimeInForce, Trade,
};
