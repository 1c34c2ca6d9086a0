//! Types and models for the Bitaroo API
//!
//! Request and response shapes for the BTC/AUD spot market. Every response
//! type implements [`ResponseSchema`] so it is checked before use.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::common::schema::{ensure_non_negative, ensure_not_blank, ensure_positive};
use crate::common::{ResponseSchema, SchemaViolation};

/// Decimal places accepted for BTC quantities.
pub const AMOUNT_SCALE: u32 = 8;

/// Decimal places accepted for AUD prices.
pub const PRICE_SCALE: u32 = 2;

/// Format a BTC quantity the way the exchange accepts it.
pub fn format_amount(amount: Decimal) -> String {
    let rounded =
        amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.8}", rounded)
}

/// Format an AUD price the way the exchange accepts it.
pub fn format_price(price: Decimal) -> String {
    let rounded = price.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.2}", rounded)
}

/// Account balance for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Asset symbol (e.g., "AUD", "BTC")
    #[serde(alias = "asset")]
    pub asset_symbol: String,
    /// Free to trade or withdraw
    pub available: Decimal,
    /// Held by open orders
    pub locked: Decimal,
    /// Available plus locked
    #[serde(alias = "total")]
    pub balance: Decimal,
}

impl ResponseSchema for Balance {
    const NAME: &'static str = "balance";

    fn validate(&self) -> Result<(), SchemaViolation> {
        ensure_not_blank("assetSymbol", &self.asset_symbol)?;
        ensure_non_negative("available", self.available)?;
        ensure_non_negative("locked", self.locked)?;
        ensure_non_negative("balance", self.balance)
    }
}

/// One orderbook level, sent as `[price, amount]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn amount(&self) -> Decimal {
        self.1
    }

    fn validate(&self) -> Result<(), SchemaViolation> {
        ensure_positive("price", self.0)?;
        ensure_non_negative("amount", self.1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orderbook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl Orderbook {
    /// Highest bid, regardless of the order levels arrive in.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(PriceLevel::price).max()
    }

    /// Lowest ask, regardless of the order levels arrive in.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(PriceLevel::price).min()
    }
}

impl ResponseSchema for Orderbook {
    const NAME: &'static str = "orderbook";

    fn validate(&self) -> Result<(), SchemaViolation> {
        for (index, level) in self.bids.iter().enumerate() {
            level.validate().map_err(|v| v.within(format!("bids[{}]", index)))?;
        }
        for (index, level) in self.asks.iter().enumerate() {
            level.validate().map_err(|v| v.within(format!("asks[{}]", index)))?;
        }
        Ok(())
    }
}

/// Top of book summary. An empty side reads as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CurrentPrice {
    pub bid: Decimal,
    pub ask: Decimal,
    pub mid: Decimal,
}

impl CurrentPrice {
    pub fn from_orderbook(orderbook: &Orderbook) -> Self {
        let bid = orderbook.best_bid().unwrap_or(Decimal::ZERO);
        let ask = orderbook.best_ask().unwrap_or(Decimal::ZERO);
        // Halve first when the sum would not fit
        let mid = bid
            .checked_add(ask)
            .map(|sum| sum / Decimal::TWO)
            .or_else(|| (bid / Decimal::TWO).checked_add(ask / Decimal::TWO))
            .unwrap_or(Decimal::MAX)
            .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
        Self { bid, ask, mid }
    }
}

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => f.pad("buy"),
            OrderSide::Sell => f.pad("sell"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => f.pad("market"),
            OrderType::Limit => f.pad("limit"),
        }
    }
}

/// Time in force for limit orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
    /// Maker or cancel
    Moc,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Cancelled,
}

/// Exchange-assigned order or trade id.
///
/// Sent either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::str::FromStr for OrderId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(OrderId)
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct NumberOrNumericString;

        impl<'de> Visitor<'de> for NumberOrNumericString {
            type Value = OrderId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a non-negative integer or a numeric string")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(OrderId(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                u64::try_from(v)
                    .map(OrderId)
                    .map_err(|_| E::custom("order id must not be negative"))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                v.parse()
                    .map_err(|_| E::custom("order id string is not numeric"))
            }
        }

        deserializer.deserialize_any(NumberOrNumericString)
    }
}

/// Request to create a new order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderParams {
    pub order_type: OrderType,
    pub side: OrderSide,
    /// BTC quantity, 8 decimal places
    pub amount: String,
    /// AUD limit price, 2 decimal places
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tif: Option<TimeInForce>,
}

impl CreateOrderParams {
    pub fn market(side: OrderSide, amount: Decimal) -> Self {
        Self {
            order_type: OrderType::Market,
            side,
            amount: format_amount(amount),
            price: None,
            tif: None,
        }
    }

    pub fn limit(side: OrderSide, amount: Decimal, price: Decimal, tif: TimeInForce) -> Self {
        Self {
            order_type: OrderType::Limit,
            side,
            amount: format_amount(amount),
            price: Some(format_price(price)),
            tif: Some(tif),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: OrderId,
}

impl ResponseSchema for CreateOrderResponse {
    const NAME: &'static str = "create order response";
}

/// Outcome of a slippage-protected fiat buy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FiatBuy {
    pub order_id: OrderId,
    /// Best ask observed before submitting
    pub ask: Decimal,
    pub limit_price: Decimal,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub order_id: OrderId,
    pub order_type: OrderType,
    pub side: OrderSide,
    pub price: Decimal,
    pub amount: Decimal,
    pub filled: Decimal,
    pub status: OrderStatus,
    pub created_at: String,
}

impl Order {
    pub fn remaining(&self) -> Decimal {
        (self.amount - self.filled).max(Decimal::ZERO)
    }
}

impl ResponseSchema for Order {
    const NAME: &'static str = "order";

    fn validate(&self) -> Result<(), SchemaViolation> {
        ensure_non_negative("price", self.price)?;
        ensure_non_negative("amount", self.amount)?;
        ensure_non_negative("filled", self.filled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub trade_id: OrderId,
    pub order_id: OrderId,
    pub price: Decimal,
    pub amount: Decimal,
    pub fee: Decimal,
    pub side: OrderSide,
    pub timestamp: String,
}

impl ResponseSchema for Trade {
    const NAME: &'static str = "trade";

    fn validate(&self) -> Result<(), SchemaViolation> {
        ensure_positive("price", self.price)?;
        ensure_positive("amount", self.amount)?;
        ensure_non_negative("fee", self.fee)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub success: bool,
}

impl ResponseSchema for CancelResponse {
    const NAME: &'static str = "cancel response";
}

/// Query options for listing orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub active_only: bool,
    pub history_only: bool,
}

impl OrderFilter {
    pub fn active() -> Self {
        Self {
            active_only: true,
            history_only: false,
        }
    }

    pub fn history() -> Self {
        Self {
            active_only: false,
            history_only: true,
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs = Vec::new();
        if self.active_only {
            pairs.push(("activeOnly", "true"));
        }
        if self.history_only {
            pairs.push(("historyOnly", "true"));
        }
        pairs
    }
}
