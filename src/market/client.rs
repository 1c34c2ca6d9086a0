//! Market data gateway
//!
//! Spot price and daily history from a CoinGecko-compatible provider, served
//! through a read-through TTL cache. Only validated values are cached; a
//! failed fetch leaves the cache untouched so the next call goes upstream.

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::types::{MarketChart, MarketSnapshot, SimplePrice};
use crate::bitaroo::ExchangeGateway;
use crate::common::{ApiRequest, ClientError, ClientResult, ResilientClient, RetryPolicy, TtlCache};

/// CoinGecko public API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Default freshness window for cached market data.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

/// Days of daily closes fetched for the snapshot.
pub const HISTORY_DAYS: u32 = 200;

const COIN_ID: &str = "bitcoin";
const VS_CURRENCY: &str = "aud";

/// Cache shared by every gateway built from the same handle.
#[derive(Debug)]
pub struct MarketCache {
    spot: TtlCache<f64>,
    history: TtlCache<Vec<f64>>,
}

impl MarketCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            spot: TtlCache::new(ttl),
            history: TtlCache::new(ttl),
        }
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn crate::common::Clock>) -> Self {
        Self {
            spot: TtlCache::with_clock(ttl, clock.clone()),
            history: TtlCache::with_clock(ttl, clock),
        }
    }

    pub fn clear(&self) {
        self.spot.clear();
        self.history.clear();
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

#[derive(Debug, Clone)]
pub struct MarketDataGateway {
    base_url: String,
    client: ResilientClient,
    policy: RetryPolicy,
    cache: Arc<MarketCache>,
}

impl Default for MarketDataGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataGateway {
    pub fn new() -> Self {
        Self::with_client(ResilientClient::new(), Arc::new(MarketCache::default()))
    }

    pub fn with_client(client: ResilientClient, cache: Arc<MarketCache>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            policy: RetryPolicy::default(),
            cache,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, url::ParseError> {
        Url::parse(base_url)?;
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    /// Current BTC/AUD spot price.
    pub async fn spot_price(&self) -> ClientResult<f64> {
        let request = self.request(
            "/simple/price",
            &[("ids", COIN_ID), ("vs_currencies", VS_CURRENCY)],
        )?;
        let key = request.fingerprint();

        if let Some(price) = self.cache.spot.get(&key) {
            debug!(request = %key, "Cache hit");
            return Ok(price);
        }

        let body: SimplePrice = self.client.execute(&request, &self.policy).await?;
        let price = body.price(COIN_ID, VS_CURRENCY).ok_or_else(|| {
            ClientError::ResponseValidation(format!(
                "simple price: {}.{}: missing",
                COIN_ID, VS_CURRENCY
            ))
        })?;

        self.cache.spot.insert(key, price);
        Ok(price)
    }

    /// Daily BTC/AUD closes for the last `days` days, oldest first.
    pub async fn historical_prices(&self, days: u32) -> ClientResult<Vec<f64>> {
        if days == 0 {
            return Err(ClientError::InvalidRequest("days must be positive".into()));
        }

        let days = days.to_string();
        let request = self.request(
            &format!("/coins/{}/market_chart", COIN_ID),
            &[("vs_currency", VS_CURRENCY), ("days", days.as_str()), ("interval", "daily")],
        )?;
        let key = request.fingerprint();

        if let Some(prices) = self.cache.history.get(&key) {
            debug!(request = %key, "Cache hit");
            return Ok(prices);
        }

        let chart: MarketChart = self.client.execute(&request, &self.policy).await?;
        let prices = chart.closes();

        self.cache.history.insert(key, prices.clone());
        Ok(prices)
    }

    /// Price with MA200 and RSI14.
    ///
    /// The price comes from the exchange midpoint when a gateway is given,
    /// otherwise from the provider's spot price. Price and history are
    /// fetched concurrently and the price is appended to the history before
    /// the indicators are computed.
    pub async fn market_snapshot(
        &self,
        exchange: Option<&ExchangeGateway>,
    ) -> ClientResult<MarketSnapshot> {
        let (price, history) = tokio::try_join!(
            self.current_price(exchange),
            self.historical_prices(HISTORY_DAYS)
        )?;
        Ok(MarketSnapshot::from_history(&history, price, Utc::now().timestamp_millis()))
    }

    async fn current_price(&self, exchange: Option<&ExchangeGateway>) -> ClientResult<f64> {
        let Some(exchange) = exchange else {
            return self.spot_price().await;
        };

        let current = exchange.current_price().await?;
        current
            .mid
            .to_f64()
            .ok_or_else(|| {
                ClientError::ResponseValidation("orderbook: mid not representable".into())
            })
    }

    fn request(&self, path: &str, query: &[(&str, &str)]) -> ClientResult<ApiRequest> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|_| ClientError::InvalidRequest("invalid endpoint url".into()))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(ApiRequest::get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitaroo::ApiCredential;
    use crate::common::testkit::{ManualClock, ScriptedTransport, Step};
    use crate::common::ErrorKind;
    use reqwest::Method;
    use serde_json::json;

    struct Harness {
        transport: Arc<ScriptedTransport>,
        clock: Arc<ManualClock>,
        gateway: MarketDataGateway,
    }

    fn harness() -> Harness {
        let transport = Arc::new(ScriptedTransport::new());
        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(MarketCache::with_clock(Duration::from_secs(60), clock.clone()));
        let client = ResilientClient::with_transport(transport.clone());
        let gateway = MarketDataGateway::with_client(client, cache)
            .with_policy(RetryPolicy::no_retry());
        Harness {
            transport,
            clock,
            gateway,
        }
    }

    fn spot(price: f64) -> Step {
        Step::json(200, json!({"bitcoin": {"aud": price}}))
    }

    fn chart(prices: &[f64]) -> Step {
        let rows: Vec<_> = prices
            .iter()
            .enumerate()
            .map(|(day, price)| json!([day as u64 * 86_400_000, price]))
            .collect();
        Step::json(200, json!({"prices": rows}))
    }

    #[tokio::test]
    async fn test_spot_price_request_shape() {
        let h = harness();
        h.transport.push(spot(101_000.0));

        assert_eq!(h.gateway.spot_price().await.unwrap(), 101_000.0);
        let sent = &h.transport.requests()[0];
        assert_eq!(sent.path, "/api/v3/simple/price");
        assert_eq!(sent.query.as_deref(), Some("ids=bitcoin&vs_currencies=aud"));
        assert_eq!(sent.bearer, None);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let h = harness();
        h.transport.push(spot(101_000.0));
        h.transport.push(spot(102_000.0));

        assert_eq!(h.gateway.spot_price().await.unwrap(), 101_000.0);
        h.clock.advance(Duration::from_secs(59));
        assert_eq!(h.gateway.spot_price().await.unwrap(), 101_000.0);
        assert_eq!(h.transport.attempts(), 1);
    }

    #[tokio::test]
    async fn test_shared_cache_keeps_hosts_apart() {
        let h = harness();
        h.transport.push(spot(101_000.0));
        h.transport.push(spot(55_000.0));

        let client = ResilientClient::with_transport(h.transport.clone());
        let mirror = MarketDataGateway::with_client(client, h.gateway.cache().clone())
            .with_base_url("https://mirror.example.com/api/v3")
            .unwrap()
            .with_policy(RetryPolicy::no_retry());

        assert_eq!(h.gateway.spot_price().await.unwrap(), 101_000.0);
        assert_eq!(mirror.spot_price().await.unwrap(), 55_000.0);
        assert_eq!(h.transport.attempts(), 2);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let h = harness();
        h.transport.push(spot(101_000.0));
        h.transport.push(spot(102_000.0));

        h.gateway.spot_price().await.unwrap();
        h.clock.advance(Duration::from_secs(60));
        assert_eq!(h.gateway.spot_price().await.unwrap(), 102_000.0);
        assert_eq!(h.transport.attempts(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let h = harness();
        h.transport.push(Step::status(503));
        h.transport.push(spot(101_000.0));

        let err = h.gateway.spot_price().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(h.gateway.spot_price().await.unwrap(), 101_000.0);
        assert_eq!(h.transport.attempts(), 2);
    }

    #[tokio::test]
    async fn test_invalid_response_not_cached() {
        let h = harness();
        h.transport.push(Step::json(200, json!({"bitcoin": {"usd": 1.0}})));
        h.transport.push(spot(101_000.0));

        let err = h.gateway.spot_price().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseValidation);
        assert_eq!(h.gateway.spot_price().await.unwrap(), 101_000.0);
    }

    #[tokio::test]
    async fn test_history_keyed_by_days() {
        let h = harness();
        h.transport.push(chart(&[1.0, 2.0]));
        h.transport.push(chart(&[1.0, 2.0, 3.0]));

        assert_eq!(h.gateway.historical_prices(2).await.unwrap(), vec![1.0, 2.0]);
        assert_eq!(h.gateway.historical_prices(3).await.unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(h.gateway.historical_prices(2).await.unwrap(), vec![1.0, 2.0]);
        assert_eq!(h.transport.attempts(), 2);

        let sent = &h.transport.requests()[0];
        assert_eq!(sent.path, "/api/v3/coins/bitcoin/market_chart");
        assert_eq!(sent.query.as_deref(), Some("vs_currency=aud&days=2&interval=daily"));
    }

    #[tokio::test]
    async fn test_history_rejects_zero_days() {
        let h = harness();
        let err = h.gateway.historical_prices(0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(h.transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_from_spot() {
        let h = harness();
        h.transport.route(Method::GET, "/api/v3/simple/price", spot(90.0));
        h.transport.route(
            Method::GET,
            "/api/v3/coins/bitcoin/market_chart",
            chart(&vec![100.0; 200]),
        );

        let snapshot = h.gateway.market_snapshot(None).await.unwrap();
        assert_eq!(snapshot.price, 90.0);
        assert!(snapshot.is_below_ma200());
        assert!(snapshot.rsi14.unwrap() < 1e-9);
        assert!(snapshot.timestamp > 0);
    }

    #[tokio::test]
    async fn test_snapshot_from_exchange_mid() {
        let h = harness();
        h.transport.route(
            Method::GET,
            "/api/v3/coins/bitcoin/market_chart",
            chart(&vec![100.0; 200]),
        );

        let exchange_transport = Arc::new(ScriptedTransport::with_steps([Step::json(
            200,
            json!({"bids": [["110", "1"]], "asks": [["111", "1"]]}),
        )]));
        let exchange = ExchangeGateway::with_client(
            ApiCredential::new("id.secret"),
            ResilientClient::with_transport(exchange_transport.clone()),
        );

        let snapshot = h.gateway.market_snapshot(Some(&exchange)).await.unwrap();
        assert_eq!(snapshot.price, 110.5);
        assert_eq!(exchange_transport.attempts(), 1);
        assert!(h
            .transport
            .requests()
            .iter()
            .all(|request| request.path != "/api/v3/simple/price"));
    }

    #[tokio::test]
    async fn test_snapshot_propagates_history_failure() {
        let h = harness();
        h.transport.route(Method::GET, "/api/v3/simple/price", spot(90.0));
        h.transport.route(
            Method::GET,
            "/api/v3/coins/bitcoin/market_chart",
            Step::status(401),
        );

        let err = h.gateway.market_snapshot(None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
