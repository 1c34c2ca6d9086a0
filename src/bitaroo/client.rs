//! Bitaroo REST gateway
//!
//! Typed operations over the resilient client. Reads are retried under the
//! configured policy; order placement and cancellation are sent as
//! non-idempotent requests so they are only repeated when the exchange
//! provably never saw them.

use reqwest::Method;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{info, warn};
use url::Url;

use super::auth::ApiCredential;
use super::types::{
    Balance, CancelResponse, CreateOrderParams, CreateOrderResponse, CurrentPrice, FiatBuy, Order,
    OrderFilter, OrderId, OrderSide, Orderbook, TimeInForce, Trade, AMOUNT_SCALE, PRICE_SCALE,
};
use crate::common::{ApiRequest, ClientError, ClientResult, ResilientClient, RetryPolicy};
use crate::vault::{Ciphertext, CredentialError, Vault};

/// Bitaroo API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.bitaroo.com.au/v1";

/// Upper bound on the slippage allowance for fiat buys, in percent.
pub const MAX_SLIPPAGE_PERCENT: Decimal = Decimal::TEN;

/// Default slippage allowance for fiat buys, in percent.
pub const DEFAULT_SLIPPAGE_PERCENT: Decimal = Decimal::ONE;

/// Authenticated gateway for one exchange account.
#[derive(Debug, Clone)]
pub struct ExchangeGateway {
    base_url: String,
    credential: ApiCredential,
    client: ResilientClient,
    policy: RetryPolicy,
}

impl ExchangeGateway {
    pub fn new(credential: ApiCredential) -> Self {
        Self::with_client(credential, ResilientClient::new())
    }

    pub fn with_client(credential: ApiCredential, client: ResilientClient) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credential,
            client,
            policy: RetryPolicy::default(),
        }
    }

    /// Open an encrypted credential header and build a gateway for it.
    ///
    /// Also returns the rotated ciphertext when the stored token was not under
    /// the current primary key; the caller is expected to persist it.
    pub fn from_sealed(
        vault: &Vault,
        header: Option<&str>,
        client: ResilientClient,
    ) -> Result<(Self, Option<Ciphertext>), CredentialError> {
        let opened = vault.open_credential_header(header)?;
        let gateway = Self::with_client(ApiCredential::new(opened.plaintext), client);
        Ok((gateway, opened.rotated))
    }

    /// Point at a different deployment, e.g. a staging host.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, url::ParseError> {
        Url::parse(base_url)?;
        self.base_url = base_url.trim_end_matches('/').to_string();
        Ok(self)
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ==================== Account ====================

    /// Get all balances
    pub async fn balances(&self) -> ClientResult<Vec<Balance>> {
        let request = self.request(Method::GET, "/balances", &[])?;
        self.client.execute(&request, &self.policy).await
    }

    /// Balance for one asset, matched case-insensitively.
    pub async fn balance(&self, asset: &str) -> ClientResult<Option<Balance>> {
        let balances = self.balances().await?;
        Ok(balances
            .into_iter()
            .find(|balance| balance.asset_symbol.eq_ignore_ascii_case(asset)))
    }

    /// Probe the credential with a balances read.
    ///
    /// `Ok(false)` when the exchange stayed unreachable through every retry;
    /// an error when the exchange answered and refused.
    pub async fn test_connection(&self) -> ClientResult<bool> {
        match self.balances().await {
            Ok(_) => Ok(true),
            Err(err) if err.is_retryable() => {
                warn!(kind = %err.kind(), "Exchange unreachable during connection test");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    // ==================== Market ====================

    pub async fn orderbook(&self) -> ClientResult<Orderbook> {
        let request = self.request(Method::GET, "/orderbook", &[])?;
        self.client.execute(&request, &self.policy).await
    }

    /// Best bid, best ask and their midpoint.
    pub async fn current_price(&self) -> ClientResult<CurrentPrice> {
        let orderbook = self.orderbook().await?;
        Ok(CurrentPrice::from_orderbook(&orderbook))
    }

    // ==================== Orders ====================

    /// Submit an order as given.
    pub async fn create_order(
        &self,
        params: &CreateOrderParams,
    ) -> ClientResult<CreateOrderResponse> {
        let body = serde_json::to_value(params)
            .map_err(|_| ClientError::InvalidRequest("order parameters not serializable".into()))?;
        let request = self.request(Method::POST, "/orders", &[])?.with_body(body);

        let response: CreateOrderResponse = self.client.execute(&request, &self.policy).await?;
        info!(
            order_id = %response.order_id,
            side = %params.side,
            order_type = %params.order_type,
            amount = %params.amount,
            price = params.price.as_deref().unwrap_or("market"),
            "Order placed"
        );
        Ok(response)
    }

    /// Buy `amount_btc`: a market order, or a GTC limit order at `price`.
    pub async fn create_buy_order(
        &self,
        amount_btc: Decimal,
        price: Option<Decimal>,
    ) -> ClientResult<CreateOrderResponse> {
        if amount_btc <= Decimal::ZERO {
            return Err(ClientError::InvalidRequest("amount must be positive".into()));
        }

        let params = match price {
            Some(price) if price <= Decimal::ZERO => {
                return Err(ClientError::InvalidRequest("price must be positive".into()))
            }
            Some(price) => {
                CreateOrderParams::limit(OrderSide::Buy, amount_btc, price, TimeInForce::Gtc)
            }
            None => CreateOrderParams::market(OrderSide::Buy, amount_btc),
        };
        self.create_order(&params).await
    }

    /// Spend `amount` AUD on BTC with a limit `slippage_percent` above the best ask.
    ///
    /// The order is immediate-or-cancel, so nothing rests on the book if the
    /// market moved past the limit between the orderbook read and the submit.
    pub async fn buy_with_fiat(
        &self,
        amount: Decimal,
        slippage_percent: Decimal,
    ) -> ClientResult<FiatBuy> {
        check_fiat_inputs(amount, slippage_percent)?;

        let orderbook = self.orderbook().await?;
        let ask = orderbook
            .best_ask()
            .ok_or_else(|| ClientError::InvalidRequest("no asks on the orderbook".into()))?;

        let (limit_price, quantity) = fiat_buy_terms(amount, ask, slippage_percent)?;

        let params =
            CreateOrderParams::limit(OrderSide::Buy, quantity, limit_price, TimeInForce::Ioc);
        let response = self.create_order(&params).await?;

        Ok(FiatBuy {
            order_id: response.order_id,
            ask,
            limit_price,
            quantity,
        })
    }

    /// List orders
    pub async fn orders(&self, filter: OrderFilter) -> ClientResult<Vec<Order>> {
        let request = self.request(Method::GET, "/orders", &filter.query_pairs())?;
        self.client.execute(&request, &self.policy).await
    }

    pub async fn order(&self, order_id: OrderId) -> ClientResult<Order> {
        let id = order_id.to_string();
        let request = self.request(Method::GET, "/orders", &[("orderId", id.as_str())])?;
        self.client.execute(&request, &self.policy).await
    }

    /// Cancel an order; returns the exchange's success flag.
    pub async fn cancel_order(&self, order_id: OrderId) -> ClientResult<bool> {
        let path = format!("/orders/{}", order_id);
        let request = self.request(Method::DELETE, &path, &[])?.non_idempotent();

        let response: CancelResponse = self.client.execute(&request, &self.policy).await?;
        info!(order_id = %order_id, success = response.success, "Order cancel requested");
        Ok(response.success)
    }

    pub async fn trades(&self) -> ClientResult<Vec<Trade>> {
        let request = self.request(Method::GET, "/trades", &[])?;
        self.client.execute(&request, &self.policy).await
    }

    fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> ClientResult<ApiRequest> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|_| ClientError::InvalidRequest("invalid endpoint url".into()))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(ApiRequest::new(method, url).with_bearer(self.credential.bearer()))
    }
}

fn check_fiat_inputs(amount: Decimal, slippage_percent: Decimal) -> ClientResult<()> {
    if amount <= Decimal::ZERO {
        return Err(ClientError::InvalidRequest("amount must be positive".into()));
    }
    if slippage_percent < Decimal::ZERO || slippage_percent > MAX_SLIPPAGE_PERCENT {
        return Err(ClientError::InvalidRequest(format!(
            "slippage must be between 0 and {}%",
            MAX_SLIPPAGE_PERCENT
        )));
    }
    Ok(())
}

/// Limit price and BTC quantity for a fiat buy against `ask`.
///
/// The price is rounded half-up to cents; the quantity is computed from that
/// rounded price and truncated so `quantity * limit_price <= amount`.
/// Inputs out of range, prices that round to zero or overflow, and amounts too
/// small for one satoshi are `InvalidRequest`.
pub fn fiat_buy_terms(
    amount: Decimal,
    ask: Decimal,
    slippage_percent: Decimal,
) -> ClientResult<(Decimal, Decimal)> {
    check_fiat_inputs(amount, slippage_percent)?;
    if ask <= Decimal::ZERO {
        return Err(ClientError::InvalidRequest("ask must be positive".into()));
    }

    let factor = Decimal::ONE + slippage_percent / Decimal::ONE_HUNDRED;
    let limit_price = ask
        .checked_mul(factor)
        .ok_or_else(|| ClientError::InvalidRequest("limit price out of range".into()))?
        .round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    if limit_price <= Decimal::ZERO {
        return Err(ClientError::InvalidRequest("limit price rounds to zero".into()));
    }

    let quantity = amount
        .checked_div(limit_price)
        .ok_or_else(|| ClientError::InvalidRequest("quantity out of range".into()))?
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::ToZero);
    if quantity.is_zero() {
        return Err(ClientError::InvalidRequest(
            "amount too small for the minimum quantity".into(),
        ));
    }
    Ok((limit_price, quantity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::testkit::{ScriptedTransport, Step};
    use crate::common::ErrorKind;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn gateway(transport: &Arc<ScriptedTransport>) -> ExchangeGateway {
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_initial_backoff(Duration::from_millis(10));
        ExchangeGateway::with_client(
            ApiCredential::new("key-id.secret"),
            ResilientClient::with_transport(transport.clone()),
        )
        .with_policy(policy)
    }

    fn book() -> serde_json::Value {
        json!({
            "bids": [["99900", "1"], ["100000", "0.5"]],
            "asks": [["100200", "1"], ["100100", "2"]]
        })
    }

    #[test]
    fn test_fiat_buy_terms() {
        let (price, quantity) = fiat_buy_terms(dec!(100), dec!(100100), dec!(1)).unwrap();
        assert_eq!(price, dec!(101101.00));
        assert_eq!(quantity, dec!(0.00098911));
        assert!(price * quantity <= dec!(100));
    }

    #[test]
    fn test_fiat_buy_terms_rounds_price_half_up() {
        let (price, _) = fiat_buy_terms(dec!(100), dec!(100.005), dec!(0)).unwrap();
        assert_eq!(price, dec!(100.01));
    }

    #[test]
    fn test_fiat_buy_terms_rejects_unusable_prices() {
        let huge = Decimal::MAX;
        for (amount, ask, slippage) in [
            (dec!(100), dec!(0.001), dec!(0)),
            (dec!(100), huge, dec!(1)),
            (dec!(100), dec!(0), dec!(1)),
            (dec!(0.000001), dec!(100100), dec!(1)),
        ] {
            let err = fiat_buy_terms(amount, ask, slippage).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "ask {}", ask);
        }
    }

    #[test]
    fn test_fiat_buy_terms_rejects_out_of_range_inputs() {
        for (amount, slippage) in [
            (dec!(100), dec!(-100)),
            (dec!(100), dec!(10.01)),
            (dec!(-5), dec!(1)),
            (dec!(0), dec!(1)),
        ] {
            let err = fiat_buy_terms(amount, dec!(100100), slippage).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
    }

    #[test]
    fn test_from_sealed() {
        use crate::vault::KeySource;

        let key = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        let vault = Vault::new(KeySource::from_pairs([("k1", key)], "k1").resolve().unwrap());
        let token = vault.encrypt("key-id.secret").unwrap().to_string();
        let client = ResilientClient::with_transport(Arc::new(ScriptedTransport::new()));

        let (gateway, rotated) =
            ExchangeGateway::from_sealed(&vault, Some(&token), client.clone()).unwrap();
        assert!(rotated.is_none());
        assert_eq!(gateway.credential.key_id(), Some("key-id"));

        let missing = ExchangeGateway::from_sealed(&vault, None, client.clone()).unwrap_err();
        assert_eq!(missing, CredentialError::Missing);
        let garbage = ExchangeGateway::from_sealed(&vault, Some("v1:k1:zz"), client).unwrap_err();
        assert!(matches!(garbage, CredentialError::Vault(_)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway = gateway(&transport).with_base_url("https://staging.example.com/v1/").unwrap();
        assert_eq!(gateway.base_url(), "https://staging.example.com/v1");
        assert!(gateway.clone().with_base_url("not a url").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_carry_bearer_and_version_prefix() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(200, json!([]))]));
        gateway(&transport).balances().await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].path, "/v1/balances");
        assert_eq!(sent[0].bearer.as_deref(), Some("key-id.secret"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_lookup_is_case_insensitive() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(
            200,
            json!([
                {"assetSymbol": "AUD", "available": "500", "locked": "0", "balance": "500"},
                {"assetSymbol": "BTC", "available": "0.1", "locked": "0", "balance": "0.1"}
            ]),
        )]));

        let btc = gateway(&transport).balance("btc").await.unwrap().unwrap();
        assert_eq!(btc.available, dec!(0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_price_uses_best_levels() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(200, book())]));
        let price = gateway(&transport).current_price().await.unwrap();

        assert_eq!(price.bid, dec!(100000));
        assert_eq!(price.ask, dec!(100100));
        assert_eq!(price.mid, dec!(100050));
    }

    #[tokio::test(start_paused = true)]
    async fn test_current_price_empty_book() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(
            200,
            json!({"bids": [], "asks": []}),
        )]));
        let price = gateway(&transport).current_price().await.unwrap();
        assert_eq!(price.mid, Decimal::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_with_fiat_submits_ioc_limit() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.route(Method::GET, "/v1/orderbook", Step::json(200, book()));
        transport.route(Method::POST, "/v1/orders", Step::json(200, json!({"orderId": "42"})));

        let buy = gateway(&transport).buy_with_fiat(dec!(100), dec!(1)).await.unwrap();
        assert_eq!(buy.order_id, OrderId(42));
        assert_eq!(buy.limit_price, dec!(101101.00));
        assert_eq!(buy.quantity, dec!(0.00098911));

        let post = &transport.requests()[1];
        assert_eq!(
            post.body,
            Some(json!({
                "orderType": "limit",
                "side": "buy",
                "amount": "0.00098911",
                "price": "101101.00",
                "tif": "ioc"
            }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_with_fiat_validates_before_network() {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway = gateway(&transport);

        for (amount, slippage) in [
            (dec!(0), dec!(1)),
            (dec!(-5), dec!(1)),
            (dec!(100), dec!(10.5)),
            (dec!(100), dec!(-1)),
        ] {
            let err = gateway.buy_with_fiat(amount, slippage).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_with_fiat_without_asks() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(
            200,
            json!({"bids": [["100000", "1"]], "asks": []}),
        )]));

        let err = gateway(&transport).buy_with_fiat(dec!(100), dec!(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_with_fiat_rejects_unusable_asks() {
        for (ask, slippage) in [("0.001", dec!(0)), ("79228162514264337593543950335", dec!(1))] {
            let transport = Arc::new(ScriptedTransport::new());
            transport.route(
                Method::GET,
                "/v1/orderbook",
                Step::json(200, json!({"bids": [], "asks": [[ask, "1"]]})),
            );

            let err = gateway(&transport).buy_with_fiat(dec!(100), slippage).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "ask {}", ask);
            assert!(transport.requests().iter().all(|r| r.method != Method::POST));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_placement_not_retried_after_503() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(503),
            Step::json(200, json!({"orderId": 1})),
        ]));

        let err = gateway(&transport)
            .create_buy_order(dec!(0.01), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(transport.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_placement_retried_after_rate_limit() {
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::status(429),
            Step::json(200, json!({"orderId": 9})),
        ]));

        let response = gateway(&transport)
            .create_buy_order(dec!(0.01), Some(dec!(95000)))
            .await
            .unwrap();
        assert_eq!(response.order_id, OrderId(9));
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.requests()[1].body.as_ref().unwrap()["tif"], "gtc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_orders_filter_and_single_order() {
        let order = json!({
            "orderId": 5, "orderType": "limit", "side": "buy", "price": "100000",
            "amount": "0.1", "filled": "0", "status": "open", "createdAt": "2024-01-01T00:00:00Z"
        });
        let transport = Arc::new(ScriptedTransport::with_steps([
            Step::json(200, json!([order.clone()])),
            Step::json(200, order),
        ]));
        let gateway = gateway(&transport);

        let orders = gateway.orders(OrderFilter::active()).await.unwrap();
        assert_eq!(orders.len(), 1);
        let single = gateway.order(OrderId(5)).await.unwrap();
        assert_eq!(single.order_id, OrderId(5));

        let sent = transport.requests();
        assert_eq!(sent[0].query.as_deref(), Some("activeOnly=true"));
        assert_eq!(sent[1].query.as_deref(), Some("orderId=5"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_order() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(
            200,
            json!({"success": true}),
        )]));
        assert!(gateway(&transport).cancel_order(OrderId(77)).await.unwrap());

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::DELETE);
        assert_eq!(sent.path, "/v1/orders/77");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trades() {
        let transport = Arc::new(ScriptedTransport::with_steps([Step::json(
            200,
            json!([{
                "tradeId": 1, "orderId": 5, "price": "100000", "amount": "0.001",
                "fee": "0.1", "side": "buy", "timestamp": "2024-01-01T00:00:00Z"
            }]),
        )]));
        let trades = gateway(&transport).trades().await.unwrap();
        assert_eq!(trades[0].fee, dec!(0.1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_outcomes() {
        let ok = Arc::new(ScriptedTransport::with_steps([Step::json(200, json!([]))]));
        assert!(gateway(&ok).test_connection().await.unwrap());

        let unauthorized = Arc::new(ScriptedTransport::with_steps([Step::status(401)]));
        let err = gateway(&unauthorized).test_connection().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);

        let down = Arc::new(ScriptedTransport::with_steps([
            Step::status(503),
            Step::status(503),
            Step::status(503),
        ]));
        assert!(!gateway(&down).test_connection().await.unwrap());
        assert_eq!(down.attempts(), 3);
    }
}
