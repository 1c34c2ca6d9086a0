//! Market data provider response shapes and the snapshot handed to callers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::common::schema::ensure_finite_positive;
use crate::common::{ResponseSchema, SchemaViolation};
use crate::indicators::{self, RsiCondition};

/// `GET /simple/price` body: `{"bitcoin": {"aud": 101234.5}}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SimplePrice(pub HashMap<String, HashMap<String, f64>>);

impl SimplePrice {
    pub fn price(&self, coin: &str, currency: &str) -> Option<f64> {
        self.0.get(coin)?.get(currency).copied()
    }
}

impl ResponseSchema for SimplePrice {
    const NAME: &'static str = "simple price";

    fn validate(&self) -> Result<(), SchemaViolation> {
        for (coin, quotes) in &self.0 {
            for (currency, price) in quotes {
                ensure_finite_positive(&format!("{}.{}", coin, currency), *price)?;
            }
        }
        Ok(())
    }
}

/// `GET /coins/{id}/market_chart` body; only the price series is used.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketChart {
    /// `[timestamp_ms, price]` pairs, oldest first
    pub prices: Vec<(f64, f64)>,
}

impl MarketChart {
    pub fn closes(&self) -> Vec<f64> {
        self.prices.iter().map(|&(_, price)| price).collect()
    }
}

impl ResponseSchema for MarketChart {
    const NAME: &'static str = "market chart";

    fn validate(&self) -> Result<(), SchemaViolation> {
        for (index, &(_, price)) in self.prices.iter().enumerate() {
            ensure_finite_positive(&format!("prices[{}]", index), price)?;
        }
        Ok(())
    }
}

/// Price plus the indicators the DCA signal is built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshot {
    pub price: f64,
    pub ma200: Option<f64>,
    pub rsi14: Option<f64>,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl MarketSnapshot {
    /// Build from a daily close history and the current price.
    pub fn from_history(history: &[f64], price: f64, timestamp: i64) -> Self {
        let mut series = Vec::with_capacity(history.len() + 1);
        series.extend_from_slice(history);
        series.push(price);

        Self {
            price,
            ma200: indicators::sma_200(&series),
            rsi14: indicators::rsi(&series, indicators::RSI_PERIOD),
            timestamp,
        }
    }

    pub fn is_below_ma200(&self) -> bool {
        indicators::is_price_below_ma(self.price, self.ma200)
    }

    pub fn percent_from_ma200(&self) -> Option<f64> {
        indicators::price_to_ma_percentage(self.price, self.ma200)
    }

    pub fn rsi_condition(&self) -> Option<RsiCondition> {
        RsiCondition::classify(self.rsi14)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::parse_response;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_price() {
        let body: SimplePrice = parse_response(br#"{"bitcoin":{"aud":101234.5}}"#).unwrap();
        assert_eq!(body.price("bitcoin", "aud"), Some(101234.5));
        assert_eq!(body.price("bitcoin", "usd"), None);
    }

    #[test]
    fn test_simple_price_rejects_non_positive() {
        let err = parse_response::<SimplePrice>(br#"{"bitcoin":{"aud":0}}"#).unwrap_err();
        assert!(err.to_string().contains("bitcoin.aud"));
    }

    #[test]
    fn test_market_chart() {
        let chart: MarketChart =
            parse_response(br#"{"prices":[[1700000000000,100.0],[1700086400000,101.5]],"total_volumes":[]}"#)
                .unwrap();
        assert_eq!(chart.closes(), vec![100.0, 101.5]);

        assert!(parse_response::<MarketChart>(br#"{"prices":[[1,-5.0]]}"#).is_err());
        assert!(parse_response::<MarketChart>(br#"{"prices":[[1]]}"#).is_err());
    }

    #[test]
    fn test_snapshot_includes_current_price() {
        let history = vec![100.0; 199];
        let snapshot = MarketSnapshot::from_history(&history, 300.0, 0);

        assert_relative_eq!(snapshot.ma200.unwrap(), 101.0);
        assert_eq!(snapshot.rsi14, Some(100.0));
        assert!(!snapshot.is_below_ma200());
        assert_eq!(snapshot.rsi_condition(), Some(RsiCondition::Overbought));
    }

    #[test]
    fn test_snapshot_short_history() {
        let snapshot = MarketSnapshot::from_history(&[100.0, 99.0], 98.0, 0);
        assert_eq!(snapshot.ma200, None);
        assert_eq!(snapshot.rsi14, None);
        assert_eq!(snapshot.percent_from_ma200(), None);
        assert!(!snapshot.is_below_ma200());
    }
}
