//! Technical indicators
//!
//! Point-in-time indicators over a daily close series, oldest first. Each
//! returns `None` when the series is too short for the requested period.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Period of the long-term moving average used for the DCA signal.
pub const MA_LONG_PERIOD: usize = 200;

/// Default RSI lookback.
pub const RSI_PERIOD: usize = 14;

/// Simple Moving Average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let sum: f64 = values[values.len() - period..].iter().sum();
    Some(sum / period as f64)
}

/// 200-day Simple Moving Average.
pub fn sma_200(values: &[f64]) -> Option<f64> {
    sma(values, MA_LONG_PERIOD)
}

/// Calculate RSI (Relative Strength Index)
///
/// Simple (not smoothed) averages of the gains and losses over the last
/// `period` day-to-day changes. A window with no losses reads 100, flat
/// series included.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let window = &values[values.len() - period - 1..];
    let (gains, losses) = window
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(gains, losses), change| {
            if change > 0.0 {
                (gains + change, losses)
            } else {
                (gains, losses - change)
            }
        });

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// False when no average is available.
pub fn is_price_below_ma(price: f64, ma: Option<f64>) -> bool {
    ma.is_some_and(|ma| price < ma)
}

/// Distance of `price` from the average, in percent of the average.
pub fn price_to_ma_percentage(price: f64, ma: Option<f64>) -> Option<f64> {
    ma.map(|ma| (price - ma) / ma * 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiCondition {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiCondition {
    pub const OVERSOLD_BELOW: f64 = 30.0;
    pub const OVERBOUGHT_ABOVE: f64 = 70.0;

    pub fn classify(rsi: Option<f64>) -> Option<Self> {
        let rsi = rsi?;
        Some(if rsi < Self::OVERSOLD_BELOW {
            RsiCondition::Oversold
        } else if rsi > Self::OVERBOUGHT_ABOVE {
            RsiCondition::Overbought
        } else {
            RsiCondition::Neutral
        })
    }
}

impl fmt::Display for RsiCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RsiCondition::Oversold => "oversold",
            RsiCondition::Neutral => "neutral",
            RsiCondition::Overbought => "overbought",
        };
        f.write_str(label)
    }
}
