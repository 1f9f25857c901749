//! Type definitions shared across the exchange layer.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One closed (or still-forming) candle.
///
/// Prices carry full exchange precision; times are Unix milliseconds.
/// `close_time` strictly increases across successive closed candles of the
/// same (symbol, interval) stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub close_time: i64,
}

impl Candle {
    /// Parse one row of the Binance kline array format:
    /// `[open_time, open, high, low, close, volume, close_time, ...]`.
    pub fn from_kline(row: &[serde_json::Value]) -> Result<Self> {
        anyhow::ensure!(row.len() >= 7, "kline row too short: {} fields", row.len());

        let price = |idx: usize, name: &str| -> Result<Decimal> {
            row[idx]
                .as_str()
                .with_context(|| format!("kline {} is not a string", name))?
                .parse::<Decimal>()
                .with_context(|| format!("kline {} is not a valid decimal", name))
        };

        Ok(Self {
            open_time: row[0].as_i64().context("kline open_time is not an integer")?,
            open: price(1, "open")?,
            high: price(2, "high")?,
            low: price(3, "low")?,
            close: price(4, "close")?,
            close_time: row[6].as_i64().context("kline close_time is not an integer")?,
        })
    }
}

/// Candle granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHours,
}

impl Interval {
    /// Binance wire string ("1m", "15m", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMinute => "1m",
            Interval::FiveMinutes => "5m",
            Interval::FifteenMinutes => "15m",
            Interval::OneHour => "1h",
            Interval::FourHours => "4h",
        }
    }

    /// Alert label ("M1", "M15", "H4").
    pub fn label(&self) -> &'static str {
        match self {
            Interval::OneMinute => "M1",
            Interval::FiveMinutes => "M5",
            Interval::FifteenMinutes => "M15",
            Interval::OneHour => "H1",
            Interval::FourHours => "H4",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Futures position information (subset of positionRisk).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRisk {
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub position_amt: Decimal,
}

/// Acknowledgement returned for a placed order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub order_id: i64,
    pub symbol: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_candle_from_kline() {
        let row = vec![
            json!(1700000000000_i64),
            json!("42000.1"),
            json!("42100.5"),
            json!("41900.0"),
            json!("42050.2"),
            json!("123.4"),
            json!(1700000899999_i64),
        ];
        let candle = Candle::from_kline(&row).unwrap();
        assert_eq!(candle.open_time, 1700000000000);
        assert_eq!(candle.high, dec!(42100.5));
        assert_eq!(candle.low, dec!(41900.0));
        assert_eq!(candle.close, dec!(42050.2));
        assert_eq!(candle.close_time, 1700000899999);
    }

    #[test]
    fn test_candle_from_short_row() {
        let row = vec![json!(1), json!("1"), json!("2")];
        assert!(Candle::from_kline(&row).is_err());
    }

    #[test]
    fn test_interval_strings() {
        assert_eq!(Interval::OneMinute.as_str(), "1m");
        assert_eq!(Interval::FifteenMinutes.label(), "M15");
    }

    #[test]
    fn test_order_side_opposite() {
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.opposite().as_str(), "BUY");
    }
}
