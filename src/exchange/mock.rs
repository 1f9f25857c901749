//! Mock exchange for driving the decision engine in tests.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::traits::{CloseSeries, MarketData, OrderGateway};
use super::types::{Candle, Interval, OrderSide};

/// One order-management call observed by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderRecord {
    CancelAll {
        symbol: String,
    },
    Market {
        symbol: String,
        side: OrderSide,
        qty: Decimal,
    },
    Stop {
        symbol: String,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
    },
    Target {
        symbol: String,
        side: OrderSide,
        target_price: Decimal,
        qty: Decimal,
    },
    Leverage {
        symbol: String,
        leverage: u32,
    },
}

#[derive(Debug, Default)]
struct MockState {
    /// Scripted closed candles per stream. Reads serve candles in order;
    /// once the stream is drained the final candle is sticky, mirroring a
    /// quiet live stream, and candles pushed later are served next.
    closed: HashMap<(String, Interval), (usize, Vec<Candle>)>,
    latest: HashMap<(String, Interval), Candle>,
    close_series: HashMap<(String, Interval), Vec<f64>>,
    position: Decimal,
    fail_market_orders: bool,
    fail_position_queries: bool,
    orders: Vec<OrderRecord>,
}

/// Scriptable exchange implementing every capability trait.
#[derive(Default)]
pub struct MockExchange {
    state: RwLock<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed candle to a (symbol, interval) stream.
    pub async fn push_closed(&self, symbol: &str, interval: Interval, candle: Candle) {
        let mut state = self.state.write().await;
        state
            .closed
            .entry((symbol.to_string(), interval))
            .or_insert((0, Vec::new()))
            .1
            .push(candle);
    }

    /// Script the still-forming candle for a stream.
    pub async fn set_latest(&self, symbol: &str, interval: Interval, candle: Candle) {
        let mut state = self.state.write().await;
        state.latest.insert((symbol.to_string(), interval), candle);
    }

    /// Script the close-price history for a stream.
    pub async fn set_close_series(&self, symbol: &str, interval: Interval, closes: Vec<f64>) {
        let mut state = self.state.write().await;
        state
            .close_series
            .insert((symbol.to_string(), interval), closes);
    }

    pub async fn set_position(&self, qty: Decimal) {
        self.state.write().await.position = qty;
    }

    pub async fn fail_market_orders(&self, fail: bool) {
        self.state.write().await.fail_market_orders = fail;
    }

    pub async fn fail_position_queries(&self, fail: bool) {
        self.state.write().await.fail_position_queries = fail;
    }

    /// Every successful order-management call, in submission order.
    pub async fn orders(&self) -> Vec<OrderRecord> {
        self.state.read().await.orders.clone()
    }
}

#[async_trait]
impl MarketData for MockExchange {
    async fn latest_candle(&self, symbol: &str, interval: Interval) -> Result<Candle> {
        let state = self.state.read().await;
        state
            .latest
            .get(&(symbol.to_string(), interval))
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no latest candle scripted for {symbol} {interval}"))
    }

    async fn last_closed_candle(&self, symbol: &str, interval: Interval) -> Result<Candle> {
        let mut state = self.state.write().await;
        let (served, candles) = state
            .closed
            .get_mut(&(symbol.to_string(), interval))
            .ok_or_else(|| anyhow::anyhow!("no closed candles scripted for {symbol} {interval}"))?;
        anyhow::ensure!(
            !candles.is_empty(),
            "no closed candles scripted for {symbol} {interval}"
        );
        let idx = (*served).min(candles.len() - 1);
        let candle = candles[idx];
        *served = idx + 1;
        Ok(candle)
    }
}

#[async_trait]
impl CloseSeries for MockExchange {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn close_series(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<f64>> {
        let state = self.state.read().await;
        let closes = state
            .close_series
            .get(&(symbol.to_string(), interval))
            .ok_or_else(|| anyhow::anyhow!("no close series scripted for {symbol} {interval}"))?;
        let start = closes.len().saturating_sub(limit);
        Ok(closes[start..].to_vec())
    }
}

#[async_trait]
impl OrderGateway for MockExchange {
    async fn position_size(&self, _symbol: &str) -> Result<Decimal> {
        let state = self.state.read().await;
        anyhow::ensure!(!state.fail_position_queries, "scripted position query failure");
        Ok(state.position)
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.push(OrderRecord::CancelAll {
            symbol: symbol.to_string(),
        });
        Ok(())
    }

    async fn submit_market_order(&self, symbol: &str, side: OrderSide, qty: Decimal) -> Result<()> {
        let mut state = self.state.write().await;
        anyhow::ensure!(!state.fail_market_orders, "scripted market order failure");
        state.orders.push(OrderRecord::Market {
            symbol: symbol.to_string(),
            side,
            qty,
        });
        Ok(())
    }

    async fn submit_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.push(OrderRecord::Stop {
            symbol: symbol.to_string(),
            side,
            stop_price,
            qty,
        });
        Ok(())
    }

    async fn submit_target_order(
        &self,
        symbol: &str,
        side: OrderSide,
        target_price: Decimal,
        qty: Decimal,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.push(OrderRecord::Target {
            symbol: symbol.to_string(),
            side,
            target_price,
            qty,
        });
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.push(OrderRecord::Leverage {
            symbol: symbol.to_string(),
            leverage,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(close_time: i64, close: Decimal) -> Candle {
        Candle {
            open_time: close_time - 899,
            open: close,
            high: close,
            low: close,
            close,
            close_time,
        }
    }

    #[tokio::test]
    async fn test_closed_stream_is_sticky_on_last_candle() {
        let mock = MockExchange::new();
        mock.push_closed("BTCUSDT", Interval::OneMinute, candle(1000, dec!(100)))
            .await;
        mock.push_closed("BTCUSDT", Interval::OneMinute, candle(2000, dec!(101)))
            .await;

        let first = mock
            .last_closed_candle("BTCUSDT", Interval::OneMinute)
            .await
            .unwrap();
        assert_eq!(first.close_time, 1000);

        let second = mock
            .last_closed_candle("BTCUSDT", Interval::OneMinute)
            .await
            .unwrap();
        assert_eq!(second.close_time, 2000);

        // Exhausted stream keeps serving the final candle.
        let again = mock
            .last_closed_candle("BTCUSDT", Interval::OneMinute)
            .await
            .unwrap();
        assert_eq!(again.close_time, 2000);
    }

    #[tokio::test]
    async fn test_unscripted_stream_errors() {
        let mock = MockExchange::new();
        assert!(mock
            .last_closed_candle("BTCUSDT", Interval::OneMinute)
            .await
            .is_err());
        assert!(mock
            .latest_candle("BTCUSDT", Interval::OneMinute)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_close_series_respects_limit() {
        let mock = MockExchange::new();
        mock.set_close_series("BTCUSDT", Interval::OneMinute, vec![1.0, 2.0, 3.0, 4.0])
            .await;
        let closes = mock
            .close_series("BTCUSDT", Interval::OneMinute, 2)
            .await
            .unwrap();
        assert_eq!(closes, vec![3.0, 4.0]);
    }
}
