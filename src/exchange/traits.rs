//! Capability traits the decision engine consumes.
//!
//! The trade lifecycle controller and the momentum scanner are written
//! against these interfaces; the Binance client implements them for live
//! operation and [`MockExchange`](super::MockExchange) implements them for
//! tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::types::{Candle, Interval, OrderSide};

/// Pull-only candle source for one venue.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// The still-forming candle at the head of the stream.
    async fn latest_candle(&self, symbol: &str, interval: Interval) -> anyhow::Result<Candle>;

    /// The most recently closed candle.
    async fn last_closed_candle(&self, symbol: &str, interval: Interval)
        -> anyhow::Result<Candle>;

    /// Block until a candle with `close_time` beyond the watermark closes.
    ///
    /// With `after_close_time = None` the current last-closed candle is
    /// returned immediately. The upstream source is pull-only, so this is a
    /// poll-with-sleep loop; `poll` is the sleep between attempts.
    async fn wait_for_new_closed_candle(
        &self,
        symbol: &str,
        interval: Interval,
        after_close_time: Option<i64>,
        poll: Duration,
    ) -> anyhow::Result<Candle> {
        loop {
            let candle = self.last_closed_candle(symbol, interval).await?;
            match after_close_time {
                Some(watermark) if candle.close_time <= watermark => {}
                _ => return Ok(candle),
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// One endpoint serving close-price history.
///
/// The scanner holds an ordered list of these and tries them in turn until
/// one succeeds, so a degraded endpoint degrades nothing else.
#[async_trait]
pub trait CloseSeries: Send + Sync {
    /// Short name for logs ("spot", "futures").
    fn name(&self) -> &'static str;

    /// Close prices oldest→newest, at most `limit` entries.
    async fn close_series(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> anyhow::Result<Vec<f64>>;
}

/// Try each source in order until one yields a close series.
pub async fn close_series_with_fallback(
    sources: &[Arc<dyn CloseSeries>],
    symbol: &str,
    interval: Interval,
    limit: usize,
) -> anyhow::Result<Vec<f64>> {
    anyhow::ensure!(!sources.is_empty(), "no close-series sources configured");

    for source in sources {
        match source.close_series(symbol, interval, limit).await {
            Ok(closes) => return Ok(closes),
            Err(e) => {
                warn!(
                    source = source.name(),
                    %symbol,
                    interval = %interval,
                    error = %e,
                    "close-series source failed, trying next"
                );
            }
        }
    }

    anyhow::bail!("all close-series sources failed for {} {}", symbol, interval)
}

/// Account and order management for the traded symbol.
///
/// Calls are never retried here; a failure surfaces to the caller so the
/// state machine stays consistent with "the intended action did not
/// complete".
#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Signed position quantity; zero when flat.
    async fn position_size(&self, symbol: &str) -> anyhow::Result<Decimal>;

    async fn cancel_all_orders(&self, symbol: &str) -> anyhow::Result<()>;

    async fn submit_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
    ) -> anyhow::Result<()>;

    async fn submit_stop_order(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: Decimal,
        qty: Decimal,
    ) -> anyhow::Result<()>;

    async fn submit_target_order(
        &self,
        symbol: &str,
        side: OrderSide,
        target_price: Decimal,
        qty: Decimal,
    ) -> anyhow::Result<()>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> anyhow::Result<()>;
}
