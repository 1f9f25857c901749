//! Alert types and delivery channels.
//!
//! Delivery failures are surfaced as errors but must never affect
//! controller or scanner state; callers log and move on.

mod telegram;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::exchange::Interval;
use crate::strategy::momentum::MomentumSignal;
use crate::strategy::plan::Side;

pub use telegram::TelegramNotifier;

/// A human-facing notification produced by the decision engine.
#[derive(Debug, Clone)]
pub enum Alert {
    /// A breakout entry, emitted once per trade.
    TradeEntry {
        symbol: String,
        side: Side,
        entry: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
        dry_run: bool,
    },
    /// A momentum exhaustion reading, at most one per closed candle.
    Momentum {
        symbol: String,
        interval: Interval,
        signal: MomentumSignal,
        rsi6: f64,
        rsi12: f64,
        rsi24: Option<f64>,
        close_time: i64,
    },
}

/// Outbound alert channel.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Fallback sink when no delivery channel is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn send(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(?alert, "alert");
        Ok(())
    }
}
