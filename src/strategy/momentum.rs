//! Multi-timeframe momentum exhaustion scanner.
//!
//! Watches N symbols on 1m/5m/15m closes, computes RSI(6/12/24) over a
//! bounded close window, and emits at most one oversold/overbought alert
//! per (symbol, granularity, candle).

use anyhow::Result;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ScannerConfig, ThresholdSet};
use crate::exchange::{close_series_with_fallback, CloseSeries, Interval, MarketData};
use crate::indicators::{rsi, rsi_multi};
use crate::notify::{Alert, AlertSink};

/// Granularities the scanner tracks for every symbol.
pub const SCAN_INTERVALS: [Interval; 3] = [
    Interval::OneMinute,
    Interval::FiveMinutes,
    Interval::FifteenMinutes,
];

/// Kind of momentum exhaustion detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MomentumSignal {
    Oversold,
    Overbought,
}

impl fmt::Display for MomentumSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MomentumSignal::Oversold => f.write_str("Oversold"),
            MomentumSignal::Overbought => f.write_str("Overbought"),
        }
    }
}

/// Classify a reading against one granularity's thresholds.
///
/// Oversold is checked first, so malformed threshold sets where both
/// conditions hold still yield exactly one signal.
pub fn classify(thresholds: &ThresholdSet, rsi6: f64, rsi12: f64) -> Option<MomentumSignal> {
    let oversold = rsi6 < thresholds.oversold_rsi6
        && thresholds.oversold_rsi12.map_or(true, |bound| rsi12 < bound);
    if oversold {
        return Some(MomentumSignal::Oversold);
    }

    let overbought = rsi6 > thresholds.overbought_rsi6
        && thresholds
            .overbought_rsi12
            .map_or(true, |bound| rsi12 > bound);
    overbought.then_some(MomentumSignal::Overbought)
}

/// Scans all tracked (symbol, granularity) pairs once per cycle.
pub struct MomentumScanner<M> {
    config: ScannerConfig,
    market: Arc<M>,
    sources: Vec<Arc<dyn CloseSeries>>,
    alerts: Arc<dyn AlertSink>,
    /// close_time of the last candle evaluated per (symbol, granularity);
    /// a candle is evaluated at most once.
    cursors: HashMap<(String, Interval), i64>,
}

impl<M> MomentumScanner<M>
where
    M: MarketData,
{
    pub fn new(
        config: ScannerConfig,
        market: Arc<M>,
        sources: Vec<Arc<dyn CloseSeries>>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            market,
            sources,
            alerts,
            cursors: HashMap::new(),
        }
    }

    /// Run until the shutdown flag flips.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        let poll = Duration::from_secs_f64(self.config.poll_seconds.max(10.0));
        info!(
            symbols = ?self.config.symbols,
            poll_seconds = poll.as_secs_f64(),
            "momentum scanner started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            self.scan_once().await;
            tokio::time::sleep(poll).await;
        }

        info!("momentum scanner stopped");
        Ok(())
    }

    /// One polling cycle over every tracked pair. A failing pair is logged
    /// and never aborts the rest of the cycle.
    pub async fn scan_once(&mut self) {
        let symbols = self.config.symbols.clone();
        for symbol in &symbols {
            for interval in SCAN_INTERVALS {
                if let Err(e) = self.check_pair(symbol, interval).await {
                    warn!(%symbol, interval = %interval, error = %e, "momentum check failed");
                }
            }
        }
    }

    /// Evaluate one pair if a new candle closed since the last evaluation.
    async fn check_pair(&mut self, symbol: &str, interval: Interval) -> Result<()> {
        let candle = self.market.last_closed_candle(symbol, interval).await?;
        let key = (symbol.to_string(), interval);
        let cursor = self.cursors.get(&key).copied().unwrap_or(0);
        if candle.close_time <= cursor {
            return Ok(());
        }
        self.cursors.insert(key, candle.close_time);

        self.evaluate(symbol, interval, candle.close_time).await
    }

    async fn evaluate(&self, symbol: &str, interval: Interval, close_time: i64) -> Result<()> {
        let closes = self.fetch_closes(symbol, interval).await?;
        let readings = rsi_multi(&closes, &[6, 12, 24]);
        let (Some(rsi6), Some(rsi12)) = (
            readings.get(&6).copied().flatten(),
            readings.get(&12).copied().flatten(),
        ) else {
            // Not enough warm-up history yet; nothing to report.
            return Ok(());
        };
        let rsi24 = readings.get(&24).copied().flatten();

        info!(%symbol, interval = %interval, rsi6, rsi12, "rsi reading");

        let thresholds = self.config.thresholds(interval);
        let Some(signal) = classify(thresholds, rsi6, rsi12) else {
            return Ok(());
        };

        if signal == MomentumSignal::Overbought
            && thresholds.confirm_with_1m
            && interval != Interval::OneMinute
        {
            if !self.confirmed_on_1m(symbol, thresholds.confirm_rsi6).await? {
                debug!(%symbol, interval = %interval, "overbought not confirmed on 1m, skipping");
                return Ok(());
            }
        }

        let alert = Alert::Momentum {
            symbol: symbol.to_string(),
            interval,
            signal,
            rsi6,
            rsi12,
            rsi24,
            close_time,
        };
        if let Err(e) = self.alerts.send(&alert).await {
            warn!(%symbol, interval = %interval, error = %e, "momentum alert delivery failed");
        }
        info!(%symbol, interval = %interval, signal = %signal, rsi6, rsi12, "momentum alert emitted");
        Ok(())
    }

    /// Cross-timeframe gate: the last closed 1m candle must agree.
    async fn confirmed_on_1m(&self, symbol: &str, bound: f64) -> Result<bool> {
        let closes = self.fetch_closes(symbol, Interval::OneMinute).await?;
        Ok(matches!(rsi(&closes, 6), Some(value) if value > bound))
    }

    async fn fetch_closes(&self, symbol: &str, interval: Interval) -> Result<Vec<f64>> {
        let closes = close_series_with_fallback(
            &self.sources,
            symbol,
            interval,
            self.config.klines_limit,
        )
        .await?;
        anyhow::ensure!(
            closes.len() >= self.config.min_klines,
            "insufficient close history for {} {}: got {}",
            symbol,
            interval,
            closes.len()
        );
        Ok(closes)
    }
}
