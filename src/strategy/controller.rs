//! Trade lifecycle state machine.
//!
//! One instance owns the full lifecycle for a single traded symbol:
//! IDLE (wait for a range candle) → ARMED (scan trigger closes for a
//! breakout) → IN_POSITION (hold/exit on each range close) → IDLE.
//! Each [`TradeController::step`] performs exactly one transition-sized
//! unit of work, so tests can drive the machine candle by candle.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::TradingConfig;
use crate::exchange::{MarketData, OrderGateway};
use crate::notify::{Alert, AlertSink};
use crate::strategy::plan::{
    build_trade_plan, hold_or_exit, simulated_quantity, tightens, Range, Side, TradePlan,
};

/// Lifecycle position of the controller. Exactly one per traded symbol;
/// never persisted — a restart re-arms from `Idle`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionState {
    /// Waiting for the next range candle to close.
    Idle,
    /// A range is captured; trigger closes are scanned for a breakout.
    Armed {
        range: Range,
        /// open_time of the range candle that was forming when we armed;
        /// a different open_time on a later tick means the range rolled
        /// over without a breakout.
        active_open_time: i64,
    },
    /// A breakout trade is open; every range close decides hold or exit.
    InPosition {
        plan: TradePlan,
        range: Range,
        current_stop: Decimal,
    },
}

/// Drives the breakout trade lifecycle for one symbol.
pub struct TradeController<M, G> {
    config: TradingConfig,
    market: Arc<M>,
    gateway: Arc<G>,
    alerts: Arc<dyn AlertSink>,
    state: PositionState,
    last_range_close: Option<i64>,
    last_trigger_close: Option<i64>,
}

impl<M, G> TradeController<M, G>
where
    M: MarketData,
    G: OrderGateway,
{
    pub fn new(
        config: TradingConfig,
        market: Arc<M>,
        gateway: Arc<G>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            config,
            market,
            gateway,
            alerts,
            state: PositionState::Idle,
            last_range_close: None,
            last_trigger_close: None,
        }
    }

    pub fn state(&self) -> &PositionState {
        &self.state
    }

    fn poll(&self) -> Duration {
        Duration::from_secs_f64(self.config.poll_seconds)
    }

    /// Run until the shutdown flag flips. Step failures are logged and the
    /// loop continues from the still-consistent state.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> Result<()> {
        info!(
            symbol = %self.config.symbol,
            dry_run = self.config.dry_run,
            range = %self.config.range_interval,
            trigger = %self.config.trigger_interval,
            "trade lifecycle controller started"
        );

        while !shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.step().await {
                error!(symbol = %self.config.symbol, error = %e, "trade loop step failed");
                tokio::time::sleep(self.poll()).await;
            }
        }

        info!(symbol = %self.config.symbol, "trade lifecycle controller stopped");
        Ok(())
    }

    /// Perform one unit of work for the current state.
    pub async fn step(&mut self) -> Result<()> {
        match self.state {
            PositionState::Idle => self.arm().await,
            PositionState::Armed {
                range,
                active_open_time,
            } => self.watch_trigger(range, active_open_time).await,
            PositionState::InPosition {
                plan,
                range,
                current_stop,
            } => self.manage_position(plan, range, current_stop).await,
        }
    }

    /// IDLE: capture the next closed range candle as the breakout range.
    async fn arm(&mut self) -> Result<()> {
        let symbol = self.config.symbol.clone();
        let candle = self
            .market
            .wait_for_new_closed_candle(
                &symbol,
                self.config.range_interval,
                self.last_range_close,
                self.poll(),
            )
            .await
            .context("waiting for range candle")?;

        let active = self
            .market
            .latest_candle(&symbol, self.config.range_interval)
            .await
            .context("fetching active range candle")?;

        self.last_range_close = Some(candle.close_time);
        self.last_trigger_close = Some(candle.close_time);

        let range = Range {
            high: candle.high,
            low: candle.low,
        };
        info!(
            %symbol,
            range_high = %range.high,
            range_low = %range.low,
            close_time = candle.close_time,
            "new range captured, armed for breakout"
        );

        self.state = PositionState::Armed {
            range,
            active_open_time: active.open_time,
        };
        Ok(())
    }

    /// ARMED: scan the next trigger close for a breakout, unless the range
    /// candle rolled over first.
    async fn watch_trigger(&mut self, range: Range, active_open_time: i64) -> Result<()> {
        let symbol = self.config.symbol.clone();
        let trigger = self
            .market
            .wait_for_new_closed_candle(
                &symbol,
                self.config.trigger_interval,
                self.last_trigger_close,
                self.poll(),
            )
            .await
            .context("waiting for trigger candle")?;
        self.last_trigger_close = Some(trigger.close_time);

        let active = self
            .market
            .latest_candle(&symbol, self.config.range_interval)
            .await
            .context("checking range rollover")?;
        if active.open_time != active_open_time {
            info!(%symbol, "range candle rolled over without a breakout, disarming");
            self.state = PositionState::Idle;
            return Ok(());
        }

        let side = if trigger.close > range.high {
            Side::Long
        } else if trigger.close < range.low {
            Side::Short
        } else {
            return Ok(());
        };

        let plan = build_trade_plan(&range, trigger.close, side);
        self.enter(plan, range).await
    }

    /// Execute a breakout entry. On a failed market entry the error
    /// propagates and the state stays ARMED.
    async fn enter(&mut self, plan: TradePlan, range: Range) -> Result<()> {
        let symbol = self.config.symbol.clone();
        let sim_qty = simulated_quantity(
            plan.entry,
            self.config.account_balance,
            self.config.leverage,
            self.config.margin_percent,
        );
        info!(
            %symbol,
            side = %plan.side,
            entry = %plan.entry,
            stop_loss = %plan.stop_loss,
            take_profit = %plan.take_profit,
            sim_qty = %sim_qty,
            dry_run = self.config.dry_run,
            "breakout entry signal"
        );

        let alert = Alert::TradeEntry {
            symbol: symbol.clone(),
            side: plan.side,
            entry: plan.entry,
            stop_loss: plan.stop_loss,
            take_profit: plan.take_profit,
            dry_run: self.config.dry_run,
        };
        if let Err(e) = self.alerts.send(&alert).await {
            warn!(%symbol, error = %e, "trade alert delivery failed");
        }

        if self.config.dry_run {
            self.state = PositionState::InPosition {
                plan,
                range,
                current_stop: plan.stop_loss,
            };
            return Ok(());
        }

        let qty = self.config.quantity;
        self.gateway
            .cancel_all_orders(&symbol)
            .await
            .context("cancelling resting orders before entry")?;
        self.gateway
            .submit_market_order(&symbol, plan.side.entry_order(), qty)
            .await
            .context("submitting market entry")?;

        // The position exists from here on, even if protective orders fail.
        self.state = PositionState::InPosition {
            plan,
            range,
            current_stop: plan.stop_loss,
        };

        self.gateway
            .submit_stop_order(&symbol, plan.side.exit_order(), plan.stop_loss, qty)
            .await
            .context("submitting protective stop")?;
        self.gateway
            .submit_target_order(&symbol, plan.side.exit_order(), plan.take_profit, qty)
            .await
            .context("submitting take profit")?;

        Ok(())
    }

    /// IN_POSITION: on each range close, detect an already-flat position,
    /// otherwise hold or exit; a held close may tighten the stop.
    async fn manage_position(
        &mut self,
        plan: TradePlan,
        range: Range,
        current_stop: Decimal,
    ) -> Result<()> {
        let symbol = self.config.symbol.clone();
        let candle = self
            .market
            .wait_for_new_closed_candle(
                &symbol,
                self.config.range_interval,
                self.last_range_close,
                self.poll(),
            )
            .await
            .context("waiting for range candle while in position")?;

        let position_qty = if self.config.dry_run {
            self.config.quantity
        } else {
            match self.gateway.position_size(&symbol).await {
                Ok(qty) => qty,
                Err(e) => {
                    // Cursor stays put: the same candle is re-delivered and
                    // the query retried on the next tick.
                    warn!(%symbol, error = %e, "position query failed, retrying on the next tick");
                    return Ok(());
                }
            }
        };
        self.last_range_close = Some(candle.close_time);

        if !self.config.dry_run && position_qty.is_zero() {
            info!(%symbol, "position closed by stop or target, re-arming on the next range close");
            self.state = PositionState::Idle;
            return Ok(());
        }

        let decision = hold_or_exit(plan.side, &range, &candle);
        if !decision.hold {
            info!(
                %symbol,
                close = %candle.close,
                range_high = %range.high,
                range_low = %range.low,
                side = %plan.side,
                "close fails hold condition, exiting"
            );
            if !self.config.dry_run {
                self.gateway
                    .cancel_all_orders(&symbol)
                    .await
                    .context("cancelling resting orders before exit")?;
                self.gateway
                    .submit_market_order(&symbol, plan.side.exit_order(), position_qty.abs())
                    .await
                    .context("submitting market exit")?;
            }
            self.state = PositionState::Idle;
            return Ok(());
        }

        info!(
            %symbol,
            close = %candle.close,
            side = %plan.side,
            "close holds, keeping position"
        );

        if self.config.move_stop_on_hold {
            if let Some(candidate) = decision.candidate_stop {
                if tightens(plan.side, current_stop, candidate) {
                    info!(%symbol, stop = %candidate, "tightening stop");
                    if !self.config.dry_run {
                        let qty = self.config.quantity;
                        self.gateway
                            .cancel_all_orders(&symbol)
                            .await
                            .context("cancelling resting orders before stop move")?;
                        self.gateway
                            .submit_stop_order(&symbol, plan.side.exit_order(), candidate, qty)
                            .await
                            .context("replacing protective stop")?;
                        self.gateway
                            .submit_target_order(
                                &symbol,
                                plan.side.exit_order(),
                                plan.take_profit,
                                qty,
                            )
                            .await
                            .context("replacing take profit")?;
                    }
                    self.state = PositionState::InPosition {
                        plan,
                        range,
                        current_stop: candidate,
                    };
                }
            }
        }

        Ok(())
    }
}
