//! Breakout plan arithmetic and hold/exit rules.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;

use crate::exchange::{Candle, OrderSide};

/// Direction of a breakout trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens the position.
    pub fn entry_order(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that closes or protects the position.
    pub fn exit_order(&self) -> OrderSide {
        self.entry_order().opposite()
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => f.write_str("LONG"),
            Side::Short => f.write_str("SHORT"),
        }
    }
}

/// High/low of the most recently closed range candle. Replaced atomically on
/// every range close; defines the breakout thresholds for the next trigger
/// scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub high: Decimal,
    pub low: Decimal,
}

/// Entry, stop and target for one breakout. Immutable after creation except
/// for the stop, which the controller may tighten in place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradePlan {
    pub side: Side,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Build the entry plan: stop at the opposite range boundary, target at 2R.
pub fn build_trade_plan(range: &Range, entry: Decimal, side: Side) -> TradePlan {
    let (stop_loss, take_profit) = match side {
        Side::Long => (range.low, entry + dec!(2) * (entry - range.low)),
        Side::Short => (range.high, entry - dec!(2) * (range.high - entry)),
    };

    TradePlan {
        side,
        entry,
        stop_loss,
        take_profit,
    }
}

/// Outcome of a hold/exit evaluation on a closed range candle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldDecision {
    pub hold: bool,
    /// When holding, the candle extreme offered as a tightened stop.
    pub candidate_stop: Option<Decimal>,
}

/// Hold while the close stays beyond the armed range boundary.
///
/// A held LONG offers the candle low as the new stop; a held SHORT offers
/// the candle high.
pub fn hold_or_exit(side: Side, range: &Range, candle: &Candle) -> HoldDecision {
    match side {
        Side::Long => {
            let hold = candle.close > range.high;
            HoldDecision {
                hold,
                candidate_stop: hold.then_some(candle.low),
            }
        }
        Side::Short => {
            let hold = candle.close < range.low;
            HoldDecision {
                hold,
                candidate_stop: hold.then_some(candle.high),
            }
        }
    }
}

/// Whether a candidate stop moves the current stop in the trade's favor.
/// A stop is never loosened.
pub fn tightens(side: Side, current_stop: Decimal, candidate: Decimal) -> bool {
    match side {
        Side::Long => candidate > current_stop,
        Side::Short => candidate < current_stop,
    }
}

/// Quantity a live account of `balance` would trade at `entry`, committing
/// `margin_percent` of the balance at `leverage`. Used only to annotate
/// dry-run logs and alerts.
pub fn simulated_quantity(
    entry: Decimal,
    balance: Decimal,
    leverage: u32,
    margin_percent: Decimal,
) -> Decimal {
    if entry <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let margin = balance * margin_percent / Decimal::ONE_HUNDRED;
    margin * Decimal::from(leverage) / entry
}
