//! Trading strategy: breakout plan rules, the trade lifecycle state
//! machine, and the momentum exhaustion scanner.

pub mod controller;
pub mod momentum;
pub mod plan;

pub use controller::{PositionState, TradeController};
pub use momentum::{classify, MomentumScanner, MomentumSignal, SCAN_INTERVALS};
pub use plan::{
    build_trade_plan, hold_or_exit, simulated_quantity, tightens, HoldDecision, Range, Side,
    TradePlan,
};
