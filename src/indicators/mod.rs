//! Technical indicators.

mod rsi;

pub use rsi::{rsi, rsi_multi};
