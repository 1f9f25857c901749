//! Exchange layer: capability traits, the Binance REST client, and a mock.
//!
//! The decision engine consumes only the traits in [`traits`]; the concrete
//! Binance client implements them for live operation and [`MockExchange`]
//! implements them for tests.

mod client;
pub mod mock;
mod traits;
mod types;

pub use client::{BinanceClient, FuturesCloses, SpotCloses};
pub use mock::{MockExchange, OrderRecord};
pub use traits::{close_series_with_fallback, CloseSeries, MarketData, OrderGateway};
pub use types::*;
