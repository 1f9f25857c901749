//! # Breakout Trader
//!
//! Automated range-breakout trading for a single Binance USDT-M Futures
//! market, with a multi-timeframe RSI exhaustion scanner on the side.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Binance REST client, capability traits, and a mock exchange
//! - `indicators`: Wilder-smoothed RSI
//! - `strategy`: Trade lifecycle state machine and the momentum scanner
//! - `notify`: Alert types and delivery channels (Telegram, log-only)

pub mod config;
pub mod exchange;
pub mod indicators;
pub mod notify;
pub mod strategy;

pub use config::Config;
