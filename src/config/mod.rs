//! Configuration management for the breakout trader.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::exchange::Interval;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Binance API credentials
    #[serde(default)]
    pub binance: BinanceConfig,
    /// Trade lifecycle parameters
    #[serde(default)]
    pub trading: TradingConfig,
    /// Telegram alert delivery
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Momentum scanner parameters
    #[serde(default)]
    pub scanner: ScannerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub api_secret: String,
    /// Use testnet instead of production
    #[serde(default)]
    pub testnet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Traded futures symbol
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Order quantity in base asset
    #[serde(default = "default_quantity")]
    pub quantity: Decimal,
    /// Leverage applied to the traded symbol at startup (live mode)
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Account balance used to size the simulated quantity in dry-run mode
    #[serde(default = "default_account_balance")]
    pub account_balance: Decimal,
    /// Percent of balance used as margin for the simulated quantity
    #[serde(default = "default_margin_percent")]
    pub margin_percent: Decimal,
    /// Simulate execution: no orders are placed, alerts still fire
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// Candle polling interval in seconds
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: f64,
    /// Tighten the stop to the latest candle extreme on each held close
    #[serde(default)]
    pub move_stop_on_hold: bool,
    /// Granularity whose candles define the breakout range
    #[serde(default = "default_range_interval")]
    pub range_interval: Interval,
    /// Granularity whose closes are scanned for the breakout
    #[serde(default = "default_trigger_interval")]
    pub trigger_interval: Interval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; alerts are logged only when empty
    #[serde(default)]
    pub bot_token: String,
    /// Default chat for all alert kinds
    #[serde(default)]
    pub chat_id: String,
    /// Chat for trade-entry alerts (falls back to chat_id)
    #[serde(default)]
    pub breakout_chat_id: String,
    /// Chat for momentum alerts (falls back to chat_id)
    #[serde(default)]
    pub momentum_chat_id: String,
}

/// RSI cutoffs for one scanner granularity.
///
/// `None` for an RSI(12) bound means that period is not consulted for the
/// signal. The overbought side can additionally be gated on the last closed
/// 1m candle confirming the move.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub oversold_rsi6: f64,
    #[serde(default)]
    pub oversold_rsi12: Option<f64>,
    pub overbought_rsi6: f64,
    #[serde(default)]
    pub overbought_rsi12: Option<f64>,
    /// Require RSI6 on the last closed 1m candle above `confirm_rsi6`
    /// before emitting an overbought alert
    #[serde(default)]
    pub confirm_with_1m: bool,
    #[serde(default = "default_confirm_rsi6")]
    pub confirm_rsi6: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Symbols tracked across 1m/5m/15m
    #[serde(default = "default_scanner_symbols")]
    pub symbols: Vec<String>,
    /// Close-series window requested per evaluation
    #[serde(default = "default_klines_limit")]
    pub klines_limit: usize,
    /// Minimum closes accepted before an evaluation is attempted
    #[serde(default = "default_min_klines")]
    pub min_klines: usize,
    /// Inter-cycle delay in seconds (floored at 10s at runtime)
    #[serde(default = "default_scanner_poll_seconds")]
    pub poll_seconds: f64,
    #[serde(default = "default_m1_thresholds")]
    pub m1: ThresholdSet,
    #[serde(default = "default_m5_thresholds")]
    pub m5: ThresholdSet,
    #[serde(default = "default_m15_thresholds")]
    pub m15: ThresholdSet,
}

impl ScannerConfig {
    /// Threshold set for a scanned granularity.
    pub fn thresholds(&self, interval: Interval) -> &ThresholdSet {
        match interval {
            Interval::FiveMinutes => &self.m5,
            Interval::FifteenMinutes => &self.m15,
            _ => &self.m1,
        }
    }
}

impl TelegramConfig {
    /// Chat for trade-entry alerts, if Telegram is configured.
    pub fn breakout_chat(&self) -> Option<&str> {
        self.routed_chat(&self.breakout_chat_id)
    }

    /// Chat for momentum alerts, if Telegram is configured.
    pub fn momentum_chat(&self) -> Option<&str> {
        self.routed_chat(&self.momentum_chat_id)
    }

    fn routed_chat<'a>(&'a self, preferred: &'a str) -> Option<&'a str> {
        if self.bot_token.is_empty() {
            return None;
        }
        let chat = if preferred.is_empty() {
            &self.chat_id
        } else {
            preferred
        };
        (!chat.is_empty()).then_some(chat)
    }
}

// Default value functions

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_quantity() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_leverage() -> u32 {
    20
}

fn default_account_balance() -> Decimal {
    Decimal::new(100, 0)
}

fn default_margin_percent() -> Decimal {
    Decimal::ONE // 1% of balance per simulated entry
}

fn default_dry_run() -> bool {
    true
}

fn default_poll_seconds() -> f64 {
    2.0
}

fn default_range_interval() -> Interval {
    Interval::FifteenMinutes
}

fn default_trigger_interval() -> Interval {
    Interval::OneMinute
}

fn default_scanner_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "XAUUSDT", "SOLUSDT"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_klines_limit() -> usize {
    500
}

fn default_min_klines() -> usize {
    25
}

fn default_scanner_poll_seconds() -> f64 {
    10.0
}

fn default_confirm_rsi6() -> f64 {
    80.0
}

fn default_m1_thresholds() -> ThresholdSet {
    ThresholdSet {
        oversold_rsi6: 20.0,
        oversold_rsi12: Some(30.0),
        overbought_rsi6: 80.0,
        overbought_rsi12: Some(70.0),
        confirm_with_1m: false,
        confirm_rsi6: default_confirm_rsi6(),
    }
}

fn default_m5_thresholds() -> ThresholdSet {
    ThresholdSet {
        oversold_rsi6: 30.0,
        oversold_rsi12: Some(40.0),
        overbought_rsi6: 70.0,
        overbought_rsi12: None,
        confirm_with_1m: true,
        confirm_rsi6: default_confirm_rsi6(),
    }
}

fn default_m15_thresholds() -> ThresholdSet {
    ThresholdSet {
        oversold_rsi6: 40.0,
        oversold_rsi12: None,
        overbought_rsi6: 60.0,
        overbought_rsi12: None,
        confirm_with_1m: true,
        confirm_rsi6: default_confirm_rsi6(),
    }
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("BOT"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values. Fatal at startup on failure.
    pub fn validate(&self) -> Result<()> {
        if !self.trading.dry_run {
            anyhow::ensure!(
                !self.binance.api_key.is_empty() && !self.binance.api_secret.is_empty(),
                "live execution requires binance.api_key and binance.api_secret"
            );
        }

        anyhow::ensure!(
            self.trading.quantity > Decimal::ZERO,
            "trading.quantity must be positive"
        );

        anyhow::ensure!(self.trading.leverage >= 1, "trading.leverage must be >= 1");

        anyhow::ensure!(
            self.trading.margin_percent > Decimal::ZERO
                && self.trading.margin_percent <= Decimal::ONE_HUNDRED,
            "trading.margin_percent must be in (0, 100]"
        );

        anyhow::ensure!(
            self.trading.poll_seconds > 0.0,
            "trading.poll_seconds must be positive"
        );

        anyhow::ensure!(
            self.trading.range_interval != self.trading.trigger_interval,
            "trading.range_interval and trading.trigger_interval must differ"
        );

        anyhow::ensure!(
            self.scanner.klines_limit >= self.scanner.min_klines,
            "scanner.klines_limit must be >= scanner.min_klines"
        );

        for thresholds in [&self.scanner.m1, &self.scanner.m5, &self.scanner.m15] {
            anyhow::ensure!(
                (0.0..=100.0).contains(&thresholds.oversold_rsi6)
                    && (0.0..=100.0).contains(&thresholds.overbought_rsi6),
                "scanner RSI thresholds must be within [0, 100]"
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binance: BinanceConfig::default(),
            trading: TradingConfig::default(),
            telegram: TelegramConfig::default(),
            scanner: ScannerConfig::default(),
        }
    }
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_secret: String::new(),
            testnet: false,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            quantity: default_quantity(),
            leverage: default_leverage(),
            account_balance: default_account_balance(),
            margin_percent: default_margin_percent(),
            dry_run: default_dry_run(),
            poll_seconds: default_poll_seconds(),
            move_stop_on_hold: false,
            range_interval: default_range_interval(),
            trigger_interval: default_trigger_interval(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            breakout_chat_id: String::new(),
            momentum_chat_id: String::new(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            symbols: default_scanner_symbols(),
            klines_limit: default_klines_limit(),
            min_klines: default_min_klines(),
            poll_seconds: default_scanner_poll_seconds(),
            m1: default_m1_thresholds(),
            m5: default_m5_thresholds(),
            m15: default_m15_thresholds(),
        }
    }
}
