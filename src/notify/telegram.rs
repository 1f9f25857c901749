//! Telegram alert delivery via the Bot API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde_json::json;

use super::{Alert, AlertSink};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends formatted alerts to one Telegram chat.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        Self::with_base_url(bot_token, chat_id, TELEGRAM_API.to_string())
    }

    pub fn with_base_url(
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
        base_url: String,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// Send an HTML-formatted message to the configured chat.
    async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        self.http
            .post(&url)
            .json(&json!({
                "chat_id": self.chat_id,
                "text": text,
                "parse_mode": "HTML",
            }))
            .send()
            .await
            .context("Failed to reach Telegram")?
            .error_for_status()
            .context("Telegram rejected the message")?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for TelegramNotifier {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.send_message(&format_alert(alert)).await
    }
}

/// Render an alert as Telegram HTML.
pub fn format_alert(alert: &Alert) -> String {
    match alert {
        Alert::TradeEntry {
            symbol,
            side,
            entry,
            stop_loss,
            take_profit,
            dry_run,
        } => {
            let mode = if *dry_run { "DRY RUN " } else { "" };
            format!(
                "🔔 <b>{mode}Trade Entry</b>\n\n\
                 <b>Symbol:</b> {symbol}\n\
                 <b>Side:</b> {side}\n\
                 <b>Entry:</b> {entry:.4}\n\
                 <b>Stop Loss:</b> {stop_loss:.4}\n\
                 <b>Take Profit:</b> {take_profit:.4}"
            )
        }
        Alert::Momentum {
            symbol,
            interval,
            signal,
            rsi6,
            rsi12,
            rsi24,
            close_time,
        } => {
            let r24 = rsi24
                .map(|v| format!("{v:.1}"))
                .unwrap_or_else(|| "N/A".to_string());
            let close_str = Utc
                .timestamp_millis_opt(*close_time)
                .single()
                .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
                .unwrap_or_else(|| format!("{close_time} ms"));
            format!(
                "📊 <b>RSI {signal}</b> {label}\n\n\
                 <b>Symbol:</b> {symbol}\n\
                 <b>RSI(6):</b> {rsi6:.1}\n\
                 <b>RSI(12):</b> {rsi12:.1}\n\
                 <b>RSI(24):</b> {r24}\n\
                 <b>Candle close:</b> {close_str}",
                label = interval.label(),
            )
        }
    }
}
