//! Breakout Trader - Main Entry Point

use anyhow::{Context, Result};
use breakout_trader::config::{Config, TelegramConfig};
use breakout_trader::exchange::{
    BinanceClient, CloseSeries, FuturesCloses, OrderGateway, SpotCloses,
};
use breakout_trader::notify::{AlertSink, LogSink, TelegramNotifier};
use breakout_trader::strategy::{MomentumScanner, TradeController};
use clap::{Parser, Subcommand};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Breakout Trader CLI
#[derive(Parser)]
#[command(name = "breakout-trader")]
#[command(version, about = "Range-breakout trading on Binance Futures with RSI alerts")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run only the momentum scanner (no trading, no credentials needed)
    Scan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let config = Config::load()?;
    config.validate()?;
    log_config(&config);

    let client = Arc::new(BinanceClient::new(&config.binance)?);

    // Shutdown signal
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown signal received");
        shutdown_clone.store(true, Ordering::SeqCst);
    });

    let scanner_only = matches!(cli.command, Some(Commands::Scan));

    // The scanner task owns its own cursors and alert sink; it shares only
    // the read-only client with the trade loop.
    let scanner_handle = if config.scanner.symbols.is_empty() {
        warn!("no scanner symbols configured, momentum scanner disabled");
        None
    } else {
        let alerts = alert_sink(&config.telegram, config.telegram.momentum_chat(), "momentum")?;
        let sources: Vec<Arc<dyn CloseSeries>> = vec![
            Arc::new(SpotCloses(client.clone())),
            Arc::new(FuturesCloses(client.clone())),
        ];
        let mut scanner =
            MomentumScanner::new(config.scanner.clone(), client.clone(), sources, alerts);
        let shutdown = shutdown.clone();
        Some(tokio::spawn(async move { scanner.run(shutdown).await }))
    };

    if scanner_only {
        match scanner_handle {
            Some(handle) => handle.await.context("scanner task panicked")??,
            None => warn!("nothing to do"),
        }
        return Ok(());
    }

    if !config.trading.dry_run {
        client
            .set_leverage(&config.trading.symbol, config.trading.leverage)
            .await
            .context("failed to apply configured leverage")?;
        info!(
            symbol = %config.trading.symbol,
            leverage = config.trading.leverage,
            "leverage applied"
        );
    }

    let alerts = alert_sink(&config.telegram, config.telegram.breakout_chat(), "breakout")?;
    let mut controller = TradeController::new(
        config.trading.clone(),
        client.clone(),
        client.clone(),
        alerts,
    );
    controller.run(shutdown).await?;

    if let Some(handle) = scanner_handle {
        handle.await.context("scanner task panicked")??;
    }

    Ok(())
}

/// Telegram sink when a chat is routed for this alert kind, log-only
/// otherwise.
fn alert_sink(
    telegram: &TelegramConfig,
    chat: Option<&str>,
    purpose: &str,
) -> Result<Arc<dyn AlertSink>> {
    match chat {
        Some(chat_id) => Ok(Arc::new(TelegramNotifier::new(
            telegram.bot_token.clone(),
            chat_id.to_string(),
        )?)),
        None => {
            info!("telegram not configured for {purpose} alerts, logging only");
            Ok(Arc::new(LogSink))
        }
    }
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "breakout-trader.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(_guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("breakout_trader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!(
        symbol = %config.trading.symbol,
        dry_run = config.trading.dry_run,
        testnet = config.binance.testnet,
        quantity = %config.trading.quantity,
        leverage = config.trading.leverage,
        range = %config.trading.range_interval,
        trigger = %config.trading.trigger_interval,
        move_stop_on_hold = config.trading.move_stop_on_hold,
        scanner_symbols = config.scanner.symbols.len(),
        "configuration loaded"
    );
}
