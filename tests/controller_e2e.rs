//! End-to-end trade lifecycle tests against the mock exchange.

use anyhow::Result;
use async_trait::async_trait;
use breakout_trader::config::TradingConfig;
use breakout_trader::exchange::{Candle, Interval, MockExchange, OrderRecord, OrderSide};
use breakout_trader::notify::{Alert, AlertSink};
use breakout_trader::strategy::{PositionState, Side, TradeController};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};

struct RecordingSink(Mutex<Vec<Alert>>);

impl RecordingSink {
    fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    fn alerts(&self) -> Vec<Alert> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn send(&self, alert: &Alert) -> Result<()> {
        self.0.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

const SYMBOL: &str = "BTCUSDT";

fn live_config() -> TradingConfig {
    TradingConfig {
        symbol: SYMBOL.to_string(),
        quantity: dec!(0.001),
        dry_run: false,
        poll_seconds: 0.005,
        ..TradingConfig::default()
    }
}

fn candle(open_time: i64, close_time: i64, high: Decimal, low: Decimal, close: Decimal) -> Candle {
    Candle {
        open_time,
        open: close,
        high,
        low,
        close,
        close_time,
    }
}

/// Range candle: high 110, low 100, closed at `close_time`.
fn range_candle(open_time: i64, close_time: i64) -> Candle {
    candle(open_time, close_time, dec!(110), dec!(100), dec!(105))
}

fn controller(
    config: TradingConfig,
    mock: Arc<MockExchange>,
    sink: Arc<RecordingSink>,
) -> TradeController<MockExchange, MockExchange> {
    TradeController::new(config, mock.clone(), mock, sink)
}

/// Arm the controller on a 110/100 range closed at t=1000, with the active
/// range candle opening at t=1000.
async fn arm(mock: &MockExchange, ctl: &mut TradeController<MockExchange, MockExchange>) {
    mock.push_closed(SYMBOL, Interval::FifteenMinutes, range_candle(100, 1000))
        .await;
    mock.set_latest(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1000, 1900, dec!(106), dec!(104), dec!(105)),
    )
    .await;
    ctl.step().await.unwrap();
    assert!(matches!(ctl.state(), PositionState::Armed { .. }));
}

#[tokio::test]
async fn test_long_breakout_hold_then_exit() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let mut ctl = controller(live_config(), mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;

    // 1m close above the range high triggers a LONG entry.
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    ctl.step().await.unwrap();

    assert!(matches!(
        ctl.state(),
        PositionState::InPosition { plan, .. } if plan.side == Side::Long
    ));
    assert_eq!(
        mock.orders().await,
        vec![
            OrderRecord::CancelAll {
                symbol: SYMBOL.to_string()
            },
            OrderRecord::Market {
                symbol: SYMBOL.to_string(),
                side: OrderSide::Buy,
                qty: dec!(0.001),
            },
            OrderRecord::Stop {
                symbol: SYMBOL.to_string(),
                side: OrderSide::Sell,
                stop_price: dec!(100),
                qty: dec!(0.001),
            },
            OrderRecord::Target {
                symbol: SYMBOL.to_string(),
                side: OrderSide::Sell,
                target_price: dec!(133),
                qty: dec!(0.001),
            },
        ]
    );

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    let Alert::TradeEntry {
        side,
        entry,
        stop_loss,
        take_profit,
        dry_run,
        ..
    } = &alerts[0]
    else {
        panic!("expected a trade entry alert");
    };
    assert_eq!(*side, Side::Long);
    assert_eq!(*entry, dec!(111));
    assert_eq!(*stop_loss, dec!(100));
    assert_eq!(*take_profit, dec!(133));
    assert!(!dry_run);

    // Position still open; a 15m close above the range high holds.
    mock.set_position(dec!(0.001)).await;
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1000, 1900, dec!(113), dec!(108), dec!(112)),
    )
    .await;
    let before = mock.orders().await.len();
    ctl.step().await.unwrap();
    assert!(matches!(ctl.state(), PositionState::InPosition { .. }));
    assert_eq!(mock.orders().await.len(), before, "a held close places no orders");

    // Next 15m close back inside the range exits at market.
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1900, 2800, dec!(112), dec!(107), dec!(109)),
    )
    .await;
    ctl.step().await.unwrap();
    assert!(matches!(ctl.state(), PositionState::Idle));

    let orders = mock.orders().await;
    assert_eq!(
        &orders[before..],
        &[
            OrderRecord::CancelAll {
                symbol: SYMBOL.to_string()
            },
            OrderRecord::Market {
                symbol: SYMBOL.to_string(),
                side: OrderSide::Sell,
                qty: dec!(0.001),
            },
        ]
    );
}

#[tokio::test]
async fn test_short_breakout_plan_levels() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let mut ctl = controller(live_config(), mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;

    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(100), dec!(99), dec!(99)),
    )
    .await;
    ctl.step().await.unwrap();

    let PositionState::InPosition { plan, .. } = ctl.state() else {
        panic!("expected an open position");
    };
    assert_eq!(plan.side, Side::Short);
    assert_eq!(plan.stop_loss, dec!(110));
    assert_eq!(plan.take_profit, dec!(77));

    let orders = mock.orders().await;
    assert!(orders.contains(&OrderRecord::Market {
        symbol: SYMBOL.to_string(),
        side: OrderSide::Sell,
        qty: dec!(0.001),
    }));
    assert!(orders.contains(&OrderRecord::Stop {
        symbol: SYMBOL.to_string(),
        side: OrderSide::Buy,
        stop_price: dec!(110),
        qty: dec!(0.001),
    }));
}

#[tokio::test]
async fn test_range_rollover_disarms_without_orders() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let mut ctl = controller(live_config(), mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;

    // The trigger close would break out, but a new range candle has opened
    // since arming: the setup is gone and no breakout may be evaluated.
    mock.set_latest(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1900, 2800, dec!(112), dec!(110), dec!(111)),
    )
    .await;
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    ctl.step().await.unwrap();

    assert!(matches!(ctl.state(), PositionState::Idle));
    assert!(mock.orders().await.is_empty());
    assert!(sink.alerts().is_empty());
}

#[tokio::test]
async fn test_failed_entry_stays_armed() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let mut ctl = controller(live_config(), mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;

    mock.fail_market_orders(true).await;
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    assert!(ctl.step().await.is_err());

    // No optimistic transition: still armed, no protective orders placed.
    assert!(matches!(ctl.state(), PositionState::Armed { .. }));
    assert_eq!(
        mock.orders().await,
        vec![OrderRecord::CancelAll {
            symbol: SYMBOL.to_string()
        }]
    );
}

#[tokio::test]
async fn test_flat_position_rearms_on_next_range_close() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let mut ctl = controller(live_config(), mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    ctl.step().await.unwrap();
    let entry_orders = mock.orders().await.len();

    // Stop or target already filled: the account is flat.
    mock.set_position(Decimal::ZERO).await;
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1000, 1900, dec!(113), dec!(108), dec!(112)),
    )
    .await;
    ctl.step().await.unwrap();

    assert!(matches!(ctl.state(), PositionState::Idle));
    assert_eq!(
        mock.orders().await.len(),
        entry_orders,
        "no exit order for an already-flat position"
    );

    // The candle that revealed the flat position is spent; arming waits for
    // the next range close.
    mock.push_closed(SYMBOL, Interval::FifteenMinutes, range_candle(1900, 2800))
        .await;
    mock.set_latest(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(2800, 3700, dec!(106), dec!(104), dec!(105)),
    )
    .await;
    ctl.step().await.unwrap();
    let PositionState::Armed { range, .. } = ctl.state() else {
        panic!("expected the controller to re-arm");
    };
    assert_eq!(range.high, dec!(110));
    assert_eq!(range.low, dec!(100));
}

#[tokio::test]
async fn test_failed_position_query_retries_same_candle() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let mut ctl = controller(live_config(), mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    ctl.step().await.unwrap();
    let entry_orders = mock.orders().await.len();

    // Exchange cannot report the position: stay in position, keep the
    // candle unconsumed.
    mock.set_position(dec!(0.001)).await;
    mock.fail_position_queries(true).await;
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1000, 1900, dec!(112), dec!(107), dec!(109)),
    )
    .await;
    ctl.step().await.unwrap();
    assert!(matches!(ctl.state(), PositionState::InPosition { .. }));
    assert_eq!(mock.orders().await.len(), entry_orders);

    // Query recovers: the same close (109, back inside the range) is
    // re-evaluated and the position exits.
    mock.fail_position_queries(false).await;
    ctl.step().await.unwrap();
    assert!(matches!(ctl.state(), PositionState::Idle));
    let orders = mock.orders().await;
    assert_eq!(
        orders.last(),
        Some(&OrderRecord::Market {
            symbol: SYMBOL.to_string(),
            side: OrderSide::Sell,
            qty: dec!(0.001),
        })
    );
}

#[tokio::test]
async fn test_dry_run_places_no_orders_but_alerts() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let config = TradingConfig {
        dry_run: true,
        ..live_config()
    };
    let mut ctl = controller(config, mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    ctl.step().await.unwrap();

    assert!(matches!(ctl.state(), PositionState::InPosition { .. }));
    assert!(mock.orders().await.is_empty());

    let alerts = sink.alerts();
    assert_eq!(alerts.len(), 1);
    assert!(matches!(&alerts[0], Alert::TradeEntry { dry_run: true, .. }));

    // Hold/exit still runs on the simulated position.
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1000, 1900, dec!(112), dec!(107), dec!(109)),
    )
    .await;
    ctl.step().await.unwrap();
    assert!(matches!(ctl.state(), PositionState::Idle));
    assert!(mock.orders().await.is_empty());
}

#[tokio::test]
async fn test_stop_tightens_only_in_favor() {
    let mock = Arc::new(MockExchange::new());
    let sink = Arc::new(RecordingSink::new());
    let config = TradingConfig {
        move_stop_on_hold: true,
        ..live_config()
    };
    let mut ctl = controller(config, mock.clone(), sink.clone());

    arm(&mock, &mut ctl).await;
    mock.push_closed(
        SYMBOL,
        Interval::OneMinute,
        candle(1001, 1060, dec!(111), dec!(110), dec!(111)),
    )
    .await;
    ctl.step().await.unwrap();
    mock.set_position(dec!(0.001)).await;

    // Held close with low 108 > current stop 100: stop moves up, target is
    // re-posted unchanged.
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1000, 1900, dec!(113), dec!(108), dec!(112)),
    )
    .await;
    ctl.step().await.unwrap();

    let PositionState::InPosition { current_stop, .. } = ctl.state() else {
        panic!("expected an open position");
    };
    assert_eq!(*current_stop, dec!(108));
    let orders = mock.orders().await;
    assert!(orders.contains(&OrderRecord::Stop {
        symbol: SYMBOL.to_string(),
        side: OrderSide::Sell,
        stop_price: dec!(108),
        qty: dec!(0.001),
    }));
    assert!(orders.contains(&OrderRecord::Target {
        symbol: SYMBOL.to_string(),
        side: OrderSide::Sell,
        target_price: dec!(133),
        qty: dec!(0.001),
    }));
    let after_tighten = orders.len();

    // Held close with a lower low must never loosen the stop.
    mock.push_closed(
        SYMBOL,
        Interval::FifteenMinutes,
        candle(1900, 2800, dec!(114), dec!(105), dec!(113)),
    )
    .await;
    ctl.step().await.unwrap();

    let PositionState::InPosition { current_stop, .. } = ctl.state() else {
        panic!("expected an open position");
    };
    assert_eq!(*current_stop, dec!(108), "stop must not move backwards");
    assert_eq!(mock.orders().await.len(), after_tighten);
}
