//! RSI (Relative Strength Index) with Wilder smoothing.

use std::collections::HashMap;

/// RSI for the last close in the series.
///
/// Needs at least `period + 1` closes; returns `None` otherwise. The
/// average gain/loss is seeded with the simple mean of the first `period`
/// changes and then Wilder-smoothed across every remaining change, so the
/// value depends on the whole supplied history — callers should pass a
/// window well beyond `period` (the scanner uses 500 candles) for values
/// to line up with a reference charting platform.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += -change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    let w = period as f64;
    for i in (period + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (w - 1.0) + gain) / w;
        avg_loss = (avg_loss * (w - 1.0) + loss) / w;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// RSI for several periods over the same close series.
///
/// Periods are computed independently; a period without enough history maps
/// to `None`.
pub fn rsi_multi(closes: &[f64], periods: &[usize]) -> HashMap<usize, Option<f64>> {
    periods.iter().map(|&p| (p, rsi(closes, p))).collect()
}
