// Indicator Engine - pure numeric functions over candle sequences
// Wilder recurrences for ATR/RSI, ratcheting bands for Supertrend

use serde::Serialize;
use std::fmt;

use crate::core::types::{Candle, TrendDirection};

// ============================================================================
// ATR
// ============================================================================

/// Average True Range over `period` bars.
///
/// True range per bar is `max(high-low, |high-prev_close|, |low-prev_close|)`.
/// The first value is a simple average of the first `period` true ranges;
/// subsequent values use Wilder smoothing. Output index 0 corresponds to
/// candle index `period`. Empty when fewer than `period + 1` candles.
pub fn atr(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            (curr.high - curr.low)
                .max((curr.high - prev.close).abs())
                .max((curr.low - prev.close).abs())
        })
        .collect();

    let mut values = Vec::with_capacity(true_ranges.len() - period + 1);
    let mut current = true_ranges[..period].iter().sum::<f64>() / period as f64;
    values.push(current);

    for tr in &true_ranges[period..] {
        current = (current * (period as f64 - 1.0) + tr) / period as f64;
        values.push(current);
    }

    values
}

// ============================================================================
// RSI
// ============================================================================

/// Relative Strength Index over `period` close-to-close changes.
///
/// Zero-loss stretches use `RS = 100` (Wilder's convention, an RSI ceiling of
/// roughly 99.01) rather than an unbounded ratio; downstream zone logic
/// depends on that ceiling, so it is deliberate. Empty when fewer than
/// `period + 1` candles.
pub fn rsi(candles: &[Candle], period: usize) -> Vec<f64> {
    if period == 0 || candles.len() < period + 1 {
        return Vec::new();
    }

    let mut gains = Vec::with_capacity(candles.len() - 1);
    let mut losses = Vec::with_capacity(candles.len() - 1);
    for pair in candles.windows(2) {
        let diff = pair[1].close - pair[0].close;
        gains.push(diff.max(0.0));
        losses.push((-diff).max(0.0));
    }

    let rsi_from = |avg_gain: f64, avg_loss: f64| {
        let rs = if avg_loss == 0.0 { 100.0 } else { avg_gain / avg_loss };
        100.0 - 100.0 / (1.0 + rs)
    };

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut values = Vec::with_capacity(gains.len() - period + 1);
    values.push(rsi_from(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        values.push(rsi_from(avg_gain, avg_loss));
    }

    values
}

// ============================================================================
// Supertrend
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupertrendPoint {
    pub value: f64,
    pub direction: TrendDirection,
}

impl fmt::Display for SupertrendPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Supertrend(value={:.4}, direction={})", self.value, self.direction)
    }
}

/// ATR-band trend overlay.
///
/// Basic bands are midprice plus/minus `multiplier * ATR`. The final upper
/// band only tightens (moves down) unless price closes above it, in which
/// case it jumps to the new basic band; the lower band is symmetric. The
/// direction starts bullish only if the first close clears the initial basic
/// upper band, flips bearish when close drops below the lower band and back
/// when close rises above the upper band. The reported value is the lower
/// band while bullish, the upper band while bearish.
pub fn supertrend(candles: &[Candle], period: usize, multiplier: f64) -> Vec<SupertrendPoint> {
    let atrs = atr(candles, period);
    if atrs.is_empty() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(candles.len() - period);
    let mut upper_band = 0.0_f64;
    let mut lower_band = 0.0_f64;
    let mut direction = TrendDirection::Bullish;

    for (offset, candle) in candles[period..].iter().enumerate() {
        let band_atr = atrs[offset];
        let basic_upper = candle.midprice() + multiplier * band_atr;
        let basic_lower = candle.midprice() - multiplier * band_atr;

        if offset == 0 {
            upper_band = basic_upper;
            lower_band = basic_lower;
            direction = if candle.close >= basic_upper {
                TrendDirection::Bullish
            } else {
                TrendDirection::Bearish
            };
        } else {
            if basic_upper < upper_band || candle.close > upper_band {
                upper_band = basic_upper;
            }
            if basic_lower > lower_band || candle.close < lower_band {
                lower_band = basic_lower;
            }

            if direction == TrendDirection::Bullish && candle.close < lower_band {
                direction = TrendDirection::Bearish;
            } else if direction == TrendDirection::Bearish && candle.close > upper_band {
                direction = TrendDirection::Bullish;
            }
        }

        let value = match direction {
            TrendDirection::Bullish => lower_band,
            _ => upper_band,
        };
        result.push(SupertrendPoint { value, direction });
    }

    result
}

// ============================================================================
// Fractals
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractalKind {
    Up,
    Down,
}

/// A local price extremum over a symmetric lookback window. A bar can be both
/// an up and a down fractal; such bars yield two entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fractal {
    pub index: usize,
    pub time: i64,
    pub price: f64,
    pub kind: FractalKind,
}

/// Bars whose high strictly exceeds every high within `period` positions on
/// both sides ("up"), and symmetrically on lows ("down"). Requires at least
/// `2 * period + 1` candles; output is ordered by bar index, down before up
/// on a bar that is both.
pub fn fractals(candles: &[Candle], period: usize) -> Vec<Fractal> {
    if period == 0 || candles.len() < 2 * period + 1 {
        return Vec::new();
    }

    let mut found = Vec::new();
    for i in period..candles.len() - period {
        let candle = &candles[i];
        let neighbors = || (i - period..=i + period).filter(|&j| j != i);

        if neighbors().all(|j| candle.low < candles[j].low) {
            found.push(Fractal {
                index: i,
                time: candle.time,
                price: candle.low,
                kind: FractalKind::Down,
            });
        }
        if neighbors().all(|j| candle.high > candles[j].high) {
            found.push(Fractal {
                index: i,
                time: candle.time,
                price: candle.high,
                kind: FractalKind::Up,
            });
        }
    }
    found
}
