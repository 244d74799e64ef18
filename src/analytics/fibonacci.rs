// Fibonacci Levels - retracement/extension projection from swing anchors
// Swings come from fractal scanning with run-length reduction to alternating
// extremes; the last low/high pair consistent with the trend anchors the grid

use serde::Serialize;
use std::fmt;

use crate::analytics::indicators::{fractals, Fractal, FractalKind};
use crate::core::types::{Candle, TrendDirection};

/// Fractal window used for structurally significant swings. Wider data, same
/// mechanism as the signal-level fractal scan.
const SWING_WINDOW: usize = 2;

/// How many trailing candles are scanned for swing points.
const SWING_LOOKBACK: usize = 60;

/// Retracement fractions, projected between the two anchors.
const RETRACEMENTS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

/// Extension fractions, projected beyond the more recent anchor.
const EXTENSIONS: [f64; 2] = [1.272, 1.618];

/// Retracement labels treated as high-confluence zones by the signal engine.
pub const PRIORITY_LEVELS: [&str; 3] = ["38.2", "50.0", "61.8"];

// ============================================================================
// Types
// ============================================================================

/// One projected price level, labelled by its percentage ("38.2", "127.2").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FibLevel {
    pub label: String,
    pub price: f64,
}

impl fmt::Display for FibLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% @ {:.4}", self.label, self.price)
    }
}

/// Retracement and extension grid anchored on an alternating low/high swing
/// pair. Levels preserve projection order (retracements by fraction, then
/// extensions).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FibLevels {
    pub low: f64,
    pub high: f64,
    pub trend: TrendDirection,
    pub retracements: Vec<FibLevel>,
    pub extensions: Vec<FibLevel>,
}

impl FibLevels {
    /// All level prices, retracements first, in projection order.
    pub fn all_prices(&self) -> Vec<f64> {
        self.retracements
            .iter()
            .chain(self.extensions.iter())
            .map(|level| level.price)
            .collect()
    }

    pub fn extension(&self, label: &str) -> Option<f64> {
        self.extensions
            .iter()
            .find(|level| level.label == label)
            .map(|level| level.price)
    }
}

// ============================================================================
// Swing selection
// ============================================================================

fn percent_label(fraction: f64) -> String {
    format!("{:.1}", fraction * 100.0)
}

/// Collapse consecutive same-kind fractals to the single most extreme one,
/// leaving a strictly alternating high/low sequence.
fn alternating_swings(swings: &[Fractal]) -> Vec<Fractal> {
    let mut reduced: Vec<Fractal> = Vec::new();
    for swing in swings {
        match reduced.last_mut() {
            Some(last) if last.kind == swing.kind => {
                let more_extreme = match swing.kind {
                    FractalKind::Up => swing.price > last.price,
                    FractalKind::Down => swing.price < last.price,
                };
                if more_extreme {
                    *last = *swing;
                }
            }
            _ => reduced.push(*swing),
        }
    }
    reduced
}

/// Most recent adjacent (low, high) pair ordered to match the trend:
/// low before high for a bullish trend, high before low for a bearish one.
fn anchor_pair(swings: &[Fractal], trend: TrendDirection) -> Option<(f64, f64)> {
    let wanted = match trend {
        TrendDirection::Bearish => (FractalKind::Up, FractalKind::Down),
        _ => (FractalKind::Down, FractalKind::Up),
    };

    for pair in swings.windows(2).rev() {
        if (pair[0].kind, pair[1].kind) == wanted {
            return match trend {
                TrendDirection::Bearish => Some((pair[1].price, pair[0].price)),
                _ => Some((pair[0].price, pair[1].price)),
            };
        }
    }
    None
}

// ============================================================================
// Level construction
// ============================================================================

/// Build the Fibonacci grid for a candle history, oriented by the prevailing
/// trend. Returns `None` when fewer than two valid alternating swings exist
/// in the lookback window.
pub fn build_fib_levels(candles: &[Candle], trend: TrendDirection) -> Option<FibLevels> {
    let start = candles.len().saturating_sub(SWING_LOOKBACK);
    let swings = alternating_swings(&fractals(&candles[start..], SWING_WINDOW));
    if swings.len() < 2 {
        return None;
    }

    let (low, high) = anchor_pair(&swings, trend)?;

    // start = the older anchor, end = the more recent extreme the move ran to
    let (anchor_start, anchor_end) = match trend {
        TrendDirection::Bearish => (high, low),
        _ => (low, high),
    };
    let range = anchor_end - anchor_start;

    let retracements = RETRACEMENTS
        .iter()
        .map(|&fraction| FibLevel {
            label: percent_label(fraction),
            price: anchor_end - range * fraction,
        })
        .collect();

    let extensions = EXTENSIONS
        .iter()
        .map(|&fraction| FibLevel {
            label: percent_label(fraction),
            price: anchor_end + range * (fraction - 1.0),
        })
        .collect();

    Some(FibLevels {
        low,
        high,
        trend,
        retracements,
        extensions,
    })
}

/// Retracement level closest to `price`, by absolute distance.
pub fn nearest_retracement<'a>(price: f64, fib: &'a FibLevels) -> Option<&'a FibLevel> {
    fib.retracements.iter().min_by(|a, b| {
        (price - a.price)
            .abs()
            .total_cmp(&(price - b.price).abs())
    })
}
