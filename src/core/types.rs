// Core Type Definitions for Deriv Signals
// Wire-facing shapes keep the camelCase field names consumers already expect

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Timeframe
// ============================================================================

/// Supported candle timeframes. Closed set; each maps to a fixed bucket
/// period in seconds which doubles as the `ticks_history` granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
}

impl Timeframe {
    pub const ALL: [Timeframe; 2] = [Timeframe::M1, Timeframe::M5];

    pub fn period_secs(&self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
        }
    }

    /// Granularity value used in Deriv history requests.
    pub fn granularity(&self) -> i64 {
        self.period_secs()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// Tick
// ============================================================================

/// A single price update from the upstream feed. Transient: ticks exist only
/// long enough to be folded into candles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub epoch: i64,
    pub quote: f64,
}

impl Tick {
    pub fn new(symbol: impl Into<String>, epoch: i64, quote: f64) -> Self {
        Self {
            symbol: symbol.into(),
            epoch,
            quote,
        }
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tick(symbol={}, epoch={}, quote={})",
            self.symbol, self.epoch, self.quote
        )
    }
}

// ============================================================================
// Candle
// ============================================================================

/// OHLC aggregate over one timeframe bucket. `time` is the bucket start,
/// aligned to the timeframe period. Mutable only while it is the most recent
/// bucket for its (symbol, timeframe); frozen once a later bucket opens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close <= self.open
    }

    pub fn midprice(&self) -> f64 {
        (self.high + self.low) / 2.0
    }
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Candle(time={}, O={:.4}, H={:.4}, L={:.4}, C={:.4})",
            self.time, self.open, self.high, self.low, self.close
        )
    }
}

// ============================================================================
// Trend / Action / Confidence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Bullish => write!(f, "bullish"),
            TrendDirection::Bearish => write!(f, "bearish"),
            TrendDirection::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    Buy,
    Sell,
    PotentialBuy,
    PotentialSell,
    Neutral,
}

impl SignalAction {
    /// True for the two actionable states that carry risk levels.
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalAction::Buy | SignalAction::Sell)
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalAction::Buy => write!(f, "BUY"),
            SignalAction::Sell => write!(f, "SELL"),
            SignalAction::PotentialBuy => write!(f, "POTENTIAL_BUY"),
            SignalAction::PotentialSell => write!(f, "POTENTIAL_SELL"),
            SignalAction::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::High => "HIGH",
            Confidence::Medium => "MEDIUM",
            Confidence::Low => "LOW",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Signal
// ============================================================================

/// Indicator values backing a signal decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalDetails {
    pub supertrend: TrendDirection,
    pub rsi_value: Option<f64>,
    pub fib_level: Option<String>,
    pub atr_value: Option<f64>,
}

/// A discrete trading recommendation. Immutable once produced; stored
/// newest-first in a bounded per-symbol log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub timestamp: String,
    pub symbol: String,
    pub action: SignalAction,
    pub confidence: Confidence,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit1: Option<f64>,
    pub take_profit2: Option<f64>,
    pub details: SignalDetails,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Signal(symbol={}, action={}, confidence={})",
            self.symbol, self.action, self.confidence
        )
    }
}

// ============================================================================
// Metrics
// ============================================================================

/// Latest indicator snapshot per symbol. Overwritten wholesale on each
/// evaluation cycle; last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub supertrend: TrendDirection,
    pub rsi: Option<f64>,
    pub atr: Option<f64>,
    pub fib_levels: Vec<f64>,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Metrics(supertrend={}, rsi={:?}, atr={:?}, fib_levels={})",
            self.supertrend,
            self.rsi,
            self.atr,
            self.fib_levels.len()
        )
    }
}

// ============================================================================
// Connection Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
