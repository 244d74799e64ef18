// Signal Engine - multi-timeframe decision logic
// Higher timeframe (M5) sets trend and momentum, lower timeframe (M1)
// confirms the entry; pure function of the two candle histories

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::analytics::fibonacci::{build_fib_levels, nearest_retracement, PRIORITY_LEVELS};
use crate::analytics::indicators::{atr, rsi, supertrend};
use crate::core::types::{
    Candle, Confidence, Metrics, Signal, SignalAction, SignalDetails, TrendDirection,
};

/// Minimum higher-timeframe history before a signal can be evaluated.
const MIN_TREND_CANDLES: usize = 60;
/// Minimum lower-timeframe history for entry confirmation.
const MIN_ENTRY_CANDLES: usize = 5;

const SUPERTREND_PERIOD: usize = 10;
const SUPERTREND_MULTIPLIER: f64 = 2.0;
const RSI_PERIOD: usize = 14;
const ATR_PERIOD: usize = 14;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

/// Stop distance and second target, in ATR multiples.
const RISK_ATR_MULTIPLE: f64 = 1.5;
/// First target, in ATR multiples.
const TARGET_ATR_MULTIPLE: f64 = 1.0;

/// Evaluate one symbol. Returns `None` when history is too short or the
/// indicator warm-up gates fail; callers treat that as "skip this cycle",
/// not an error. Deterministic: identical inputs always produce identical
/// output, and neither candle slice is mutated.
pub fn generate_signal(
    symbol: &str,
    higher_tf: &[Candle],
    lower_tf: &[Candle],
) -> Option<(Signal, Metrics)> {
    if higher_tf.len() < MIN_TREND_CANDLES || lower_tf.len() < MIN_ENTRY_CANDLES {
        return None;
    }

    let st = supertrend(higher_tf, SUPERTREND_PERIOD, SUPERTREND_MULTIPLIER);
    let st_latest = *st.last()?;

    let rsi_values = rsi(higher_tf, RSI_PERIOD);
    let atr_values = atr(higher_tf, ATR_PERIOD);
    if rsi_values.len() < 3 || atr_values.is_empty() {
        return None;
    }

    let rsi_now = rsi_values[rsi_values.len() - 1];
    let rsi_prev = rsi_values[rsi_values.len() - 2];
    let atr_value = *atr_values.last()?;

    let trend = st_latest.direction;
    let fib = build_fib_levels(higher_tf, trend);
    let latest = higher_tf.last()?;
    let nearest = fib.as_ref().and_then(|f| nearest_retracement(latest.close, f));

    let momentum_buy = rsi_prev < RSI_OVERSOLD && rsi_now > rsi_prev;
    let momentum_sell = rsi_prev > RSI_OVERBOUGHT && rsi_now < rsi_prev;

    // Confluence with a key retracement zone raises confidence.
    let at_priority_level = nearest
        .map(|level| PRIORITY_LEVELS.contains(&level.label.as_str()))
        .unwrap_or(false);
    let confidence = if at_priority_level {
        Confidence::High
    } else {
        Confidence::Medium
    };

    let mut action = SignalAction::Neutral;
    if trend == TrendDirection::Bullish && momentum_buy {
        action = SignalAction::PotentialBuy;
    }
    if trend == TrendDirection::Bearish && momentum_sell {
        action = SignalAction::PotentialSell;
    }

    // Entry confirmation on the lower timeframe. The zone price is the
    // nearest retracement, falling back to the supertrend band when no
    // Fibonacci grid exists.
    let entry_candle = lower_tf.last()?;
    let zone = nearest.map(|level| level.price).unwrap_or(st_latest.value);

    if action == SignalAction::PotentialBuy
        && entry_candle.is_bullish()
        && entry_candle.close >= zone
    {
        action = SignalAction::Buy;
    }
    if action == SignalAction::PotentialSell
        && entry_candle.is_bearish()
        && entry_candle.close <= zone
    {
        action = SignalAction::Sell;
    }

    let entry_price = action.is_entry().then_some(entry_candle.close);

    let mut stop_loss = None;
    let mut take_profit1 = None;
    let mut take_profit2 = None;

    if let Some(entry) = entry_price {
        let risk = atr_value * RISK_ATR_MULTIPLE;
        let target1 = atr_value * TARGET_ATR_MULTIPLE;
        let target2 = atr_value * RISK_ATR_MULTIPLE;

        let buying = action == SignalAction::Buy;
        stop_loss = Some(if buying { entry - risk } else { entry + risk });

        let raw_tp1 = if buying { entry + target1 } else { entry - target1 };
        let raw_tp2 = if buying { entry + target2 } else { entry - target2 };

        // Reconcile raw ATR targets against the Fibonacci extensions when
        // they exist: take the nearer (more conservative) of the two.
        let reconcile = |raw: f64, fib_target: Option<f64>| match fib_target {
            Some(fib_price) if buying => raw.min(fib_price),
            Some(fib_price) => raw.max(fib_price),
            None => raw,
        };
        take_profit1 = Some(reconcile(raw_tp1, fib.as_ref().and_then(|f| f.extension("127.2"))));
        take_profit2 = Some(reconcile(raw_tp2, fib.as_ref().and_then(|f| f.extension("161.8"))));
    }

    let timestamp = DateTime::<Utc>::from_timestamp(latest.time, 0)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| latest.time.to_string());

    let signal = Signal {
        timestamp,
        symbol: symbol.to_string(),
        action,
        confidence: if action == SignalAction::Neutral {
            Confidence::Low
        } else {
            confidence
        },
        entry_price,
        stop_loss,
        take_profit1,
        take_profit2,
        details: SignalDetails {
            supertrend: trend,
            rsi_value: Some(rsi_now),
            fib_level: nearest.map(|level| format!("{}%", level.label)),
            atr_value: Some(atr_value),
        },
    };

    let metrics = Metrics {
        supertrend: trend,
        rsi: Some(rsi_now),
        atr: Some(atr_value),
        fib_levels: fib.as_ref().map(|f| f.all_prices()).unwrap_or_default(),
    };

    debug!(symbol = %symbol, action = %signal.action, rsi = rsi_now, "Signal evaluated");
    Some((signal, metrics))
}
