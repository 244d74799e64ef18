// Market Store - bounded in-memory history per symbol
// Thread-safe: written by the feed task and the signal loop, read by consumers

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::core::types::{Candle, Metrics, Signal, Timeframe};

/// Per-symbol state. Candles are ascending by bucket time; signals are
/// newest-first.
#[derive(Debug, Default)]
struct SymbolSlot {
    candles: HashMap<Timeframe, VecDeque<Candle>>,
    signals: VecDeque<Signal>,
    metrics: Option<Metrics>,
}

impl SymbolSlot {
    fn new() -> Self {
        let mut candles = HashMap::new();
        for tf in Timeframe::ALL {
            candles.insert(tf, VecDeque::new());
        }
        Self {
            candles,
            signals: VecDeque::new(),
            metrics: None,
        }
    }
}

/// Bounded per-symbol history of candles, signals, and metrics. Reads on an
/// unknown symbol behave as if the symbol had just been initialized: empty,
/// never an error. Symbol state persists for the process lifetime.
pub struct MarketStore {
    slots: RwLock<HashMap<String, SymbolSlot>>,
    max_candles: usize,
    max_signals: usize,
}

impl MarketStore {
    pub fn new() -> Self {
        Self::with_limits(500, 200)
    }

    pub fn with_limits(max_candles: usize, max_signals: usize) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            max_candles,
            max_signals,
        }
    }

    /// Lazily initialize empty state for a symbol. Idempotent.
    pub fn ensure_symbol(&self, symbol: &str) {
        let mut slots = self.slots.write();
        slots.entry(symbol.to_string()).or_insert_with(SymbolSlot::new);
    }

    /// Upsert-or-append: a candle whose bucket time matches the trailing
    /// entry replaces it (the open candle mutating tick by tick); otherwise
    /// it is appended. Trims from the front beyond the cap.
    pub fn add_candle(&self, symbol: &str, timeframe: Timeframe, candle: Candle) {
        let mut slots = self.slots.write();
        let slot = slots.entry(symbol.to_string()).or_insert_with(SymbolSlot::new);
        let list = slot.candles.entry(timeframe).or_default();

        match list.back_mut() {
            Some(last) if last.time == candle.time => *last = candle,
            _ => list.push_back(candle),
        }

        while list.len() > self.max_candles {
            list.pop_front();
        }
    }

    /// Seed older history fetched from the upstream feed. Only candles
    /// strictly older than the earliest live candle are prepended, so live
    /// aggregation is never overwritten. `history` must be ascending by time.
    pub fn backfill_candles(&self, symbol: &str, timeframe: Timeframe, history: &[Candle]) {
        let mut slots = self.slots.write();
        let slot = slots.entry(symbol.to_string()).or_insert_with(SymbolSlot::new);
        let list = slot.candles.entry(timeframe).or_default();

        let cutoff = list.front().map(|c| c.time);
        for candle in history.iter().rev() {
            match cutoff {
                Some(first) if candle.time >= first => continue,
                _ => list.push_front(*candle),
            }
        }

        while list.len() > self.max_candles {
            list.pop_front();
        }
    }

    /// Candle history, ascending by bucket time.
    pub fn get_candles(&self, symbol: &str, timeframe: Timeframe) -> Vec<Candle> {
        let slots = self.slots.read();
        slots
            .get(symbol)
            .and_then(|slot| slot.candles.get(&timeframe))
            .map(|list| list.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Prepend a signal (newest-first log) and trim from the tail.
    pub fn add_signal(&self, signal: Signal) {
        let mut slots = self.slots.write();
        let slot = slots
            .entry(signal.symbol.clone())
            .or_insert_with(SymbolSlot::new);
        slot.signals.push_front(signal);
        slot.signals.truncate(self.max_signals);
    }

    /// Signal log, newest first.
    pub fn get_signals(&self, symbol: &str) -> Vec<Signal> {
        let slots = self.slots.read();
        slots
            .get(symbol)
            .map(|slot| slot.signals.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn set_metrics(&self, symbol: &str, metrics: Metrics) {
        let mut slots = self.slots.write();
        let slot = slots.entry(symbol.to_string()).or_insert_with(SymbolSlot::new);
        slot.metrics = Some(metrics);
    }

    pub fn get_metrics(&self, symbol: &str) -> Option<Metrics> {
        let slots = self.slots.read();
        slots.get(symbol).and_then(|slot| slot.metrics.clone())
    }

    pub fn get_stats(&self) -> MarketStoreStats {
        let slots = self.slots.read();
        let mut total_candles = 0;
        let mut total_signals = 0;
        for slot in slots.values() {
            total_candles += slot.candles.values().map(|l| l.len()).sum::<usize>();
            total_signals += slot.signals.len();
        }
        MarketStoreStats {
            symbols: slots.len(),
            total_candles,
            total_signals,
        }
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct MarketStoreStats {
    pub symbols: usize,
    pub total_candles: usize,
    pub total_signals: usize,
}

impl fmt::Display for MarketStoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MarketStore(symbols={}, candles={}, signals={})",
            self.symbols, self.total_candles, self.total_signals
        )
    }
}
