// Candle Aggregator - tick to per-timeframe candle bucketing
// One stateful instance per symbol; the feed task serializes tick delivery

use std::collections::HashMap;

use crate::core::types::{Candle, Tick, Timeframe};

/// Folds an ordered tick stream into candles, one open candle per timeframe.
/// The instance must not be shared across symbols: the open-candle state is
/// symbol-specific.
#[derive(Debug, Default)]
pub struct CandleAggregator {
    open_candles: HashMap<Timeframe, Candle>,
}

impl CandleAggregator {
    pub fn new() -> Self {
        Self {
            open_candles: HashMap::new(),
        }
    }

    /// Fold one tick into the candle for `timeframe` and return a snapshot of
    /// the updated candle. Ticks landing in the current bucket mutate it in
    /// place (open is never altered); a tick in a later bucket freezes the
    /// previous candle and opens a new one.
    ///
    /// Returned candles are copies, so downstream storage never aliases the
    /// aggregator's mutable state.
    pub fn build(&mut self, timeframe: Timeframe, tick: &Tick) -> Candle {
        let period = timeframe.period_secs();
        let bucket = tick.epoch.div_euclid(period) * period;

        match self.open_candles.get_mut(&timeframe) {
            Some(current) if current.time == bucket => {
                current.high = current.high.max(tick.quote);
                current.low = current.low.min(tick.quote);
                current.close = tick.quote;
                *current
            }
            _ => {
                let candle = Candle {
                    time: bucket,
                    open: tick.quote,
                    high: tick.quote,
                    low: tick.quote,
                    close: tick.quote,
                };
                self.open_candles.insert(timeframe, candle);
                candle
            }
        }
    }

    /// Currently open candle for a timeframe, if any tick has arrived.
    pub fn current(&self, timeframe: Timeframe) -> Option<Candle> {
        self.open_candles.get(&timeframe).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(epoch: i64, quote: f64) -> Tick {
        Tick::new("R_100", epoch, quote)
    }

    #[test]
    fn test_first_tick_opens_candle() {
        let mut agg = CandleAggregator::new();
        let candle = agg.build(Timeframe::M1, &tick(125, 100.5));

        assert_eq!(candle.time, 120);
        assert_eq!(candle.open, 100.5);
        assert_eq!(candle.high, 100.5);
        assert_eq!(candle.low, 100.5);
        assert_eq!(candle.close, 100.5);
    }

    #[test]
    fn test_same_bucket_updates_in_place() {
        let mut agg = CandleAggregator::new();
        agg.build(Timeframe::M1, &tick(120, 100.0));
        agg.build(Timeframe::M1, &tick(130, 103.0));
        let candle = agg.build(Timeframe::M1, &tick(140, 99.0));

        assert_eq!(candle.time, 120);
        assert_eq!(candle.open, 100.0); // open never changes after creation
        assert_eq!(candle.high, 103.0);
        assert_eq!(candle.low, 99.0);
        assert_eq!(candle.close, 99.0);
        assert!(candle.low <= candle.open && candle.open <= candle.high);
        assert!(candle.low <= candle.close && candle.close <= candle.high);
    }

    #[test]
    fn test_bucket_rollover_freezes_previous() {
        let mut agg = CandleAggregator::new();
        agg.build(Timeframe::M1, &tick(59, 101.0));
        let next = agg.build(Timeframe::M1, &tick(60, 102.0));

        assert_eq!(next.time, 60);
        assert_eq!(next.open, 102.0);
        // The open candle is now the new bucket only.
        assert_eq!(agg.current(Timeframe::M1).unwrap().time, 60);
    }

    #[test]
    fn test_timeframes_bucket_independently() {
        let mut agg = CandleAggregator::new();
        let m1 = agg.build(Timeframe::M1, &tick(310, 50.0));
        let m5 = agg.build(Timeframe::M5, &tick(310, 50.0));

        assert_eq!(m1.time, 300);
        assert_eq!(m5.time, 300);

        let m1 = agg.build(Timeframe::M1, &tick(365, 51.0));
        let m5 = agg.build(Timeframe::M5, &tick(365, 51.0));

        assert_eq!(m1.time, 360); // new M1 bucket
        assert_eq!(m5.time, 300); // still inside the M5 bucket
        assert_eq!(m5.high, 51.0);
    }

    #[test]
    fn test_duplicate_tick_is_idempotent() {
        let mut agg = CandleAggregator::new();
        agg.build(Timeframe::M1, &tick(10, 100.0));
        agg.build(Timeframe::M1, &tick(20, 105.0));
        let once = agg.build(Timeframe::M1, &tick(30, 102.0));
        let twice = agg.build(Timeframe::M1, &tick(30, 102.0));

        assert_eq!(once, twice);
    }

    #[test]
    fn test_negative_epoch_aligns_down() {
        let mut agg = CandleAggregator::new();
        let candle = agg.build(Timeframe::M1, &tick(-30, 1.0));
        assert_eq!(candle.time, -60);
    }
}
