// End-to-End Pipeline Tests for Deriv Signals
//
// These tests exercise the full data pipeline without network connections:
//   Tick → FeedManager → CandleAggregator → MarketStore → SignalEngine → EventBus
//
// Run with: cargo test --test pipeline_test

use std::sync::Arc;

use deriv_signals::core::events::{EventBus, StreamEvent, Topic};
use deriv_signals::core::types::{Candle, SignalAction, Tick, Timeframe};
use deriv_signals::feed::FeedManager;
use deriv_signals::market::MarketStore;
use deriv_signals::FeedConfig;

// ============================================================================
// Helpers
// ============================================================================

fn test_config() -> FeedConfig {
    FeedConfig {
        // Nothing listens here, so any accidental network use fails fast
        ws_url: "ws://127.0.0.1:1".to_string(),
        ..Default::default()
    }
}

fn build_pipeline() -> (FeedManager, Arc<MarketStore>, Arc<EventBus>) {
    let store = Arc::new(MarketStore::new());
    let bus = Arc::new(EventBus::new());
    let manager = FeedManager::new(test_config(), store.clone(), bus.clone());
    (manager, store, bus)
}

fn flat_candle(time: i64, close: f64) -> Candle {
    Candle {
        time,
        open: close,
        high: close,
        low: close,
        close,
    }
}

// ============================================================================
// TEST 1 - Ticks become candles in the store and on the bus
// ============================================================================

#[tokio::test]
async fn test_tick_stream_builds_candles() {
    let (manager, store, bus) = build_pipeline();
    let mut candle_rx = bus.subscribe(Topic::Candle);

    // Three ticks inside one M1 bucket, one tick in the next
    let base = 1_700_000_020; // 40s into a minute
    manager.process_tick(&Tick::new("R_100", base, 100.0));
    manager.process_tick(&Tick::new("R_100", base + 5, 102.0));
    manager.process_tick(&Tick::new("R_100", base + 10, 99.0));
    manager.process_tick(&Tick::new("R_100", base + 30, 101.0)); // next minute

    let m1 = store.get_candles("R_100", Timeframe::M1);
    assert_eq!(m1.len(), 2);
    assert_eq!(m1[0].open, 100.0);
    assert_eq!(m1[0].high, 102.0);
    assert_eq!(m1[0].low, 99.0);
    assert_eq!(m1[0].close, 99.0);
    assert_eq!(m1[1].open, 101.0);

    // All four ticks fall inside one M5 bucket
    let m5 = store.get_candles("R_100", Timeframe::M5);
    assert_eq!(m5.len(), 1);
    assert_eq!(m5[0].high, 102.0);
    assert_eq!(m5[0].low, 99.0);
    assert_eq!(m5[0].close, 101.0);

    // Every tick published one event per timeframe, in publish order
    for _ in 0..8 {
        assert!(matches!(
            candle_rx.recv().await.unwrap(),
            StreamEvent::Candle { .. }
        ));
    }
    assert!(candle_rx.try_recv().is_err());
}

// ============================================================================
// TEST 2 - Backfilled history merges under live candles
// ============================================================================

#[tokio::test]
async fn test_backfill_merges_with_live_aggregation() {
    let (manager, store, _bus) = build_pipeline();

    // Live tick first, then history arrives for earlier buckets
    manager.process_tick(&Tick::new("R_100", 1200, 50.0));

    let history = vec![
        flat_candle(300, 47.0),
        flat_candle(600, 48.0),
        flat_candle(900, 49.0),
        flat_candle(1200, 99.0), // overlaps the live bucket, must lose
    ];
    store.backfill_candles("R_100", Timeframe::M5, &history);

    let m5 = store.get_candles("R_100", Timeframe::M5);
    let times: Vec<i64> = m5.iter().map(|c| c.time).collect();
    assert_eq!(times, vec![300, 600, 900, 1200]);
    assert_eq!(m5[3].close, 50.0); // live candle kept

    // Later ticks keep extending the live series
    manager.process_tick(&Tick::new("R_100", 1500, 51.0));
    assert_eq!(store.get_candles("R_100", Timeframe::M5).len(), 5);
}

// ============================================================================
// TEST 3 - Full evaluation cycle: signal, metrics, heartbeat
// ============================================================================

#[tokio::test]
async fn test_evaluation_cycle_emits_all_topics() {
    let (manager, store, bus) = build_pipeline();

    // Seed a full flat history so backfill is skipped and the gates pass
    for i in 0..70 {
        store.add_candle("R_100", Timeframe::M5, flat_candle(i * 300, 250.0));
    }
    for i in 0..5 {
        store.add_candle("R_100", Timeframe::M1, flat_candle(i * 60, 250.0));
    }
    manager.subscribe("R_100");

    let mut signal_rx = bus.subscribe(Topic::Signal);
    let mut metrics_rx = bus.subscribe(Topic::Metrics);
    let mut heartbeat_rx = bus.subscribe(Topic::Heartbeat);

    manager.evaluate_once();

    // Flat candles cannot justify a trade
    let signal = match signal_rx.recv().await.unwrap() {
        StreamEvent::Signal { symbol, signal } => {
            assert_eq!(symbol, "R_100");
            signal
        }
        other => panic!("unexpected event: {:?}", other),
    };
    assert_eq!(signal.action, SignalAction::Neutral);
    assert!(signal.entry_price.is_none());

    match metrics_rx.recv().await.unwrap() {
        StreamEvent::Metrics { metrics, .. } => {
            assert!(metrics.rsi.is_some());
            assert_eq!(metrics.atr, Some(0.0));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(matches!(
        heartbeat_rx.recv().await.unwrap(),
        StreamEvent::Heartbeat { .. }
    ));

    // The same signal landed in the bounded store, newest first
    let stored = store.get_signals("R_100");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], signal);

    // A second cycle is deterministic on identical history
    manager.evaluate_once();
    let stored = store.get_signals("R_100");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].action, stored[1].action);
    assert_eq!(stored[0].timestamp, stored[1].timestamp);
}

// ============================================================================
// TEST 4 - Events serialize with the wire field names
// ============================================================================

#[tokio::test]
async fn test_signal_event_wire_shape() {
    let (manager, store, bus) = build_pipeline();
    for i in 0..70 {
        store.add_candle("R_25", Timeframe::M5, flat_candle(i * 300, 10.0));
    }
    for i in 0..5 {
        store.add_candle("R_25", Timeframe::M1, flat_candle(i * 60, 10.0));
    }
    manager.subscribe("R_25");

    let mut signal_rx = bus.subscribe(Topic::Signal);
    manager.evaluate_once();

    let event = signal_rx.recv().await.unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "signal");
    assert_eq!(json["symbol"], "R_25");
    assert_eq!(json["signal"]["action"], "NEUTRAL");
    assert!(json["signal"].get("entryPrice").is_some());
    assert!(json["signal"]["details"].get("rsiValue").is_some());
}

// ============================================================================
// TEST 5 - Slow consumers never stall the pipeline
// ============================================================================

#[tokio::test]
async fn test_slow_subscriber_does_not_block_ticks() {
    let store = Arc::new(MarketStore::new());
    let bus = Arc::new(EventBus::with_capacity(4));
    let manager = FeedManager::new(test_config(), store.clone(), bus.clone());

    // Subscriber exists but never reads
    let _lagging_rx = bus.subscribe(Topic::Candle);

    for i in 0..100 {
        manager.process_tick(&Tick::new("R_100", 1_700_000_000 + i, 100.0 + i as f64));
    }

    // Publishing stayed non-blocking and state is complete
    assert_eq!(manager.get_stats().ticks_processed, 100);
    assert!(!store.get_candles("R_100", Timeframe::M1).is_empty());
}
