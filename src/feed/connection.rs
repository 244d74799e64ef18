// Feed Manager - connection lifecycle, tick routing, and the signal timer
// One owned service per process: a read loop that folds ticks into candles
// and a periodic evaluation loop that turns stored history into signals

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use crate::analytics::generate_signal;
use crate::core::config::FeedConfig;
use crate::core::events::{EventBus, StreamEvent};
use crate::core::types::{ConnectionStatus, Tick, Timeframe};
use crate::feed::history::HistoryClient;
use crate::feed::protocol::{parse_message, tick_subscribe_request, InboundMessage};
use crate::market::{CandleAggregator, MarketStore};

/// Minimum stored higher-timeframe candles before backfill is skipped.
const BACKFILL_THRESHOLD: usize = 60;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed already started")]
    AlreadyStarted,
}

/// Commands routed into the live connection loop.
#[derive(Debug)]
enum FeedCommand {
    Subscribe(String),
}

#[derive(Debug, Default)]
struct FeedCounters {
    ticks_processed: u64,
    candles_published: u64,
    signals_generated: u64,
    reconnects: u64,
}

/// State shared between the manager handle and its background tasks.
struct FeedShared {
    config: FeedConfig,
    store: Arc<MarketStore>,
    bus: Arc<EventBus>,
    history: Arc<HistoryClient>,
    status: RwLock<ConnectionStatus>,
    symbols: RwLock<HashSet<String>>,
    aggregators: Mutex<HashMap<String, CandleAggregator>>,
    counters: RwLock<FeedCounters>,
}

impl FeedShared {
    /// Fold one tick into every timeframe bucket, persist the updated
    /// candles, and publish copies to live subscribers.
    fn process_tick(&self, tick: &Tick) {
        let candles: Vec<(Timeframe, _)> = {
            let mut aggregators = self.aggregators.lock();
            let aggregator = aggregators
                .entry(tick.symbol.clone())
                .or_insert_with(CandleAggregator::new);
            Timeframe::ALL
                .iter()
                .map(|&tf| (tf, aggregator.build(tf, tick)))
                .collect()
        };

        for (timeframe, candle) in candles {
            self.store.add_candle(&tick.symbol, timeframe, candle);
            self.bus.publish(StreamEvent::Candle {
                symbol: tick.symbol.clone(),
                timeframe,
                candle,
            });
        }

        let mut counters = self.counters.write();
        counters.ticks_processed += 1;
        counters.candles_published += Timeframe::ALL.len() as u64;
    }

    /// One evaluation cycle over every tracked symbol, ending with a
    /// heartbeat regardless of how many signals were produced.
    fn evaluate_once(&self) {
        let symbols: Vec<String> = self.symbols.read().iter().cloned().collect();

        for symbol in symbols {
            let m5 = self.store.get_candles(&symbol, Timeframe::M5);
            let m1 = self.store.get_candles(&symbol, Timeframe::M1);

            let Some((signal, metrics)) = generate_signal(&symbol, &m5, &m1) else {
                debug!(symbol = %symbol, m5 = m5.len(), m1 = m1.len(), "Insufficient history, skipping");
                continue;
            };

            info!(symbol = %symbol, action = %signal.action, confidence = %signal.confidence, "Signal generated");

            self.store.add_signal(signal.clone());
            self.store.set_metrics(&symbol, metrics.clone());
            self.bus.publish(StreamEvent::Signal {
                symbol: symbol.clone(),
                signal,
            });
            self.bus.publish(StreamEvent::Metrics { symbol, metrics });

            self.counters.write().signals_generated += 1;
        }

        self.bus.publish(StreamEvent::Heartbeat {
            ts: Utc::now().timestamp_millis(),
        });
    }

    /// Seed recent candle history for a symbol whose stored state is too
    /// short to evaluate. Live candles are never overwritten.
    async fn backfill_symbol(&self, symbol: &str) {
        if self.store.get_candles(symbol, Timeframe::M5).len() >= BACKFILL_THRESHOLD {
            debug!(symbol = %symbol, "History sufficient, backfill skipped");
            return;
        }

        for timeframe in Timeframe::ALL {
            match self
                .history
                .fetch(symbol, timeframe, self.config.history_count)
                .await
            {
                Ok(candles) => {
                    info!(symbol = %symbol, timeframe = %timeframe, count = candles.len(), "Backfilled history");
                    self.store.backfill_candles(symbol, timeframe, &candles);
                }
                Err(e) => {
                    // Live aggregation fills the gap over time
                    warn!(symbol = %symbol, timeframe = %timeframe, error = %e, "Backfill failed");
                }
            }
        }
    }
}

/// Owned feed service. Create one, register symbols, call `start` inside a
/// tokio runtime. Dropping the manager (or calling `stop`) tears down its
/// background tasks.
pub struct FeedManager {
    shared: Arc<FeedShared>,
    cmd_tx: mpsc::UnboundedSender<FeedCommand>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<FeedCommand>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedManager {
    pub fn new(config: FeedConfig, store: Arc<MarketStore>, bus: Arc<EventBus>) -> Self {
        let history = Arc::new(HistoryClient::new(
            config.endpoint(),
            Duration::from_secs(config.history_timeout_secs),
        ));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        Self {
            shared: Arc::new(FeedShared {
                config,
                store,
                bus,
                history,
                status: RwLock::new(ConnectionStatus::Disconnected),
                symbols: RwLock::new(HashSet::new()),
                aggregators: Mutex::new(HashMap::new()),
                counters: RwLock::new(FeedCounters::default()),
            }),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the connection loop and the signal timer. Errors if already
    /// started; `stop` does not re-arm a manager.
    pub fn start(&self) -> Result<(), FeedError> {
        let cmd_rx = self
            .cmd_rx
            .lock()
            .take()
            .ok_or(FeedError::AlreadyStarted)?;

        info!(endpoint = %self.shared.config.endpoint(), "Starting feed manager");

        let shared = self.shared.clone();
        let connection = tokio::spawn(async move {
            run_connection_loop(shared, cmd_rx).await;
        });

        let shared = self.shared.clone();
        let signals = tokio::spawn(async move {
            run_signal_loop(shared).await;
        });

        let mut tasks = self.tasks.lock();
        tasks.push(connection);
        tasks.push(signals);
        Ok(())
    }

    /// Tear down background tasks and mark the feed disconnected.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
        *self.shared.status.write() = ConnectionStatus::Disconnected;
        info!("Feed manager stopped");
    }

    /// Track a symbol: initialize its store slot, request the live tick
    /// stream, and backfill history when the stored window is too short.
    /// Idempotent; repeat calls for a tracked symbol do nothing.
    pub fn subscribe(&self, symbol: &str) {
        let newly_added = self.shared.symbols.write().insert(symbol.to_string());
        if !newly_added {
            debug!(symbol = %symbol, "Already subscribed");
            return;
        }

        self.shared.store.ensure_symbol(symbol);
        info!(symbol = %symbol, "Symbol subscribed");

        // Queued until the connection loop is live; the resubscribe snapshot
        // on connect covers anything queued before then.
        let _ = self.cmd_tx.send(FeedCommand::Subscribe(symbol.to_string()));

        let shared = self.shared.clone();
        let symbol = symbol.to_string();
        tokio::spawn(async move {
            shared.backfill_symbol(&symbol).await;
        });
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.read()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.shared.symbols.read().iter().cloned().collect()
    }

    /// Route one tick through aggregation, storage, and fan-out. Public so
    /// ticks from sources other than the live connection (replays, tests)
    /// take the identical path.
    pub fn process_tick(&self, tick: &Tick) {
        self.shared.process_tick(tick);
    }

    /// Run one signal evaluation cycle immediately, outside the timer.
    pub fn evaluate_once(&self) {
        self.shared.evaluate_once();
    }

    pub fn get_stats(&self) -> FeedStats {
        let counters = self.shared.counters.read();
        FeedStats {
            status: *self.shared.status.read(),
            symbols: self.shared.symbols.read().len(),
            ticks_processed: counters.ticks_processed,
            candles_published: counters.candles_published,
            signals_generated: counters.signals_generated,
            reconnects: counters.reconnects,
        }
    }
}

impl Drop for FeedManager {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedStats {
    pub status: ConnectionStatus,
    pub symbols: usize,
    pub ticks_processed: u64,
    pub candles_published: u64,
    pub signals_generated: u64,
    pub reconnects: u64,
}

impl std::fmt::Display for FeedStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FeedStats(status={}, symbols={}, ticks={}, candles={}, signals={}, reconnects={})",
            self.status,
            self.symbols,
            self.ticks_processed,
            self.candles_published,
            self.signals_generated,
            self.reconnects
        )
    }
}

// ============================================================================
// Background loops
// ============================================================================

/// Connect, resubscribe, and pump frames until the connection drops, then
/// wait the fixed delay and try again. Retries forever; one loop doubles as
/// connector and reconnect timer, so overlapping attempts are impossible.
async fn run_connection_loop(
    shared: Arc<FeedShared>,
    mut cmd_rx: mpsc::UnboundedReceiver<FeedCommand>,
) {
    let endpoint = shared.config.endpoint();
    let delay = Duration::from_secs(shared.config.reconnect_delay_secs);
    let mut first_attempt = true;

    loop {
        *shared.status.write() = ConnectionStatus::Connecting;

        match connect_async(&endpoint).await {
            Ok((ws_stream, _)) => {
                info!("Feed connected");
                if !first_attempt {
                    shared.counters.write().reconnects += 1;
                }
                *shared.status.write() = ConnectionStatus::Connected;

                if let Err(e) = pump_connection(&shared, ws_stream, &mut cmd_rx).await {
                    warn!(error = %e, "Feed connection lost");
                }
            }
            Err(e) => {
                error!(error = %e, "Feed connection failed");
            }
        }

        first_attempt = false;
        *shared.status.write() = ConnectionStatus::Disconnected;

        debug!(delay_secs = delay.as_secs(), "Reconnecting after delay");
        tokio::time::sleep(delay).await;
    }
}

/// Drive one live connection: resubscribe every tracked symbol, then process
/// inbound frames and subscribe commands until the stream ends.
async fn pump_connection(
    shared: &Arc<FeedShared>,
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    cmd_rx: &mut mpsc::UnboundedReceiver<FeedCommand>,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let (mut write, mut read) = ws_stream.split();

    // Snapshot first, then drain queued commands against it: a subscribe
    // racing this connect is either in the snapshot (its command dropped
    // here) or only in the queue (kept as pending), never sent twice.
    let snapshot: Vec<String> = shared.symbols.read().iter().cloned().collect();
    let mut pending: Vec<String> = Vec::new();
    while let Ok(FeedCommand::Subscribe(symbol)) = cmd_rx.try_recv() {
        if !snapshot.contains(&symbol) && !pending.contains(&symbol) {
            pending.push(symbol);
        }
    }

    for symbol in snapshot.iter().chain(pending.iter()) {
        write
            .send(Message::Text(tick_subscribe_request(symbol).into()))
            .await?;
    }
    if !snapshot.is_empty() || !pending.is_empty() {
        info!(
            count = snapshot.len() + pending.len(),
            symbols = ?snapshot,
            "Resubscribed symbols"
        );
    }

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match parse_message(text.as_str()) {
                            Ok(InboundMessage::Tick(tick)) => shared.process_tick(&tick),
                            Ok(InboundMessage::Error { code, message }) => {
                                warn!(code = %code, message = %message, "Feed error frame");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(error = %e, "Unparseable frame skipped");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Feed closed by server");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e),
                    None => {
                        info!("Feed stream ended");
                        return Ok(());
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(FeedCommand::Subscribe(symbol)) => {
                        write
                            .send(Message::Text(tick_subscribe_request(&symbol).into()))
                            .await?;
                        debug!(symbol = %symbol, "Live subscribe sent");
                    }
                    // Manager dropped; end this connection
                    None => return Ok(()),
                }
            }
        }
    }
}

/// Fixed-period evaluation timer. Late cycles are delayed, never bunched.
async fn run_signal_loop(shared: Arc<FeedShared>) {
    let period = Duration::from_secs(shared.config.signal_interval_secs);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; consume it so cycles start one
    // period after launch.
    interval.tick().await;

    loop {
        interval.tick().await;
        shared.evaluate_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::Topic;
    use crate::core::types::{Candle, SignalAction};

    fn test_config() -> FeedConfig {
        FeedConfig {
            // Nothing listens here; backfill attempts fail fast and are logged
            ws_url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        }
    }

    fn manager() -> (FeedManager, Arc<MarketStore>, Arc<EventBus>) {
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

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (manager, store, _bus) = manager();
        manager.subscribe("R_100");
        manager.subscribe("R_100");

        assert_eq!(manager.symbols(), vec!["R_100".to_string()]);
        assert_eq!(store.get_stats().symbols, 1);
    }

    #[tokio::test]
    async fn test_process_tick_stores_and_publishes() {
        let (manager, store, bus) = manager();
        let mut candle_rx = bus.subscribe(Topic::Candle);

        manager.process_tick(&Tick::new("R_100", 1700000030, 123.45));

        // One candle event per timeframe
        let mut seen = Vec::new();
        for _ in Timeframe::ALL {
            match candle_rx.recv().await.unwrap() {
                StreamEvent::Candle { timeframe, candle, .. } => {
                    assert_eq!(candle.close, 123.45);
                    seen.push(timeframe);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert!(seen.contains(&Timeframe::M1));
        assert!(seen.contains(&Timeframe::M5));

        // Bucket times are aligned to each period
        let m1 = store.get_candles("R_100", Timeframe::M1);
        let m5 = store.get_candles("R_100", Timeframe::M5);
        assert_eq!(m1[0].time, 1700000030 / 60 * 60);
        assert_eq!(m5[0].time, 1700000030 / 300 * 300);

        let stats = manager.get_stats();
        assert_eq!(stats.ticks_processed, 1);
        assert_eq!(stats.candles_published, 2);
    }

    #[tokio::test]
    async fn test_evaluate_once_emits_signal_and_heartbeat() {
        let (manager, store, bus) = manager();

        // Seed enough flat history that backfill is skipped and the signal
        // gates pass.
        for i in 0..70 {
            store.add_candle("R_100", Timeframe::M5, flat_candle(i * 300, 100.0));
        }
        for i in 0..5 {
            store.add_candle("R_100", Timeframe::M1, flat_candle(i * 60, 100.0));
        }
        manager.subscribe("R_100");

        let mut signal_rx = bus.subscribe(Topic::Signal);
        let mut metrics_rx = bus.subscribe(Topic::Metrics);
        let mut heartbeat_rx = bus.subscribe(Topic::Heartbeat);

        manager.evaluate_once();

        match signal_rx.recv().await.unwrap() {
            StreamEvent::Signal { symbol, signal } => {
                assert_eq!(symbol, "R_100");
                assert_eq!(signal.action, SignalAction::Neutral);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            metrics_rx.recv().await.unwrap(),
            StreamEvent::Metrics { .. }
        ));
        assert!(matches!(
            heartbeat_rx.recv().await.unwrap(),
            StreamEvent::Heartbeat { .. }
        ));

        assert_eq!(store.get_signals("R_100").len(), 1);
        assert!(store.get_metrics("R_100").is_some());
        assert_eq!(manager.get_stats().signals_generated, 1);
    }

    #[tokio::test]
    async fn test_evaluate_once_heartbeat_without_symbols() {
        let (manager, _store, bus) = manager();
        let mut heartbeat_rx = bus.subscribe(Topic::Heartbeat);

        manager.evaluate_once();

        assert!(matches!(
            heartbeat_rx.recv().await.unwrap(),
            StreamEvent::Heartbeat { .. }
        ));
    }

    #[tokio::test]
    async fn test_short_history_skips_symbol() {
        let (manager, store, bus) = manager();
        for i in 0..10 {
            store.add_candle("R_100", Timeframe::M5, flat_candle(i * 300, 100.0));
        }
        manager.subscribe("R_100");

        let mut signal_rx = bus.subscribe(Topic::Signal);
        manager.evaluate_once();

        assert!(signal_rx.try_recv().is_err());
        assert!(store.get_signals("R_100").is_empty());
    }

    #[tokio::test]
    async fn test_start_twice_errors() {
        let (manager, _store, _bus) = manager();
        assert!(manager.start().is_ok());
        assert!(matches!(manager.start(), Err(FeedError::AlreadyStarted)));
        manager.stop();
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes_full_symbol_set() {
        // Accept one websocket connection and collect `expected` subscribe
        // frames from it.
        async fn accept_and_read(
            listener: &tokio::net::TcpListener,
            expected: usize,
        ) -> (
            tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
            Vec<String>,
        ) {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            let mut symbols = Vec::new();
            while symbols.len() < expected {
                if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
                    let value: serde_json::Value =
                        serde_json::from_str(text.as_str()).unwrap();
                    assert_eq!(value["subscribe"], 1);
                    symbols.push(value["ticks"].as_str().unwrap().to_string());
                }
            }
            (ws, symbols)
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let store = Arc::new(MarketStore::new());
        let bus = Arc::new(EventBus::new());
        let config = FeedConfig {
            ws_url: format!("ws://{}/", addr),
            reconnect_delay_secs: 1,
            ..Default::default()
        };
        let manager = FeedManager::new(config, store.clone(), bus);

        // Seed history so subscribe skips backfill and the mock server only
        // ever sees the live feed connection.
        for symbol in ["R_100", "R_50", "R_25"] {
            for i in 0..70 {
                store.add_candle(symbol, Timeframe::M5, flat_candle(i * 300, 100.0));
            }
        }
        manager.subscribe("R_100");
        manager.subscribe("R_50");
        manager.start().unwrap();

        let (ws, mut first) =
            tokio::time::timeout(Duration::from_secs(5), accept_and_read(&listener, 2))
                .await
                .unwrap();
        first.sort();
        assert_eq!(first, vec!["R_100".to_string(), "R_50".to_string()]);

        // Kill the connection; the manager must reconnect after the fixed
        // delay and resend the complete set, nothing dropped.
        drop(ws);

        let (mut ws, mut second) =
            tokio::time::timeout(Duration::from_secs(5), accept_and_read(&listener, 2))
                .await
                .unwrap();
        second.sort();
        assert_eq!(second, first);

        // ...and nothing duplicated.
        let extra = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
        assert!(extra.is_err(), "unexpected frame after resubscribe: {:?}", extra);

        // A subscribe while connected sends exactly one live frame.
        manager.subscribe("R_25");
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match frame {
            Message::Text(text) => {
                let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(value["ticks"], "R_25");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        let extra = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
        assert!(extra.is_err(), "duplicate subscribe frame: {:?}", extra);

        manager.stop();
    }
}
