// Event Bus - topic-routed fan-out to live consumers
// Bounded tokio broadcast channels per topic; a slow subscriber lags and
// loses the oldest events instead of stalling the publisher

use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::debug;

use crate::core::types::{Candle, Metrics, Signal, Timeframe};

/// Default per-topic channel capacity.
const DEFAULT_CAPACITY: usize = 256;

// ============================================================================
// Topics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Candle,
    Signal,
    Metrics,
    Heartbeat,
}

impl Topic {
    pub const ALL: [Topic; 4] = [Topic::Candle, Topic::Signal, Topic::Metrics, Topic::Heartbeat];
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Candle => write!(f, "candle"),
            Topic::Signal => write!(f, "signal"),
            Topic::Metrics => write!(f, "metrics"),
            Topic::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Payloads delivered to consumers. Serialized shape matches what the
/// streaming API layer forwards verbatim.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Candle {
        symbol: String,
        timeframe: Timeframe,
        candle: Candle,
    },
    Signal {
        symbol: String,
        signal: Signal,
    },
    Metrics {
        symbol: String,
        metrics: Metrics,
    },
    Heartbeat {
        /// Epoch milliseconds of the evaluation cycle.
        ts: i64,
    },
}

impl StreamEvent {
    pub fn topic(&self) -> Topic {
        match self {
            StreamEvent::Candle { .. } => Topic::Candle,
            StreamEvent::Signal { .. } => Topic::Signal,
            StreamEvent::Metrics { .. } => Topic::Metrics,
            StreamEvent::Heartbeat { .. } => Topic::Heartbeat,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

#[derive(Debug, Default)]
struct EventBusStats {
    published: u64,
}

/// Fan-out of candle/signal/metrics/heartbeat events. Consumers subscribe per
/// topic and unsubscribe by dropping the receiver; delivery order per
/// subscriber matches publish order. No replay: a receiver only sees events
/// published after it was created, so consumers needing the latest state pull
/// it from the store on registration.
pub struct EventBus {
    candle_tx: broadcast::Sender<StreamEvent>,
    signal_tx: broadcast::Sender<StreamEvent>,
    metrics_tx: broadcast::Sender<StreamEvent>,
    heartbeat_tx: broadcast::Sender<StreamEvent>,
    stats: RwLock<EventBusStats>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (candle_tx, _) = broadcast::channel(capacity);
        let (signal_tx, _) = broadcast::channel(capacity);
        let (metrics_tx, _) = broadcast::channel(capacity);
        let (heartbeat_tx, _) = broadcast::channel(capacity);

        Self {
            candle_tx,
            signal_tx,
            metrics_tx,
            heartbeat_tx,
            stats: RwLock::new(EventBusStats::default()),
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<StreamEvent> {
        match topic {
            Topic::Candle => &self.candle_tx,
            Topic::Signal => &self.signal_tx,
            Topic::Metrics => &self.metrics_tx,
            Topic::Heartbeat => &self.heartbeat_tx,
        }
    }

    /// Register a subscriber for one topic. Dropping the returned receiver
    /// unsubscribes it.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<StreamEvent> {
        debug!(topic = %topic, "Bus subscriber registered");
        self.sender(topic).subscribe()
    }

    /// Publish an event to its topic. Never blocks; publishing with no
    /// subscribers is a no-op.
    pub fn publish(&self, event: StreamEvent) {
        self.stats.write().published += 1;
        // send only fails when there are no receivers
        let _ = self.sender(event.topic()).send(event);
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }

    pub fn get_stats(&self) -> EventBusStatsSnapshot {
        EventBusStatsSnapshot {
            total_published: self.stats.read().published,
            candle_subscribers: self.candle_tx.receiver_count(),
            signal_subscribers: self.signal_tx.receiver_count(),
            metrics_subscribers: self.metrics_tx.receiver_count(),
            heartbeat_subscribers: self.heartbeat_tx.receiver_count(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct EventBusStatsSnapshot {
    pub total_published: u64,
    pub candle_subscribers: usize,
    pub signal_subscribers: usize,
    pub metrics_subscribers: usize,
    pub heartbeat_subscribers: usize,
}

impl fmt::Display for EventBusStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EventBusStats(published={}, candle={}, signal={}, metrics={}, heartbeat={})",
            self.total_published,
            self.candle_subscribers,
            self.signal_subscribers,
            self.metrics_subscribers,
            self.heartbeat_subscribers
        )
    }
}
