// Deriv Signals - real-time trading signal pipeline for Deriv synthetic
// indices
//
// Data flows one way:
//   Feed (websocket ticks) → Market (candle aggregation, bounded store)
//     → Analytics (indicators, signal logic) → EventBus (live fan-out)
//
// The feed layer owns connection lifecycle and history backfill, the market
// layer owns state, and analytics stays pure so every decision is
// reproducible from stored candles alone.

pub mod analytics;
pub mod core;
pub mod feed;
pub mod market;

// Re-export the primary entry points
pub use crate::core::config::FeedConfig;
pub use crate::core::events::{EventBus, StreamEvent, Topic};
pub use crate::core::logger::setup_logging;
pub use crate::core::types::{Candle, ConnectionStatus, Signal, SignalAction, Tick, Timeframe};
pub use crate::feed::FeedManager;
pub use crate::market::MarketStore;
