// Core Module - foundational types, config, logging, events

pub mod config;
pub mod events;
pub mod logger;
pub mod types;

// Re-export commonly used items for convenience
pub use config::{ConfigError, FeedConfig};
pub use events::{EventBus, EventBusStatsSnapshot, StreamEvent, Topic};
pub use logger::setup_logging;
pub use types::*;
