// Feed Module - Deriv websocket connectivity
// Live tick streaming, one-shot history backfill, and the wire protocol

pub mod connection;
pub mod history;
pub mod protocol;

// Re-export commonly used items
pub use connection::{FeedError, FeedManager, FeedStats};
pub use history::{HistoryClient, HistoryError};
pub use protocol::{parse_message, InboundMessage, ParseError, TicksHistoryRequest};
