// Market Module - tick aggregation and bounded in-memory history

pub mod aggregator;
pub mod store;

// Re-export commonly used items
pub use aggregator::CandleAggregator;
pub use store::{MarketStore, MarketStoreStats};
