//! Upstream data collection and snapshot aggregation
//!
//! Features:
//! - HTTP sources for price OHLC, on-chain metrics and mempool state
//! - Per-request timeouts so a slow upstream cannot stall a cycle
//! - Timestamp merge with forward fill, RSI and signal derivation
//! - Stage-tagged failures instead of partial snapshots

pub mod aggregator;
pub mod feeds;
pub mod merge;

pub use aggregator::{AggregatorStats, DataAggregator, SnapshotProvider};
pub use feeds::{HttpMarketData, MarketDataSource};
pub use merge::{build_snapshot, merge_series};
