//! Aggregated snapshot types pushed to clients

use serde::{Deserialize, Serialize};

use crate::Signal;

/// Timestamp layout used for historical records on the wire
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// One merged per-timestamp row (price joined with on-chain and mempool data)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub rsi: Option<f64>,

    // On-chain, forward-filled
    #[serde(rename = "n-transactions")]
    pub n_transactions: Option<f64>,
    #[serde(rename = "n-unique-addresses")]
    pub n_unique_addresses: Option<f64>,

    // Mempool, same value on every row of a cycle
    pub block_height: u64,
    pub fastest_fee: u64,

    // Derived
    pub addr_change_7d: Option<f64>,
    pub tx_change_7d: Option<f64>,
    pub signal: Signal,
}

/// Immutable result of one aggregation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub price: f64,
    pub price_change_24h: f64,
    pub active_addresses: u64,
    pub tx_volume: f64,
    pub rsi: Option<f64>,
    pub signal: Signal,
    pub block_height: u64,
    pub fastest_fee: u64,

    /// Chronological, at most `history_len` rows
    #[serde(rename = "historical_data")]
    pub historical_series: Vec<HistoricalRecord>,
}

impl Snapshot {
    /// Timestamp of the most recent row, if any
    pub fn latest_timestamp(&self) -> Option<&str> {
        self.historical_series.last().map(|r| r.timestamp.as_str())
    }
}
