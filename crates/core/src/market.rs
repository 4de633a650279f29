//! Upstream market, on-chain and mempool samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLC candle from the price upstream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcSample {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A timestamp-keyed numeric observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl MetricPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// The two on-chain series fetched each cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnchainSeries {
    /// Daily confirmed transaction count
    pub transactions: Vec<MetricPoint>,
    /// Daily unique address count
    pub unique_addresses: Vec<MetricPoint>,
}

/// Recommended fee tiers in sat/vB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRates {
    pub fastest_fee: u64,
    #[serde(default)]
    pub half_hour_fee: u64,
    #[serde(default)]
    pub hour_fee: u64,
    #[serde(default)]
    pub economy_fee: u64,
    #[serde(default)]
    pub minimum_fee: u64,
}

/// Current mempool state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MempoolState {
    pub block_height: u64,
    pub fee_rates: FeeRates,
}
