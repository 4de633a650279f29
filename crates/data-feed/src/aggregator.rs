//! Snapshot aggregator - coordinates the upstream sources

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use signals_core::{FetchResult, FetchStage, RefreshConfig, Snapshot};

use crate::feeds::MarketDataSource;
use crate::merge::build_snapshot;

/// Produces one snapshot per call. The seam the refresh loops depend on.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn snapshot(&self) -> FetchResult<Snapshot>;
}

/// Fetches price, on-chain and mempool data in order, then merges them
pub struct DataAggregator<S> {
    source: S,
    config: RefreshConfig,
    cycles: AtomicU64,
    failures: AtomicU64,
    last_success: RwLock<Option<Instant>>,
    last_failure: RwLock<Option<FetchStage>>,
}

impl<S: MarketDataSource> DataAggregator<S> {
    pub fn new(source: S, config: RefreshConfig) -> Self {
        Self {
            source,
            config,
            cycles: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_success: RwLock::new(None),
            last_failure: RwLock::new(None),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    async fn run_cycle(&self) -> FetchResult<Snapshot> {
        let prices = self.source.fetch_prices().await?;
        let onchain = self.source.fetch_onchain().await?;
        let mempool = self.source.fetch_mempool().await?;

        build_snapshot(&prices, &onchain, &mempool, &self.config)
    }

    /// Get statistics
    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_success_age: self.last_success.read().map(|t| t.elapsed()),
            last_failure: *self.last_failure.read(),
        }
    }
}

#[async_trait]
impl<S: MarketDataSource> SnapshotProvider for DataAggregator<S> {
    async fn snapshot(&self) -> FetchResult<Snapshot> {
        let start = Instant::now();
        let result = self.run_cycle().await;
        self.cycles.fetch_add(1, Ordering::Relaxed);

        match &result {
            Ok(snapshot) => {
                *self.last_success.write() = Some(Instant::now());
                debug!(
                    price = snapshot.price,
                    signal = %snapshot.signal,
                    rows = snapshot.historical_series.len(),
                    "Aggregation cycle completed in {:?}",
                    start.elapsed()
                );
            }
            Err(failure) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                *self.last_failure.write() = Some(failure.stage());
                warn!(stage = %failure.stage(), "Aggregation cycle failed: {}", failure);
            }
        }

        result
    }
}

/// Aggregator statistics
#[derive(Debug, Clone)]
pub struct AggregatorStats {
    pub cycles: u64,
    pub failures: u64,
    pub last_success_age: Option<Duration>,
    pub last_failure: Option<FetchStage>,
}
