//! HTTP upstream sources

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use signals_core::{
    FeeRates, FetchFailure, FetchResult, FetchStage, MempoolState, MetricPoint, OhlcSample,
    OnchainSeries, UpstreamConfig,
};

/// Base trait for upstream data sources.
///
/// Every method reports failures tagged with its own stage.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_prices(&self) -> FetchResult<Vec<OhlcSample>>;
    async fn fetch_onchain(&self) -> FetchResult<OnchainSeries>;
    async fn fetch_mempool(&self) -> FetchResult<MempoolState>;
}

/// Blockchain.com chart payload
#[derive(Debug, Deserialize)]
struct ChartResponse {
    values: Vec<ChartPoint>,
}

#[derive(Debug, Deserialize)]
struct ChartPoint {
    x: i64,
    y: f64,
}

/// CoinGecko, Blockchain.com and mempool.space over HTTP
pub struct HttpMarketData {
    config: UpstreamConfig,
    client: Client,
}

impl HttpMarketData {
    pub fn new(config: UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("btc-signals/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { config, client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        stage: FetchStage,
        url: &str,
        query: &[(&str, String)],
    ) -> FetchResult<T> {
        debug!(%stage, url, "Fetching upstream JSON");

        self.client
            .get(url)
            .query(query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchFailure::new(stage, e))?
            .json::<T>()
            .await
            .map_err(|e| FetchFailure::new(stage, e))
    }

    async fn get_text(&self, stage: FetchStage, url: &str) -> FetchResult<String> {
        debug!(%stage, url, "Fetching upstream text");

        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchFailure::new(stage, e))?
            .text()
            .await
            .map_err(|e| FetchFailure::new(stage, e))
    }

    async fn fetch_chart(&self, url: &str) -> FetchResult<Vec<MetricPoint>> {
        let query = [
            ("timespan", format!("{}days", self.config.window_days)),
            ("format", "json".to_string()),
        ];
        let chart: ChartResponse = self.get_json(FetchStage::Onchain, url, &query).await?;

        chart
            .values
            .into_iter()
            .map(|p| {
                let timestamp = DateTime::<Utc>::from_timestamp(p.x, 0).ok_or_else(|| {
                    FetchFailure::Onchain(format!("invalid timestamp {}", p.x))
                })?;
                Ok(MetricPoint::new(timestamp, p.y))
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketData {
    async fn fetch_prices(&self) -> FetchResult<Vec<OhlcSample>> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("days", self.config.window_days.to_string()),
        ];
        // [[timestamp_ms, open, high, low, close], ...]
        let rows: Vec<[f64; 5]> = self
            .get_json(FetchStage::Price, &self.config.price_url, &query)
            .await?;

        rows.into_iter()
            .map(|[ts, open, high, low, close]| {
                let timestamp = DateTime::<Utc>::from_timestamp_millis(ts as i64)
                    .ok_or_else(|| FetchFailure::Price(format!("invalid timestamp {ts}")))?;
                Ok(OhlcSample { timestamp, open, high, low, close })
            })
            .collect()
    }

    async fn fetch_onchain(&self) -> FetchResult<OnchainSeries> {
        let transactions = self.fetch_chart(&self.config.transactions_url).await?;
        let unique_addresses = self.fetch_chart(&self.config.unique_addresses_url).await?;

        Ok(OnchainSeries { transactions, unique_addresses })
    }

    async fn fetch_mempool(&self) -> FetchResult<MempoolState> {
        let height = self
            .get_text(FetchStage::Mempool, &self.config.block_height_url)
            .await?;
        let block_height = height
            .trim()
            .parse::<u64>()
            .map_err(|e| FetchFailure::Mempool(format!("invalid block height {height:?}: {e}")))?;

        let fee_rates: FeeRates = self
            .get_json(FetchStage::Mempool, &self.config.fee_rates_url, &[])
            .await?;

        Ok(MempoolState { block_height, fee_rates })
    }
}
