//! Configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{CoreError, CoreResult};

/// Listener configuration for the client-facing server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outbound messages buffered per client before delivery fails
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            outbound_buffer: 64,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub price_url: String,
    pub transactions_url: String,
    pub unique_addresses_url: String,
    pub block_height_url: String,
    pub fee_rates_url: String,
    pub request_timeout_ms: u64,
    pub window_days: u32,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            price_url: "https://api.coingecko.com/api/v3/coins/bitcoin/ohlc".to_string(),
            transactions_url: "https://api.blockchain.info/charts/n-transactions".to_string(),
            unique_addresses_url: "https://api.blockchain.info/charts/n-unique-addresses"
                .to_string(),
            block_height_url: "https://mempool.space/api/blocks/tip/height".to_string(),
            fee_rates_url: "https://mempool.space/api/v1/fees/recommended".to_string(),
            request_timeout_ms: 10_000,
            window_days: 30,
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Refresh cadence and indicator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_ms: u64,
    pub history_len: usize,
    pub rsi_period: usize,
    /// Lag for the 7-sample percent change (first vs last of the window)
    pub change_periods: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            history_len: 30,
            rsi_period: 14,
            change_periods: 6,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub refresh: RefreshConfig,
}

impl AppConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let refresh = &self.refresh;

        if refresh.interval_ms == 0 {
            return Err(CoreError::InvalidConfig("refresh.interval_ms must be > 0".into()));
        }
        if refresh.history_len == 0 {
            return Err(CoreError::InvalidConfig("refresh.history_len must be > 0".into()));
        }
        if refresh.rsi_period < 2 {
            return Err(CoreError::InvalidConfig("refresh.rsi_period must be >= 2".into()));
        }
        if refresh.change_periods == 0 {
            return Err(CoreError::InvalidConfig("refresh.change_periods must be > 0".into()));
        }
        if refresh.oversold >= refresh.overbought {
            return Err(CoreError::InvalidConfig(format!(
                "refresh.oversold ({}) must be below refresh.overbought ({})",
                refresh.oversold, refresh.overbought
            )));
        }
        if self.server.outbound_buffer == 0 {
            return Err(CoreError::InvalidConfig("server.outbound_buffer must be > 0".into()));
        }

        Ok(())
    }
}
