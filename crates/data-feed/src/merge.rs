//! Series merge and snapshot construction

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use signals_core::{
    FetchFailure, FetchResult, HistoricalRecord, MempoolState, MetricPoint, OhlcSample,
    OnchainSeries, RefreshConfig, Snapshot, TIMESTAMP_FORMAT,
};
use signals_indicators::{forward_fill, pct_change, rsi_series, SignalEngine, SignalInputs};

/// Left join of both on-chain series onto price timestamps, one record per price sample.
///
/// On-chain values are matched on exact timestamps and forward-filled; RSI, the
/// 7-sample changes and the per-row signal are computed on the joined rows.
pub fn merge_series(
    prices: &[OhlcSample],
    onchain: &OnchainSeries,
    mempool: &MempoolState,
    config: &RefreshConfig,
) -> Vec<HistoricalRecord> {
    let mut prices = prices.to_vec();
    prices.sort_by_key(|p| p.timestamp);

    let closes: Vec<f64> = prices.iter().map(|p| p.close).collect();
    let rsi = rsi_series(&closes, config.rsi_period);

    let transactions = forward_fill(&left_join(&prices, &onchain.transactions));
    let addresses = forward_fill(&left_join(&prices, &onchain.unique_addresses));
    let tx_change = pct_change(&transactions, config.change_periods);
    let addr_change = pct_change(&addresses, config.change_periods);

    let engine = SignalEngine::from_config(config);

    prices
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let signal = engine.derive(&SignalInputs {
                rsi: rsi[i],
                addr_change: addr_change[i],
                tx_change: tx_change[i],
            });

            HistoricalRecord {
                timestamp: sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                open: sample.open,
                high: sample.high,
                low: sample.low,
                close: sample.close,
                rsi: rsi[i],
                n_transactions: transactions[i],
                n_unique_addresses: addresses[i],
                block_height: mempool.block_height,
                fastest_fee: mempool.fee_rates.fastest_fee,
                addr_change_7d: addr_change[i],
                tx_change_7d: tx_change[i],
                signal,
            }
        })
        .collect()
}

fn left_join(prices: &[OhlcSample], series: &[MetricPoint]) -> Vec<Option<f64>> {
    let by_timestamp: HashMap<DateTime<Utc>, f64> =
        series.iter().map(|p| (p.timestamp, p.value)).collect();

    prices
        .iter()
        .map(|p| by_timestamp.get(&p.timestamp).copied())
        .collect()
}

/// Build the snapshot for one cycle from already-fetched upstream data
pub fn build_snapshot(
    prices: &[OhlcSample],
    onchain: &OnchainSeries,
    mempool: &MempoolState,
    config: &RefreshConfig,
) -> FetchResult<Snapshot> {
    if let Some(bad) = prices.iter().find(|p| !p.close.is_finite()) {
        return Err(FetchFailure::Compute(format!(
            "non-finite close at {}",
            bad.timestamp.format(TIMESTAMP_FORMAT)
        )));
    }

    let rows = merge_series(prices, onchain, mempool, config);
    let latest = rows
        .last()
        .ok_or_else(|| FetchFailure::Compute("price series is empty".to_string()))?;

    let price_change_24h = match rows.len() {
        n if n > 1 => {
            let previous = rows[n - 2].close;
            if previous == 0.0 {
                return Err(FetchFailure::Compute("previous close is zero".to_string()));
            }
            (latest.close - previous) / previous * 100.0
        }
        _ => 0.0,
    };

    let start = rows.len().saturating_sub(config.history_len);

    Ok(Snapshot {
        price: latest.close,
        price_change_24h,
        active_addresses: latest.n_unique_addresses.map(|v| v.max(0.0) as u64).unwrap_or(0),
        tx_volume: latest.n_transactions.unwrap_or(0.0),
        rsi: latest.rsi,
        signal: latest.signal,
        block_height: latest.block_height,
        fastest_fee: latest.fastest_fee,
        historical_series: rows[start..].to_vec(),
    })
}
