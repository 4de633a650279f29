//! Technical indicators and signal rules
//!
//! Features:
//! - Wilder-smoothed RSI
//! - Lagged percent change and forward fill over gappy series
//! - Pluggable Buy/Sell rules combining RSI with on-chain activity

pub mod rsi;
pub mod change;
pub mod strategies;

pub use rsi::{latest_rsi, rsi_series};
pub use change::{forward_fill, pct_change};
pub use strategies::{
    OverboughtCooling, OversoldAccumulation, SignalEngine, SignalInputs, SignalRule,
};
