//! Core types and utilities for the BTC on-chain signal server
//!
//! This crate provides shared types used across all components:
//! - Market, on-chain and mempool samples
//! - Snapshot and historical record types
//! - Client identifiers and trading signals
//! - Error taxonomy and configuration

pub mod types;
pub mod market;
pub mod snapshot;
pub mod config;
pub mod errors;

pub use types::*;
pub use market::*;
pub use snapshot::*;
pub use config::*;
pub use errors::*;
