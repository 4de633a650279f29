//! Error types

use std::fmt;

use thiserror::Error;

use crate::ClientId;

/// Aggregation stage that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchStage {
    Price,
    Onchain,
    Mempool,
    Compute,
}

impl FetchStage {
    pub fn name(&self) -> &'static str {
        match self {
            FetchStage::Price => "price",
            FetchStage::Onchain => "onchain",
            FetchStage::Mempool => "mempool",
            FetchStage::Compute => "compute",
        }
    }
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Cycle-scoped aggregation failure. Never carries a partial snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("price fetch failed: {0}")]
    Price(String),

    #[error("onchain fetch failed: {0}")]
    Onchain(String),

    #[error("mempool fetch failed: {0}")]
    Mempool(String),

    #[error("compute failed: {0}")]
    Compute(String),
}

impl FetchFailure {
    pub fn new(stage: FetchStage, cause: impl fmt::Display) -> Self {
        let cause = cause.to_string();
        match stage {
            FetchStage::Price => FetchFailure::Price(cause),
            FetchStage::Onchain => FetchFailure::Onchain(cause),
            FetchStage::Mempool => FetchFailure::Mempool(cause),
            FetchStage::Compute => FetchFailure::Compute(cause),
        }
    }

    pub fn stage(&self) -> FetchStage {
        match self {
            FetchFailure::Price(_) => FetchStage::Price,
            FetchFailure::Onchain(_) => FetchStage::Onchain,
            FetchFailure::Mempool(_) => FetchStage::Mempool,
            FetchFailure::Compute(_) => FetchStage::Compute,
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            FetchFailure::Price(c)
            | FetchFailure::Onchain(c)
            | FetchFailure::Mempool(c)
            | FetchFailure::Compute(c) => c,
        }
    }
}

/// Outbound delivery errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Client {0} not connected")]
    ClientNotConnected(ClientId),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    #[error("Registry is shutting down")]
    ShuttingDown,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias
pub type FetchResult<T> = Result<T, FetchFailure>;
pub type TransportResult<T> = Result<T, TransportError>;
pub type SessionResult<T> = Result<T, SessionError>;
pub type CoreResult<T> = Result<T, CoreError>;
