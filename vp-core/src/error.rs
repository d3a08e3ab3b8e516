//! Chain collaborator error types

use thiserror::Error;

/// Errors raised by the chain collaborator.
///
/// Retry policy belongs to the client implementation, never to the ledger core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    #[error("Failed to decode chain data: {0}")]
    Decode(String),

    #[error("Not found on chain: {0}")]
    NotFound(String),

    #[error("Event subscription failed: {0}")]
    Subscription(String),

    #[error("Event queue closed")]
    QueueClosed,
}

/// Result type for chain reads
pub type ChainResult<T> = Result<T, ChainError>;

impl ChainError {
    /// Create an RPC error from any displayable error
    pub fn rpc(err: impl std::fmt::Display) -> Self {
        Self::Rpc(err.to_string())
    }

    /// Create a decode error from any displayable error
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
