//! Slow Track VP Core
//!
//! Shared types for the Slow Track voting-power ledger.
//!
//! Slow Track voting treats voting power (VP) as a scarce budget that a user
//! spreads across several concurrently open proposals. The off-chain ledger
//! mirrors what the governor contract believes each user has allocated, so
//! availability can be answered without a chain round trip.
//!
//! # Layers
//!
//! - `types` - ledger rows, proposal views, chain events, attestations and
//!   reconciliation output
//! - `chain` - the read-only chain collaborator (`ChainClient`, `EventSource`)
//! - `error` - chain read errors
//! - `logging` - log level and structured field conventions
//!
//! All VP and token quantities are `U256`. Floating point never appears.

pub mod chain;
pub mod error;
pub mod logging;
pub mod types;

pub use chain::{ChainClient, EventSource};
pub use error::{ChainError, ChainResult};
pub use types::*;

pub use alloy::primitives::{Address, U256};
