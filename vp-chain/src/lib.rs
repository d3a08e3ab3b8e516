//! Governor Chain Client
//!
//! Implements the `ChainClient` and `EventSource` collaborators from
//! `vp-core` against an EVM JSON-RPC endpoint using alloy.
//!
//! - [`EvmChainClient`]: contract reads and chunked block-range log queries
//! - [`LogSubscription`]: polling log follower that feeds the ingestion queue
//!   and keeps going across RPC failures

pub mod client;
pub mod config;
pub mod contract;
pub mod subscription;

pub use client::EvmChainClient;
pub use config::ChainConfig;
pub use subscription::LogSubscription;
