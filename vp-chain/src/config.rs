//! Chain connection configuration
//!
//! Supports loading from environment variables with the VP_CHAIN_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use vp_core::{Address, ChainError, ChainResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL
    pub rpc_url: String,
    /// Governor contract address (0x hex)
    pub governor_address: String,
    /// Delay between log polls in the live subscription
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Largest block span requested in one `eth_getLogs` call
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_max_block_range() -> u64 {
    2_000
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            governor_address: Address::ZERO.to_string(),
            poll_interval_ms: default_poll_interval_ms(),
            max_block_range: default_max_block_range(),
        }
    }
}

impl ChainConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - VP_CHAIN_RPC_URL: JSON-RPC endpoint
    /// - VP_CHAIN_GOVERNOR_ADDRESS: governor contract address
    /// - VP_CHAIN_POLL_INTERVAL_MS: subscription poll interval
    /// - VP_CHAIN_MAX_BLOCK_RANGE: log query chunk size
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            rpc_url: env::var("VP_CHAIN_RPC_URL").unwrap_or(defaults.rpc_url),
            governor_address: env::var("VP_CHAIN_GOVERNOR_ADDRESS")
                .unwrap_or(defaults.governor_address),
            poll_interval_ms: env::var("VP_CHAIN_POLL_INTERVAL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.poll_interval_ms),
            max_block_range: env::var("VP_CHAIN_MAX_BLOCK_RANGE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_block_range),
        }
    }

    /// Parsed governor address
    pub fn governor(&self) -> ChainResult<Address> {
        self.governor_address
            .parse()
            .map_err(|e| ChainError::decode(format!("governor address: {}", e)))
    }

    /// Block ranges of at most `max_block_range` covering `[from, to]`
    pub fn chunks(&self, from: u64, to: u64) -> Vec<(u64, u64)> {
        let step = self.max_block_range.max(1);
        let mut ranges = Vec::new();
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(step - 1).min(to);
            ranges.push((start, end));
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        ranges
    }
}
