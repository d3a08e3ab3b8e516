//! Service configuration
//!
//! Supports loading from environment variables with the VP_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpServiceConfig {
    /// Upper bound on attestation lifetime
    #[serde(default = "default_signature_ttl_secs")]
    pub signature_ttl_secs: u64,
    /// Blocks replayed by startup catch-up
    #[serde(default = "default_catch_up_lookback_blocks")]
    pub catch_up_lookback_blocks: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,
    /// Heal affected pairs after each scheduled audit
    #[serde(default = "default_heal_on_reconcile")]
    pub heal_on_reconcile: bool,
    /// Consecutive failed cycles before each further failure logs a warning
    #[serde(default = "default_max_consecutive_failures_warn")]
    pub max_consecutive_failures_warn: u32,
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
}

fn default_signature_ttl_secs() -> u64 {
    300
}

fn default_catch_up_lookback_blocks() -> u64 {
    10_000
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_expiry_sweep_interval_secs() -> u64 {
    600
}

fn default_heal_on_reconcile() -> bool {
    true
}

fn default_max_consecutive_failures_warn() -> u32 {
    3
}

fn default_event_queue_capacity() -> usize {
    1024
}

impl Default for VpServiceConfig {
    fn default() -> Self {
        Self {
            signature_ttl_secs: default_signature_ttl_secs(),
            catch_up_lookback_blocks: default_catch_up_lookback_blocks(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            heal_on_reconcile: default_heal_on_reconcile(),
            max_consecutive_failures_warn: default_max_consecutive_failures_warn(),
            event_queue_capacity: default_event_queue_capacity(),
        }
    }
}

impl VpServiceConfig {
    /// Short intervals for local chains
    pub fn development() -> Self {
        Self {
            signature_ttl_secs: 120,
            catch_up_lookback_blocks: 1_000,
            reconcile_interval_secs: 30,
            expiry_sweep_interval_secs: 60,
            heal_on_reconcile: true,
            max_consecutive_failures_warn: 1,
            event_queue_capacity: 256,
        }
    }

    pub fn production() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - VP_SIGNATURE_TTL_SECS
    /// - VP_CATCH_UP_LOOKBACK_BLOCKS
    /// - VP_RECONCILE_INTERVAL_SECS
    /// - VP_EXPIRY_SWEEP_INTERVAL_SECS
    /// - VP_HEAL_ON_RECONCILE: true/false
    /// - VP_MAX_CONSECUTIVE_FAILURES_WARN
    /// - VP_EVENT_QUEUE_CAPACITY
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            signature_ttl_secs: env_parse("VP_SIGNATURE_TTL_SECS")
                .unwrap_or(defaults.signature_ttl_secs),
            catch_up_lookback_blocks: env_parse("VP_CATCH_UP_LOOKBACK_BLOCKS")
                .unwrap_or(defaults.catch_up_lookback_blocks),
            reconcile_interval_secs: env_parse("VP_RECONCILE_INTERVAL_SECS")
                .unwrap_or(defaults.reconcile_interval_secs),
            expiry_sweep_interval_secs: env_parse("VP_EXPIRY_SWEEP_INTERVAL_SECS")
                .unwrap_or(defaults.expiry_sweep_interval_secs),
            heal_on_reconcile: env_parse("VP_HEAL_ON_RECONCILE")
                .unwrap_or(defaults.heal_on_reconcile),
            max_consecutive_failures_warn: env_parse("VP_MAX_CONSECUTIVE_FAILURES_WARN")
                .unwrap_or(defaults.max_consecutive_failures_warn),
            event_queue_capacity: env_parse("VP_EVENT_QUEUE_CAPACITY")
                .unwrap_or(defaults.event_queue_capacity),
        }
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
