//! Logging Standards and Conventions
//!
//! # Log Levels
//!
//! | Level | Usage | Examples |
//! |-------|-------|----------|
//! | ERROR | A cycle or a pair heal failed | Reconciliation run failed, heal transaction rolled back |
//! | WARN  | Divergence or degraded operation | Discrepancy found, event dropped, repeated failures |
//! | INFO  | Significant state changes | Catch-up complete, rows healed, attestation issued |
//! | DEBUG | Per-event and per-request flow | Event handled, allocation recorded |
//! | TRACE | Full payloads | Raw chain events |
//!
//! # Structured Logging Fields
//!
//! Always use structured fields for key information:
//!
//! ```ignore
//! use tracing::warn;
//!
//! warn!(
//!     proposal_id = %proposal_id,
//!     delegate = %delegate,
//!     delegator = %delegator,
//!     db_value = %db_value,
//!     on_chain_value = %on_chain,
//!     "Delegator power mismatch"
//! );
//! ```

use serde::{Deserialize, Serialize};

/// Log level enumeration matching tracing levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Parse from string, accepting `warning` as an alias
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warn" | "warning" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Default `EnvFilter` directive covering every workspace crate
    pub fn workspace_directive(&self) -> String {
        WORKSPACE_TARGETS
            .iter()
            .map(|target| format!("{}={}", target, self.as_str()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracing targets of the workspace crates
pub const WORKSPACE_TARGETS: &[&str] = &[
    "vp_core",
    "vp_store",
    "vp_signer",
    "vp_chain",
    "vp_service",
    "vp_cli",
];
