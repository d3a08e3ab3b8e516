//! Slow Track VP Service
//!
//! Off-chain bookkeeping for Slow Track votes:
//!
//! - [`AllocationLedger`]: free VP per user and signed vote attestations
//! - [`EventIngestion`]: keeps the ledger in step with governor events
//! - [`ReconciliationEngine`]: audits delegator power against the chain and
//!   heals drift
//! - [`BackgroundRunner`]: scheduled reconciliation and expiry sweeps
//!
//! The governor contract is always the final arbiter. Every ledger value is
//! a cache of chain state that reconciliation can rebuild.
//!
//! # Example
//!
//! ```rust,ignore
//! use vp_service::{VpService, VpServiceConfig};
//!
//! let service = VpService::new(store, chain, signer, VpServiceConfig::from_env());
//! let report = service.catch_up().await?;
//! let pipeline = service.follow(subscription, report.resume_block());
//! let runner = service.start_background();
//! ```

pub mod config;
pub mod error;
pub mod ingestion;
pub mod ledger;
pub mod reconcile;
pub mod runner;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use config::VpServiceConfig;
pub use error::{IneligibleReason, VpError, VpResult};
pub use ingestion::{CatchUpReport, EventIngestion, IngestionStats};
pub use ledger::{check_eligibility, AllocationLedger, AvailableVp};
pub use reconcile::{
    ClaimValidation, HealReport, PairSyncOutcome, ReconciliationEngine, ReconciliationStats,
    RunSummary,
};
pub use runner::{run_reconcile_cycle, BackgroundRunner, CycleReport, FailureTracker, RunnerHandle};
pub use service::{LivePipeline, VpService};
