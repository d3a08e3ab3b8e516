//! Slow Track Ledger Store
//!
//! Keyed storage for two tables:
//!
//! - allocations, unique on `(user, proposal_id)`: the VP a user currently
//!   has allocated to an open proposal
//! - delegator powers, unique on `(proposal_id, delegate, delegator)`: the
//!   power each delegator contributed to a delegate's vote
//!
//! Every mutation is an idempotent upsert or delete. The store keeps no
//! audit trail; removed rows are gone.
//!
//! Two implementations share the `LedgerStore` contract:
//!
//! - `MemoryLedgerStore` for tests and development
//! - `SledLedgerStore` for persistent deployments

pub mod error;
pub mod memory;
pub mod sled_store;

#[cfg(test)]
mod conformance;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vp_core::types::serde_helpers::u256_dec;
use vp_core::{Address, AllocationRecord, DelegatePair, DelegatorPowerRecord, PairCorrection, U256};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryLedgerStore;
pub use sled_store::SledLedgerStore;

/// Allocation ledger storage interface
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ==================== Allocations ====================

    /// Insert or overwrite the row for `(user, proposal_id)`. Last write wins.
    async fn upsert_allocation(
        &self,
        user: Address,
        proposal_id: U256,
        vp_amount: U256,
        support: bool,
        deadline: DateTime<Utc>,
    ) -> StoreResult<AllocationRecord>;

    async fn get_allocation(
        &self,
        user: Address,
        proposal_id: U256,
    ) -> StoreResult<Option<AllocationRecord>>;

    /// All rows for `user`, ordered by proposal id ascending
    async fn list_user_allocations(&self, user: Address) -> StoreResult<Vec<AllocationRecord>>;

    /// Every allocation row
    async fn list_allocations(&self) -> StoreResult<Vec<AllocationRecord>>;

    /// Returns whether a row was removed
    async fn delete_allocation(&self, user: Address, proposal_id: U256) -> StoreResult<bool>;

    /// Remove every row for `proposal_id`; returns the number removed
    async fn delete_proposal_allocations(&self, proposal_id: U256) -> StoreResult<u64>;

    /// Remove every row whose deadline is at or before `now`
    async fn delete_expired_allocations(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    // ==================== Delegator powers ====================

    async fn upsert_delegator_power(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
        power_used: U256,
    ) -> StoreResult<DelegatorPowerRecord>;

    /// Distinct `(proposal_id, delegate)` pairs, ascending; optionally scoped
    /// to one proposal
    async fn list_delegate_pairs(&self, proposal_id: Option<U256>) -> StoreResult<Vec<DelegatePair>>;

    /// Rows under one pair, ordered by delegator
    async fn list_delegator_powers(&self, pair: DelegatePair) -> StoreResult<Vec<DelegatorPowerRecord>>;

    /// Apply all corrections for one pair in a single transaction.
    ///
    /// Either every correction lands or none does.
    async fn apply_pair_corrections(
        &self,
        pair: DelegatePair,
        corrections: &[PairCorrection],
    ) -> StoreResult<CorrectionOutcome>;

    // ==================== Stats ====================

    async fn get_stats(&self, now: DateTime<Utc>) -> StoreResult<StoreStats>;
}

/// Rows touched by one `apply_pair_corrections` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionOutcome {
    pub rows_deleted: u64,
    pub rows_updated: u64,
}

/// Storage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_allocations: u64,
    pub active_allocations: u64,
    /// Past deadline, not yet swept
    pub expired_allocations: u64,
    pub distinct_users: u64,
    pub distinct_proposals: u64,
    #[serde(with = "u256_dec")]
    pub total_active_vp: U256,
    pub delegator_rows: u64,
    pub delegate_pairs: u64,
}

impl StoreStats {
    /// Build stats from full table scans
    pub(crate) fn collect<'a>(
        allocations: impl Iterator<Item = &'a AllocationRecord>,
        delegator_rows: impl Iterator<Item = &'a DelegatorPowerRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        use std::collections::BTreeSet;

        let mut stats = StoreStats::default();
        let mut users = BTreeSet::new();
        let mut proposals = BTreeSet::new();

        for record in allocations {
            stats.total_allocations += 1;
            users.insert(record.user);
            proposals.insert(record.proposal_id);
            if record.is_active_at(now) {
                stats.active_allocations += 1;
                stats.total_active_vp = stats.total_active_vp.saturating_add(record.vp_amount);
            } else {
                stats.expired_allocations += 1;
            }
        }

        let mut pairs = BTreeSet::new();
        for row in delegator_rows {
            stats.delegator_rows += 1;
            pairs.insert(row.pair());
        }

        stats.distinct_users = users.len() as u64;
        stats.distinct_proposals = proposals.len() as u64;
        stats.delegate_pairs = pairs.len() as u64;
        stats
    }
}
