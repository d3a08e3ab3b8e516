//! In-memory ledger store
//!
//! Thread-safe implementation backed by ordered maps under tokio `RwLock`s.
//! Used by tests and development setups.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use vp_core::{Address, AllocationRecord, DelegatePair, DelegatorPowerRecord, PairCorrection, U256};

use super::{CorrectionOutcome, LedgerStore, StoreStats};
use crate::error::{StoreError, StoreResult};

type AllocationKey = (Address, U256);
type DelegatorKey = (U256, Address, Address);

/// In-memory ledger store.
///
/// Lock order is always allocations before delegator powers.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    allocations: Arc<RwLock<BTreeMap<AllocationKey, AllocationRecord>>>,
    delegator_powers: Arc<RwLock<BTreeMap<DelegatorKey, DelegatorPowerRecord>>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all rows
    pub async fn clear(&self) {
        self.allocations.write().await.clear();
        self.delegator_powers.write().await.clear();
    }

    fn pair_range(pair: DelegatePair) -> std::ops::RangeInclusive<DelegatorKey> {
        (pair.proposal_id, pair.delegate, Address::ZERO)
            ..=(pair.proposal_id, pair.delegate, Address::repeat_byte(0xff))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    // ==================== Allocations ====================

    async fn upsert_allocation(
        &self,
        user: Address,
        proposal_id: U256,
        vp_amount: U256,
        support: bool,
        deadline: DateTime<Utc>,
    ) -> StoreResult<AllocationRecord> {
        let mut allocations = self.allocations.write().await;
        let record = allocations
            .entry((user, proposal_id))
            .and_modify(|existing| existing.overwrite(vp_amount, support, deadline))
            .or_insert_with(|| AllocationRecord::new(user, proposal_id, vp_amount, support, deadline));
        Ok(record.clone())
    }

    async fn get_allocation(
        &self,
        user: Address,
        proposal_id: U256,
    ) -> StoreResult<Option<AllocationRecord>> {
        let allocations = self.allocations.read().await;
        Ok(allocations.get(&(user, proposal_id)).cloned())
    }

    async fn list_user_allocations(&self, user: Address) -> StoreResult<Vec<AllocationRecord>> {
        let allocations = self.allocations.read().await;
        Ok(allocations
            .range((user, U256::ZERO)..=(user, U256::MAX))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn list_allocations(&self) -> StoreResult<Vec<AllocationRecord>> {
        let allocations = self.allocations.read().await;
        Ok(allocations.values().cloned().collect())
    }

    async fn delete_allocation(&self, user: Address, proposal_id: U256) -> StoreResult<bool> {
        let mut allocations = self.allocations.write().await;
        Ok(allocations.remove(&(user, proposal_id)).is_some())
    }

    async fn delete_proposal_allocations(&self, proposal_id: U256) -> StoreResult<u64> {
        let mut allocations = self.allocations.write().await;
        let before = allocations.len();
        allocations.retain(|(_, proposal), _| *proposal != proposal_id);
        Ok((before - allocations.len()) as u64)
    }

    async fn delete_expired_allocations(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut allocations = self.allocations.write().await;
        let before = allocations.len();
        allocations.retain(|_, record| record.is_active_at(now));
        Ok((before - allocations.len()) as u64)
    }

    // ==================== Delegator powers ====================

    async fn upsert_delegator_power(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
        power_used: U256,
    ) -> StoreResult<DelegatorPowerRecord> {
        let record = DelegatorPowerRecord::new(proposal_id, delegate, delegator, power_used);
        let mut powers = self.delegator_powers.write().await;
        powers.insert((proposal_id, delegate, delegator), record.clone());
        Ok(record)
    }

    async fn list_delegate_pairs(&self, proposal_id: Option<U256>) -> StoreResult<Vec<DelegatePair>> {
        let powers = self.delegator_powers.read().await;
        let mut pairs: Vec<DelegatePair> = powers
            .keys()
            .filter(|(proposal, _, _)| proposal_id.map_or(true, |p| p == *proposal))
            .map(|(proposal, delegate, _)| DelegatePair::new(*proposal, *delegate))
            .collect();
        pairs.dedup();
        Ok(pairs)
    }

    async fn list_delegator_powers(&self, pair: DelegatePair) -> StoreResult<Vec<DelegatorPowerRecord>> {
        let powers = self.delegator_powers.read().await;
        Ok(powers
            .range(Self::pair_range(pair))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn apply_pair_corrections(
        &self,
        pair: DelegatePair,
        corrections: &[PairCorrection],
    ) -> StoreResult<CorrectionOutcome> {
        let mut allocations = self.allocations.write().await;
        let mut powers = self.delegator_powers.write().await;

        // Validate before touching anything so a rejected batch leaves no trace.
        for correction in corrections {
            if let PairCorrection::SetDelegatorPower { delegator, .. } = correction {
                if !powers.contains_key(&(pair.proposal_id, pair.delegate, *delegator)) {
                    return Err(StoreError::NotFound(format!(
                        "delegator row {:?} under {}",
                        delegator, pair
                    )));
                }
            }
        }

        let mut outcome = CorrectionOutcome::default();
        for correction in corrections {
            match correction {
                PairCorrection::DeleteDelegator { delegator } => {
                    if powers.remove(&(pair.proposal_id, pair.delegate, *delegator)).is_some() {
                        outcome.rows_deleted += 1;
                    }
                }
                PairCorrection::SetDelegatorPower { delegator, power_used } => {
                    if let Some(row) = powers.get_mut(&(pair.proposal_id, pair.delegate, *delegator)) {
                        row.power_used = *power_used;
                        row.updated_at = Utc::now();
                        outcome.rows_updated += 1;
                    }
                }
                PairCorrection::DeleteDelegateAllocation => {
                    if allocations.remove(&(pair.delegate, pair.proposal_id)).is_some() {
                        outcome.rows_deleted += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    // ==================== Stats ====================

    async fn get_stats(&self, now: DateTime<Utc>) -> StoreResult<StoreStats> {
        let allocations = self.allocations.read().await;
        let powers = self.delegator_powers.read().await;
        Ok(StoreStats::collect(allocations.values(), powers.values(), now))
    }
}
