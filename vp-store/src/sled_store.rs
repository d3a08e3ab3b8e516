//! Sled-backed ledger store
//!
//! Rows are JSON values under fixed-width big-endian keys, so prefix scans
//! come back in key order:
//!
//! | Tree                      | Key                                      |
//! |---------------------------|------------------------------------------|
//! | `allocations`             | user (20) ‖ proposal_id (32)             |
//! | `allocations_by_proposal` | proposal_id (32) ‖ user (20)             |
//! | `delegator_powers`        | proposal_id (32) ‖ delegate (20) ‖ delegator (20) |
//!
//! Addresses are raw bytes, which normalizes case for free.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Transactional;
use std::path::Path;
use tracing::debug;
use vp_core::{Address, AllocationRecord, DelegatePair, DelegatorPowerRecord, PairCorrection, U256};

use super::{CorrectionOutcome, LedgerStore, StoreStats};
use crate::error::{StoreError, StoreResult};

const ALLOCATIONS_TREE: &str = "allocations";
const PROPOSAL_INDEX_TREE: &str = "allocations_by_proposal";
const DELEGATOR_POWERS_TREE: &str = "delegator_powers";

type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

/// Persistent ledger store on sled
#[derive(Debug, Clone)]
pub struct SledLedgerStore {
    db: sled::Db,
    allocations: sled::Tree,
    proposal_index: sled::Tree,
    delegator_powers: sled::Tree,
}

impl SledLedgerStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Temporary database removed on drop
    pub fn temporary() -> StoreResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> StoreResult<Self> {
        Ok(Self {
            allocations: db.open_tree(ALLOCATIONS_TREE)?,
            proposal_index: db.open_tree(PROPOSAL_INDEX_TREE)?,
            delegator_powers: db.open_tree(DELEGATOR_POWERS_TREE)?,
            db,
        })
    }

    /// Flush to disk
    pub async fn flush(&self) -> StoreResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    // ==================== Helpers ====================

    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn proposal_bytes(proposal_id: U256) -> [u8; 32] {
        proposal_id.to_be_bytes::<32>()
    }

    fn allocation_key(user: Address, proposal_id: U256) -> Vec<u8> {
        let mut key = Vec::with_capacity(52);
        key.extend_from_slice(user.as_slice());
        key.extend_from_slice(&Self::proposal_bytes(proposal_id));
        key
    }

    fn proposal_index_key(proposal_id: U256, user: Address) -> Vec<u8> {
        let mut key = Vec::with_capacity(52);
        key.extend_from_slice(&Self::proposal_bytes(proposal_id));
        key.extend_from_slice(user.as_slice());
        key
    }

    fn pair_prefix(pair: DelegatePair) -> Vec<u8> {
        let mut key = Vec::with_capacity(72);
        key.extend_from_slice(&Self::proposal_bytes(pair.proposal_id));
        key.extend_from_slice(pair.delegate.as_slice());
        key
    }

    fn delegator_key(pair: DelegatePair, delegator: Address) -> Vec<u8> {
        let mut key = Self::pair_prefix(pair);
        key.extend_from_slice(delegator.as_slice());
        key
    }

    fn scan<T: DeserializeOwned>(iter: sled::Iter) -> StoreResult<Vec<T>> {
        iter.map(|item| {
            let (_, value) = item?;
            Self::decode(&value)
        })
        .collect()
    }

    fn abort<T>(e: StoreError) -> TxResult<T> {
        Err(ConflictableTransactionError::Abort(e))
    }

    fn tx_error(e: TransactionError<StoreError>) -> StoreError {
        match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Transaction(e.to_string()),
        }
    }

    /// Remove an allocation row and its index entry inside a transaction
    fn remove_allocation_tx(
        allocations: &TransactionalTree,
        index: &TransactionalTree,
        user: Address,
        proposal_id: U256,
    ) -> TxResult<bool> {
        let removed = allocations.remove(Self::allocation_key(user, proposal_id))?;
        index.remove(Self::proposal_index_key(proposal_id, user))?;
        Ok(removed.is_some())
    }
}

#[async_trait]
impl LedgerStore for SledLedgerStore {
    // ==================== Allocations ====================

    async fn upsert_allocation(
        &self,
        user: Address,
        proposal_id: U256,
        vp_amount: U256,
        support: bool,
        deadline: DateTime<Utc>,
    ) -> StoreResult<AllocationRecord> {
        let key = Self::allocation_key(user, proposal_id);
        let index_key = Self::proposal_index_key(proposal_id, user);

        (&self.allocations, &self.proposal_index)
            .transaction(|(allocations, index)| -> TxResult<AllocationRecord> {
                let record = match allocations.get(&key)? {
                    Some(bytes) => {
                        let mut existing: AllocationRecord = match Self::decode(&bytes) {
                            Ok(record) => record,
                            Err(e) => return Self::abort(e),
                        };
                        existing.overwrite(vp_amount, support, deadline);
                        existing
                    }
                    None => AllocationRecord::new(user, proposal_id, vp_amount, support, deadline),
                };
                let value = match Self::encode(&record) {
                    Ok(value) => value,
                    Err(e) => return Self::abort(e),
                };
                allocations.insert(key.as_slice(), value)?;
                index.insert(index_key.as_slice(), Vec::<u8>::new())?;
                Ok(record)
            })
            .map_err(Self::tx_error)
    }

    async fn get_allocation(
        &self,
        user: Address,
        proposal_id: U256,
    ) -> StoreResult<Option<AllocationRecord>> {
        match self.allocations.get(Self::allocation_key(user, proposal_id))? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_user_allocations(&self, user: Address) -> StoreResult<Vec<AllocationRecord>> {
        Self::scan(self.allocations.scan_prefix(user.as_slice()))
    }

    async fn list_allocations(&self) -> StoreResult<Vec<AllocationRecord>> {
        Self::scan(self.allocations.iter())
    }

    async fn delete_allocation(&self, user: Address, proposal_id: U256) -> StoreResult<bool> {
        (&self.allocations, &self.proposal_index)
            .transaction(|(allocations, index)| {
                Self::remove_allocation_tx(allocations, index, user, proposal_id)
            })
            .map_err(Self::tx_error)
    }

    async fn delete_proposal_allocations(&self, proposal_id: U256) -> StoreResult<u64> {
        let prefix = Self::proposal_bytes(proposal_id);
        let mut users = Vec::new();
        for item in self.proposal_index.scan_prefix(prefix) {
            let (key, _) = item?;
            users.push(Address::from_slice(&key[32..52]));
        }

        let removed = (&self.allocations, &self.proposal_index)
            .transaction(|(allocations, index)| -> TxResult<u64> {
                let mut count = 0u64;
                for user in &users {
                    if Self::remove_allocation_tx(allocations, index, *user, proposal_id)? {
                        count += 1;
                    }
                }
                Ok(count)
            })
            .map_err(Self::tx_error)?;

        debug!(proposal_id = %proposal_id, count = removed, "Removed proposal allocations");
        Ok(removed)
    }

    async fn delete_expired_allocations(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut expired = Vec::new();
        for item in self.allocations.iter() {
            let (_, value) = item?;
            let record: AllocationRecord = Self::decode(&value)?;
            if !record.is_active_at(now) {
                expired.push((record.user, record.proposal_id));
            }
        }

        (&self.allocations, &self.proposal_index)
            .transaction(|(allocations, index)| -> TxResult<u64> {
                let mut count = 0u64;
                for (user, proposal_id) in &expired {
                    // A concurrent upsert may have moved the deadline.
                    let still_expired = match allocations.get(Self::allocation_key(*user, *proposal_id))? {
                        Some(bytes) => match Self::decode::<AllocationRecord>(&bytes) {
                            Ok(record) => !record.is_active_at(now),
                            Err(e) => return Self::abort(e),
                        },
                        None => false,
                    };
                    if still_expired && Self::remove_allocation_tx(allocations, index, *user, *proposal_id)? {
                        count += 1;
                    }
                }
                Ok(count)
            })
            .map_err(Self::tx_error)
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
        let key = Self::delegator_key(record.pair(), delegator);
        self.delegator_powers.insert(key, Self::encode(&record)?)?;
        Ok(record)
    }

    async fn list_delegate_pairs(&self, proposal_id: Option<U256>) -> StoreResult<Vec<DelegatePair>> {
        let iter = match proposal_id {
            Some(p) => self.delegator_powers.scan_prefix(Self::proposal_bytes(p)),
            None => self.delegator_powers.iter(),
        };

        let mut pairs: Vec<DelegatePair> = Vec::new();
        for item in iter {
            let (key, _) = item?;
            let pair = DelegatePair::new(
                U256::from_be_slice(&key[..32]),
                Address::from_slice(&key[32..52]),
            );
            if pairs.last() != Some(&pair) {
                pairs.push(pair);
            }
        }
        Ok(pairs)
    }

    async fn list_delegator_powers(&self, pair: DelegatePair) -> StoreResult<Vec<DelegatorPowerRecord>> {
        Self::scan(self.delegator_powers.scan_prefix(Self::pair_prefix(pair)))
    }

    async fn apply_pair_corrections(
        &self,
        pair: DelegatePair,
        corrections: &[PairCorrection],
    ) -> StoreResult<CorrectionOutcome> {
        (&self.allocations, &self.proposal_index, &self.delegator_powers)
            .transaction(|(allocations, index, powers)| -> TxResult<CorrectionOutcome> {
                let mut outcome = CorrectionOutcome::default();
                for correction in corrections {
                    match correction {
                        PairCorrection::DeleteDelegator { delegator } => {
                            if powers.remove(Self::delegator_key(pair, *delegator))?.is_some() {
                                outcome.rows_deleted += 1;
                            }
                        }
                        PairCorrection::SetDelegatorPower { delegator, power_used } => {
                            let key = Self::delegator_key(pair, *delegator);
                            let mut row: DelegatorPowerRecord = match powers.get(&key)? {
                                Some(bytes) => match Self::decode(&bytes) {
                                    Ok(row) => row,
                                    Err(e) => return Self::abort(e),
                                },
                                None => {
                                    return Self::abort(StoreError::NotFound(format!(
                                        "delegator row {:?} under {}",
                                        delegator, pair
                                    )))
                                }
                            };
                            row.power_used = *power_used;
                            row.updated_at = Utc::now();
                            let value = match Self::encode(&row) {
                                Ok(value) => value,
                                Err(e) => return Self::abort(e),
                            };
                            powers.insert(key, value)?;
                            outcome.rows_updated += 1;
                        }
                        PairCorrection::DeleteDelegateAllocation => {
                            if Self::remove_allocation_tx(allocations, index, pair.delegate, pair.proposal_id)? {
                                outcome.rows_deleted += 1;
                            }
                        }
                    }
                }
                Ok(outcome)
            })
            .map_err(Self::tx_error)
    }

    // ==================== Stats ====================

    async fn get_stats(&self, now: DateTime<Utc>) -> StoreResult<StoreStats> {
        let allocations: Vec<AllocationRecord> = Self::scan(self.allocations.iter())?;
        let powers: Vec<DelegatorPowerRecord> = Self::scan(self.delegator_powers.iter())?;
        Ok(StoreStats::collect(allocations.iter(), powers.iter(), now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance;
    use tempfile::tempdir;

    fn store() -> SledLedgerStore {
        SledLedgerStore::temporary().unwrap()
    }

    #[tokio::test]
    async fn test_sled_upsert_is_idempotent() {
        conformance::upsert_is_idempotent(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_user_allocations_ordered() {
        conformance::user_allocations_ordered_by_proposal(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_proposal_cleanup_counts() {
        conformance::proposal_cleanup_returns_exact_count(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_expired_sweep() {
        conformance::expired_sweep_keeps_active_rows(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_delegate_pairs() {
        conformance::delegate_pairs_are_distinct(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_pair_corrections() {
        conformance::pair_corrections_apply(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_pair_corrections_roll_back() {
        conformance::pair_corrections_roll_back_on_missing_row(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_stats() {
        conformance::stats_split_active_and_expired(&store()).await;
    }

    #[tokio::test]
    async fn test_sled_rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let user = Address::repeat_byte(0xaa);
        let proposal = U256::from(7u64);

        {
            let store = SledLedgerStore::open(dir.path()).unwrap();
            store
                .upsert_allocation(user, proposal, U256::from(600u64), true, Utc::now())
                .await
                .unwrap();
            store.flush().await.unwrap();
        }

        {
            let store = SledLedgerStore::open(dir.path()).unwrap();
            let row = store.get_allocation(user, proposal).await.unwrap().unwrap();
            assert_eq!(row.vp_amount, U256::from(600u64));
            // The proposal index survives too, so cleanup still finds the row.
            assert_eq!(store.delete_proposal_allocations(proposal).await.unwrap(), 1);
        }
    }
}
