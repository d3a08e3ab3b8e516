//! Allocation Ledger
//!
//! Tracks how much of each user's VP is committed to open Slow Track
//! proposals and issues signed attestations for new votes.
//!
//! The ledger is an optimistic pre-check. Rows only change once Event
//! Ingestion sees the mined vote, so two concurrent attestation requests for
//! the same user may both pass here; the governor settles that with its own
//! accounting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use vp_core::types::serde_helpers::u256_dec;
use vp_core::{
    unix_now, Address, AllocationRecord, Attestation, ChainClient, DelegatorPowerRecord,
    ProposalInfo, ProposalStatus, ProposalTrack, U256,
};
use vp_signer::{AttestationSigner, SlowVoteMessage};
use vp_store::{LedgerStore, StoreStats};

use crate::error::{IneligibleReason, VpError, VpResult};

/// Free VP for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableVp {
    #[serde(with = "u256_dec")]
    pub total: U256,
    /// Sum of active allocations
    #[serde(with = "u256_dec")]
    pub allocated: U256,
    /// `max(0, total - allocated)`
    #[serde(with = "u256_dec")]
    pub available: U256,
    pub allocations: Vec<AllocationRecord>,
}

impl AvailableVp {
    /// Active allocation on `proposal_id`, if any
    pub fn allocation_for(&self, proposal_id: U256) -> Option<&AllocationRecord> {
        self.allocations.iter().find(|a| a.proposal_id == proposal_id)
    }
}

/// Check a proposal can take a Slow Track vote at `now_secs`
pub fn check_eligibility(proposal: &ProposalInfo, now_secs: u64) -> Result<(), IneligibleReason> {
    if !proposal.exists() {
        return Err(IneligibleReason::NotFound);
    }
    if proposal.track != ProposalTrack::Slow {
        return Err(IneligibleReason::WrongTrack);
    }
    if proposal.status != ProposalStatus::Active {
        return Err(IneligibleReason::NotActive);
    }
    if now_secs < proposal.voting_starts_at {
        return Err(IneligibleReason::VotingNotStarted);
    }
    if now_secs > proposal.voting_ends_at {
        return Err(IneligibleReason::VotingEnded);
    }
    Ok(())
}

pub struct AllocationLedger<S: LedgerStore, C: ChainClient> {
    store: Arc<S>,
    chain: Arc<C>,
    signer: Arc<AttestationSigner>,
    signature_ttl_secs: u64,
}

impl<S: LedgerStore, C: ChainClient> AllocationLedger<S, C> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        signer: Arc<AttestationSigner>,
        signature_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            chain,
            signer,
            signature_ttl_secs,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    // ==================== Ledger rows ====================

    /// Non-expired rows for `user`, ascending by proposal id
    pub async fn get_active_allocations(&self, user: Address) -> VpResult<Vec<AllocationRecord>> {
        let now = Utc::now();
        let rows = self.store.list_user_allocations(user).await?;
        Ok(rows.into_iter().filter(|r| r.is_active_at(now)).collect())
    }

    /// Idempotent upsert keyed by `(user, proposal_id)`
    pub async fn record_allocation(
        &self,
        user: Address,
        proposal_id: U256,
        vp_amount: U256,
        support: bool,
        deadline: DateTime<Utc>,
    ) -> VpResult<AllocationRecord> {
        let record = self
            .store
            .upsert_allocation(user, proposal_id, vp_amount, support, deadline)
            .await?;
        debug!(%user, %proposal_id, %vp_amount, support, "Recorded allocation");
        Ok(record)
    }

    pub async fn remove_allocation(&self, user: Address, proposal_id: U256) -> VpResult<bool> {
        let removed = self.store.delete_allocation(user, proposal_id).await?;
        if removed {
            info!(%user, %proposal_id, "Removed allocation");
        }
        Ok(removed)
    }

    /// Delete every allocation row for a finalized proposal
    pub async fn cleanup_proposal_allocations(&self, proposal_id: U256) -> VpResult<u64> {
        let count = self.store.delete_proposal_allocations(proposal_id).await?;
        info!(%proposal_id, count, "Cleaned up proposal allocations");
        Ok(count)
    }

    /// Sweep rows whose deadline has passed
    pub async fn cleanup_expired_allocations(&self) -> VpResult<u64> {
        let count = self.store.delete_expired_allocations(Utc::now()).await?;
        if count > 0 {
            info!(count, "Swept expired allocations");
        }
        Ok(count)
    }

    /// Record the power a delegator contributed to a delegate's vote
    pub async fn record_delegator_power(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
        power_used: U256,
    ) -> VpResult<DelegatorPowerRecord> {
        let record = self
            .store
            .upsert_delegator_power(proposal_id, delegate, delegator, power_used)
            .await?;
        debug!(%proposal_id, %delegate, %delegator, %power_used, "Recorded delegator power");
        Ok(record)
    }

    pub async fn get_allocation_stats(&self) -> VpResult<StoreStats> {
        Ok(self.store.get_stats(Utc::now()).await?)
    }

    // ==================== Availability ====================

    pub async fn get_available_vp(&self, user: Address, total_vp: U256) -> VpResult<AvailableVp> {
        let allocations = self.get_active_allocations(user).await?;
        let allocated = allocations
            .iter()
            .fold(U256::ZERO, |acc, a| acc.saturating_add(a.vp_amount));

        Ok(AvailableVp {
            total: total_vp,
            allocated,
            available: total_vp.saturating_sub(allocated),
            allocations,
        })
    }

    // ==================== Attestations ====================

    /// Issue a signed attestation for a Slow Track vote.
    ///
    /// An existing active allocation on the same proposal counts as free
    /// capacity, since the new vote replaces it. Nothing is written.
    pub async fn get_slow_track_attestation(
        &self,
        user: Address,
        proposal_id: U256,
        support: bool,
        vp_amount: U256,
        total_vp: U256,
    ) -> VpResult<Attestation> {
        if vp_amount.is_zero() {
            return Err(VpError::validation("vpAmount must be greater than zero"));
        }
        if user == Address::ZERO {
            return Err(VpError::validation("user must not be the zero address"));
        }

        let proposal = self.chain.proposal(proposal_id).await?;
        let now = unix_now();
        check_eligibility(&proposal, now).map_err(|reason| VpError::ineligible(proposal_id, reason))?;

        // Capped by the voting end; an attestation that is already dead is never issued
        let expiry = now
            .saturating_add(self.signature_ttl_secs)
            .min(proposal.voting_ends_at);
        if expiry <= now {
            return Err(VpError::ineligible(proposal_id, IneligibleReason::VotingEnded));
        }

        let availability = self.get_available_vp(user, total_vp).await?;
        let existing = availability.allocation_for(proposal_id).map(|a| a.vp_amount);
        let effective_available = availability
            .available
            .saturating_add(existing.unwrap_or(U256::ZERO));

        if vp_amount > effective_available {
            return Err(VpError::InsufficientVp {
                requested: vp_amount,
                available: effective_available,
                existing,
            });
        }

        let nonce = self.chain.allocation_nonce(user).await?;

        let attestation = self.signer.sign(&SlowVoteMessage {
            user,
            proposal_id,
            support,
            vp_amount,
            available_vp: effective_available,
            nonce,
            expiry,
        })?;

        info!(
            %user,
            %proposal_id,
            %vp_amount,
            available = %effective_available,
            %nonce,
            expiry,
            update = existing.is_some(),
            "Issued slow track attestation"
        );

        Ok(attestation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainClient;
    use chrono::Duration;
    use vp_store::MemoryLedgerStore;

    fn user() -> Address {
        Address::repeat_byte(0xa1)
    }

    fn ledger(chain: Arc<MockChainClient>) -> AllocationLedger<MemoryLedgerStore, MockChainClient> {
        AllocationLedger::new(
            Arc::new(MemoryLedgerStore::new()),
            chain,
            Arc::new(AttestationSigner::random()),
            300,
        )
    }

    fn proposal(track: ProposalTrack, status: ProposalStatus, starts: u64, ends: u64) -> ProposalInfo {
        ProposalInfo {
            id: U256::from(1u64),
            track,
            status,
            voting_starts_at: starts,
            voting_ends_at: ends,
        }
    }

    #[test]
    fn test_eligibility_rules() {
        let now = 1_000;
        let ok = proposal(ProposalTrack::Slow, ProposalStatus::Active, 900, 1_100);
        assert_eq!(check_eligibility(&ok, now), Ok(()));
        // window bounds are inclusive
        assert_eq!(check_eligibility(&ok, 900), Ok(()));
        assert_eq!(check_eligibility(&ok, 1_100), Ok(()));

        let missing = proposal(ProposalTrack::Fast, ProposalStatus::Pending, 0, 0);
        assert_eq!(check_eligibility(&missing, now), Err(IneligibleReason::NotFound));

        let fast = proposal(ProposalTrack::Fast, ProposalStatus::Active, 900, 1_100);
        assert_eq!(check_eligibility(&fast, now), Err(IneligibleReason::WrongTrack));

        let pending = proposal(ProposalTrack::Slow, ProposalStatus::Pending, 900, 1_100);
        assert_eq!(check_eligibility(&pending, now), Err(IneligibleReason::NotActive));

        assert_eq!(check_eligibility(&ok, 899), Err(IneligibleReason::VotingNotStarted));
        assert_eq!(check_eligibility(&ok, 1_101), Err(IneligibleReason::VotingEnded));
    }

    #[tokio::test]
    async fn test_available_vp_never_negative() {
        let ledger = ledger(Arc::new(MockChainClient::new()));
        let deadline = Utc::now() + Duration::hours(1);
        ledger
            .record_allocation(user(), U256::from(1u64), U256::from(700u64), true, deadline)
            .await
            .unwrap();
        ledger
            .record_allocation(user(), U256::from(2u64), U256::from(500u64), false, deadline)
            .await
            .unwrap();

        let available = ledger.get_available_vp(user(), U256::from(1000u64)).await.unwrap();
        assert_eq!(available.allocated, U256::from(1200u64));
        assert_eq!(available.available, U256::ZERO);
        assert_eq!(available.allocations.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_rows_do_not_count() {
        let ledger = ledger(Arc::new(MockChainClient::new()));
        ledger
            .record_allocation(
                user(),
                U256::from(1u64),
                U256::from(700u64),
                true,
                Utc::now() - Duration::seconds(5),
            )
            .await
            .unwrap();

        let available = ledger.get_available_vp(user(), U256::from(1000u64)).await.unwrap();
        assert_eq!(available.available, U256::from(1000u64));
        assert!(ledger.get_active_allocations(user()).await.unwrap().is_empty());

        assert_eq!(ledger.cleanup_expired_allocations().await.unwrap(), 1);
        assert_eq!(ledger.cleanup_expired_allocations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_zero_amount_request_rejected() {
        let ledger = ledger(Arc::new(MockChainClient::new()));
        let err = ledger
            .get_slow_track_attestation(user(), U256::from(1u64), true, U256::ZERO, U256::from(10u64))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_expiry_capped_by_voting_end() {
        let chain = Arc::new(MockChainClient::new());
        let now = unix_now();
        chain.set_slow_active_proposal(U256::from(4u64), now - 10, now + 60).await;
        let ledger = ledger(chain);

        let attestation = ledger
            .get_slow_track_attestation(user(), U256::from(4u64), true, U256::from(1u64), U256::from(10u64))
            .await
            .unwrap();
        assert_eq!(attestation.expiry, now + 60);
    }

    #[tokio::test]
    async fn test_last_second_of_voting_rejected() {
        let chain = Arc::new(MockChainClient::new());
        let now = unix_now();
        chain.set_slow_active_proposal(U256::from(7u64), now - 10, now).await;
        let ledger = ledger(chain);

        let err = ledger
            .get_slow_track_attestation(user(), U256::from(7u64), true, U256::from(1u64), U256::from(10u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VpError::IneligibleProposal {
                reason: IneligibleReason::VotingEnded,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_record_delegator_power_upserts() {
        let ledger = ledger(Arc::new(MockChainClient::new()));
        let p = U256::from(3u64);
        let delegate = Address::repeat_byte(0xd0);
        let delegator = Address::repeat_byte(0x01);

        ledger
            .record_delegator_power(p, delegate, delegator, U256::from(40u64))
            .await
            .unwrap();
        let record = ledger
            .record_delegator_power(p, delegate, delegator, U256::from(25u64))
            .await
            .unwrap();
        assert_eq!(record.power_used, U256::from(25u64));

        let rows = ledger
            .store()
            .list_delegator_powers(vp_core::DelegatePair::new(p, delegate))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].power_used, U256::from(25u64));
        assert_eq!(ledger.get_allocation_stats().await.unwrap().delegator_rows, 1);
    }

    #[tokio::test]
    async fn test_wrong_track_rejected() {
        let chain = Arc::new(MockChainClient::new());
        let now = unix_now();
        chain
            .set_proposal(ProposalInfo {
                id: U256::from(5u64),
                track: ProposalTrack::Fast,
                status: ProposalStatus::Active,
                voting_starts_at: now - 10,
                voting_ends_at: now + 100,
            })
            .await;
        let ledger = ledger(chain);

        let err = ledger
            .get_slow_track_attestation(user(), U256::from(5u64), true, U256::from(1u64), U256::from(10u64))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VpError::IneligibleProposal {
                reason: IneligibleReason::WrongTrack,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_chain_failure_surfaces_as_chain_read() {
        let chain = Arc::new(MockChainClient::new());
        chain.set_failing(true).await;
        let ledger = ledger(chain);

        let err = ledger
            .get_slow_track_attestation(user(), U256::from(1u64), true, U256::from(1u64), U256::from(10u64))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "CHAIN_READ_ERROR");
        assert!(err.is_retryable());
    }
}
