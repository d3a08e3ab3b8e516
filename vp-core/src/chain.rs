//! Chain collaborator interfaces
//!
//! The governor contract is the authoritative source for every allocation.
//! These traits describe the read-only surface the ledger needs; connection
//! management and retries live in the implementation (see `vp-chain`).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ChainResult;
use crate::types::{ChainEvent, DelegatedVote, ProposalInfo};
use crate::{Address, U256};

/// Read-only view of the governor contract.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current allocation nonce for `user`. Binds each attestation.
    async fn allocation_nonce(&self, user: Address) -> ChainResult<U256>;

    /// Proposal metadata. A proposal that was never created comes back with
    /// zeroed timestamps.
    async fn proposal(&self, proposal_id: U256) -> ChainResult<ProposalInfo>;

    /// Aggregate delegated vote of `delegate` on `proposal_id`.
    async fn delegated_vote(
        &self,
        proposal_id: U256,
        delegate: Address,
    ) -> ChainResult<DelegatedVote>;

    /// Power `delegator` contributed to `delegate`'s vote on `proposal_id`.
    async fn delegator_vote_contribution(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
    ) -> ChainResult<U256>;

    /// Highest proposal id created so far.
    async fn proposal_counter(&self) -> ChainResult<U256>;

    /// Latest block number.
    async fn block_number(&self) -> ChainResult<u64>;

    /// Vote-cast and proposal-finalized events in `[from_block, to_block]`,
    /// ordered by block number then log index.
    async fn query_events(&self, from_block: u64, to_block: u64) -> ChainResult<Vec<ChainEvent>>;
}

/// Live event delivery.
///
/// Implementations push every event from `from_block` onward into `sink`
/// and return once the receiving side is dropped. Gaps during a
/// disconnection are not guaranteed to be replayed.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn stream_events(
        &self,
        from_block: u64,
        sink: mpsc::Sender<ChainEvent>,
    ) -> ChainResult<()>;
}
