//! Scripted chain collaborator for tests
//!
//! Every read answers from in-memory maps that tests set up directly.
//! Unknown proposals read back zeroed, like the governor's default struct.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use vp_core::{
    sort_chain_order, Address, ChainClient, ChainError, ChainEvent, ChainResult, DelegatedVote,
    ProposalInfo, ProposalStatus, ProposalTrack, U256,
};

#[derive(Default)]
struct ChainState {
    proposals: HashMap<U256, ProposalInfo>,
    proposal_counter: U256,
    nonces: HashMap<Address, U256>,
    delegated_votes: HashMap<(U256, Address), DelegatedVote>,
    contributions: HashMap<(U256, Address, Address), U256>,
    block_number: u64,
    events: Vec<ChainEvent>,
    failing: bool,
    failing_delegates: Vec<Address>,
}

#[derive(Default)]
pub struct MockChainClient {
    state: RwLock<ChainState>,
    proposal_reads: AtomicU64,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proposal and raise the counter to cover it
    pub async fn set_proposal(&self, proposal: ProposalInfo) {
        let mut state = self.state.write().await;
        if proposal.id > state.proposal_counter {
            state.proposal_counter = proposal.id;
        }
        state.proposals.insert(proposal.id, proposal);
    }

    /// Register an active Slow Track proposal
    pub async fn set_slow_active_proposal(&self, id: U256, voting_starts_at: u64, voting_ends_at: u64) {
        self.set_proposal(ProposalInfo {
            id,
            track: ProposalTrack::Slow,
            status: ProposalStatus::Active,
            voting_starts_at,
            voting_ends_at,
        })
        .await;
    }

    pub async fn set_proposal_counter(&self, counter: U256) {
        self.state.write().await.proposal_counter = counter;
    }

    pub async fn set_nonce(&self, user: Address, nonce: U256) {
        self.state.write().await.nonces.insert(user, nonce);
    }

    pub async fn set_delegated_vote(&self, proposal_id: U256, vote: DelegatedVote) {
        self.state
            .write()
            .await
            .delegated_votes
            .insert((proposal_id, vote.delegate), vote);
    }

    pub async fn set_contribution(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
        power: U256,
    ) {
        self.state
            .write()
            .await
            .contributions
            .insert((proposal_id, delegate, delegator), power);
    }

    pub async fn set_block_number(&self, block: u64) {
        self.state.write().await.block_number = block;
    }

    pub async fn push_event(&self, event: ChainEvent) {
        self.state.write().await.events.push(event);
    }

    /// Make every read fail with an RPC error
    pub async fn set_failing(&self, failing: bool) {
        self.state.write().await.failing = failing;
    }

    /// Make reads about one delegate fail
    pub async fn fail_delegate(&self, delegate: Address) {
        self.state.write().await.failing_delegates.push(delegate);
    }

    /// Number of `proposal` reads served so far
    pub fn proposal_reads(&self) -> u64 {
        self.proposal_reads.load(Ordering::SeqCst)
    }

    async fn check(&self, delegate: Option<Address>) -> ChainResult<()> {
        let state = self.state.read().await;
        if state.failing {
            return Err(ChainError::rpc("mock chain unavailable"));
        }
        if let Some(delegate) = delegate {
            if state.failing_delegates.contains(&delegate) {
                return Err(ChainError::rpc(format!("mock read failed for {}", delegate)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn allocation_nonce(&self, user: Address) -> ChainResult<U256> {
        self.check(None).await?;
        let state = self.state.read().await;
        Ok(state.nonces.get(&user).copied().unwrap_or(U256::ZERO))
    }

    async fn proposal(&self, proposal_id: U256) -> ChainResult<ProposalInfo> {
        self.check(None).await?;
        self.proposal_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;
        Ok(state.proposals.get(&proposal_id).cloned().unwrap_or(ProposalInfo {
            id: proposal_id,
            track: ProposalTrack::Fast,
            status: ProposalStatus::Pending,
            voting_starts_at: 0,
            voting_ends_at: 0,
        }))
    }

    async fn delegated_vote(
        &self,
        proposal_id: U256,
        delegate: Address,
    ) -> ChainResult<DelegatedVote> {
        self.check(Some(delegate)).await?;
        let state = self.state.read().await;
        Ok(state
            .delegated_votes
            .get(&(proposal_id, delegate))
            .cloned()
            .unwrap_or_else(|| DelegatedVote::absent(delegate)))
    }

    async fn delegator_vote_contribution(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
    ) -> ChainResult<U256> {
        self.check(Some(delegate)).await?;
        let state = self.state.read().await;
        Ok(state
            .contributions
            .get(&(proposal_id, delegate, delegator))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn proposal_counter(&self) -> ChainResult<U256> {
        self.check(None).await?;
        Ok(self.state.read().await.proposal_counter)
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.check(None).await?;
        Ok(self.state.read().await.block_number)
    }

    async fn query_events(&self, from_block: u64, to_block: u64) -> ChainResult<Vec<ChainEvent>> {
        self.check(None).await?;
        let state = self.state.read().await;
        let mut events: Vec<ChainEvent> = state
            .events
            .iter()
            .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
            .cloned()
            .collect();
        sort_chain_order(&mut events);
        Ok(events)
    }
}
