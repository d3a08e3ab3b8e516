//! Event Ingestion
//!
//! Applies governor events to the ledger, one at a time, from a single
//! consumer queue:
//!
//! - vote cast: upsert the voter's allocation with the proposal deadline
//! - proposal finalized: delete every allocation for the proposal
//!
//! On startup a bounded catch-up replays recent history. Gaps from a lost
//! subscription are left to the Reconciliation Engine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use vp_core::{
    datetime_from_unix, sort_chain_order, ChainClient, ChainEvent, EventPayload,
    ProposalFinalizedEvent, VoteCastEvent, U256,
};
use vp_store::LedgerStore;

use crate::error::VpResult;
use crate::ledger::AllocationLedger;

/// Counters kept across the lifetime of one ingestion instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionStats {
    pub events_processed: u64,
    pub events_failed: u64,
    /// Votes for proposals the chain reports as nonexistent
    pub events_dropped: u64,
    pub allocations_recorded: u64,
    pub allocations_removed: u64,
    pub proposals_finalized: u64,
    pub last_block: Option<u64>,
}

/// Outcome of one startup catch-up pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchUpReport {
    pub from_block: u64,
    pub to_block: u64,
    pub events_replayed: u64,
    pub events_failed: u64,
}

impl CatchUpReport {
    /// First block the live subscription should cover
    pub fn resume_block(&self) -> u64 {
        self.to_block.saturating_add(1)
    }
}

pub struct EventIngestion<S: LedgerStore, C: ChainClient> {
    ledger: Arc<AllocationLedger<S, C>>,
    chain: Arc<C>,
    /// `votingEndsAt` never changes once a proposal exists
    deadlines: RwLock<HashMap<U256, DateTime<Utc>>>,
    stats: RwLock<IngestionStats>,
}

impl<S: LedgerStore + 'static, C: ChainClient + 'static> EventIngestion<S, C> {
    pub fn new(ledger: Arc<AllocationLedger<S, C>>, chain: Arc<C>) -> Self {
        Self {
            ledger,
            chain,
            deadlines: RwLock::new(HashMap::new()),
            stats: RwLock::new(IngestionStats::default()),
        }
    }

    pub async fn stats(&self) -> IngestionStats {
        self.stats.read().await.clone()
    }

    /// Apply one event to the ledger
    pub async fn handle_event(&self, event: &ChainEvent) -> VpResult<()> {
        debug!(
            kind = event.kind().as_str(),
            block = event.block_number,
            log_index = event.log_index,
            proposal_id = %event.proposal_id(),
            "Handling governor event"
        );

        let result = match &event.payload {
            EventPayload::VoteCast(vote) => self.on_vote_cast(vote).await,
            EventPayload::ProposalFinalized(finalized) => self.on_proposal_finalized(finalized).await,
        };

        let mut stats = self.stats.write().await;
        stats.last_block = Some(stats.last_block.map_or(event.block_number, |b| b.max(event.block_number)));
        match result {
            Ok(()) => stats.events_processed += 1,
            Err(_) => stats.events_failed += 1,
        }
        result
    }

    async fn on_vote_cast(&self, vote: &VoteCastEvent) -> VpResult<()> {
        if vote.vp_amount.is_zero() {
            if self.ledger.remove_allocation(vote.voter, vote.proposal_id).await? {
                self.stats.write().await.allocations_removed += 1;
            }
            return Ok(());
        }

        let Some(deadline) = self.proposal_deadline(vote.proposal_id).await? else {
            warn!(
                proposal_id = %vote.proposal_id,
                user = %vote.voter,
                "Dropping vote for proposal unknown to the governor"
            );
            self.stats.write().await.events_dropped += 1;
            return Ok(());
        };

        self.ledger
            .record_allocation(vote.voter, vote.proposal_id, vote.vp_amount, vote.support, deadline)
            .await?;
        self.stats.write().await.allocations_recorded += 1;
        Ok(())
    }

    async fn on_proposal_finalized(&self, finalized: &ProposalFinalizedEvent) -> VpResult<()> {
        self.ledger.cleanup_proposal_allocations(finalized.proposal_id).await?;
        self.deadlines.write().await.remove(&finalized.proposal_id);
        self.stats.write().await.proposals_finalized += 1;
        Ok(())
    }

    /// Cached voting deadline; `None` when the proposal does not exist
    async fn proposal_deadline(&self, proposal_id: U256) -> VpResult<Option<DateTime<Utc>>> {
        if let Some(deadline) = self.deadlines.read().await.get(&proposal_id) {
            return Ok(Some(*deadline));
        }

        let proposal = self.chain.proposal(proposal_id).await?;
        if !proposal.exists() {
            return Ok(None);
        }
        let deadline = datetime_from_unix(proposal.voting_ends_at);
        self.deadlines.write().await.insert(proposal_id, deadline);
        Ok(Some(deadline))
    }

    /// Replay both event types over `[head - lookback, head]` in chain order.
    ///
    /// A failing event is logged and counted; the pass continues.
    pub async fn catch_up(&self, lookback_blocks: u64) -> VpResult<CatchUpReport> {
        let to_block = self.chain.block_number().await?;
        let from_block = to_block.saturating_sub(lookback_blocks);

        let mut events = self.chain.query_events(from_block, to_block).await?;
        sort_chain_order(&mut events);

        let mut report = CatchUpReport {
            from_block,
            to_block,
            events_replayed: 0,
            events_failed: 0,
        };

        for event in &events {
            match self.handle_event(event).await {
                Ok(()) => report.events_replayed += 1,
                Err(e) => {
                    report.events_failed += 1;
                    warn!(
                        block = event.block_number,
                        log_index = event.log_index,
                        error = %e,
                        "Catch-up event failed"
                    );
                }
            }
        }

        info!(
            from_block,
            to_block,
            replayed = report.events_replayed,
            failed = report.events_failed,
            "Catch-up complete"
        );
        Ok(report)
    }

    /// Drain the ingestion queue until every sender is dropped
    pub async fn run(self: Arc<Self>, mut queue: mpsc::Receiver<ChainEvent>) -> IngestionStats {
        info!("Event ingestion started");
        while let Some(event) = queue.recv().await {
            if let Err(e) = self.handle_event(&event).await {
                warn!(
                    kind = event.kind().as_str(),
                    block = event.block_number,
                    error = %e,
                    "Failed to apply governor event"
                );
            }
        }
        let stats = self.stats().await;
        info!(
            processed = stats.events_processed,
            failed = stats.events_failed,
            "Event ingestion stopped"
        );
        stats
    }

    /// Spawn [`run`](Self::run) on a fresh queue and hand back its sender
    pub fn spawn(
        self: &Arc<Self>,
        capacity: usize,
    ) -> (mpsc::Sender<ChainEvent>, tokio::task::JoinHandle<IngestionStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(Arc::clone(self).run(rx));
        (tx, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockChainClient;
    use vp_core::{unix_now, Address};
    use vp_signer::AttestationSigner;
    use vp_store::MemoryLedgerStore;

    fn setup() -> (
        Arc<MockChainClient>,
        Arc<MemoryLedgerStore>,
        Arc<EventIngestion<MemoryLedgerStore, MockChainClient>>,
    ) {
        let chain = Arc::new(MockChainClient::new());
        let store = Arc::new(MemoryLedgerStore::new());
        let ledger = Arc::new(AllocationLedger::new(
            store.clone(),
            chain.clone(),
            Arc::new(AttestationSigner::random()),
            300,
        ));
        let ingestion = Arc::new(EventIngestion::new(ledger, chain.clone()));
        (chain, store, ingestion)
    }

    fn vote(proposal: u64, voter: u8, amount: u64) -> VoteCastEvent {
        VoteCastEvent {
            proposal_id: U256::from(proposal),
            voter: Address::repeat_byte(voter),
            support: true,
            vp_amount: U256::from(amount),
            nonce: U256::ZERO,
        }
    }

    #[tokio::test]
    async fn test_vote_records_allocation_with_deadline() {
        let (chain, store, ingestion) = setup();
        let ends = unix_now() + 1_000;
        chain.set_slow_active_proposal(U256::from(7u64), 0, ends).await;

        ingestion
            .handle_event(&ChainEvent::vote_cast(10, 0, vote(7, 1, 600)))
            .await
            .unwrap();

        let row = store
            .get_allocation(Address::repeat_byte(1), U256::from(7u64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.vp_amount, U256::from(600u64));
        assert_eq!(row.deadline, datetime_from_unix(ends));
    }

    #[tokio::test]
    async fn test_deadline_is_cached() {
        let (chain, _store, ingestion) = setup();
        chain.set_slow_active_proposal(U256::from(7u64), 0, unix_now() + 1_000).await;

        for voter in 1..=3u8 {
            ingestion
                .handle_event(&ChainEvent::vote_cast(10, voter as u64, vote(7, voter, 100)))
                .await
                .unwrap();
        }
        assert_eq!(chain.proposal_reads(), 1);
    }

    #[tokio::test]
    async fn test_zero_amount_vote_removes_row() {
        let (chain, store, ingestion) = setup();
        chain.set_slow_active_proposal(U256::from(7u64), 0, unix_now() + 1_000).await;

        ingestion
            .handle_event(&ChainEvent::vote_cast(10, 0, vote(7, 1, 600)))
            .await
            .unwrap();
        ingestion
            .handle_event(&ChainEvent::vote_cast(11, 0, vote(7, 1, 0)))
            .await
            .unwrap();

        assert!(store.list_allocations().await.unwrap().is_empty());
        assert_eq!(ingestion.stats().await.allocations_removed, 1);
    }

    #[tokio::test]
    async fn test_vote_for_unknown_proposal_dropped() {
        let (_chain, store, ingestion) = setup();
        ingestion
            .handle_event(&ChainEvent::vote_cast(10, 0, vote(99, 1, 600)))
            .await
            .unwrap();

        assert!(store.list_allocations().await.unwrap().is_empty());
        assert_eq!(ingestion.stats().await.events_dropped, 1);
    }

    #[tokio::test]
    async fn test_finalization_clears_proposal() {
        let (chain, store, ingestion) = setup();
        chain.set_slow_active_proposal(U256::from(7u64), 0, unix_now() + 1_000).await;
        chain.set_slow_active_proposal(U256::from(8u64), 0, unix_now() + 1_000).await;

        for (i, event) in [vote(7, 1, 100), vote(7, 2, 200), vote(8, 1, 300)].into_iter().enumerate() {
            ingestion
                .handle_event(&ChainEvent::vote_cast(10, i as u64, event))
                .await
                .unwrap();
        }
        ingestion
            .handle_event(&ChainEvent::proposal_finalized(
                12,
                0,
                ProposalFinalizedEvent {
                    proposal_id: U256::from(7u64),
                    status: 2,
                },
            ))
            .await
            .unwrap();

        let rows = store.list_allocations().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].proposal_id, U256::from(8u64));
        let stats = ingestion.stats().await;
        assert_eq!(stats.proposals_finalized, 1);
        assert_eq!(stats.last_block, Some(12));
    }

    #[tokio::test]
    async fn test_chain_failure_counts_as_failed_event() {
        let (chain, _store, ingestion) = setup();
        chain.set_failing(true).await;

        assert!(ingestion
            .handle_event(&ChainEvent::vote_cast(10, 0, vote(7, 1, 600)))
            .await
            .is_err());
        assert_eq!(ingestion.stats().await.events_failed, 1);
    }

    #[tokio::test]
    async fn test_queue_drains_in_order() {
        let (chain, store, ingestion) = setup();
        chain.set_slow_active_proposal(U256::from(7u64), 0, unix_now() + 1_000).await;

        let (tx, handle) = ingestion.spawn(8);
        tx.send(ChainEvent::vote_cast(10, 0, vote(7, 1, 100))).await.unwrap();
        tx.send(ChainEvent::vote_cast(11, 0, vote(7, 1, 250))).await.unwrap();
        drop(tx);

        let stats = handle.await.unwrap();
        assert_eq!(stats.events_processed, 2);
        let row = store
            .get_allocation(Address::repeat_byte(1), U256::from(7u64))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.vp_amount, U256::from(250u64));
    }
}
