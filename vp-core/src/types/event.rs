//! Chain events consumed by ingestion

use serde::{Deserialize, Serialize};

use super::serde_helpers::{address_hex, u256_dec};
use crate::{Address, U256};

/// Event kinds the ledger listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    VoteCast,
    ProposalFinalized,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VoteCast => "VOTE_CAST",
            Self::ProposalFinalized => "PROPOSAL_FINALIZED",
        }
    }
}

/// A Slow Track vote was cast or updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCastEvent {
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    #[serde(with = "address_hex")]
    pub voter: Address,
    pub support: bool,
    #[serde(with = "u256_dec")]
    pub vp_amount: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
}

/// A proposal left voting with a final status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalFinalizedEvent {
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    VoteCast(VoteCastEvent),
    ProposalFinalized(ProposalFinalizedEvent),
}

/// Abstract chain event placed on the ingestion queue.
///
/// Independent of the subscription API that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    pub block_number: u64,
    pub log_index: u64,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl ChainEvent {
    pub fn vote_cast(block_number: u64, log_index: u64, event: VoteCastEvent) -> Self {
        Self {
            block_number,
            log_index,
            payload: EventPayload::VoteCast(event),
        }
    }

    pub fn proposal_finalized(block_number: u64, log_index: u64, event: ProposalFinalizedEvent) -> Self {
        Self {
            block_number,
            log_index,
            payload: EventPayload::ProposalFinalized(event),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::VoteCast(_) => EventKind::VoteCast,
            EventPayload::ProposalFinalized(_) => EventKind::ProposalFinalized,
        }
    }

    pub fn proposal_id(&self) -> U256 {
        match &self.payload {
            EventPayload::VoteCast(e) => e.proposal_id,
            EventPayload::ProposalFinalized(e) => e.proposal_id,
        }
    }

    /// Position in chain order
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Sort events into chain order: block number, then log index
pub fn sort_chain_order(events: &mut [ChainEvent]) {
    events.sort_by_key(ChainEvent::position);
}
