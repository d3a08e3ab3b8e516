//! EVM JSON-RPC chain client

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, warn};
use vp_core::{
    sort_chain_order, Address, ChainClient, ChainError, ChainEvent, ChainResult, DelegatedVote,
    ProposalFinalizedEvent, ProposalInfo, ProposalStatus, ProposalTrack, VoteCastEvent, U256,
};

use crate::config::ChainConfig;
use crate::contract::SlowTrackGovernor::{self, SlowTrackGovernorInstance};

/// Read-only client for the Slow Track governor
#[derive(Clone)]
pub struct EvmChainClient {
    provider: DynProvider,
    governor: SlowTrackGovernorInstance<DynProvider>,
    config: ChainConfig,
}

impl EvmChainClient {
    /// Build an HTTP provider for `config.rpc_url`. No request is made yet.
    pub fn connect(config: ChainConfig) -> ChainResult<Self> {
        let url = config
            .rpc_url
            .parse::<Url>()
            .map_err(|e| ChainError::rpc(format!("invalid rpc url {}: {}", config.rpc_url, e)))?;
        let address = config.governor()?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        let governor = SlowTrackGovernor::new(address, provider.clone());

        Ok(Self {
            provider,
            governor,
            config,
        })
    }

    pub fn governor_address(&self) -> Address {
        *self.governor.address()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    fn event_filter(&self, from_block: u64, to_block: u64) -> Filter {
        Filter::new()
            .address(self.governor_address())
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(vec![
                SlowTrackGovernor::SlowVoteCast::SIGNATURE_HASH,
                SlowTrackGovernor::ProposalFinalized::SIGNATURE_HASH,
            ])
    }
}

/// Convert a raw governor log into a ledger event.
///
/// Removed (reorged) and pending logs yield `None`.
pub fn decode_log(log: &Log) -> ChainResult<Option<ChainEvent>> {
    if log.removed {
        return Ok(None);
    }
    let (Some(block_number), Some(log_index)) = (log.block_number, log.log_index) else {
        return Ok(None);
    };
    let Some(topic0) = log.topic0() else {
        return Ok(None);
    };

    if *topic0 == SlowTrackGovernor::SlowVoteCast::SIGNATURE_HASH {
        let decoded = log
            .log_decode::<SlowTrackGovernor::SlowVoteCast>()
            .map_err(ChainError::decode)?;
        let event = decoded.inner.data;
        Ok(Some(ChainEvent::vote_cast(
            block_number,
            log_index,
            VoteCastEvent {
                proposal_id: event.proposalId,
                voter: event.voter,
                support: event.support,
                vp_amount: event.vpAmount,
                nonce: event.nonce,
            },
        )))
    } else if *topic0 == SlowTrackGovernor::ProposalFinalized::SIGNATURE_HASH {
        let decoded = log
            .log_decode::<SlowTrackGovernor::ProposalFinalized>()
            .map_err(ChainError::decode)?;
        let event = decoded.inner.data;
        Ok(Some(ChainEvent::proposal_finalized(
            block_number,
            log_index,
            ProposalFinalizedEvent {
                proposal_id: event.proposalId,
                status: event.status,
            },
        )))
    } else {
        Ok(None)
    }
}

#[async_trait]
impl ChainClient for EvmChainClient {
    async fn allocation_nonce(&self, user: Address) -> ChainResult<U256> {
        self.governor
            .allocationNonce(user)
            .call()
            .await
            .map_err(|e| ChainError::rpc(format!("allocationNonce({}): {}", user, e)))
    }

    async fn proposal(&self, proposal_id: U256) -> ChainResult<ProposalInfo> {
        let raw = self
            .governor
            .proposals(proposal_id)
            .call()
            .await
            .map_err(|e| ChainError::rpc(format!("proposals({}): {}", proposal_id, e)))?;

        Ok(ProposalInfo {
            id: proposal_id,
            track: ProposalTrack::from_u8(raw.track),
            status: ProposalStatus::from_u8(raw.status),
            voting_starts_at: raw.votingStartsAt,
            voting_ends_at: raw.votingEndsAt,
        })
    }

    async fn delegated_vote(
        &self,
        proposal_id: U256,
        delegate: Address,
    ) -> ChainResult<DelegatedVote> {
        let raw = self
            .governor
            .getDelegatedVote(proposal_id, delegate)
            .call()
            .await
            .map_err(|e| {
                ChainError::rpc(format!("getDelegatedVote({}, {}): {}", proposal_id, delegate, e))
            })?;

        Ok(DelegatedVote {
            delegate,
            has_voted: raw.hasVoted,
            support: raw.support,
            total_power_used: raw.totalPowerUsed,
        })
    }

    async fn delegator_vote_contribution(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
    ) -> ChainResult<U256> {
        self.governor
            .delegatorVoteContribution(proposal_id, delegate, delegator)
            .call()
            .await
            .map_err(|e| {
                ChainError::rpc(format!(
                    "delegatorVoteContribution({}, {}, {}): {}",
                    proposal_id, delegate, delegator, e
                ))
            })
    }

    async fn proposal_counter(&self) -> ChainResult<U256> {
        self.governor
            .proposalCounter()
            .call()
            .await
            .map_err(|e| ChainError::rpc(format!("proposalCounter(): {}", e)))
    }

    async fn block_number(&self) -> ChainResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::rpc(format!("eth_blockNumber: {}", e)))
    }

    async fn query_events(&self, from_block: u64, to_block: u64) -> ChainResult<Vec<ChainEvent>> {
        let mut events = Vec::new();

        for (start, end) in self.config.chunks(from_block, to_block) {
            let logs = self
                .provider
                .get_logs(&self.event_filter(start, end))
                .await
                .map_err(|e| ChainError::rpc(format!("eth_getLogs [{}, {}]: {}", start, end, e)))?;

            debug!(from = start, to = end, count = logs.len(), "Fetched governor logs");

            for log in &logs {
                match decode_log(log) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            block = ?log.block_number,
                            log_index = ?log.log_index,
                            error = %e,
                            "Skipping undecodable governor log"
                        );
                    }
                }
            }
        }

        sort_chain_order(&mut events);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{LogData, B256};

    fn governor() -> Address {
        Address::repeat_byte(0x99)
    }

    fn rpc_log<E: SolEvent>(event: &E, block: u64, index: u64) -> Log {
        Log {
            inner: alloy::primitives::Log {
                address: governor(),
                data: event.encode_log_data(),
            },
            block_number: Some(block),
            log_index: Some(index),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_vote_cast() {
        let event = SlowTrackGovernor::SlowVoteCast {
            proposalId: U256::from(7u64),
            voter: Address::repeat_byte(0x01),
            support: true,
            vpAmount: U256::from(600u64),
            nonce: U256::from(2u64),
        };
        let decoded = decode_log(&rpc_log(&event, 100, 3)).unwrap().unwrap();

        assert_eq!(decoded.position(), (100, 3));
        match decoded.payload {
            vp_core::EventPayload::VoteCast(vote) => {
                assert_eq!(vote.proposal_id, U256::from(7u64));
                assert_eq!(vote.voter, Address::repeat_byte(0x01));
                assert!(vote.support);
                assert_eq!(vote.vp_amount, U256::from(600u64));
                assert_eq!(vote.nonce, U256::from(2u64));
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_decode_proposal_finalized() {
        let event = SlowTrackGovernor::ProposalFinalized {
            proposalId: U256::from(8u64),
            status: 2,
        };
        let decoded = decode_log(&rpc_log(&event, 5, 0)).unwrap().unwrap();
        assert_eq!(decoded.proposal_id(), U256::from(8u64));
        assert_eq!(decoded.kind(), vp_core::EventKind::ProposalFinalized);
    }

    #[test]
    fn test_removed_and_pending_logs_skipped() {
        let event = SlowTrackGovernor::ProposalFinalized {
            proposalId: U256::from(8u64),
            status: 2,
        };
        let mut removed = rpc_log(&event, 5, 0);
        removed.removed = true;
        assert!(decode_log(&removed).unwrap().is_none());

        let mut pending = rpc_log(&event, 5, 0);
        pending.block_number = None;
        assert!(decode_log(&pending).unwrap().is_none());
    }

    #[test]
    fn test_unknown_topic_ignored() {
        let log = Log {
            inner: alloy::primitives::Log {
                address: governor(),
                data: LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Default::default()),
            },
            block_number: Some(1),
            log_index: Some(0),
            ..Default::default()
        };
        assert!(decode_log(&log).unwrap().is_none());
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let config = ChainConfig {
            rpc_url: "not a url".into(),
            ..ChainConfig::default()
        };
        assert!(matches!(
            EvmChainClient::connect(config),
            Err(ChainError::Rpc(_))
        ));
    }
}
