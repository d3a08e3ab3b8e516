//! Reconciliation Engine
//!
//! Audits the delegator power table against the governor and heals it.
//!
//! For every `(proposal_id, delegate)` pair in the ledger:
//!
//! | Chain state                          | Result              |
//! |--------------------------------------|---------------------|
//! | proposal id 0 or above the counter   | `MISSING_ON_CHAIN`  |
//! | `hasVoted == false`                  | `ORPHANED_DB_RECORD`|
//! | contribution differs from the ledger | `POWER_MISMATCH`    |
//!
//! Only per-delegator contributions are compared. The governor's aggregate
//! vote hash goes stale once a delegator withdraws power after voting and is
//! never consulted.
//!
//! A pair whose reads fail during an audit is skipped and listed in
//! `errors`. Healing runs one store transaction per pair. A failed pair is
//! reported and the remaining pairs still run.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use vp_core::types::serde_helpers::{address_hex, u256_dec};
use vp_core::{
    Address, ChainClient, DelegatePair, Discrepancy, PairCorrection, ReconciliationResult, U256,
};
use vp_store::{CorrectionOutcome, LedgerStore};

use crate::error::VpResult;

/// Corrections applied to one pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairSyncOutcome {
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    #[serde(with = "address_hex")]
    pub delegate: Address,
    pub rows_deleted: u64,
    pub rows_updated: u64,
}

impl PairSyncOutcome {
    fn new(pair: DelegatePair, outcome: CorrectionOutcome) -> Self {
        Self {
            proposal_id: pair.proposal_id,
            delegate: pair.delegate,
            rows_deleted: outcome.rows_deleted,
            rows_updated: outcome.rows_updated,
        }
    }

    pub fn changed(&self) -> bool {
        self.rows_deleted > 0 || self.rows_updated > 0
    }
}

/// Result of healing every pair named by an audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealReport {
    pub pairs_attempted: u64,
    pub pairs_healed: u64,
    pub rows_deleted: u64,
    pub rows_updated: u64,
    /// One entry per failed pair
    pub errors: Vec<String>,
}

/// Delegator claim checked against chain state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimValidation {
    pub valid: bool,
    #[serde(with = "u256_dec")]
    pub claimed_power: U256,
    #[serde(with = "u256_dec")]
    pub on_chain_power: U256,
}

/// Compact record of the latest audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub checked_at: DateTime<Utc>,
    pub pairs_checked: u64,
    pub discrepancies: u64,
    pub pairs_skipped: u64,
    pub is_healthy: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationStats {
    pub total_runs: u64,
    pub failed_runs: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_result: Option<RunSummary>,
    pub rows_deleted: u64,
    pub rows_updated: u64,
}

pub struct ReconciliationEngine<S: LedgerStore, C: ChainClient> {
    store: Arc<S>,
    chain: Arc<C>,
    stats: RwLock<ReconciliationStats>,
}

impl<S: LedgerStore, C: ChainClient> ReconciliationEngine<S, C> {
    pub fn new(store: Arc<S>, chain: Arc<C>) -> Self {
        Self {
            store,
            chain,
            stats: RwLock::new(ReconciliationStats::default()),
        }
    }

    // ==================== Audit ====================

    /// Audit every pair in the ledger
    pub async fn run_reconciliation(&self) -> VpResult<ReconciliationResult> {
        let result = self.audit(None).await;
        self.record_run(&result).await;
        result
    }

    /// Audit the pairs of one proposal
    pub async fn reconcile_proposal(&self, proposal_id: U256) -> VpResult<ReconciliationResult> {
        let result = self.audit(Some(proposal_id)).await;
        self.record_run(&result).await;
        result
    }

    async fn audit(&self, scope: Option<U256>) -> VpResult<ReconciliationResult> {
        let pairs = self.store.list_delegate_pairs(scope).await?;
        if pairs.is_empty() {
            debug!(scope = ?scope, "No delegate pairs to audit");
            return Ok(ReconciliationResult::new(0, 0, 0, Vec::new()));
        }
        let proposal_counter = self.chain.proposal_counter().await?;

        let mut proposals = BTreeSet::new();
        let mut allocations_checked: u64 = 0;
        let mut discrepancies = Vec::new();
        let mut errors = Vec::new();

        for pair in &pairs {
            proposals.insert(pair.proposal_id);
            match self.audit_pair(*pair, proposal_counter).await {
                Ok((rows, found)) => {
                    allocations_checked += rows;
                    discrepancies.extend(found);
                }
                Err(e) => {
                    error!(
                        proposal_id = %pair.proposal_id,
                        delegate = %pair.delegate,
                        error = %e,
                        "Failed to audit pair"
                    );
                    errors.push(format!("{}: {}", pair, e));
                }
            }
        }

        for discrepancy in &discrepancies {
            warn!(
                kind = discrepancy.kind.as_str(),
                proposal_id = %discrepancy.proposal_id,
                delegate = %discrepancy.delegate,
                delegator = ?discrepancy.delegator,
                "{}",
                discrepancy.message
            );
        }

        let result = ReconciliationResult::new(
            proposals.len() as u64,
            pairs.len() as u64,
            allocations_checked,
            discrepancies,
        )
        .with_errors(errors);

        info!(
            proposals = result.proposals_checked,
            pairs = result.delegates_checked,
            rows = result.allocations_checked,
            discrepancies = result.discrepancies.len(),
            skipped = result.errors.len(),
            healthy = result.is_healthy,
            "Reconciliation audit complete"
        );
        Ok(result)
    }

    /// Check one pair. Returns the rows examined and the discrepancies found.
    async fn audit_pair(
        &self,
        pair: DelegatePair,
        proposal_counter: U256,
    ) -> VpResult<(u64, Vec<Discrepancy>)> {
        let rows = self.store.list_delegator_powers(pair).await?;
        let examined = rows.len() as u64;

        if pair.proposal_id.is_zero() || pair.proposal_id > proposal_counter {
            return Ok((examined, vec![Discrepancy::missing_on_chain(pair, proposal_counter)]));
        }

        let vote = self.chain.delegated_vote(pair.proposal_id, pair.delegate).await?;
        if !vote.has_voted {
            return Ok((examined, vec![Discrepancy::orphaned(pair, rows.len())]));
        }

        let mut found = Vec::new();
        for row in &rows {
            let on_chain = self
                .chain
                .delegator_vote_contribution(pair.proposal_id, pair.delegate, row.delegator)
                .await?;
            if on_chain != row.power_used {
                found.push(Discrepancy::power_mismatch(
                    pair,
                    row.delegator,
                    row.power_used,
                    on_chain,
                ));
            }
        }
        Ok((examined, found))
    }

    async fn record_run(&self, result: &VpResult<ReconciliationResult>) {
        let mut stats = self.stats.write().await;
        stats.total_runs += 1;
        match result {
            Ok(result) => {
                stats.consecutive_failures = 0;
                stats.last_error = None;
                stats.last_result = Some(RunSummary {
                    checked_at: result.checked_at,
                    pairs_checked: result.delegates_checked,
                    discrepancies: result.discrepancies.len() as u64,
                    pairs_skipped: result.errors.len() as u64,
                    is_healthy: result.is_healthy,
                });
            }
            Err(e) => {
                stats.failed_runs += 1;
                stats.consecutive_failures += 1;
                stats.last_error = Some(e.to_string());
                error!(
                    error = %e,
                    consecutive_failures = stats.consecutive_failures,
                    "Reconciliation run failed"
                );
            }
        }
    }

    // ==================== Healing ====================

    /// Bring one pair's ledger rows in line with the chain, atomically.
    ///
    /// - vote absent: delete every delegator row and the delegate's allocation
    /// - contribution zero: delete that delegator's row
    /// - contribution differs: overwrite it
    pub async fn sync_allocations_from_chain(
        &self,
        proposal_id: U256,
        delegate: Address,
    ) -> VpResult<PairSyncOutcome> {
        let pair = DelegatePair::new(proposal_id, delegate);
        let rows = self.store.list_delegator_powers(pair).await?;
        let vote = self.chain.delegated_vote(proposal_id, delegate).await?;

        let mut corrections = Vec::new();
        if !vote.has_voted {
            corrections.extend(rows.iter().map(|row| PairCorrection::DeleteDelegator {
                delegator: row.delegator,
            }));
            corrections.push(PairCorrection::DeleteDelegateAllocation);
        } else {
            for row in &rows {
                let on_chain = self
                    .chain
                    .delegator_vote_contribution(proposal_id, delegate, row.delegator)
                    .await?;
                if on_chain.is_zero() {
                    corrections.push(PairCorrection::DeleteDelegator {
                        delegator: row.delegator,
                    });
                } else if on_chain != row.power_used {
                    corrections.push(PairCorrection::SetDelegatorPower {
                        delegator: row.delegator,
                        power_used: on_chain,
                    });
                }
            }
        }

        if corrections.is_empty() {
            debug!(%proposal_id, %delegate, "Pair already matches chain");
            return Ok(PairSyncOutcome::new(pair, CorrectionOutcome::default()));
        }

        let outcome = self.store.apply_pair_corrections(pair, &corrections).await?;
        {
            let mut stats = self.stats.write().await;
            stats.rows_deleted += outcome.rows_deleted;
            stats.rows_updated += outcome.rows_updated;
        }

        info!(
            %proposal_id,
            %delegate,
            deleted = outcome.rows_deleted,
            updated = outcome.rows_updated,
            "Healed pair from chain"
        );
        Ok(PairSyncOutcome::new(pair, outcome))
    }

    /// Heal every distinct pair named by `result`, collecting per-pair errors
    pub async fn heal_discrepancies(&self, result: &ReconciliationResult) -> HealReport {
        let mut report = HealReport::default();

        for pair in result.affected_pairs() {
            report.pairs_attempted += 1;
            match self.sync_allocations_from_chain(pair.proposal_id, pair.delegate).await {
                Ok(outcome) => {
                    if outcome.changed() {
                        report.pairs_healed += 1;
                    }
                    report.rows_deleted += outcome.rows_deleted;
                    report.rows_updated += outcome.rows_updated;
                }
                Err(e) => {
                    error!(
                        proposal_id = %pair.proposal_id,
                        delegate = %pair.delegate,
                        error = %e,
                        "Failed to heal pair"
                    );
                    report.errors.push(format!("{}: {}", pair, e));
                }
            }
        }

        report
    }

    // ==================== Queries ====================

    /// Compare a delegator's claimed power with the chain. Reads only.
    pub async fn validate_delegator_claim_power(
        &self,
        proposal_id: U256,
        delegate: Address,
        delegator: Address,
        claimed_power: U256,
    ) -> VpResult<ClaimValidation> {
        let on_chain_power = self
            .chain
            .delegator_vote_contribution(proposal_id, delegate, delegator)
            .await?;
        Ok(ClaimValidation {
            valid: on_chain_power == claimed_power,
            claimed_power,
            on_chain_power,
        })
    }

    pub async fn get_reconciliation_stats(&self) -> ReconciliationStats {
        self.stats.read().await.clone()
    }
}
