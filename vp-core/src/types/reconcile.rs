//! Reconciliation output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::serde_helpers::{address_hex, address_hex_opt, u256_dec, u256_dec_opt};
use super::DelegatePair;
use crate::{Address, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyType {
    /// Ledger references a proposal the chain does not know
    MissingOnChain,
    /// Stored delegator power differs from the on-chain contribution
    PowerMismatch,
    /// Ledger holds rows for a delegate that has not voted on chain
    OrphanedDbRecord,
}

impl DiscrepancyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingOnChain => "MISSING_ON_CHAIN",
            Self::PowerMismatch => "POWER_MISMATCH",
            Self::OrphanedDbRecord => "ORPHANED_DB_RECORD",
        }
    }
}

impl std::fmt::Display for DiscrepancyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A divergence between the ledger and the chain.
///
/// Always returned as data, never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discrepancy {
    #[serde(rename = "type")]
    pub kind: DiscrepancyType,
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    #[serde(with = "address_hex")]
    pub delegate: Address,
    #[serde(with = "address_hex_opt", default)]
    pub delegator: Option<Address>,
    #[serde(with = "u256_dec_opt", default)]
    pub db_value: Option<U256>,
    #[serde(with = "u256_dec_opt", default)]
    pub on_chain_value: Option<U256>,
    pub message: String,
}

impl Discrepancy {
    pub fn missing_on_chain(pair: DelegatePair, proposal_counter: U256) -> Self {
        Self {
            kind: DiscrepancyType::MissingOnChain,
            proposal_id: pair.proposal_id,
            delegate: pair.delegate,
            delegator: None,
            db_value: None,
            on_chain_value: None,
            message: format!(
                "Proposal {} does not exist on chain (proposal counter is {})",
                pair.proposal_id, proposal_counter
            ),
        }
    }

    pub fn orphaned(pair: DelegatePair, rows: usize) -> Self {
        Self {
            kind: DiscrepancyType::OrphanedDbRecord,
            proposal_id: pair.proposal_id,
            delegate: pair.delegate,
            delegator: None,
            db_value: None,
            on_chain_value: None,
            message: format!(
                "Delegate has not voted on proposal {} on chain but the ledger holds {} delegator row(s)",
                pair.proposal_id, rows
            ),
        }
    }

    pub fn power_mismatch(
        pair: DelegatePair,
        delegator: Address,
        db_value: U256,
        on_chain_value: U256,
    ) -> Self {
        Self {
            kind: DiscrepancyType::PowerMismatch,
            proposal_id: pair.proposal_id,
            delegate: pair.delegate,
            delegator: Some(delegator),
            db_value: Some(db_value),
            on_chain_value: Some(on_chain_value),
            message: format!(
                "Delegator power mismatch on proposal {}: ledger has {}, chain has {}",
                pair.proposal_id, db_value, on_chain_value
            ),
        }
    }

    pub fn pair(&self) -> DelegatePair {
        DelegatePair::new(self.proposal_id, self.delegate)
    }
}

/// Summary of one reconciliation audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub checked_at: DateTime<Utc>,
    pub proposals_checked: u64,
    pub delegates_checked: u64,
    pub allocations_checked: u64,
    pub discrepancies: Vec<Discrepancy>,
    pub is_healthy: bool,
    /// Pairs whose chain or store reads failed; they were skipped
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ReconciliationResult {
    pub fn new(
        proposals_checked: u64,
        delegates_checked: u64,
        allocations_checked: u64,
        discrepancies: Vec<Discrepancy>,
    ) -> Self {
        let is_healthy = discrepancies.is_empty();
        Self {
            checked_at: Utc::now(),
            proposals_checked,
            delegates_checked,
            allocations_checked,
            discrepancies,
            is_healthy,
            errors: Vec::new(),
        }
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// True when every enumerated pair was actually checked
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count_of(&self, kind: DiscrepancyType) -> usize {
        self.discrepancies.iter().filter(|d| d.kind == kind).count()
    }

    /// Distinct pairs named by any discrepancy, in ascending order
    pub fn affected_pairs(&self) -> Vec<DelegatePair> {
        self.discrepancies
            .iter()
            .map(Discrepancy::pair)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_iff_no_discrepancies() {
        assert!(ReconciliationResult::new(1, 1, 1, vec![]).is_healthy);

        let pair = DelegatePair::new(U256::from(1u64), Address::repeat_byte(2));
        let result = ReconciliationResult::new(1, 1, 0, vec![Discrepancy::orphaned(pair, 3)]);
        assert!(!result.is_healthy);
        assert_eq!(result.count_of(DiscrepancyType::OrphanedDbRecord), 1);
        assert_eq!(result.count_of(DiscrepancyType::PowerMismatch), 0);
    }

    #[test]
    fn test_skipped_pairs_do_not_affect_health() {
        let result = ReconciliationResult::new(2, 2, 1, vec![])
            .with_errors(vec!["pair 3/0x02: read failed".to_string()]);
        assert!(result.is_healthy);
        assert!(!result.is_complete());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["errors"][0], "pair 3/0x02: read failed");
    }

    #[test]
    fn test_affected_pairs_are_deduplicated() {
        let pair = DelegatePair::new(U256::from(1u64), Address::repeat_byte(2));
        let other = DelegatePair::new(U256::from(0u64), Address::repeat_byte(2));
        let result = ReconciliationResult::new(
            2,
            1,
            2,
            vec![
                Discrepancy::power_mismatch(pair, Address::repeat_byte(3), U256::from(5u64), U256::from(4u64)),
                Discrepancy::power_mismatch(pair, Address::repeat_byte(4), U256::from(5u64), U256::ZERO),
                Discrepancy::orphaned(other, 1),
            ],
        );

        assert_eq!(result.affected_pairs(), vec![other, pair]);
    }

    #[test]
    fn test_discrepancy_json_uses_wire_names() {
        let pair = DelegatePair::new(U256::from(9u64), Address::repeat_byte(2));
        let d = Discrepancy::power_mismatch(pair, Address::repeat_byte(3), U256::from(100u64), U256::from(80u64));
        let json = serde_json::to_value(&d).unwrap();

        assert_eq!(json["type"], "POWER_MISMATCH");
        assert_eq!(json["dbValue"], "100");
        assert_eq!(json["onChainValue"], "80");
    }
}
