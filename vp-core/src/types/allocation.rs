//! Allocation ledger rows

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serde_helpers::{address_hex, u256_dec};
use crate::{Address, U256};

/// Lifecycle position of an allocation row.
///
/// `Active -> Expired -> Deleted`. Deleted rows no longer exist, so only the
/// first two states are observable on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationState {
    /// Voting deadline still ahead
    Active,
    /// Deadline passed, row not yet swept
    Expired,
}

/// The ledger's belief about one user's active allocation on one proposal.
///
/// Unique on `(user, proposal_id)`. The sum of a user's active amounts should
/// not exceed their total VP, but this is only checked when an attestation is
/// issued; the ledger may lag the chain and be corrected by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationRecord {
    #[serde(with = "address_hex")]
    pub user: Address,
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    #[serde(with = "u256_dec")]
    pub vp_amount: U256,
    pub support: bool,
    /// Proposal voting end
    pub deadline: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AllocationRecord {
    pub fn new(
        user: Address,
        proposal_id: U256,
        vp_amount: U256,
        support: bool,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            user,
            proposal_id,
            vp_amount,
            support,
            deadline,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a newer write for the same key. Last write wins; `created_at`
    /// is kept from the original row.
    pub fn overwrite(&mut self, vp_amount: U256, support: bool, deadline: DateTime<Utc>) {
        self.vp_amount = vp_amount;
        self.support = support;
        self.deadline = deadline;
        self.updated_at = Utc::now();
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline > now
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> AllocationState {
        if self.is_active_at(now) {
            AllocationState::Active
        } else {
            AllocationState::Expired
        }
    }
}

/// Identifies one delegated vote: a delegate voting on a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatePair {
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    #[serde(with = "address_hex")]
    pub delegate: Address,
}

impl DelegatePair {
    pub fn new(proposal_id: U256, delegate: Address) -> Self {
        Self {
            proposal_id,
            delegate,
        }
    }
}

impl std::fmt::Display for DelegatePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "proposal {} / delegate {}",
            self.proposal_id,
            super::serde_helpers::address_to_lower_hex(&self.delegate)
        )
    }
}

/// Power a single delegator contributed to a delegate's vote.
///
/// Keyed by `(proposal_id, delegate, delegator)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatorPowerRecord {
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    #[serde(with = "address_hex")]
    pub delegate: Address,
    #[serde(with = "address_hex")]
    pub delegator: Address,
    #[serde(with = "u256_dec")]
    pub power_used: U256,
    pub updated_at: DateTime<Utc>,
}

impl DelegatorPowerRecord {
    pub fn new(proposal_id: U256, delegate: Address, delegator: Address, power_used: U256) -> Self {
        Self {
            proposal_id,
            delegate,
            delegator,
            power_used,
            updated_at: Utc::now(),
        }
    }

    pub fn pair(&self) -> DelegatePair {
        DelegatePair::new(self.proposal_id, self.delegate)
    }
}

/// One atomic step of a per-pair heal.
///
/// A heal is a list of these applied in a single store transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairCorrection {
    /// Remove the delegator's row under the pair
    DeleteDelegator { delegator: Address },
    /// Overwrite the delegator's stored power with the on-chain value
    SetDelegatorPower { delegator: Address, power_used: U256 },
    /// Remove the delegate's own allocation row on the pair's proposal
    DeleteDelegateAllocation,
}
