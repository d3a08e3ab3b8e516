//! Governor proposal views

use serde::{Deserialize, Serialize};

use super::serde_helpers::{address_hex, u256_dec};
use crate::{Address, U256};

/// Voting track as encoded by the governor contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalTrack {
    Fast,
    Slow,
    Unknown(u8),
}

impl ProposalTrack {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Fast,
            1 => Self::Slow,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for ProposalTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "FAST"),
            Self::Slow => write!(f, "SLOW"),
            Self::Unknown(v) => write!(f, "UNKNOWN({})", v),
        }
    }
}

/// Proposal status as encoded by the governor contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Pending,
    Active,
    Succeeded,
    Defeated,
    Executed,
    Cancelled,
    Unknown(u8),
}

impl ProposalStatus {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Active,
            2 => Self::Succeeded,
            3 => Self::Defeated,
            4 => Self::Executed,
            5 => Self::Cancelled,
            other => Self::Unknown(other),
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Defeated => write!(f, "DEFEATED"),
            Self::Executed => write!(f, "EXECUTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Unknown(v) => write!(f, "UNKNOWN({})", v),
        }
    }
}

/// The subset of `proposals(id)` the ledger reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalInfo {
    #[serde(with = "u256_dec")]
    pub id: U256,
    pub track: ProposalTrack,
    pub status: ProposalStatus,
    /// Unix seconds
    pub voting_starts_at: u64,
    /// Unix seconds
    pub voting_ends_at: u64,
}

impl ProposalInfo {
    /// Proposals never created read back with zeroed timestamps
    pub fn exists(&self) -> bool {
        self.voting_ends_at != 0
    }

    /// Inclusive voting window check
    pub fn is_voting_open_at(&self, now_secs: u64) -> bool {
        now_secs >= self.voting_starts_at && now_secs <= self.voting_ends_at
    }

    pub fn remaining_voting_secs(&self, now_secs: u64) -> u64 {
        self.voting_ends_at.saturating_sub(now_secs)
    }
}

/// Result of `getDelegatedVote(proposalId, delegate)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegatedVote {
    #[serde(with = "address_hex")]
    pub delegate: Address,
    pub has_voted: bool,
    pub support: bool,
    #[serde(with = "u256_dec")]
    pub total_power_used: U256,
}

impl DelegatedVote {
    pub fn absent(delegate: Address) -> Self {
        Self {
            delegate,
            has_voted: false,
            support: false,
            total_power_used: U256::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(starts: u64, ends: u64) -> ProposalInfo {
        ProposalInfo {
            id: U256::from(7u64),
            track: ProposalTrack::Slow,
            status: ProposalStatus::Active,
            voting_starts_at: starts,
            voting_ends_at: ends,
        }
    }

    #[test]
    fn test_voting_window_is_inclusive() {
        let p = proposal(100, 200);
        assert!(!p.is_voting_open_at(99));
        assert!(p.is_voting_open_at(100));
        assert!(p.is_voting_open_at(200));
        assert!(!p.is_voting_open_at(201));
    }

    #[test]
    fn test_unknown_enum_values_are_preserved() {
        assert_eq!(ProposalTrack::from_u8(9), ProposalTrack::Unknown(9));
        assert_eq!(ProposalStatus::from_u8(1), ProposalStatus::Active);
        assert_eq!(ProposalStatus::from_u8(42).to_string(), "UNKNOWN(42)");
    }

    #[test]
    fn test_missing_proposal_has_zero_deadline() {
        assert!(!proposal(0, 0).exists());
        assert_eq!(proposal(100, 200).remaining_voting_secs(250), 0);
    }
}
