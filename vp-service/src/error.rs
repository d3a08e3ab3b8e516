//! Service error taxonomy
//!
//! Every failure an API-style caller can see maps to a stable reason code.
//! Discrepancies found by reconciliation are result data, never errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vp_core::{ChainError, U256};
use vp_signer::SignerError;
use vp_store::StoreError;

/// Why a proposal cannot take a Slow Track vote right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IneligibleReason {
    NotFound,
    WrongTrack,
    NotActive,
    VotingNotStarted,
    VotingEnded,
}

impl IneligibleReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "PROPOSAL_NOT_FOUND",
            Self::WrongTrack => "WRONG_TRACK",
            Self::NotActive => "NOT_ACTIVE",
            Self::VotingNotStarted => "VOTING_NOT_STARTED",
            Self::VotingEnded => "VOTING_ENDED",
        }
    }
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotFound => "proposal does not exist",
            Self::WrongTrack => "proposal is not on the Slow track",
            Self::NotActive => "proposal is not active",
            Self::VotingNotStarted => "voting has not started",
            Self::VotingEnded => "voting has ended",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug)]
pub enum VpError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Proposal {proposal_id} is not eligible: {reason}")]
    IneligibleProposal {
        proposal_id: U256,
        reason: IneligibleReason,
    },

    /// `available` already includes `existing` when the request updates a
    /// prior allocation on the same proposal
    #[error("Insufficient VP: requested {requested}, available {available}{}", existing_note(.existing))]
    InsufficientVp {
        requested: U256,
        available: U256,
        existing: Option<U256>,
    },

    #[error("Chain read failed: {0}")]
    ChainRead(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Signing error: {0}")]
    Signing(#[from] SignerError),
}

fn existing_note(existing: &Option<U256>) -> String {
    match existing {
        Some(amount) => format!(" (includes existing allocation {})", amount),
        None => String::new(),
    }
}

pub type VpResult<T> = Result<T, VpError>;

impl VpError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn ineligible(proposal_id: U256, reason: IneligibleReason) -> Self {
        Self::IneligibleProposal {
            proposal_id,
            reason,
        }
    }

    /// Stable machine-readable code
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::IneligibleProposal { .. } => "INELIGIBLE_PROPOSAL",
            Self::InsufficientVp { .. } => "INSUFFICIENT_VP",
            Self::ChainRead(_) => "CHAIN_READ_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Signing(_) => "SIGNING_ERROR",
        }
    }

    /// Whether the same call may succeed if repeated unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ChainRead(_) | Self::Storage(_))
    }

    /// True for the update sub-case of an insufficient VP rejection
    pub fn is_update_rejection(&self) -> bool {
        matches!(self, Self::InsufficientVp { existing: Some(_), .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_message_carries_both_numbers() {
        let err = VpError::InsufficientVp {
            requested: U256::from(1100u64),
            available: U256::from(400u64),
            existing: None,
        };
        assert!(err.to_string().contains("requested 1100, available 400"));
        assert_eq!(err.reason_code(), "INSUFFICIENT_VP");
        assert!(!err.is_update_rejection());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_update_rejection_mentions_existing() {
        let err = VpError::InsufficientVp {
            requested: U256::from(1200u64),
            available: U256::from(1000u64),
            existing: Some(U256::from(600u64)),
        };
        assert!(err.to_string().contains("existing allocation 600"));
        assert!(err.is_update_rejection());
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(VpError::validation("x").reason_code(), "VALIDATION_ERROR");
        let err = VpError::ineligible(U256::from(3u64), IneligibleReason::VotingEnded);
        assert_eq!(err.reason_code(), "INELIGIBLE_PROPOSAL");
        assert!(err.to_string().contains("voting has ended"));

        let chain: VpError = ChainError::rpc("timeout").into();
        assert_eq!(chain.reason_code(), "CHAIN_READ_ERROR");
        assert!(chain.is_retryable());
    }

    #[test]
    fn test_ineligible_reason_codes() {
        assert_eq!(IneligibleReason::WrongTrack.as_str(), "WRONG_TRACK");
        assert_eq!(
            serde_json::to_string(&IneligibleReason::VotingNotStarted).unwrap(),
            "\"VOTING_NOT_STARTED\""
        );
    }
}
