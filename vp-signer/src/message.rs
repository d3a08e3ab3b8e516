//! Canonical `voteSlow` message

use alloy::primitives::{keccak256, B256};
use vp_core::{Address, Attestation, U256};

/// Domain separation tags
pub mod domain {
    /// Tag prefixed to every Slow Track vote attestation
    pub const VOTE_SLOW: &[u8] = b"voteSlow";
}

/// Fields bound by a Slow Track vote attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlowVoteMessage {
    pub user: Address,
    pub proposal_id: U256,
    pub support: bool,
    pub vp_amount: U256,
    pub available_vp: U256,
    pub nonce: U256,
    /// Unix seconds
    pub expiry: u64,
}

impl SlowVoteMessage {
    pub const PACKED_LEN: usize = domain::VOTE_SLOW.len() + 20 + 32 + 1 + 32 * 4;

    pub fn from_attestation(attestation: &Attestation) -> Self {
        Self {
            user: attestation.user,
            proposal_id: attestation.proposal_id,
            support: attestation.support,
            vp_amount: attestation.vp_amount,
            available_vp: attestation.available_vp,
            nonce: attestation.nonce,
            expiry: attestation.expiry,
        }
    }

    /// `abi.encodePacked` of the domain tag and every field
    pub fn packed(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::PACKED_LEN);
        buf.extend_from_slice(domain::VOTE_SLOW);
        buf.extend_from_slice(self.user.as_slice());
        buf.extend_from_slice(&self.proposal_id.to_be_bytes::<32>());
        buf.push(u8::from(self.support));
        buf.extend_from_slice(&self.vp_amount.to_be_bytes::<32>());
        buf.extend_from_slice(&self.available_vp.to_be_bytes::<32>());
        buf.extend_from_slice(&self.nonce.to_be_bytes::<32>());
        buf.extend_from_slice(&U256::from(self.expiry).to_be_bytes::<32>());
        buf
    }

    /// keccak256 of the packed message
    pub fn digest(&self) -> B256 {
        keccak256(self.packed())
    }
}
