//! Slow Track vote attestations

use serde::{Deserialize, Serialize};

use super::serde_helpers::{address_hex, u256_dec};
use crate::{Address, U256};

/// A signed capability token for one Slow Track vote.
///
/// Never persisted. The governor verifies the signer, the expiry and the
/// nonce, and enforces the VP budget with its own state. An expired
/// attestation must be reissued, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    #[serde(with = "address_hex")]
    pub user: Address,
    #[serde(with = "u256_dec")]
    pub proposal_id: U256,
    pub support: bool,
    #[serde(rename = "vpAmount", with = "u256_dec")]
    pub vp_amount: U256,
    /// Capacity the request was checked against, including any allocation
    /// the user already holds on this proposal
    #[serde(rename = "availableVP", with = "u256_dec")]
    pub available_vp: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    /// Unix seconds
    pub expiry: u64,
    /// 65-byte `r || s || v`, `0x`-prefixed hex
    pub signature: String,
}

impl Attestation {
    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        self.expiry <= now_secs
    }
}
