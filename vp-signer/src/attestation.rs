//! Attestation signing and recovery

use std::fmt;

use alloy::primitives::{Signature, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use tracing::debug;
use vp_core::{Address, Attestation};

use crate::error::{SignerError, SignerResult};
use crate::message::SlowVoteMessage;

/// Holder of the backend attestation key.
///
/// Built once at startup and shared behind an `Arc`. The key never leaves
/// this type; `Debug` prints only the address.
#[derive(Clone)]
pub struct AttestationSigner {
    signer: PrivateKeySigner,
}

impl AttestationSigner {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Generate a throwaway key
    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }

    /// Create from a hex-encoded 32-byte secret, with or without `0x`
    pub fn from_hex(hex_str: &str) -> SignerResult<Self> {
        let trimmed = hex_str.trim();
        let raw = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(raw)
            .map_err(|e| SignerError::InvalidKey(format!("Invalid hex: {}", e)))?;
        if bytes.len() != 32 {
            return Err(SignerError::InvalidKey(format!(
                "Invalid key length: expected 32, got {}",
                bytes.len()
            )));
        }
        let signer = PrivateKeySigner::from_bytes(&B256::from_slice(&bytes))
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self::new(signer))
    }

    /// Address the governor is configured to trust
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign a message, producing the full attestation
    pub fn sign(&self, message: &SlowVoteMessage) -> SignerResult<Attestation> {
        let digest = message.digest();
        let signature = self
            .signer
            .sign_message_sync(digest.as_slice())
            .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

        debug!(
            user = %message.user,
            proposal_id = %message.proposal_id,
            nonce = %message.nonce,
            expiry = message.expiry,
            "Signed slow vote attestation"
        );

        Ok(Attestation {
            user: message.user,
            proposal_id: message.proposal_id,
            support: message.support,
            vp_amount: message.vp_amount,
            available_vp: message.available_vp,
            nonce: message.nonce,
            expiry: message.expiry,
            signature: format!("0x{}", hex::encode(signature.as_bytes())),
        })
    }

    /// Check that `attestation` was produced by this key and has not expired
    pub fn verify(&self, attestation: &Attestation, now_secs: u64) -> SignerResult<()> {
        if attestation.is_expired_at(now_secs) {
            return Err(SignerError::Expired {
                expiry: attestation.expiry,
                now: now_secs,
            });
        }
        let recovered = recover_signer(attestation)?;
        if recovered != self.address() {
            return Err(SignerError::SignerMismatch {
                expected: self.address().to_string(),
                recovered: recovered.to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for AttestationSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationSigner")
            .field("address", &self.address())
            .finish()
    }
}

/// Recover the address that signed `attestation`, the same way the governor does
pub fn recover_signer(attestation: &Attestation) -> SignerResult<Address> {
    let raw = attestation
        .signature
        .strip_prefix("0x")
        .unwrap_or(&attestation.signature);
    let bytes = hex::decode(raw)
        .map_err(|e| SignerError::InvalidSignature(format!("Invalid hex: {}", e)))?;
    if bytes.len() != 65 {
        return Err(SignerError::InvalidSignature(format!(
            "Invalid signature length: expected 65, got {}",
            bytes.len()
        )));
    }
    let signature =
        Signature::from_raw(&bytes).map_err(|e| SignerError::InvalidSignature(e.to_string()))?;

    let digest = SlowVoteMessage::from_attestation(attestation).digest();
    signature
        .recover_address_from_msg(digest.as_slice())
        .map_err(|e| SignerError::InvalidSignature(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vp_core::U256;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn message() -> SlowVoteMessage {
        SlowVoteMessage {
            user: Address::repeat_byte(0xab),
            proposal_id: U256::from(7u64),
            support: true,
            vp_amount: U256::from(600u64),
            available_vp: U256::from(1000u64),
            nonce: U256::from(0u64),
            expiry: 2_000_000_000,
        }
    }

    #[test]
    fn test_sign_and_recover() {
        let signer = AttestationSigner::from_hex(TEST_KEY).unwrap();
        let attestation = signer.sign(&message()).unwrap();

        assert!(attestation.signature.starts_with("0x"));
        assert_eq!(attestation.signature.len(), 2 + 130);
        assert_eq!(recover_signer(&attestation).unwrap(), signer.address());
        assert!(signer.verify(&attestation, 1_000).is_ok());
    }

    #[test]
    fn test_from_hex_accepts_bare_hex() {
        let a = AttestationSigner::from_hex(TEST_KEY).unwrap();
        let b = AttestationSigner::from_hex(TEST_KEY.trim_start_matches("0x")).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_from_hex_rejects_bad_keys() {
        assert!(matches!(
            AttestationSigner::from_hex("0x1234"),
            Err(SignerError::InvalidKey(_))
        ));
        assert!(matches!(
            AttestationSigner::from_hex("not-hex"),
            Err(SignerError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_tampered_fields_change_recovered_signer() {
        let signer = AttestationSigner::random();
        let attestation = signer.sign(&message()).unwrap();

        let mut tampered = attestation.clone();
        tampered.vp_amount = U256::from(601u64);
        assert!(matches!(
            signer.verify(&tampered, 0),
            Err(SignerError::SignerMismatch { .. }) | Err(SignerError::InvalidSignature(_))
        ));

        let mut tampered = attestation.clone();
        tampered.nonce = U256::from(1u64);
        assert_ne!(recover_signer(&tampered).ok(), Some(signer.address()));

        let mut tampered = attestation;
        tampered.expiry += 1;
        assert_ne!(recover_signer(&tampered).ok(), Some(signer.address()));
    }

    #[test]
    fn test_other_key_rejected() {
        let signer = AttestationSigner::random();
        let other = AttestationSigner::random();
        let attestation = signer.sign(&message()).unwrap();
        assert!(matches!(
            other.verify(&attestation, 0),
            Err(SignerError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn test_expired_attestation_rejected() {
        let signer = AttestationSigner::random();
        let attestation = signer.sign(&message()).unwrap();
        assert!(matches!(
            signer.verify(&attestation, attestation.expiry),
            Err(SignerError::Expired { .. })
        ));
    }

    #[test]
    fn test_malformed_signature() {
        let signer = AttestationSigner::random();
        let mut attestation = signer.sign(&message()).unwrap();
        attestation.signature = "0xdeadbeef".into();
        assert!(matches!(
            recover_signer(&attestation),
            Err(SignerError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let signer = AttestationSigner::from_hex(TEST_KEY).unwrap();
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("address"));
        assert!(!rendered.contains(TEST_KEY.trim_start_matches("0x")));
    }
}
