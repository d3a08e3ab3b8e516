//! Error types for attestation signing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Invalid signer key: {0}")]
    InvalidKey(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Signature recovered {recovered}, expected {expected}")]
    SignerMismatch { expected: String, recovered: String },

    #[error("Attestation expired at {expiry}, now {now}")]
    Expired { expiry: u64, now: u64 },
}

pub type SignerResult<T> = Result<T, SignerError>;
