//! Slow Track Attestation Signer
//!
//! Signs the `voteSlow` capability token that lets the governor accept an
//! off-chain VP availability check without recomputing it.
//!
//! Signing flow:
//! 1. Pack `"voteSlow" ‖ user ‖ proposalId ‖ support ‖ vpAmount ‖ availableVP ‖ nonce ‖ expiry`
//!    exactly like Solidity `abi.encodePacked`
//! 2. Hash with keccak256
//! 3. Sign the 32-byte digest with EIP-191 personal-sign semantics
//!
//! The contract recovers the signer from the same digest, so any change to
//! a packed field changes the recovered address.

pub mod attestation;
pub mod error;
pub mod message;

pub use attestation::{recover_signer, AttestationSigner};
pub use error::{SignerError, SignerResult};
pub use message::{domain, SlowVoteMessage};
