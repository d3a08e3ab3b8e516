//! Slow Track VP CLI
//!
//! # Usage
//!
//! ```text
//! vp [OPTIONS] <COMMAND>
//!
//! Commands:
//!   run             Catch up, follow governor events, run scheduled jobs
//!   reconcile       Audit delegator power against the chain
//!   sync            Heal one (proposal, delegate) pair
//!   sweep           Delete expired allocations
//!   stats           Ledger statistics
//!   attest          Issue a Slow Track vote attestation
//!   available       Free VP for a user
//!   validate-claim  Check a delegator's claimed power
//!   verify          Verify an attestation file
//! ```
//!
//! Configuration comes from flags, then environment (`.env` is loaded first).
//!
//! # Examples
//!
//! ```text
//! vp --governor 0xGov... run
//! vp reconcile --proposal 7 --heal
//! vp attest 0xUser... 7 600 1000
//! ```

pub mod commands;
pub mod error;
pub mod handler;
pub mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use error::{CliError, CliResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
