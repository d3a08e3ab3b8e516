//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vp_core::logging::LogLevel;

/// Slow Track VP ledger
#[derive(Parser, Debug)]
#[command(name = "vp")]
#[command(version)]
#[command(about = "Slow Track VP allocation ledger")]
#[command(long_about = "Operate the off-chain Slow Track VP ledger.\n\n\
    Follows governor events, issues vote attestations, and reconciles \
    delegator power against the chain.")]
pub struct Cli {
    /// JSON-RPC endpoint (env: VP_CHAIN_RPC_URL)
    #[arg(long, env = "VP_CHAIN_RPC_URL", default_value = "http://127.0.0.1:8545")]
    pub rpc_url: String,

    /// Governor contract address (env: VP_CHAIN_GOVERNOR_ADDRESS)
    #[arg(long, env = "VP_CHAIN_GOVERNOR_ADDRESS")]
    pub governor: Option<String>,

    /// Ledger database directory (env: VP_DB_PATH)
    #[arg(long, env = "VP_DB_PATH", default_value = "./vp-ledger")]
    pub db_path: PathBuf,

    /// Attestation signer private key, hex (env: VP_SIGNER_KEY)
    #[arg(long, env = "VP_SIGNER_KEY", hide_env_values = true)]
    pub signer_key: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "table")]
    pub format: OutputFormat,

    /// Log level for workspace crates when RUST_LOG is unset
    #[arg(long, env = "VP_LOG_LEVEL", default_value = "info", value_parser = parse_log_level)]
    pub log_level: LogLevel,

    /// Shorthand for --log-level debug
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level: {}", s))
}

impl Cli {
    pub fn effective_log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Catch up, follow governor events, and run scheduled jobs until Ctrl-C
    Run,

    /// Audit delegator power against the chain
    Reconcile {
        /// Only audit this proposal
        #[arg(long)]
        proposal: Option<String>,
        /// Heal every affected pair after the audit
        #[arg(long)]
        heal: bool,
    },

    /// Heal one (proposal, delegate) pair from chain state
    Sync {
        proposal: String,
        delegate: String,
    },

    /// Delete allocations past their deadline
    Sweep,

    /// Ledger statistics
    Stats,

    /// Issue a signed Slow Track vote attestation
    Attest {
        user: String,
        proposal: String,
        /// VP to allocate
        vp_amount: String,
        /// User's total VP
        total_vp: String,
        /// Vote against instead of for
        #[arg(long)]
        against: bool,
    },

    /// Free VP for a user
    Available {
        user: String,
        total_vp: String,
    },

    /// Check a delegator's claimed power against the chain
    ValidateClaim {
        proposal: String,
        delegate: String,
        delegator: String,
        claimed_power: String,
    },

    /// Verify an attestation JSON file against the configured signer
    Verify {
        file: PathBuf,
    },
}
