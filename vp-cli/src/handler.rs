//! Command Handlers

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vp_chain::{ChainConfig, EvmChainClient, LogSubscription};
use vp_core::{unix_now, Address, Attestation, U256};
use vp_service::{AllocationLedger, ReconciliationEngine, VpService, VpServiceConfig};
use vp_signer::{recover_signer, AttestationSigner};
use vp_store::SledLedgerStore;

use crate::commands::{Cli, Commands};
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the CLI with parsed arguments
pub async fn run(cli: Cli) -> CliResult<()> {
    match &cli.command {
        Commands::Run => handle_run(&cli).await,
        Commands::Reconcile { proposal, heal } => {
            handle_reconcile(&cli, proposal.as_deref(), *heal).await
        }
        Commands::Sync { proposal, delegate } => handle_sync(&cli, proposal, delegate).await,
        Commands::Sweep => handle_sweep(&cli).await,
        Commands::Stats => handle_stats(&cli).await,
        Commands::Attest {
            user,
            proposal,
            vp_amount,
            total_vp,
            against,
        } => handle_attest(&cli, user, proposal, vp_amount, total_vp, !*against).await,
        Commands::Available { user, total_vp } => handle_available(&cli, user, total_vp).await,
        Commands::ValidateClaim {
            proposal,
            delegate,
            delegator,
            claimed_power,
        } => handle_validate_claim(&cli, proposal, delegate, delegator, claimed_power).await,
        Commands::Verify { file } => handle_verify(&cli, file).await,
    }
}

// ==================== Argument parsing ====================

pub fn parse_address(label: &str, value: &str) -> CliResult<Address> {
    value
        .trim()
        .parse()
        .map_err(|e| CliError::invalid_arg(format!("{} '{}': {}", label, value, e)))
}

/// Decimal, or hex with a `0x` prefix
pub fn parse_u256(label: &str, value: &str) -> CliResult<U256> {
    value
        .trim()
        .parse()
        .map_err(|e| CliError::invalid_arg(format!("{} '{}': {}", label, value, e)))
}

// ==================== Collaborators ====================

fn open_store(cli: &Cli) -> CliResult<Arc<SledLedgerStore>> {
    debug!(path = %cli.db_path.display(), "Opening ledger store");
    Ok(Arc::new(SledLedgerStore::open(&cli.db_path)?))
}

/// Chain client; `governor` may be omitted for commands that only touch the store
fn chain_client(cli: &Cli, require_governor: bool) -> CliResult<Arc<EvmChainClient>> {
    let mut config = ChainConfig::from_env();
    config.rpc_url = cli.rpc_url.clone();
    match &cli.governor {
        Some(governor) => config.governor_address = governor.clone(),
        None if require_governor => {
            return Err(CliError::config(
                "governor address is required (--governor or VP_CHAIN_GOVERNOR_ADDRESS)",
            ))
        }
        None => config.governor_address = Address::ZERO.to_string(),
    }
    Ok(Arc::new(EvmChainClient::connect(config)?))
}

fn require_signer(cli: &Cli) -> CliResult<Arc<AttestationSigner>> {
    let key = cli
        .signer_key
        .as_deref()
        .ok_or_else(|| CliError::config("signer key is required (--signer-key or VP_SIGNER_KEY)"))?;
    Ok(Arc::new(AttestationSigner::from_hex(key)?))
}

/// Configured signer, or a throwaway key for commands that never sign
fn signer_or_ephemeral(cli: &Cli) -> CliResult<Arc<AttestationSigner>> {
    match cli.signer_key {
        Some(_) => require_signer(cli),
        None => Ok(Arc::new(AttestationSigner::random())),
    }
}

fn ledger(cli: &Cli, require_governor: bool) -> CliResult<AllocationLedger<SledLedgerStore, EvmChainClient>> {
    let config = VpServiceConfig::from_env();
    Ok(AllocationLedger::new(
        open_store(cli)?,
        chain_client(cli, require_governor)?,
        signer_or_ephemeral(cli)?,
        config.signature_ttl_secs,
    ))
}

fn engine(cli: &Cli) -> CliResult<ReconciliationEngine<SledLedgerStore, EvmChainClient>> {
    Ok(ReconciliationEngine::new(open_store(cli)?, chain_client(cli, true)?))
}

// ==================== Handlers ====================

async fn handle_run(cli: &Cli) -> CliResult<()> {
    let store = open_store(cli)?;
    let chain = chain_client(cli, true)?;
    let signer = require_signer(cli)?;
    let config = VpServiceConfig::from_env();

    info!(
        signer = %signer.address(),
        governor = %chain.governor_address(),
        db = %cli.db_path.display(),
        "Starting Slow Track ledger"
    );

    let service = VpService::new(store.clone(), chain.clone(), signer, config);
    let report = service.catch_up().await?;

    let poll_interval = Duration::from_millis(chain.config().poll_interval_ms);
    let subscription = Arc::new(LogSubscription::new(chain.clone(), poll_interval));
    let pipeline = service.follow(subscription, report.resume_block());
    let runner = service.start_background();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    runner.stop().await;
    pipeline.source.abort();
    match pipeline.ingestion.await {
        Ok(stats) => info!(
            processed = stats.events_processed,
            failed = stats.events_failed,
            dropped = stats.events_dropped,
            "Ingestion drained"
        ),
        Err(e) => warn!(error = %e, "Ingestion task ended abnormally"),
    }
    store.flush().await?;
    Ok(())
}

async fn handle_reconcile(cli: &Cli, proposal: Option<&str>, heal: bool) -> CliResult<()> {
    let engine = engine(cli)?;
    let result = match proposal {
        Some(p) => engine.reconcile_proposal(parse_u256("proposal", p)?).await?,
        None => engine.run_reconciliation().await?,
    };
    output::print_reconciliation(&result, cli.format);
    let skipped = result.errors.len();

    if heal && !result.is_healthy {
        let report = engine.heal_discrepancies(&result).await;
        output::print_heal(&report, cli.format);
        if !report.errors.is_empty() || skipped > 0 {
            return Err(CliError::check_failed(format!(
                "{} pair(s) failed to heal, {} pair(s) could not be audited",
                report.errors.len(),
                skipped
            )));
        }
        return Ok(());
    }

    if skipped > 0 {
        return Err(CliError::check_failed(format!(
            "{} pair(s) could not be audited",
            skipped
        )));
    }
    if !result.is_healthy {
        return Err(CliError::check_failed(format!(
            "{} discrepancies found",
            result.discrepancies.len()
        )));
    }
    Ok(())
}

async fn handle_sync(cli: &Cli, proposal: &str, delegate: &str) -> CliResult<()> {
    let engine = engine(cli)?;
    let outcome = engine
        .sync_allocations_from_chain(parse_u256("proposal", proposal)?, parse_address("delegate", delegate)?)
        .await?;
    output::print_sync(&outcome, cli.format);
    Ok(())
}

async fn handle_sweep(cli: &Cli) -> CliResult<()> {
    let count = ledger(cli, false)?.cleanup_expired_allocations().await?;
    println!("Removed {} expired allocation(s)", count);
    Ok(())
}

async fn handle_stats(cli: &Cli) -> CliResult<()> {
    let stats = ledger(cli, false)?.get_allocation_stats().await?;
    output::print_stats(&stats, cli.format);
    Ok(())
}

async fn handle_attest(
    cli: &Cli,
    user: &str,
    proposal: &str,
    vp_amount: &str,
    total_vp: &str,
    support: bool,
) -> CliResult<()> {
    let store = open_store(cli)?;
    let chain = chain_client(cli, true)?;
    let signer = require_signer(cli)?;
    let ledger = AllocationLedger::new(
        store,
        chain,
        signer,
        VpServiceConfig::from_env().signature_ttl_secs,
    );

    let attestation = ledger
        .get_slow_track_attestation(
            parse_address("user", user)?,
            parse_u256("proposal", proposal)?,
            support,
            parse_u256("vp_amount", vp_amount)?,
            parse_u256("total_vp", total_vp)?,
        )
        .await?;
    output::print_attestation(&attestation);
    Ok(())
}

async fn handle_available(cli: &Cli, user: &str, total_vp: &str) -> CliResult<()> {
    let available = ledger(cli, false)?
        .get_available_vp(parse_address("user", user)?, parse_u256("total_vp", total_vp)?)
        .await?;
    output::print_available(&available, cli.format);
    Ok(())
}

async fn handle_validate_claim(
    cli: &Cli,
    proposal: &str,
    delegate: &str,
    delegator: &str,
    claimed_power: &str,
) -> CliResult<()> {
    let claim = engine(cli)?
        .validate_delegator_claim_power(
            parse_u256("proposal", proposal)?,
            parse_address("delegate", delegate)?,
            parse_address("delegator", delegator)?,
            parse_u256("claimed_power", claimed_power)?,
        )
        .await?;
    output::print_claim(&claim, cli.format);
    if !claim.valid {
        return Err(CliError::check_failed("claimed power does not match chain"));
    }
    Ok(())
}

async fn handle_verify(cli: &Cli, file: &std::path::Path) -> CliResult<()> {
    let signer = require_signer(cli)?;
    let raw = tokio::fs::read_to_string(file).await?;
    let attestation: Attestation = serde_json::from_str(&raw)?;

    let recovered = recover_signer(&attestation)?;
    println!("Recovered signer: {}", recovered);
    signer.verify(&attestation, unix_now())?;
    println!("Attestation is valid for {}", signer.address());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u256_accepts_decimal_and_hex() {
        assert_eq!(parse_u256("x", "1100").unwrap(), U256::from(1100u64));
        assert_eq!(parse_u256("x", "0x10").unwrap(), U256::from(16u64));
        assert_eq!(parse_u256("x", "-1").unwrap_err().exit_code(), 2);
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("user", "0x00000000000000000000000000000000000000aa").unwrap();
        assert_eq!(addr, Address::with_last_byte(0xaa));
        assert!(parse_address("user", "0x1234").is_err());
    }

    #[tokio::test]
    async fn test_stats_on_fresh_store() {
        use clap::Parser;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("ledger");
        let cli = Cli::try_parse_from([
            "vp",
            "--db-path",
            db.to_str().unwrap(),
            "--format",
            "json",
            "stats",
        ])
        .unwrap();
        run(cli).await.unwrap();
    }

    #[tokio::test]
    async fn test_attest_requires_signer() {
        use clap::Parser;

        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("ledger");
        let mut cli = Cli::try_parse_from([
            "vp",
            "--db-path",
            db.to_str().unwrap(),
            "--governor",
            "0x0000000000000000000000000000000000000001",
            "attest",
            "0x00000000000000000000000000000000000000aa",
            "7",
            "600",
            "1000",
        ])
        .unwrap();
        cli.signer_key = None;
        let err = run(cli).await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }
}
