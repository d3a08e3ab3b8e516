//! Output Formatting

use serde::Serialize;
use vp_core::{Attestation, ReconciliationResult};
use vp_service::{AvailableVp, ClaimValidation, HealReport, PairSyncOutcome};
use vp_store::StoreStats;

use crate::commands::OutputFormat;

/// Print any value as pretty JSON
pub fn print_json<T: Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error formatting JSON: {}", e),
    }
}

pub fn print_reconciliation(result: &ReconciliationResult, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(result),
        OutputFormat::Table => {
            println!("Reconciliation");
            println!("==============");
            println!("Checked at:   {}", result.checked_at);
            println!("Proposals:    {}", result.proposals_checked);
            println!("Pairs:        {}", result.delegates_checked);
            println!("Rows:         {}", result.allocations_checked);
            println!("Healthy:      {}", if result.is_healthy { "yes" } else { "no" });
            if !result.discrepancies.is_empty() {
                println!();
                println!("Discrepancies:");
                for d in &result.discrepancies {
                    println!("  - [{}] {}", d.kind, d.message);
                }
            }
            if !result.errors.is_empty() {
                println!();
                println!("Skipped pairs:");
                for err in &result.errors {
                    println!("  ! {}", err);
                }
            }
        }
    }
}

pub fn print_heal(report: &HealReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            println!();
            println!("Healing");
            println!("=======");
            println!("Pairs attempted: {}", report.pairs_attempted);
            println!("Pairs healed:    {}", report.pairs_healed);
            println!("Rows deleted:    {}", report.rows_deleted);
            println!("Rows updated:    {}", report.rows_updated);
            for err in &report.errors {
                println!("  ! {}", err);
            }
        }
    }
}

pub fn print_sync(outcome: &PairSyncOutcome, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Table => {
            println!(
                "Pair ({}, {}): {} deleted, {} updated",
                outcome.proposal_id, outcome.delegate, outcome.rows_deleted, outcome.rows_updated
            );
        }
    }
}

pub fn print_stats(stats: &StoreStats, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(stats),
        OutputFormat::Table => {
            println!("Ledger Statistics");
            println!("=================");
            println!("Allocations:       {}", stats.total_allocations);
            println!("  active:          {}", stats.active_allocations);
            println!("  expired:         {}", stats.expired_allocations);
            println!("Users:             {}", stats.distinct_users);
            println!("Proposals:         {}", stats.distinct_proposals);
            println!("Active VP:         {}", stats.total_active_vp);
            println!("Delegator rows:    {}", stats.delegator_rows);
            println!("Delegate pairs:    {}", stats.delegate_pairs);
        }
    }
}

pub fn print_available(available: &AvailableVp, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(available),
        OutputFormat::Table => {
            println!("Total VP:     {}", available.total);
            println!("Allocated:    {}", available.allocated);
            println!("Available:    {}", available.available);
            for a in &available.allocations {
                println!(
                    "  - proposal {}: {} ({}) until {}",
                    a.proposal_id,
                    a.vp_amount,
                    if a.support { "for" } else { "against" },
                    a.deadline
                );
            }
        }
    }
}

pub fn print_claim(claim: &ClaimValidation, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(claim),
        OutputFormat::Table => {
            println!("Claimed:  {}", claim.claimed_power);
            println!("On chain: {}", claim.on_chain_power);
            println!("Valid:    {}", if claim.valid { "yes" } else { "no" });
        }
    }
}

/// Attestations are always JSON; they are meant to be passed on verbatim
pub fn print_attestation(attestation: &Attestation) {
    print_json(attestation);
}
