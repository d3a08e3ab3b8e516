//! Background Runner
//!
//! Drives the scheduled jobs on independent timers:
//!
//! - reconciliation: audit every pair, then heal affected pairs if enabled
//! - expiry sweep: delete allocations past their deadline
//!
//! A failed cycle is logged and counted, never fatal. Once a job fails
//! `max_consecutive_failures_warn` times in a row, each further failure
//! also logs a warning.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use vp_core::ChainClient;
use vp_store::LedgerStore;

use crate::config::VpServiceConfig;
use crate::error::VpResult;
use crate::ledger::AllocationLedger;
use crate::reconcile::{HealReport, ReconciliationEngine};

/// Consecutive failure counter for one scheduled job
#[derive(Debug, Clone)]
pub struct FailureTracker {
    job: &'static str,
    threshold: u32,
    consecutive: u32,
}

impl FailureTracker {
    pub fn new(job: &'static str, threshold: u32) -> Self {
        Self {
            job,
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn record_success(&mut self) {
        if self.consecutive > 0 {
            info!(job = self.job, after = self.consecutive, "Scheduled job recovered");
        }
        self.consecutive = 0;
    }

    /// Returns true once the warning threshold is reached
    pub fn record_failure(&mut self, err: &dyn std::fmt::Display) -> bool {
        self.consecutive += 1;
        error!(job = self.job, consecutive = self.consecutive, error = %err, "Scheduled job failed");
        if self.consecutive >= self.threshold {
            warn!(
                job = self.job,
                consecutive = self.consecutive,
                "Scheduled job keeps failing"
            );
            return true;
        }
        false
    }
}

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub discrepancies: usize,
    /// Pairs the audit could not read
    pub audit_failures: usize,
    pub heal: Option<HealReport>,
}

impl CycleReport {
    /// Pairs skipped by the audit plus pairs that failed to heal
    pub fn failures(&self) -> usize {
        self.audit_failures + self.heal_failures()
    }

    /// Pairs the healing pass could not fix
    pub fn heal_failures(&self) -> usize {
        self.heal.as_ref().map_or(0, |h| h.errors.len())
    }
}

/// Audit, then heal if `heal` is set and the ledger is unhealthy
pub async fn run_reconcile_cycle<S: LedgerStore, C: ChainClient>(
    engine: &ReconciliationEngine<S, C>,
    heal: bool,
) -> VpResult<CycleReport> {
    let result = engine.run_reconciliation().await?;
    let mut report = CycleReport {
        discrepancies: result.discrepancies.len(),
        audit_failures: result.errors.len(),
        heal: None,
    };

    if heal && !result.is_healthy {
        let heal_report = engine.heal_discrepancies(&result).await;
        let failed = heal_report.errors.len();
        info!(
            pairs = heal_report.pairs_attempted,
            healed = heal_report.pairs_healed,
            deleted = heal_report.rows_deleted,
            updated = heal_report.rows_updated,
            failed,
            "Healing pass complete"
        );
        report.heal = Some(heal_report);
    }

    Ok(report)
}

pub struct BackgroundRunner<S: LedgerStore + 'static, C: ChainClient + 'static> {
    ledger: Arc<AllocationLedger<S, C>>,
    engine: Arc<ReconciliationEngine<S, C>>,
    config: VpServiceConfig,
}

impl<S: LedgerStore + 'static, C: ChainClient + 'static> BackgroundRunner<S, C> {
    pub fn new(
        ledger: Arc<AllocationLedger<S, C>>,
        engine: Arc<ReconciliationEngine<S, C>>,
        config: VpServiceConfig,
    ) -> Self {
        Self {
            ledger,
            engine,
            config,
        }
    }

    pub fn start(self) -> RunnerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(RwLock::new(true));
        let running_clone = running.clone();

        let reconcile_interval = self.config.reconcile_interval();
        let sweep_interval = self.config.expiry_sweep_interval();
        let heal = self.config.heal_on_reconcile;
        let threshold = self.config.max_consecutive_failures_warn;
        let ledger = self.ledger;
        let engine = self.engine;

        let task = tokio::spawn(async move {
            let mut reconcile_timer = interval(reconcile_interval);
            let mut sweep_timer = interval(sweep_interval);
            let mut reconcile_failures = FailureTracker::new("reconciliation", threshold);
            let mut sweep_failures = FailureTracker::new("expiry_sweep", threshold);

            info!(
                reconcile_secs = reconcile_interval.as_secs(),
                sweep_secs = sweep_interval.as_secs(),
                heal,
                "Background runner started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Background runner received shutdown signal");
                        break;
                    }
                    _ = reconcile_timer.tick() => {
                        if !*running_clone.read().await {
                            continue;
                        }
                        match run_reconcile_cycle(engine.as_ref(), heal).await {
                            Ok(report) if report.failures() > 0 => {
                                let msg = format!(
                                    "{} pair(s) skipped by audit, {} pair(s) failed to heal",
                                    report.audit_failures,
                                    report.heal_failures()
                                );
                                reconcile_failures.record_failure(&msg);
                            }
                            Ok(report) => {
                                debug!(discrepancies = report.discrepancies, "Reconciliation cycle done");
                                reconcile_failures.record_success();
                            }
                            Err(e) => {
                                reconcile_failures.record_failure(&e);
                            }
                        }
                    }
                    _ = sweep_timer.tick() => {
                        if !*running_clone.read().await {
                            continue;
                        }
                        match ledger.cleanup_expired_allocations().await {
                            Ok(count) => {
                                debug!(count, "Expiry sweep done");
                                sweep_failures.record_success();
                            }
                            Err(e) => {
                                sweep_failures.record_failure(&e);
                            }
                        }
                    }
                }
            }

            info!("Background runner stopped");
        });

        RunnerHandle {
            shutdown_tx,
            running,
            task,
        }
    }
}

/// Control handle for a started runner
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    /// Stop the runner and wait for the current cycle to finish
    pub async fn stop(self) {
        *self.running.write().await = false;
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "Background runner task ended abnormally");
        }
    }

    /// Skip cycles until resumed
    pub async fn pause(&self) {
        *self.running.write().await = false;
    }

    pub async fn resume(&self) {
        *self.running.write().await = true;
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
