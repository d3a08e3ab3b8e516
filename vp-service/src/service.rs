//! Service assembly
//!
//! Wires one store, one chain client and one signer into the ledger,
//! ingestion and reconciliation components.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};
use vp_core::{ChainClient, EventSource};
use vp_signer::AttestationSigner;
use vp_store::LedgerStore;

use crate::config::VpServiceConfig;
use crate::error::VpResult;
use crate::ingestion::{CatchUpReport, EventIngestion, IngestionStats};
use crate::ledger::AllocationLedger;
use crate::reconcile::ReconciliationEngine;
use crate::runner::{BackgroundRunner, RunnerHandle};

/// Handles for the live event pipeline
pub struct LivePipeline {
    pub source: JoinHandle<()>,
    pub ingestion: JoinHandle<IngestionStats>,
}

pub struct VpService<S: LedgerStore + 'static, C: ChainClient + 'static> {
    ledger: Arc<AllocationLedger<S, C>>,
    ingestion: Arc<EventIngestion<S, C>>,
    engine: Arc<ReconciliationEngine<S, C>>,
    config: VpServiceConfig,
}

impl<S: LedgerStore + 'static, C: ChainClient + 'static> VpService<S, C> {
    pub fn new(
        store: Arc<S>,
        chain: Arc<C>,
        signer: Arc<AttestationSigner>,
        config: VpServiceConfig,
    ) -> Self {
        let ledger = Arc::new(AllocationLedger::new(
            store.clone(),
            chain.clone(),
            signer,
            config.signature_ttl_secs,
        ));
        let ingestion = Arc::new(EventIngestion::new(ledger.clone(), chain.clone()));
        let engine = Arc::new(ReconciliationEngine::new(store, chain));

        Self {
            ledger,
            ingestion,
            engine,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<AllocationLedger<S, C>> {
        &self.ledger
    }

    pub fn ingestion(&self) -> &Arc<EventIngestion<S, C>> {
        &self.ingestion
    }

    pub fn reconciliation(&self) -> &Arc<ReconciliationEngine<S, C>> {
        &self.engine
    }

    pub fn config(&self) -> &VpServiceConfig {
        &self.config
    }

    /// Replay the configured lookback window
    pub async fn catch_up(&self) -> VpResult<CatchUpReport> {
        self.ingestion.catch_up(self.config.catch_up_lookback_blocks).await
    }

    /// Connect `source` to the ingestion queue starting at `from_block`
    pub fn follow<E: EventSource + 'static>(&self, source: Arc<E>, from_block: u64) -> LivePipeline {
        let (sink, ingestion) = self.ingestion.spawn(self.config.event_queue_capacity);
        let source = tokio::spawn(async move {
            match source.stream_events(from_block, sink).await {
                Ok(()) => info!("Event source finished"),
                Err(e) => error!(error = %e, "Event source failed"),
            }
        });
        LivePipeline { source, ingestion }
    }

    /// Start the reconciliation and expiry sweep schedules
    pub fn start_background(&self) -> RunnerHandle {
        BackgroundRunner::new(self.ledger.clone(), self.engine.clone(), self.config.clone()).start()
    }
}
