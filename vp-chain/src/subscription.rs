//! Polling log subscription
//!
//! Follows the chain head by repeatedly querying new blocks and pushing the
//! decoded events onto the ingestion queue. An RPC failure never ends the
//! subscription: the next poll retries from the last delivered block, which
//! is how the connection is re-established.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use vp_core::{ChainClient, ChainEvent, ChainResult, EventSource};

/// Live event source built on block-range queries
pub struct LogSubscription<C: ChainClient> {
    client: Arc<C>,
    poll_interval: Duration,
}

impl<C: ChainClient> LogSubscription<C> {
    pub fn new(client: Arc<C>, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Fetch and deliver everything in `[next_block, head]`.
    ///
    /// Returns the next block to poll from, or `None` once the queue is closed.
    async fn poll_once(
        &self,
        next_block: u64,
        sink: &mpsc::Sender<ChainEvent>,
    ) -> ChainResult<Option<u64>> {
        let head = self.client.block_number().await?;
        if head < next_block {
            return Ok(Some(next_block));
        }

        let events = self.client.query_events(next_block, head).await?;
        debug!(from = next_block, to = head, count = events.len(), "Polled governor events");

        for event in events {
            if sink.send(event).await.is_err() {
                return Ok(None);
            }
        }
        Ok(Some(head.saturating_add(1)))
    }
}

#[async_trait]
impl<C: ChainClient + 'static> EventSource for LogSubscription<C> {
    async fn stream_events(
        &self,
        from_block: u64,
        sink: mpsc::Sender<ChainEvent>,
    ) -> ChainResult<()> {
        let mut next_block = from_block;
        let mut failures: u32 = 0;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(from_block, "Log subscription started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = sink.closed() => {
                    info!(next_block, "Event queue closed, stopping log subscription");
                    return Ok(());
                }
            }

            match self.poll_once(next_block, &sink).await {
                Ok(Some(next)) => {
                    if failures > 0 {
                        info!(failures, next_block, "Log subscription re-established");
                        failures = 0;
                    }
                    next_block = next;
                }
                Ok(None) => {
                    info!(next_block, "Event queue closed, stopping log subscription");
                    return Ok(());
                }
                Err(e) => {
                    failures += 1;
                    warn!(
                        error = %e,
                        failures,
                        next_block,
                        "Log poll failed, retrying on next tick"
                    );
                }
            }
        }
    }
}
