//! Fixed-interval refresh loop with at-most-one refresh in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::pipeline::{RefreshError, RefreshPipeline};
use crate::snapshot::SnapshotStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Published { duration_ms: u64 },
    /// Another refresh was still running; nothing was queued.
    Skipped,
    /// The previous snapshot stays published.
    Failed(RefreshError),
}

pub struct RefreshScheduler {
    pipeline: Arc<RefreshPipeline>,
    store: SnapshotStore,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(pipeline: Arc<RefreshPipeline>, store: SnapshotStore, interval: Duration) -> Self {
        Self {
            pipeline,
            store,
            interval,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Runs one refresh unless one is already in progress.
    pub async fn try_refresh(&self) -> RefreshOutcome {
        let Some(_guard) = self.store.try_begin_refresh() else {
            info!("refresh already in progress, skipping this tick");
            return RefreshOutcome::Skipped;
        };

        match self.pipeline.run().await {
            Ok(snapshot) => {
                let duration_ms = snapshot.diagnostics.duration_ms;
                self.store.publish(snapshot).await;
                info!(duration_ms, "published new market snapshot");
                RefreshOutcome::Published { duration_ms }
            }
            Err(err) => {
                error!(error = %err, "refresh failed, keeping previous snapshot");
                RefreshOutcome::Failed(err)
            }
        }
    }

    /// Ticks immediately, then every `interval`. Each tick runs in its own
    /// task so a slow cycle makes later ticks skip instead of queueing.
    ///
    /// Refresh tasks are owned by the returned handle's task: aborting it
    /// also cancels any refresh still in flight.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let scheduler = Arc::clone(&self);
                        in_flight.spawn(async move {
                            scheduler.try_refresh().await;
                        });
                    }
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(err) = joined {
                            if err.is_panic() {
                                error!(error = %err, "refresh task panicked");
                            }
                        }
                    }
                }
            }
        })
    }
}
