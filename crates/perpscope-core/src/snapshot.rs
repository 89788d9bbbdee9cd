//! Immutable market snapshots and the shared store that publishes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::aggregation::AssetAggregates;
use crate::symbols::ResolvedUniverse;
use crate::trend::TrendAssessment;
use crate::{AssetMap, MetricPoint, SourceTag, Timestamp};

/// Aggregates and trend for one asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetSnapshot {
    pub aggregates: AssetAggregates,
    pub trend: TrendAssessment,
}

/// Result of one endpoint call for one source during a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Ok { points: usize },
    Failed { error: String },
    Skipped,
}

impl StageStatus {
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub source: SourceTag,
    pub current: StageStatus,
    pub history: StageStatus,
}

/// Refresh bookkeeping exposed through the debug endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SnapshotDiagnostics {
    pub sources: Vec<SourceStatus>,
    pub dropped_funding_values: usize,
    pub raw_sample: Vec<MetricPoint>,
    pub duration_ms: u64,
}

/// One complete, published refresh result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub assets: AssetMap<AssetSnapshot>,
    pub updated_at: Timestamp,
    pub universe: ResolvedUniverse,
    pub diagnostics: SnapshotDiagnostics,
}

/// Process-wide holder of the latest snapshot.
///
/// Readers clone the inner `Arc` and never observe a partially built
/// snapshot. At most one refresh holds the [`RefreshGuard`] at a time.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    latest: Arc<RwLock<Option<Arc<MarketSnapshot>>>>,
    refreshing: Arc<AtomicBool>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self) -> Option<Arc<MarketSnapshot>> {
        self.latest.read().await.clone()
    }

    /// Replaces the published snapshot wholesale.
    pub async fn publish(&self, snapshot: MarketSnapshot) {
        *self.latest.write().await = Some(Arc::new(snapshot));
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    /// Claims the refresh slot; `None` when another refresh is in flight.
    pub fn try_begin_refresh(&self) -> Option<RefreshGuard> {
        self.refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .ok()
            .map(|_| RefreshGuard {
                refreshing: Arc::clone(&self.refreshing),
            })
    }
}

/// Releases the refresh slot on drop, including on early return.
#[derive(Debug)]
pub struct RefreshGuard {
    refreshing: Arc<AtomicBool>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.refreshing.store(false, Ordering::SeqCst);
    }
}
