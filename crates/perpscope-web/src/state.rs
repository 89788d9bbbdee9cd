use std::sync::Arc;

use perpscope_core::{MarketSnapshot, ResolvedUniverse, SnapshotStore};

use crate::error::ApiError;

/// Shared handler state; routes only ever read the published snapshot.
#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub universe: Arc<ResolvedUniverse>,
}

impl AppState {
    pub fn new(store: SnapshotStore, universe: ResolvedUniverse) -> Self {
        Self {
            store,
            universe: Arc::new(universe),
        }
    }

    /// Latest snapshot, or [`ApiError::Loading`] before the first publication.
    pub async fn snapshot(&self) -> Result<Arc<MarketSnapshot>, ApiError> {
        self.store.latest().await.ok_or(ApiError::Loading)
    }
}
