//! One refresh cycle: fetch every source, sanitize, merge, aggregate, classify.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::adapters::{CoingeckoAdapter, CoinalyzeAdapter, HyperliquidAdapter};
use crate::aggregation::{merge_current, merge_history, AggregationEngine};
use crate::config::{AnalysisConfig, AppConfig};
use crate::data_source::{
    CurrentBatch, CurrentRequest, DerivativesSource, HistoryBatch, HistoryRequest,
};
use crate::http_client::HttpClient;
use crate::snapshot::{AssetSnapshot, MarketSnapshot, SnapshotDiagnostics, SourceStatus, StageStatus};
use crate::symbols::{InstrumentUniverse, ResolvedUniverse, SymbolResolver};
use crate::trend::TrendClassifier;
use crate::{AssetMap, HistoryWindow, SourceTag, Timestamp};

const RAW_SAMPLE_LIMIT: usize = 12;

/// A refresh that produced nothing publishable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("no sources are enabled")]
    NoSources,
    #[error("every source failed: {details}")]
    AllSourcesFailed { details: String },
}

/// Enabled sources plus the client the symbol resolver shares with the aggregator adapter.
pub struct SourceSet {
    pub coinalyze: CoinalyzeAdapter,
    pub sources: Vec<Arc<dyn DerivativesSource>>,
}

impl SourceSet {
    pub fn from_config(config: &AppConfig, http: Arc<dyn HttpClient>) -> Self {
        if config.coinalyze_api_key.is_none() {
            warn!("COINALYZE_API_KEY is not set; metrics aggregator calls will fail");
        }
        let coinalyze = CoinalyzeAdapter::new(
            Arc::clone(&http),
            config.coinalyze_api_key.as_deref(),
            config.source_policy(SourceTag::Coinalyze),
        );

        let mut sources: Vec<Arc<dyn DerivativesSource>> = vec![Arc::new(coinalyze.clone())];
        if config.source_enabled(SourceTag::Hyperliquid) {
            sources.push(Arc::new(HyperliquidAdapter::new(
                Arc::clone(&http),
                config.source_policy(SourceTag::Hyperliquid),
            )));
        }
        if config.source_enabled(SourceTag::Coingecko) {
            sources.push(Arc::new(CoingeckoAdapter::new(
                http,
                config.coingecko_api_key.as_deref(),
                config.source_policy(SourceTag::Coingecko),
            )));
        }

        Self { coinalyze, sources }
    }
}

/// Everything a source contributed to one cycle.
struct SourceFetch {
    status: SourceStatus,
    current: Option<CurrentBatch>,
    history: Option<HistoryBatch>,
}

impl SourceFetch {
    fn aborted(source: SourceTag) -> Self {
        let failed = || StageStatus::Failed {
            error: String::from("source task aborted"),
        };
        Self {
            status: SourceStatus {
                source,
                current: failed(),
                history: failed(),
            },
            current: None,
            history: None,
        }
    }
}

/// Builds complete snapshots; never touches the store.
pub struct RefreshPipeline {
    sources: Vec<Arc<dyn DerivativesSource>>,
    universe: ResolvedUniverse,
    window: HistoryWindow,
    engine: AggregationEngine,
    classifier: TrendClassifier,
}

impl RefreshPipeline {
    pub fn new(
        sources: Vec<Arc<dyn DerivativesSource>>,
        universe: ResolvedUniverse,
        window: HistoryWindow,
        analysis: AnalysisConfig,
    ) -> Self {
        Self {
            sources,
            universe,
            window,
            engine: AggregationEngine::new(analysis),
            classifier: TrendClassifier::new(analysis),
        }
    }

    /// Wires the configured sources and resolves the instrument universe once.
    pub async fn bootstrap(config: &AppConfig, http: Arc<dyn HttpClient>) -> Self {
        let SourceSet { coinalyze, sources } = SourceSet::from_config(config, http);
        let universe = SymbolResolver::new(coinalyze.client().clone())
            .resolve()
            .await;
        Self::new(sources, universe, config.history, config.analysis)
    }

    pub fn universe(&self) -> &ResolvedUniverse {
        &self.universe
    }

    /// Runs one cycle. Per-source failures are isolated and recorded in the
    /// diagnostics; the cycle fails only when no source delivered anything.
    pub async fn run(&self) -> Result<MarketSnapshot, RefreshError> {
        if self.sources.is_empty() {
            return Err(RefreshError::NoSources);
        }

        let started = Instant::now();
        let end = Timestamp::now();
        let fetches = self.fetch_all(end).await;

        if !fetches
            .iter()
            .any(|fetch| fetch.current.is_some() || fetch.history.is_some())
        {
            let details = fetches
                .iter()
                .map(|fetch| match &fetch.status.current {
                    StageStatus::Failed { error } => format!("{}: {error}", fetch.status.source),
                    _ => format!("{}: no data", fetch.status.source),
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(RefreshError::AllSourcesFailed { details });
        }

        let mut statuses = Vec::with_capacity(fetches.len());
        let mut current = Vec::new();
        let mut history = Vec::new();
        for fetch in fetches {
            statuses.push(fetch.status);
            if let Some(batch) = fetch.current {
                current.extend(batch.points);
            }
            if let Some(batch) = fetch.history {
                history.extend(batch.points);
            }
        }

        let (current, dropped_current) = self.engine.sanitize_current(current);
        let (history, dropped_history) = self.engine.sanitize_history(history);
        let current = merge_current(current);
        let history = merge_history(history);

        let assets = AssetMap::from_fn(|asset| {
            let aggregates = self.engine.aggregate_asset(asset, &current, &history);
            let trend = self.classifier.classify(&aggregates);
            AssetSnapshot { aggregates, trend }
        });

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let dropped_funding_values = dropped_current + dropped_history;
        info!(
            current_points = current.len(),
            history_points = history.len(),
            dropped_funding_values,
            duration_ms,
            "refresh cycle completed"
        );

        Ok(MarketSnapshot {
            assets,
            updated_at: end,
            universe: self.universe.clone(),
            diagnostics: SnapshotDiagnostics {
                sources: statuses,
                dropped_funding_values,
                raw_sample: current.into_iter().take(RAW_SAMPLE_LIMIT).collect(),
                duration_ms,
            },
        })
    }

    /// Sources run concurrently; each one serializes its own calls.
    async fn fetch_all(&self, end: Timestamp) -> Vec<SourceFetch> {
        let universe = Arc::new(self.universe.universe.clone());
        let mut tasks = JoinSet::new();
        for (index, source) in self.sources.iter().enumerate() {
            let source = Arc::clone(source);
            let universe = Arc::clone(&universe);
            let window = self.window;
            tasks.spawn(async move { (index, fetch_source(source, universe, window, end).await) });
        }

        let mut slots: Vec<Option<SourceFetch>> = self.sources.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, fetch)) => slots[index] = Some(fetch),
                Err(err) => error!(error = %err, "source task aborted"),
            }
        }

        // A source whose task died still reports, so positions stay stable.
        slots
            .into_iter()
            .zip(&self.sources)
            .map(|(slot, source)| slot.unwrap_or_else(|| SourceFetch::aborted(source.tag())))
            .collect()
    }
}

async fn fetch_source(
    source: Arc<dyn DerivativesSource>,
    universe: Arc<InstrumentUniverse>,
    window: HistoryWindow,
    end: Timestamp,
) -> SourceFetch {
    let tag = source.tag();
    let capabilities = source.capabilities();

    let (current, current_status) = if capabilities.current {
        match source.current(CurrentRequest { universe: &universe }).await {
            Ok(batch) => {
                let status = StageStatus::Ok {
                    points: batch.points.len(),
                };
                (Some(batch), status)
            }
            Err(err) => {
                warn!(source = %tag, error = %err, "current fetch failed, source omitted from this cycle");
                (None, StageStatus::Failed { error: err.to_string() })
            }
        }
    } else {
        (None, StageStatus::Skipped)
    };

    let (history, history_status) = if capabilities.history {
        let req = HistoryRequest {
            universe: &universe,
            window,
            end,
        };
        match source.history(req).await {
            Ok(batch) => {
                let status = StageStatus::Ok {
                    points: batch.points.len(),
                };
                (Some(batch), status)
            }
            Err(err) => {
                warn!(source = %tag, error = %err, "history fetch failed, source omitted from this cycle");
                (None, StageStatus::Failed { error: err.to_string() })
            }
        }
    } else {
        (None, StageStatus::Skipped)
    };

    SourceFetch {
        status: SourceStatus {
            source: tag,
            current: current_status,
            history: history_status,
        },
        current,
        history,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{CapabilitySet, SourceError, SourceFuture};
    use crate::{Asset, InstrumentId, Metric, MetricPoint};

    struct StaticSource {
        tag: SourceTag,
        current: Result<Vec<MetricPoint>, SourceError>,
    }

    impl DerivativesSource for StaticSource {
        fn tag(&self) -> SourceTag {
            self.tag
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::current_only()
        }

        fn current<'a>(&'a self, _req: CurrentRequest<'a>) -> SourceFuture<'a, CurrentBatch> {
            let result = self.current.clone().map(|points| CurrentBatch { points });
            Box::pin(async move { result })
        }

        fn history<'a>(&'a self, _req: HistoryRequest<'a>) -> SourceFuture<'a, HistoryBatch> {
            Box::pin(async move { Err(SourceError::unsupported_endpoint(self.tag, "history")) })
        }
    }

    fn point(source: SourceTag, metric: Metric, exchange: &str, value: f64) -> MetricPoint {
        MetricPoint {
            source,
            asset: Asset::Btc,
            metric,
            exchange: exchange.to_owned(),
            instrument: format!("{exchange}:BTC"),
            value,
            observed_at: Timestamp::from_millis(0),
        }
    }

    fn universe() -> ResolvedUniverse {
        ResolvedUniverse {
            universe: InstrumentUniverse::new(
                vec![InstrumentId::parse("BTCUSDT_PERP.A").expect("valid")],
                Vec::new(),
            ),
            fallback_used: false,
            failure: None,
        }
    }

    fn pipeline(sources: Vec<Arc<dyn DerivativesSource>>) -> RefreshPipeline {
        RefreshPipeline::new(sources, universe(), HistoryWindow::day(), AnalysisConfig::default())
    }

    #[tokio::test]
    async fn failing_source_does_not_block_the_others() {
        let pipeline = pipeline(vec![
            Arc::new(StaticSource {
                tag: SourceTag::Coinalyze,
                current: Ok(vec![
                    point(SourceTag::Coinalyze, Metric::OpenInterest, "Binance", 100.0),
                    point(SourceTag::Coinalyze, Metric::FundingRate, "Binance", 0.0002),
                    point(SourceTag::Coinalyze, Metric::FundingRate, "Bybit", 0.02),
                ]),
            }),
            Arc::new(StaticSource {
                tag: SourceTag::Hyperliquid,
                current: Err(SourceError::decode("bad payload")),
            }),
        ]);

        let snapshot = pipeline.run().await.expect("partial snapshot publishes");

        let btc = snapshot.assets.get(Asset::Btc);
        assert_eq!(btc.aggregates.open_interest.total, 100.0);
        assert_eq!(btc.aggregates.funding.by_exchange.len(), 1);
        assert_eq!(snapshot.diagnostics.dropped_funding_values, 1);
        assert!(snapshot.diagnostics.sources[0].current.is_ok());
        assert!(matches!(
            snapshot.diagnostics.sources[1].current,
            StageStatus::Failed { .. }
        ));
        assert_eq!(snapshot.diagnostics.sources[1].history, StageStatus::Skipped);
    }

    fn decode_with_bug() -> Result<CurrentBatch, SourceError> {
        panic!("decoder bug")
    }

    struct PanickingSource;

    impl DerivativesSource for PanickingSource {
        fn tag(&self) -> SourceTag {
            SourceTag::Hyperliquid
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::current_only()
        }

        fn current<'a>(&'a self, _req: CurrentRequest<'a>) -> SourceFuture<'a, CurrentBatch> {
            Box::pin(async move { decode_with_bug() })
        }

        fn history<'a>(&'a self, _req: HistoryRequest<'a>) -> SourceFuture<'a, HistoryBatch> {
            Box::pin(async move { Err(SourceError::unsupported_endpoint(SourceTag::Hyperliquid, "history")) })
        }
    }

    #[tokio::test]
    async fn panicked_source_keeps_its_diagnostics_slot() {
        let pipeline = pipeline(vec![
            Arc::new(PanickingSource),
            Arc::new(StaticSource {
                tag: SourceTag::Coingecko,
                current: Ok(vec![point(SourceTag::Coingecko, Metric::OpenInterest, "Gate.io", 7.0)]),
            }),
        ]);

        let snapshot = pipeline.run().await.expect("healthy source still publishes");

        let sources = &snapshot.diagnostics.sources;
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source, SourceTag::Hyperliquid);
        assert_eq!(
            sources[0].current,
            StageStatus::Failed {
                error: String::from("source task aborted")
            }
        );
        assert_eq!(sources[1].source, SourceTag::Coingecko);
        assert!(sources[1].current.is_ok());
    }

    #[tokio::test]
    async fn all_sources_failing_is_an_error() {
        let pipeline = pipeline(vec![Arc::new(StaticSource {
            tag: SourceTag::Coingecko,
            current: Err(SourceError::decode("bad payload")),
        })]);

        let error = pipeline.run().await.expect_err("nothing to publish");
        assert!(matches!(error, RefreshError::AllSourcesFailed { .. }));
        assert!(error.to_string().contains("coingecko"));
    }

    #[tokio::test]
    async fn no_sources_is_an_error() {
        assert_eq!(pipeline(Vec::new()).run().await, Err(RefreshError::NoSources));
    }
}
