//! # Perpscope Core
//!
//! Refresh and aggregation pipeline for BTC/ETH perpetual futures metrics.
//!
//! ## Overview
//!
//! This crate polls several derivatives data sources, merges their
//! per-exchange open interest, funding and long/short figures, and publishes
//! immutable snapshots with simple trend signals:
//!
//! - **Rate-limited request client** with retry, backoff and 429 handling
//! - **Symbol resolver** picking one perpetual per (asset, exchange)
//! - **Source adapters** for the metrics aggregator, the decentralized exchange
//!   and the secondary aggregator
//! - **Aggregation engine** for exchange breakdowns and bucketed history
//! - **Trend classifier** producing bullish/bearish/neutral assessments
//! - **Snapshot store and scheduler** with at-most-one refresh in flight
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Source adapters (Coinalyze, Hyperliquid, CoinGecko) |
//! | [`aggregation`] | Sanity filter, precedence merge, totals and buckets |
//! | [`config`] | Environment configuration and analysis thresholds |
//! | [`data_source`] | Source trait and request/response types |
//! | [`domain`] | Assets, instruments, exchanges, timestamps, metric points |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`pipeline`] | One refresh cycle |
//! | [`request_client`] | Throttled JSON client with retries |
//! | [`retry`] | Backoff and retry policy |
//! | [`scheduler`] | Interval-driven refresh loop |
//! | [`snapshot`] | Published snapshots and the shared store |
//! | [`source`] | Source identifiers and precedence |
//! | [`source_policy`] | Per-source request budgets |
//! | [`symbols`] | Instrument universe resolution |
//! | [`throttling`] | Per-source call gate |
//! | [`trend`] | Trend classification |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ RefreshScheduler│──────────────┐
//! └────────┬────────┘              │ publish
//!          │                       ▼
//!          ▼               ┌──────────────────┐
//! ┌─────────────────┐      │  SnapshotStore   │◀── HTTP routes
//! │ RefreshPipeline │      └──────────────────┘
//! └────────┬────────┘
//!          │ concurrently, one task per source
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Source adapters │────▶│ RequestClient    │
//! └────────┬────────┘     │ (throttle/retry) │
//!          │              └──────────────────┘
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Aggregation     │────▶│ TrendClassifier  │
//! └─────────────────┘     └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use perpscope_core::{AppConfig, RefreshPipeline, RefreshScheduler, ReqwestHttpClient, SnapshotStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let pipeline = RefreshPipeline::bootstrap(&config, Arc::new(ReqwestHttpClient::new())).await;
//!     let store = SnapshotStore::new();
//!     let scheduler = Arc::new(RefreshScheduler::new(Arc::new(pipeline), store.clone(), config.refresh_interval));
//!     scheduler.try_refresh().await;
//!     if let Some(snapshot) = store.latest().await {
//!         println!("BTC open interest: {}", snapshot.assets.btc.aggregates.open_interest.total);
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod aggregation;
pub mod config;
pub mod data_source;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod pipeline;
pub mod request_client;
pub mod retry;
pub mod scheduler;
pub mod snapshot;
pub mod source;
pub mod source_policy;
pub mod symbols;
pub mod throttling;
pub mod trend;

// Adapter implementations
pub use adapters::{CoingeckoAdapter, CoinalyzeAdapter, HyperliquidAdapter};

// Aggregation
pub use aggregation::{AggregationEngine, AssetAggregates, FundingSummary, OpenInterestSummary};

// Configuration
pub use config::{AnalysisConfig, AppConfig};

// Data source trait and types
pub use data_source::{
    CapabilitySet, CurrentBatch, CurrentRequest, DerivativesSource, HistoryBatch, HistoryRequest,
    SourceError, SourceErrorKind, SourceFuture,
};

// Domain models
pub use domain::{
    exchange_key, Asset, AssetMap, ExchangeRegistry, ExchangeValue, HistoryInterval,
    HistoryMetric, HistoryPoint, HistoryValue, HistoryWindow, InstrumentId, LongShortBucket,
    Metric, MetricPoint, SeriesPoint, Timestamp, SUPPORTED_EXCHANGE_CODES,
};

// Error types
pub use error::{ConfigError, ValidationError};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, ReqwestHttpClient,
    ScriptedHttpClient, ScriptedReply,
};

// Refresh
pub use pipeline::{RefreshError, RefreshPipeline, SourceSet};
pub use scheduler::{RefreshOutcome, RefreshScheduler};
pub use snapshot::{
    AssetSnapshot, MarketSnapshot, SnapshotDiagnostics, SnapshotStore, SourceStatus, StageStatus,
};

// Request plumbing
pub use request_client::{RequestClient, UpstreamError};
pub use retry::{Backoff, RetryPolicy};
pub use source_policy::SourcePolicy;
pub use throttling::SourceThrottle;

// Source identifiers
pub use source::SourceTag;

// Symbols and trend
pub use symbols::{InstrumentUniverse, ResolvedUniverse, SymbolResolver};
pub use trend::{Confidence, SignalCounts, Trend, TrendAssessment, TrendClassifier};
