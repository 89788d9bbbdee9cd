//! Source adapter contract and request/response types.
//!
//! Every upstream (metrics aggregator, decentralized exchange, secondary
//! aggregator) implements [`DerivativesSource`] and translates its own
//! response shapes into [`MetricPoint`]s and [`HistoryPoint`]s tagged with
//! its [`SourceTag`].
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | Current | [`CurrentRequest`] | [`CurrentBatch`] |
//! | History | [`HistoryRequest`] | [`HistoryBatch`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::request_client::UpstreamError;
use crate::symbols::InstrumentUniverse;
use crate::{HistoryPoint, HistoryWindow, MetricPoint, SourceTag, Timestamp};

/// Supported endpoint matrix for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub current: bool,
    pub history: bool,
}

impl CapabilitySet {
    pub const fn new(current: bool, history: bool) -> Self {
        Self { current, history }
    }

    pub const fn full() -> Self {
        Self::new(true, true)
    }

    pub const fn current_only() -> Self {
        Self::new(true, false)
    }
}

/// Adapter-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceErrorKind {
    Upstream,
    Decode,
    UnsupportedEndpoint,
}

/// Structured source error, isolated per source during a refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    kind: SourceErrorKind,
    message: String,
    retryable: bool,
}

impl SourceError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: SourceErrorKind::Decode,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unsupported_endpoint(source: SourceTag, endpoint: &str) -> Self {
        Self {
            kind: SourceErrorKind::UnsupportedEndpoint,
            message: format!("endpoint '{endpoint}' is not supported by {source}"),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> SourceErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            SourceErrorKind::Upstream => "source.upstream",
            SourceErrorKind::Decode => "source.decode",
            SourceErrorKind::UnsupportedEndpoint => "source.unsupported_endpoint",
        }
    }
}

impl From<UpstreamError> for SourceError {
    fn from(error: UpstreamError) -> Self {
        Self {
            kind: SourceErrorKind::Upstream,
            message: error.to_string(),
            retryable: true,
        }
    }
}

impl Display for SourceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for SourceError {}

/// Request for current open interest and funding across the universe.
#[derive(Debug, Clone, Copy)]
pub struct CurrentRequest<'a> {
    pub universe: &'a InstrumentUniverse,
}

/// Request for bucketed history ending at `end`.
#[derive(Debug, Clone, Copy)]
pub struct HistoryRequest<'a> {
    pub universe: &'a InstrumentUniverse,
    pub window: HistoryWindow,
    pub end: Timestamp,
}

impl HistoryRequest<'_> {
    pub fn start(&self) -> Timestamp {
        self.end.saturating_sub_millis(self.window.lookback_ms())
    }
}

/// Normalized current observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentBatch {
    pub points: Vec<MetricPoint>,
}

/// Normalized history buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryBatch {
    pub points: Vec<HistoryPoint>,
}

pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations must be `Send + Sync`; the refresh pipeline drives all
/// sources concurrently from one task.
pub trait DerivativesSource: Send + Sync {
    /// Returns the source tag used for merge precedence.
    fn tag(&self) -> SourceTag;

    /// Returns the set of supported endpoints.
    fn capabilities(&self) -> CapabilitySet;

    /// Fetches current open interest (USD) and funding (fraction per 8h).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the upstream fails after retries or its
    /// response cannot be decoded.
    fn current<'a>(&'a self, req: CurrentRequest<'a>) -> SourceFuture<'a, CurrentBatch>;

    /// Fetches bucketed history for the requested window.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] for unsupported endpoints and upstream failures.
    fn history<'a>(&'a self, req: HistoryRequest<'a>) -> SourceFuture<'a, HistoryBatch>;
}
