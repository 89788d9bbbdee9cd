//! # Domain Models
//!
//! Canonical types shared by the adapters, the aggregation engine and the
//! snapshot store.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Asset`] | Tracked base asset (BTC, ETH) |
//! | [`InstrumentId`] | Exchange-qualified perpetual identifier |
//! | [`ExchangeRegistry`] | Exchange code to display name mapping |
//! | [`MetricPoint`] | Current open interest or funding observation |
//! | [`HistoryPoint`] | One bucket of a historical series |
//! | [`Timestamp`] | Millisecond Unix timestamp |
//!
//! Funding rates are carried as decimal fractions per 8 hours
//! (`0.0001` == 0.01 %). Open interest is carried in USD.

mod asset;
mod exchange;
mod instrument;
mod interval;
mod metrics;
mod timestamp;

pub use asset::{Asset, AssetMap};
pub use exchange::{exchange_key, ExchangeRegistry, SUPPORTED_EXCHANGE_CODES};
pub use instrument::InstrumentId;
pub use interval::{HistoryInterval, HistoryWindow};
pub use metrics::{
    ExchangeValue, HistoryMetric, HistoryPoint, HistoryValue, LongShortBucket, Metric,
    MetricPoint, SeriesPoint,
};
pub use timestamp::Timestamp;
