use serde::{Deserialize, Serialize};

use crate::{Asset, SourceTag, Timestamp};

/// Point-in-time metric kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Notional open interest in USD.
    OpenInterest,
    /// Funding rate as a decimal fraction per 8 hours.
    FundingRate,
}

/// Historical series kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryMetric {
    OpenInterest,
    FundingRate,
    LongShort,
}

impl HistoryMetric {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenInterest => "open_interest",
            Self::FundingRate => "funding_rate",
            Self::LongShort => "long_short",
        }
    }
}

/// One current observation for one instrument, tagged with the source that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub source: SourceTag,
    pub asset: Asset,
    pub metric: Metric,
    pub exchange: String,
    pub instrument: String,
    pub value: f64,
    pub observed_at: Timestamp,
}

/// Per-bucket payload of a historical series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryValue {
    /// Last observation in the bucket.
    Close { value: f64 },
    /// Long/short account ratio with its percentage components.
    LongShort { ratio: f64, long: f64, short: f64 },
}

/// One bucket of a historical series for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub source: SourceTag,
    pub asset: Asset,
    pub metric: HistoryMetric,
    pub exchange: String,
    pub instrument: String,
    pub t: Timestamp,
    pub value: HistoryValue,
}

impl HistoryPoint {
    pub fn close_value(&self) -> Option<f64> {
        match self.value {
            HistoryValue::Close { value } => Some(value),
            HistoryValue::LongShort { .. } => None,
        }
    }
}

/// `{exchange, value}` breakdown row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeValue {
    pub exchange: String,
    pub value: f64,
}

/// `{t, value}` series row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub t: Timestamp,
    pub value: f64,
}

/// `{t, ratio, long, short}` series row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LongShortBucket {
    pub t: Timestamp,
    pub ratio: f64,
    pub long: f64,
    pub short: f64,
}
