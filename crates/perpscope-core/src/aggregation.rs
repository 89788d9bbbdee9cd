//! Cross-source merging and per-asset aggregation.
//!
//! Order of operations inside a refresh:
//!
//! 1. [`AggregationEngine::sanitize_current`] / [`AggregationEngine::sanitize_history`]
//!    drop implausible funding values.
//! 2. [`merge_current`] / [`merge_history`] keep, per exchange, only the
//!    highest-precedence source.
//! 3. [`AggregationEngine::aggregate_asset`] produces totals, averages and
//!    bucketed series.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::{
    exchange_key, Asset, ExchangeValue, HistoryMetric, HistoryPoint, HistoryValue, LongShortBucket,
    Metric, MetricPoint, SeriesPoint, SourceTag, Timestamp,
};

/// Open interest for one asset: sum across exchanges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenInterestSummary {
    pub total: f64,
    /// Sorted descending by value.
    pub by_exchange: Vec<ExchangeValue>,
}

/// Funding for one asset: mean of per-exchange means.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FundingSummary {
    /// `None` when no exchange reported a usable value.
    pub average: Option<f64>,
    /// Sorted descending by magnitude.
    pub by_exchange: Vec<ExchangeValue>,
}

/// Every aggregated metric for one asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetAggregates {
    pub open_interest: OpenInterestSummary,
    pub funding: FundingSummary,
    pub open_interest_history: Vec<SeriesPoint>,
    pub funding_history: Vec<SeriesPoint>,
    pub long_short_history: Vec<LongShortBucket>,
}

/// How close values sharing a bucket are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketMode {
    Sum,
    Mean,
}

#[derive(Debug, Clone)]
pub struct AggregationEngine {
    analysis: AnalysisConfig,
}

impl AggregationEngine {
    pub fn new(analysis: AnalysisConfig) -> Self {
        Self { analysis }
    }

    pub fn analysis(&self) -> &AnalysisConfig {
        &self.analysis
    }

    /// Drops funding values outside the sanity bound. Returns the kept points and the drop count.
    pub fn sanitize_current(&self, points: Vec<MetricPoint>) -> (Vec<MetricPoint>, usize) {
        let before = points.len();
        let kept = points
            .into_iter()
            .filter(|point| {
                point.metric != Metric::FundingRate || self.analysis.is_plausible_funding(point.value)
            })
            .collect::<Vec<_>>();
        let dropped = before - kept.len();
        (kept, dropped)
    }

    /// History counterpart of [`Self::sanitize_current`]; applied to every funding bucket.
    pub fn sanitize_history(&self, points: Vec<HistoryPoint>) -> (Vec<HistoryPoint>, usize) {
        let before = points.len();
        let kept = points
            .into_iter()
            .filter(|point| match (point.metric, point.value) {
                (HistoryMetric::FundingRate, HistoryValue::Close { value }) => {
                    self.analysis.is_plausible_funding(value)
                }
                _ => true,
            })
            .collect::<Vec<_>>();
        let dropped = before - kept.len();
        (kept, dropped)
    }

    /// Aggregates already sanitized and merged points for `asset`.
    pub fn aggregate_asset(
        &self,
        asset: Asset,
        current: &[MetricPoint],
        history: &[HistoryPoint],
    ) -> AssetAggregates {
        let current_for = |metric: Metric| {
            current
                .iter()
                .filter(move |point| point.asset == asset && point.metric == metric)
        };
        let history_for = |metric: HistoryMetric| {
            history
                .iter()
                .filter(move |point| point.asset == asset && point.metric == metric)
        };

        let open_interest = summarize_open_interest(current_for(Metric::OpenInterest));
        let funding = summarize_funding(current_for(Metric::FundingRate));

        AssetAggregates {
            open_interest,
            funding,
            open_interest_history: bucket_series(history_for(HistoryMetric::OpenInterest), BucketMode::Sum),
            funding_history: bucket_series(history_for(HistoryMetric::FundingRate), BucketMode::Mean),
            long_short_history: bucket_long_short(history_for(HistoryMetric::LongShort)),
        }
    }
}

/// Keeps, per (asset, metric, exchange), the points of the highest-precedence source.
pub fn merge_current(points: Vec<MetricPoint>) -> Vec<MetricPoint> {
    merge_by_precedence(points, |point| {
        (point.asset, point.metric as u8, exchange_key(&point.exchange), point.source)
    })
}

/// History counterpart of [`merge_current`].
pub fn merge_history(points: Vec<HistoryPoint>) -> Vec<HistoryPoint> {
    merge_by_precedence(points, |point| {
        (point.asset, point.metric as u8, exchange_key(&point.exchange), point.source)
    })
}

fn merge_by_precedence<T>(points: Vec<T>, key: impl Fn(&T) -> (Asset, u8, String, SourceTag)) -> Vec<T> {
    let mut winners: BTreeMap<(Asset, u8, String), SourceTag> = BTreeMap::new();
    for point in &points {
        let (asset, metric, exchange, source) = key(point);
        winners
            .entry((asset, metric, exchange))
            .and_modify(|winner| {
                if source.precedence() < winner.precedence() {
                    *winner = source;
                }
            })
            .or_insert(source);
    }

    points
        .into_iter()
        .filter(|point| {
            let (asset, metric, exchange, source) = key(point);
            winners.get(&(asset, metric, exchange)) == Some(&source)
        })
        .collect()
}

/// Per-exchange running totals keyed by normalized exchange name.
struct ExchangeTotals {
    groups: BTreeMap<String, (String, f64, u32)>,
}

impl ExchangeTotals {
    fn collect<'a>(points: impl Iterator<Item = &'a MetricPoint>) -> Self {
        let mut groups: BTreeMap<String, (String, f64, u32)> = BTreeMap::new();
        for point in points {
            if !point.value.is_finite() {
                continue;
            }
            let entry = groups
                .entry(exchange_key(&point.exchange))
                .or_insert_with(|| (point.exchange.clone(), 0.0, 0));
            entry.1 += point.value;
            entry.2 += 1;
        }
        Self { groups }
    }

    fn sums(self) -> Vec<ExchangeValue> {
        self.groups
            .into_values()
            .map(|(exchange, sum, _)| ExchangeValue { exchange, value: sum })
            .collect()
    }

    fn means(self) -> Vec<ExchangeValue> {
        self.groups
            .into_values()
            .map(|(exchange, sum, count)| ExchangeValue {
                exchange,
                value: sum / f64::from(count),
            })
            .collect()
    }
}

/// Per-exchange sums sorted descending; total is the sum over exchanges.
pub fn summarize_open_interest<'a>(points: impl Iterator<Item = &'a MetricPoint>) -> OpenInterestSummary {
    let mut by_exchange = ExchangeTotals::collect(points).sums();
    by_exchange.sort_by(|a, b| b.value.total_cmp(&a.value));
    OpenInterestSummary {
        total: by_exchange.iter().map(|row| row.value).sum(),
        by_exchange,
    }
}

/// Per-exchange means sorted by magnitude; average is the mean of those means.
pub fn summarize_funding<'a>(points: impl Iterator<Item = &'a MetricPoint>) -> FundingSummary {
    let mut by_exchange = ExchangeTotals::collect(points).means();
    by_exchange.sort_by(|a, b| b.value.abs().total_cmp(&a.value.abs()));
    let average = (!by_exchange.is_empty())
        .then(|| by_exchange.iter().map(|row| row.value).sum::<f64>() / by_exchange.len() as f64);
    FundingSummary {
        average,
        by_exchange,
    }
}

/// Groups close values by bucket timestamp, ascending. Empty buckets never appear.
pub fn bucket_series<'a>(points: impl Iterator<Item = &'a HistoryPoint>, mode: BucketMode) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<Timestamp, (f64, u32)> = BTreeMap::new();
    for point in points {
        let Some(value) = point.close_value().filter(|value| value.is_finite()) else {
            continue;
        };
        let entry = buckets.entry(point.t).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(t, (sum, count))| SeriesPoint {
            t,
            value: match mode {
                BucketMode::Sum => sum,
                BucketMode::Mean => sum / f64::from(count),
            },
        })
        .collect()
}

/// Averages ratio, long and short independently per bucket, ascending.
pub fn bucket_long_short<'a>(points: impl Iterator<Item = &'a HistoryPoint>) -> Vec<LongShortBucket> {
    let mut buckets: BTreeMap<Timestamp, ([f64; 3], u32)> = BTreeMap::new();
    for point in points {
        let HistoryValue::LongShort { ratio, long, short } = point.value else {
            continue;
        };
        let entry = buckets.entry(point.t).or_insert(([0.0; 3], 0));
        entry.0[0] += ratio;
        entry.0[1] += long;
        entry.0[2] += short;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .map(|(t, (sums, count))| {
            let count = f64::from(count);
            LongShortBucket {
                t,
                ratio: sums[0] / count,
                long: sums[1] / count,
                short: sums[2] / count,
            }
        })
        .collect()
}
