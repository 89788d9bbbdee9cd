//! Rule-based trend classification.
//!
//! Three independent signals, each voting bullish, bearish or not at all:
//! average funding, open-interest momentum across the history window, and the
//! latest long/short ratio.

use serde::{Deserialize, Serialize};

use crate::aggregation::AssetAggregates;
use crate::config::AnalysisConfig;
use crate::SeriesPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Moderate,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounts {
    pub bullish: u32,
    pub bearish: u32,
}

/// Classification with the reasons behind each triggered signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAssessment {
    pub trend: Trend,
    pub confidence: Confidence,
    pub signals: SignalCounts,
    pub reasons: Vec<String>,
}

impl Default for TrendAssessment {
    fn default() -> Self {
        Self {
            trend: Trend::Neutral,
            confidence: Confidence::Low,
            signals: SignalCounts::default(),
            reasons: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vote {
    Bullish,
    Bearish,
}

/// Pure classifier; holds only thresholds.
#[derive(Debug, Clone)]
pub struct TrendClassifier {
    analysis: AnalysisConfig,
}

impl TrendClassifier {
    pub fn new(analysis: AnalysisConfig) -> Self {
        Self { analysis }
    }

    pub fn classify(&self, aggregates: &AssetAggregates) -> TrendAssessment {
        let mut assessment = TrendAssessment::default();
        let mut record = |vote: Vote, reason: String| {
            match vote {
                Vote::Bullish => assessment.signals.bullish += 1,
                Vote::Bearish => assessment.signals.bearish += 1,
            }
            assessment.reasons.push(reason);
        };

        if let Some((vote, reason)) = self.funding_signal(aggregates.funding.average) {
            record(vote, reason);
        }
        if let Some((vote, reason)) = self.momentum_signal(&aggregates.open_interest_history) {
            record(vote, reason);
        }
        if let Some((vote, reason)) =
            self.long_short_signal(aggregates.long_short_history.last().map(|bucket| bucket.ratio))
        {
            record(vote, reason);
        }

        let SignalCounts { bullish, bearish } = assessment.signals;
        assessment.trend = match bullish.cmp(&bearish) {
            std::cmp::Ordering::Greater => Trend::Bullish,
            std::cmp::Ordering::Less => Trend::Bearish,
            std::cmp::Ordering::Equal => Trend::Neutral,
        };
        assessment.confidence = match bullish.max(bearish) {
            3.. => Confidence::High,
            2 => Confidence::Moderate,
            _ => Confidence::Low,
        };
        assessment
    }

    fn funding_signal(&self, average: Option<f64>) -> Option<(Vote, String)> {
        let average = average?;
        let threshold = self.analysis.trend_funding_threshold;
        let percent = average * 100.0;
        if average > threshold {
            Some((
                Vote::Bullish,
                format!("Funding rate positive ({percent:.4}%): longs paying shorts"),
            ))
        } else if average < -threshold {
            Some((
                Vote::Bearish,
                format!("Funding rate negative ({percent:.4}%): shorts paying longs"),
            ))
        } else {
            None
        }
    }

    /// Compares the mean of the first third of the series with the last third.
    fn momentum_signal(&self, series: &[SeriesPoint]) -> Option<(Vote, String)> {
        if series.len() < self.analysis.min_oi_buckets.max(3) {
            return None;
        }
        let third = series.len() / 3;
        let mean = |slice: &[SeriesPoint]| {
            slice.iter().map(|point| point.value).sum::<f64>() / slice.len() as f64
        };
        let first = mean(&series[..third]);
        let last = mean(&series[series.len() - third..]);
        if first == 0.0 || !first.is_finite() {
            return None;
        }

        let change = (last - first) / first * 100.0;
        let limit = self.analysis.oi_momentum_pct;
        if change > limit {
            Some((
                Vote::Bullish,
                format!("Open interest increasing (+{change:.2}%): new positions opening"),
            ))
        } else if change < -limit {
            Some((
                Vote::Bearish,
                format!("Open interest decreasing ({change:.2}%): positions closing"),
            ))
        } else {
            None
        }
    }

    fn long_short_signal(&self, ratio: Option<f64>) -> Option<(Vote, String)> {
        let ratio = ratio.filter(|ratio| ratio.is_finite())?;
        if ratio > self.analysis.long_short_bullish {
            Some((
                Vote::Bullish,
                format!("Long/short ratio {ratio:.2}: more accounts long"),
            ))
        } else if ratio < self.analysis.long_short_bearish {
            Some((
                Vote::Bearish,
                format!("Long/short ratio {ratio:.2}: more accounts short"),
            ))
        } else {
            None
        }
    }
}
