use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::SourceTag;

/// Request budget and retry behaviour for one upstream source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePolicy {
    pub source: SourceTag,
    pub quota_window: Duration,
    pub quota_limit: u32,
    /// Minimum spacing between the starts of two calls to this source.
    pub min_call_spacing: Duration,
    pub retry: RetryPolicy,
}

impl SourcePolicy {
    /// Documented cap is 40 requests per minute per key.
    pub fn coinalyze_default() -> Self {
        Self {
            source: SourceTag::Coinalyze,
            quota_window: Duration::from_secs(60),
            quota_limit: 40,
            min_call_spacing: Duration::from_millis(1_500),
            retry: RetryPolicy::linear(3, Duration::from_secs(1)),
        }
    }

    pub fn hyperliquid_default() -> Self {
        Self {
            source: SourceTag::Hyperliquid,
            quota_window: Duration::from_secs(60),
            quota_limit: 100,
            min_call_spacing: Duration::from_millis(500),
            retry: RetryPolicy::linear(3, Duration::from_secs(1)),
        }
    }

    /// Public and demo tiers allow roughly 30 calls per minute.
    pub fn coingecko_default() -> Self {
        Self {
            source: SourceTag::Coingecko,
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
            min_call_spacing: Duration::from_millis(2_000),
            retry: RetryPolicy::exponential(3, Duration::from_secs(1)),
        }
    }

    pub fn default_for(source: SourceTag) -> Self {
        match source {
            SourceTag::Coinalyze => Self::coinalyze_default(),
            SourceTag::Hyperliquid => Self::hyperliquid_default(),
            SourceTag::Coingecko => Self::coingecko_default(),
        }
    }

    pub fn with_call_spacing(mut self, spacing: Duration) -> Self {
        self.min_call_spacing = spacing;
        self
    }

    /// Policy for offline tests: no spacing, generous quota, millisecond backoff.
    pub fn immediate(source: SourceTag) -> Self {
        Self {
            source,
            quota_window: Duration::from_secs(1),
            quota_limit: 10_000,
            min_call_spacing: Duration::ZERO,
            retry: RetryPolicy::linear(3, Duration::from_millis(1))
                .with_rate_limit_wait(Duration::from_millis(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinalyze_policy_matches_documented_cap() {
        let policy = SourcePolicy::coinalyze_default();

        assert_eq!(policy.source, SourceTag::Coinalyze);
        assert_eq!(policy.quota_window, Duration::from_secs(60));
        assert_eq!(policy.quota_limit, 40);
        assert_eq!(policy.retry.max_attempts, 3);
    }

    #[test]
    fn default_for_covers_every_source() {
        for source in SourceTag::ALL {
            assert_eq!(SourcePolicy::default_for(source).source, source);
        }
    }
}
