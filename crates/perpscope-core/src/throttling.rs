use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

use crate::source_policy::SourcePolicy;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Serialises calls to one source, spaces them out and enforces its quota.
#[derive(Clone)]
pub struct SourceThrottle {
    limiter: Arc<DirectRateLimiter>,
    last_call: Arc<Mutex<Option<Instant>>>,
    min_spacing: Duration,
}

/// Held for the duration of one upstream call; other callers wait on it.
pub struct ThrottlePermit<'a> {
    _guard: MutexGuard<'a, Option<Instant>>,
}

impl SourceThrottle {
    pub fn new(quota_window: Duration, quota_limit: u32, min_spacing: Duration) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                quota_window,
                quota_limit,
            ))),
            last_call: Arc::new(Mutex::new(None)),
            min_spacing,
        }
    }

    pub fn from_policy(policy: &SourcePolicy) -> Self {
        Self::new(
            policy.quota_window,
            policy.quota_limit,
            policy.min_call_spacing,
        )
    }

    /// Waits for the previous call's spacing to elapse and for quota budget.
    pub async fn acquire(&self) -> ThrottlePermit<'_> {
        let mut last_call = self.last_call.lock().await;

        if let Some(previous) = *last_call {
            let ready_at = previous + self.min_spacing;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        self.limiter.until_ready().await;
        *last_call = Some(Instant::now());

        ThrottlePermit { _guard: last_call }
    }

    /// True when a call could start without waiting on the quota.
    pub fn has_budget(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit.max(1)).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
