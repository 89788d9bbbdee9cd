//! Retry policy with backoff and rate-limit waits.

use std::time::Duration;

/// Backoff strategy for retrying failed requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Grows with the attempt number: `base * (attempt + 1)`.
    Linear {
        /// Delay after the first failed attempt.
        base: Duration,
        /// The maximum duration to wait between retries.
        max: Duration,
    },
    /// Uses an exponential delay between retries.
    ///
    /// The delay is calculated as `base * (factor ^ attempt)`.
    Exponential {
        /// The initial backoff duration.
        base: Duration,
        /// The multiplicative factor for each subsequent retry.
        factor: f64,
        /// The maximum duration to wait between retries.
        max: Duration,
        /// Whether to apply random jitter (+/- 50%) to the delay.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Linear {
            base: Duration::from_secs(1),
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay before the next attempt after `attempt` (0-based) has failed.
    pub fn delay(self, attempt: u32) -> Duration {
        match self {
            Self::Linear { base, max } => base.saturating_mul(attempt.saturating_add(1)).min(max),
            Self::Exponential {
                base,
                factor,
                max,
                jitter,
            } => {
                let scale = factor.powi(attempt as i32);
                let seconds = base.as_secs_f64() * scale;
                let capped_seconds = seconds.min(max.as_secs_f64());

                let mut delay = Duration::from_secs_f64(capped_seconds);

                if jitter {
                    let jitter_ms = (delay.as_millis() as f64 * 0.5) as u64;
                    let random_offset = fastrand::u64(0..=(jitter_ms * 2));
                    let total_ms =
                        delay.as_millis() as i64 + (random_offset as i64 - jitter_ms as i64);
                    delay = Duration::from_millis(total_ms.max(0) as u64);
                }

                delay
            }
        }
    }
}

/// Retry behaviour shared by every source client.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per request, including the first one.
    pub max_attempts: u32,
    /// The backoff strategy to use between failed attempts.
    pub backoff: Backoff,
    /// Wait applied to a 429 response without a usable `Retry-After` header.
    pub rate_limit_wait: Duration,
    /// Upper bound on any single rate-limit wait, hinted or not.
    pub max_rate_limit_wait: Duration,
    /// Consecutive 429 responses tolerated before the request fails.
    ///
    /// Rate-limit waits never consume `max_attempts`.
    pub max_rate_limit_waits: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::default(),
            rate_limit_wait: Duration::from_secs(5),
            max_rate_limit_wait: Duration::from_secs(60),
            max_rate_limit_waits: 5,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff (`base * attempt`) over `max_attempts` attempts.
    pub fn linear(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Linear {
                base,
                max: base.saturating_mul(max_attempts.max(1)),
            },
            ..Self::default()
        }
    }

    /// Jittered exponential backoff over `max_attempts` attempts.
    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential {
                base,
                factor: 2.0,
                max: Duration::from_secs(30),
                jitter: true,
            },
            ..Self::default()
        }
    }

    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    /// Calculate the delay after a failed attempt (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }

    /// Wait for a rate-limited response, preferring the upstream hint,
    /// capped at `max_rate_limit_wait`.
    pub fn rate_limit_delay(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .unwrap_or(self.rate_limit_wait)
            .min(self.max_rate_limit_wait)
    }
}
