//! Retry with exponential backoff

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PricingError, PricingResult};
use crate::metrics::PricingMetrics;

/// Retry policy for upstream calls. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total tries including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Scale each delay by a random factor in [0.5, 1.0]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_millis(5000),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Un-jittered delay before retry `retry` (1-based):
    /// `min(base * multiplier^(retry - 1), max)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(64) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }

    /// Delay to sleep before retry `retry`, jittered when enabled
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if self.jitter {
            delay.mul_f64(rand::rng().random_range(0.5..=1.0))
        } else {
            delay
        }
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Only errors whose category is retryable are retried; the last error is
    /// returned when attempts are exhausted.
    pub async fn run<F, Fut, T>(&self, label: &str, mut operation: F) -> PricingResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PricingResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Upstream call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    warn!(label, attempts = attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.delay_for_retry(attempt);
                    attempt += 1;
                    debug!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying upstream call"
                    );
                    PricingMetrics::record_retry(attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Map an elapsed per-attempt timeout to a transient error
pub fn attempt_timeout(label: &str, limit: Duration) -> PricingError {
    PricingError::TransientUpstream(format!("{label} timed out after {}ms", limit.as_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy() -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(4)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(250))
            .without_jitter()
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(250));
        assert_eq!(policy.backoff(40), Duration::from_millis(250));
    }

    #[test]
    fn test_jittered_delays_stay_between_half_and_full_backoff() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2));
        let slack = Duration::from_micros(1);
        for retry in 1..10 {
            let ceiling = policy.backoff(retry);
            for _ in 0..50 {
                let delay = policy.delay_for_retry(retry);
                assert!(delay <= ceiling + slack);
                assert!(delay + slack >= ceiling / 2);
            }
        }
    }

    #[test]
    fn test_backoff_is_non_decreasing() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (1..20).map(|a| policy.backoff(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy()
            .run("test", |_| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(PricingError::TransientUpstream("reset".into()))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: PricingResult<()> = policy()
            .run("test", |_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PricingError::NotFound("m5.large".into()))
            })
            .await;

        assert!(matches!(result, Err(PricingError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let result: PricingResult<()> = policy()
            .run("test", |attempt| async move {
                Err(PricingError::RateLimited(format!("attempt {attempt}")))
            })
            .await;

        match result {
            Err(PricingError::RateLimited(msg)) => assert_eq!(msg, "attempt 4"),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }
}
