use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::breaker::{CircuitBreaker, CircuitState};
use super::retry::{RetryPolicy, attempt_timeout};
use crate::catalog::{CatalogQuery, PriceCatalog, RawCandidate};
use crate::error::PricingResult;
use crate::metrics::PricingMetrics;

/// A [`PriceCatalog`] guarded by a circuit breaker, retries and per-attempt timeouts.
///
/// The breaker admits one logical call, which may span several retried
/// attempts. Only errors that say something about upstream health (transient
/// and rate-limited) count as breaker failures. A permanent error settles the
/// call neutrally: it neither counts as a failure nor resets the failure run.
pub struct ResilientCatalog {
    inner: Arc<dyn PriceCatalog>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl ResilientCatalog {
    pub fn new(
        inner: Arc<dyn PriceCatalog>,
        breaker: Arc<CircuitBreaker>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            breaker,
            retry,
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[async_trait]
impl PriceCatalog for ResilientCatalog {
    async fn query(&self, query: &CatalogQuery) -> PricingResult<Vec<RawCandidate>> {
        let permit = self.breaker.try_acquire()?;
        let label = self.breaker.endpoint();

        let result = self
            .retry
            .run(label, |_| async move {
                let started = Instant::now();
                let outcome = tokio::time::timeout(self.call_timeout, self.inner.query(query))
                    .await
                    .unwrap_or_else(|_| Err(attempt_timeout(label, self.call_timeout)));

                let kind = match &outcome {
                    Ok(_) => "ok",
                    Err(e) if e.counts_against_breaker() => "transient",
                    Err(_) => "permanent",
                };
                PricingMetrics::record_upstream_call(kind, started.elapsed());
                outcome
            })
            .await;

        match &result {
            Ok(_) => permit.success(),
            Err(e) if e.counts_against_breaker() => permit.failure(),
            Err(_) => permit.neutral(),
        }
        result
    }
}
