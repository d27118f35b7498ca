//! Batch resolution with bounded fan-out and partial-failure tolerance.
//!
//! Keys are deduplicated (first occurrence wins), split into fixed-size
//! chunks, and each chunk is resolved concurrently under a deadline. Cache
//! hits are answered without taking an upstream slot. When a chunk's deadline
//! passes, its unfinished keys are recorded as failed while the results that
//! already completed are kept.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{BatchFailure, PricingError, PricingResult};
use crate::metrics::PricingMetrics;
use crate::models::PriceRequest;
use crate::quotes::Quote;
use crate::resilience::retry::attempt_timeout;
use crate::resolver::QuoteResolver;

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub chunk_size: usize,
    /// Upstream resolutions allowed in flight at once
    pub concurrency: usize,
    pub chunk_timeout: Duration,
    /// Timeout for a single upstream resolution
    pub request_timeout: Duration,
    /// Minimum `succeeded / total` for the batch to be accepted, in [0, 1]
    pub min_success_rate: f64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20,
            concurrency: 10,
            chunk_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(20),
            min_success_rate: 0.8,
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate.clamp(0.0, 1.0);
        self
    }
}

/// Accepted batch result. `successes` holds only keys that resolved.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub successes: HashMap<String, Quote>,
    pub failures: Vec<BatchFailure>,
    pub total: usize,
    pub success_rate: f64,
}

pub struct BatchOrchestrator {
    resolver: Arc<dyn QuoteResolver>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(resolver: Arc<dyn QuoteResolver>, config: BatchConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Resolve keyed requests.
    ///
    /// Fails with [`PricingError::LowBatchSuccessRate`] only when the overall
    /// success rate is below the configured minimum.
    pub async fn resolve(&self, items: Vec<(String, PriceRequest)>) -> PricingResult<BatchOutcome> {
        let started = Instant::now();

        let mut seen = HashSet::new();
        let items: Vec<(String, PriceRequest)> = items
            .into_iter()
            .filter(|(key, _)| seen.insert(key.clone()))
            .collect();
        let total = items.len();

        let mut successes = HashMap::with_capacity(total);
        let mut failures = Vec::new();
        let semaphore = Semaphore::new(self.config.concurrency.max(1));

        for (index, chunk) in items.chunks(self.config.chunk_size.max(1)).enumerate() {
            self.run_chunk(index, chunk, &semaphore, &mut successes, &mut failures)
                .await;
        }

        let succeeded = successes.len();
        let success_rate = if total == 0 {
            1.0
        } else {
            succeeded as f64 / total as f64
        };
        let elapsed = started.elapsed();
        PricingMetrics::record_batch(total, succeeded, elapsed);
        info!(
            total,
            succeeded,
            failed = failures.len(),
            success_rate,
            elapsed_ms = elapsed.as_millis() as u64,
            "Batch resolution finished"
        );

        if success_rate < self.config.min_success_rate {
            return Err(PricingError::LowBatchSuccessRate {
                success_rate,
                threshold: self.config.min_success_rate,
                total,
                failed: failures,
            });
        }

        Ok(BatchOutcome {
            successes,
            failures,
            total,
            success_rate,
        })
    }

    async fn run_chunk(
        &self,
        index: usize,
        chunk: &[(String, PriceRequest)],
        semaphore: &Semaphore,
        successes: &mut HashMap<String, Quote>,
        failures: &mut Vec<BatchFailure>,
    ) {
        let deadline = Instant::now() + self.config.chunk_timeout;
        let mut pending: HashSet<&str> = chunk.iter().map(|(key, _)| key.as_str()).collect();

        let mut in_flight: FuturesUnordered<_> = chunk
            .iter()
            .map(|(key, request)| async move { (key.as_str(), self.resolve_one(request, semaphore).await) })
            .collect();

        loop {
            match tokio::time::timeout_at(deadline, in_flight.next()).await {
                Ok(Some((key, result))) => {
                    pending.remove(key);
                    match result {
                        Ok(quote) => {
                            successes.insert(key.to_string(), quote);
                        }
                        Err(e) => failures.push(BatchFailure {
                            key: key.to_string(),
                            reason: e.to_string(),
                        }),
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        chunk = index,
                        unfinished = pending.len(),
                        timeout_ms = self.config.chunk_timeout.as_millis() as u64,
                        "Batch chunk timed out"
                    );
                    let reason = format!(
                        "chunk timed out after {:?} before resolution completed",
                        self.config.chunk_timeout
                    );
                    // Keep input order for the failures of this chunk
                    failures.extend(
                        chunk
                            .iter()
                            .filter(|(key, _)| pending.contains(key.as_str()))
                            .map(|(key, _)| BatchFailure {
                                key: key.clone(),
                                reason: reason.clone(),
                            }),
                    );
                    break;
                }
            }
        }
    }

    async fn resolve_one(&self, request: &PriceRequest, semaphore: &Semaphore) -> PricingResult<Quote> {
        if let Some(quote) = self.resolver.lookup_cached(request).await {
            return Ok(quote);
        }

        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| PricingError::Internal("batch semaphore closed".into()))?;

        match tokio::time::timeout(self.config.request_timeout, self.resolver.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(attempt_timeout(&request.label(), self.config.request_timeout)),
        }
    }
}
