//! Circuit breaker for one upstream endpoint.
//!
//! ```text
//! ┌─────────┐  failures >= threshold  ┌────────┐
//! │ CLOSED  │ ──────────────────────> │  OPEN  │ <─────┐
//! └─────────┘                         └────────┘       │
//!      ^                                   │           │
//!      │                                   │ recovery  │ trial
//!      │                                   v elapsed   │ failed
//!      │     trial succeeded      ┌─────────────┐      │
//!      └───────────────────────── │ HALF-OPEN   │ ─────┘
//!                                 └─────────────┘
//! ```
//!
//! All state lives behind one mutex so a transition and the counters it
//! touches change together. Callers take a [`BreakerPermit`] before calling
//! upstream and settle it with the outcome. A permit dropped without an
//! outcome (the call was cancelled) records nothing, except that it frees the
//! half-open trial slot.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use strum::Display;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::error::{PricingError, PricingResult};
use crate::metrics::PricingMetrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected without touching upstream.
    Open,
    /// One trial call is testing whether upstream recovered.
    HalfOpen,
}

/// Configuration for the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time since the last failure before a trial call is allowed.
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Thread-safe circuit breaker, shared by every caller of one endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(endpoint: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current state as last recorded.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// Ask to make one upstream call.
    ///
    /// Fails with [`PricingError::CircuitOpen`] while open, and while a
    /// half-open trial is already in flight.
    pub fn try_acquire(&self) -> PricingResult<BreakerPermit<'_>> {
        let mut inner = self.lock();

        match inner.state {
            CircuitState::Closed => Ok(BreakerPermit::new(self, false)),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(self.config.recovery_timeout);

                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(endpoint = %self.endpoint, "Circuit breaker HALF-OPEN (testing recovery)");
                    PricingMetrics::record_circuit_transition(&self.endpoint, "half-open");
                    Ok(BreakerPermit::new(self, true))
                } else {
                    PricingMetrics::record_circuit_rejection(&self.endpoint);
                    Err(PricingError::CircuitOpen {
                        endpoint: self.endpoint.clone(),
                        retry_in: self.config.recovery_timeout - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen if !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                Ok(BreakerPermit::new(self, true))
            }
            CircuitState::HalfOpen => {
                PricingMetrics::record_circuit_rejection(&self.endpoint);
                Err(PricingError::CircuitOpen {
                    endpoint: self.endpoint.clone(),
                    retry_in: Duration::ZERO,
                })
            }
        }
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure = None;
        inner.trial_in_flight = false;
        info!(endpoint = %self.endpoint, "Circuit breaker reset by operator");
        PricingMetrics::record_circuit_transition(&self.endpoint, "closed");
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.trial_in_flight = false;
                info!(endpoint = %self.endpoint, "Circuit breaker CLOSED (recovered)");
                PricingMetrics::record_circuit_transition(&self.endpoint, "closed");
            }
            // A call admitted before the circuit opened says nothing about recovery
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                inner.last_failure = Some(Instant::now());
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    warn!(
                        endpoint = %self.endpoint,
                        failures = inner.consecutive_failures,
                        recovery_secs = self.config.recovery_timeout.as_secs(),
                        "Circuit breaker OPENED"
                    );
                    PricingMetrics::record_circuit_transition(&self.endpoint, "open");
                }
            }
            CircuitState::HalfOpen if trial => {
                inner.state = CircuitState::Open;
                inner.last_failure = Some(Instant::now());
                inner.trial_in_flight = false;
                warn!(endpoint = %self.endpoint, "Circuit breaker trial failed, OPEN again");
                PricingMetrics::record_circuit_transition(&self.endpoint, "open");
            }
            CircuitState::HalfOpen | CircuitState::Open => {}
        }
    }

    /// Settled without a health signal: counters stay as they are and a
    /// trial slot is handed back.
    fn on_released(&self, trial: bool) {
        if trial {
            let mut inner = self.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.trial_in_flight = false;
            }
        }
    }
}

/// Admission to make one upstream call; settle it with the call's outcome.
#[must_use = "a permit must be settled with success(), failure() or neutral()"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    /// The call finished with an outcome that says nothing about upstream health
    pub fn neutral(mut self) {
        self.settled = true;
        self.breaker.on_released(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_released(self.trial);
        }
    }
}
