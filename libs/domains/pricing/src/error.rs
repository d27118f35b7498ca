//! Pricing error taxonomy and error categorization
//!
//! Errors are categorized to determine retry and circuit-breaker behavior:
//! - **Transient**: network, timeout, upstream 5xx. Retried with backoff.
//! - **RateLimited**: upstream throttling. Retried with backoff.
//! - **Permanent**: validation, not-found, malformed payloads. Never retried.

use std::time::Duration;
use thiserror::Error;

/// Result type for pricing operations
pub type PricingResult<T> = Result<T, PricingError>;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transient,
    RateLimited,
    Permanent,
}

impl ErrorCategory {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorCategory::Permanent)
    }
}

/// A single key that could not be resolved inside a batch
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BatchFailure {
    pub key: String,
    pub reason: String,
}

/// Errors that can occur in the pricing engine
#[derive(Debug, Error)]
pub enum PricingError {
    /// No price resolvable after fallback strategies
    #[error("Price not found: {0}")]
    NotFound(String),

    /// Network / timeout / upstream 5xx
    #[error("Transient upstream error: {0}")]
    TransientUpstream(String),

    /// Upstream throttled the request
    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    /// Malformed request or payload, never retried
    #[error("Permanent upstream error: {0}")]
    PermanentUpstream(String),

    /// Breaker is open, no upstream call was attempted
    #[error("Circuit breaker open for '{endpoint}', retry in {retry_in:?}")]
    CircuitOpen { endpoint: String, retry_in: Duration },

    /// Shared cache tier unreachable. Logged by the cache layer, never returned to callers.
    #[error("Cache backend unavailable: {0}")]
    CacheBackendUnavailable(String),

    /// Batch success rate fell below the acceptance threshold
    #[error(
        "Batch success rate {:.1}% below threshold {:.1}% ({} of {} keys failed)",
        .success_rate * 100.0,
        .threshold * 100.0,
        .failed.len(),
        .total
    )]
    LowBatchSuccessRate {
        success_rate: f64,
        threshold: f64,
        total: usize,
        failed: Vec<BatchFailure>,
    },

    /// No available substitute exists for an instance type in a region
    #[error("No alternative for {instance_type} in {region}: {reason}")]
    NoAlternative {
        instance_type: String,
        region: String,
        reason: String,
    },

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PricingError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            PricingError::TransientUpstream(_) => ErrorCategory::Transient,
            PricingError::RateLimited(_) => ErrorCategory::RateLimited,
            PricingError::CacheBackendUnavailable(_) => ErrorCategory::Transient,
            PricingError::CircuitOpen { .. } => ErrorCategory::Transient,
            PricingError::NotFound(_)
            | PricingError::PermanentUpstream(_)
            | PricingError::LowBatchSuccessRate { .. }
            | PricingError::NoAlternative { .. }
            | PricingError::InvalidInput(_)
            | PricingError::Serialization(_)
            | PricingError::Internal(_) => ErrorCategory::Permanent,
        }
    }

    /// Whether the resilience wrapper should retry this error
    pub fn is_retryable(&self) -> bool {
        // An open breaker is surfaced to the caller, not retried in place
        !matches!(self, PricingError::CircuitOpen { .. }) && self.category().is_retryable()
    }

    /// Whether this error says something about upstream health
    pub fn counts_against_breaker(&self) -> bool {
        matches!(
            self,
            PricingError::TransientUpstream(_) | PricingError::RateLimited(_)
        )
    }
}

impl From<serde_json::Error> for PricingError {
    fn from(err: serde_json::Error) -> Self {
        PricingError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for PricingError {
    fn from(err: redis::RedisError) -> Self {
        PricingError::CacheBackendUnavailable(err.to_string())
    }
}

impl From<reqwest::Error> for PricingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return PricingError::TransientUpstream(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => PricingError::RateLimited(err.to_string()),
            Some(status) if status.is_server_error() => {
                PricingError::TransientUpstream(err.to_string())
            }
            Some(_) => PricingError::PermanentUpstream(err.to_string()),
            None if err.is_decode() => PricingError::PermanentUpstream(err.to_string()),
            None => PricingError::TransientUpstream(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            PricingError::TransientUpstream("reset".into()).category(),
            ErrorCategory::Transient
        );
        assert_eq!(
            PricingError::RateLimited("slow down".into()).category(),
            ErrorCategory::RateLimited
        );
        assert_eq!(
            PricingError::NotFound("m5.large".into()).category(),
            ErrorCategory::Permanent
        );
        assert_eq!(
            PricingError::PermanentUpstream("bad filter".into()).category(),
            ErrorCategory::Permanent
        );
    }

    #[test]
    fn test_retryable() {
        assert!(PricingError::TransientUpstream("timeout".into()).is_retryable());
        assert!(PricingError::RateLimited("429".into()).is_retryable());
        assert!(!PricingError::InvalidInput("empty type".into()).is_retryable());
        assert!(
            !PricingError::CircuitOpen {
                endpoint: "catalog".into(),
                retry_in: Duration::from_secs(5),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_only_upstream_health_errors_count_against_breaker() {
        assert!(PricingError::TransientUpstream("reset".into()).counts_against_breaker());
        assert!(PricingError::RateLimited("429".into()).counts_against_breaker());
        assert!(!PricingError::NotFound("x".into()).counts_against_breaker());
        assert!(!PricingError::PermanentUpstream("400".into()).counts_against_breaker());
    }

    #[test]
    fn test_low_batch_success_rate_message() {
        let err = PricingError::LowBatchSuccessRate {
            success_rate: 0.6,
            threshold: 0.8,
            total: 10,
            failed: vec![
                BatchFailure {
                    key: "m5.large".into(),
                    reason: "timeout".into(),
                };
                4
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("60.0%"));
        assert!(msg.contains("80.0%"));
        assert!(msg.contains("4 of 10"));
    }
}
