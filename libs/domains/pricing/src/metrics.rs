//! Pricing engine metrics.
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Pricing metrics recorder
pub struct PricingMetrics;

impl PricingMetrics {
    // =========================================================================
    // Cache
    // =========================================================================

    pub fn record_cache_hit(tier: &'static str) {
        counter!("pricing_cache_requests_total", "result" => "hit", "tier" => tier).increment(1);
    }

    pub fn record_cache_miss() {
        counter!("pricing_cache_requests_total", "result" => "miss").increment(1);
    }

    pub fn record_cache_evictions(count: u64) {
        counter!("pricing_cache_evictions_total").increment(count);
    }

    pub fn record_cache_backend_error(operation: &'static str) {
        counter!("pricing_cache_backend_errors_total", "operation" => operation).increment(1);
    }

    pub fn set_local_cache_entries(count: usize) {
        gauge!("pricing_cache_local_entries").set(count as f64);
    }

    // =========================================================================
    // Upstream
    // =========================================================================

    /// Record one upstream attempt and how it ended
    pub fn record_upstream_call(outcome: &'static str, elapsed: Duration) {
        counter!("pricing_upstream_calls_total", "outcome" => outcome).increment(1);
        histogram!("pricing_upstream_call_duration_seconds", "outcome" => outcome)
            .record(elapsed.as_secs_f64());
    }

    pub fn record_retry(attempt: u32) {
        counter!("pricing_upstream_retries_total").increment(1);
        tracing::trace!(attempt, "Retry recorded");
    }

    pub fn record_circuit_transition(endpoint: &str, to: &'static str) {
        counter!(
            "pricing_circuit_transitions_total",
            "endpoint" => endpoint.to_string(),
            "to" => to
        )
        .increment(1);
    }

    pub fn record_circuit_rejection(endpoint: &str) {
        counter!("pricing_circuit_rejections_total", "endpoint" => endpoint.to_string())
            .increment(1);
    }

    // =========================================================================
    // Batch
    // =========================================================================

    pub fn record_batch(total: usize, succeeded: usize, elapsed: Duration) {
        counter!("pricing_batches_total").increment(1);
        counter!("pricing_batch_keys_total", "result" => "success").increment(succeeded as u64);
        counter!("pricing_batch_keys_total", "result" => "failure")
            .increment(total.saturating_sub(succeeded) as u64);
        histogram!("pricing_batch_duration_seconds").record(elapsed.as_secs_f64());
        if total > 0 {
            gauge!("pricing_batch_last_success_rate").set(succeeded as f64 / total as f64);
        }
    }

    // =========================================================================
    // Availability
    // =========================================================================

    pub fn record_snapshot_refresh(region: &str, stale_reused: bool) {
        counter!(
            "pricing_availability_refreshes_total",
            "region" => region.to_string(),
            "result" => if stale_reused { "stale" } else { "fresh" }
        )
        .increment(1);
    }
}
