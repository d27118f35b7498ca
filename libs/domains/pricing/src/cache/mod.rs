//! Two-tier quote cache.
//!
//! The shared tier is consulted first and the process-local tier serves as
//! the fallback; writes go to both. Shared-tier errors are logged and
//! swallowed, so a cache backend outage degrades to local-only caching and
//! never fails a caller.

pub mod key;
pub mod local;
pub mod redis;
pub mod shared;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::PricingResult;
use crate::metrics::PricingMetrics;
use crate::quotes::Quote;

pub use key::{DEFAULT_HASH_THRESHOLD, cache_key, key_pattern};
pub use local::{EntryInfo, LocalLookup, LocalStore};
pub use redis::RedisCacheBackend;
pub use shared::{InMemorySharedBackend, SharedCacheBackend};

/// Cache counters since process start
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate_percent: f64,
    pub local_entries: usize,
}

/// Quote cache seen by the resolution pipeline
#[async_trait]
pub trait QuoteCache: Send + Sync {
    /// A live quote for `key`, or `None`. Expired entries are never returned.
    async fn get(&self, key: &str) -> Option<Quote>;

    /// Store a quote, replacing any previous entry and its TTL
    async fn set(&self, key: &str, quote: &Quote, ttl: Duration);

    /// Drop every key matching a glob pattern; returns how many keys were removed.
    ///
    /// Only a malformed pattern is an error. Backend failures are logged.
    async fn invalidate(&self, pattern: &str) -> PricingResult<usize>;

    fn stats(&self) -> CacheStats;
}

/// Shared-tier payload. The wall-clock expiry guards against the backend's
/// whole-second TTL granularity keeping an entry slightly too long.
#[derive(Debug, Serialize, Deserialize)]
struct SharedEnvelope {
    expires_at: DateTime<Utc>,
    quote: Quote,
}

/// Shared tier (optional) in front of a bounded local tier
pub struct TieredCache {
    local: LocalStore,
    shared: Option<Arc<dyn SharedCacheBackend>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TieredCache {
    pub fn new(local_capacity: usize, shared: Option<Arc<dyn SharedCacheBackend>>) -> Self {
        Self {
            local: LocalStore::new(local_capacity),
            shared,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn local_only(local_capacity: usize) -> Self {
        Self::new(local_capacity, None)
    }

    pub fn has_shared_tier(&self) -> bool {
        self.shared.is_some()
    }

    async fn shared_get(&self, shared: &dyn SharedCacheBackend, key: &str) -> Option<Quote> {
        let bytes = match shared.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!(backend = %shared.name(), key, error = %e, "Shared cache read failed, using local tier");
                PricingMetrics::record_cache_backend_error("get");
                return None;
            }
        };

        match serde_json::from_slice::<SharedEnvelope>(&bytes) {
            Ok(envelope) if envelope.expires_at > Utc::now() => Some(envelope.quote),
            Ok(_) => None,
            Err(e) => {
                warn!(backend = %shared.name(), key, error = %e, "Discarding undecodable shared cache entry");
                if let Err(e) = shared.delete(key).await {
                    debug!(key, error = %e, "Could not delete undecodable entry");
                }
                None
            }
        }
    }

    fn record_hit(&self, tier: &'static str, key: &str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        PricingMetrics::record_cache_hit(tier);
        debug!(key, tier, "Cache hit");
    }
}

#[async_trait]
impl QuoteCache for TieredCache {
    async fn get(&self, key: &str) -> Option<Quote> {
        if let Some(shared) = &self.shared {
            if let Some(quote) = self.shared_get(shared.as_ref(), key).await {
                self.record_hit("shared", key);
                return Some(quote);
            }
        }

        match self.local.get(key) {
            LocalLookup::Hit(quote) => {
                self.record_hit("local", key);
                Some(quote)
            }
            LocalLookup::Miss | LocalLookup::Expired => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                PricingMetrics::record_cache_miss();
                None
            }
        }
    }

    async fn set(&self, key: &str, quote: &Quote, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let evicted = self.local.insert(key.to_string(), quote.clone(), ttl);
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            PricingMetrics::record_cache_evictions(evicted);
        }
        PricingMetrics::set_local_cache_entries(self.local.len());

        let Some(shared) = &self.shared else {
            return;
        };

        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let envelope = SharedEnvelope {
            expires_at,
            quote: quote.clone(),
        };
        let bytes = match serde_json::to_vec(&envelope) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "Could not encode quote for shared cache");
                return;
            }
        };

        if let Err(e) = shared.set_with_expiry(key, bytes, ttl).await {
            warn!(backend = %shared.name(), key, error = %e, "Shared cache write failed, entry kept locally");
            PricingMetrics::record_cache_backend_error("set");
        }
    }

    async fn invalidate(&self, pattern: &str) -> PricingResult<usize> {
        let compiled = key_pattern(pattern)?;
        let mut removed: BTreeSet<String> =
            self.local.remove_matching(&compiled).into_iter().collect();

        if let Some(shared) = &self.shared {
            match shared.scan_by_prefix(pattern).await {
                Ok(keys) => {
                    for key in keys {
                        match shared.delete(&key).await {
                            Ok(()) => {
                                removed.insert(key);
                            }
                            Err(e) => {
                                warn!(backend = %shared.name(), key = %key, error = %e, "Shared cache delete failed");
                                PricingMetrics::record_cache_backend_error("delete");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(backend = %shared.name(), pattern, error = %e, "Shared cache scan failed, invalidated local tier only");
                    PricingMetrics::record_cache_backend_error("scan");
                }
            }
        }

        debug!(pattern, removed = removed.len(), "Cache invalidated");
        Ok(removed.len())
    }

    fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate_percent: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64 * 100.0
            },
            local_entries: self.local.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PricingError;
    use crate::models::{BillingModel, Currency, InstanceSpecs, OperatingSystem};
    use crate::quotes::{InstancePriceQuote, InstanceQuoteParts};
    use shared::MockSharedCacheBackend;

    fn quote(rate: f64) -> Quote {
        Quote::Instance(
            InstancePriceQuote::new(InstanceQuoteParts {
                instance_type: "m5.large".to_string(),
                region: "us-east-1".to_string(),
                operating_system: OperatingSystem::Linux,
                billing_model: BillingModel::OnDemand,
                term: None,
                payment_option: None,
                hourly_rate: rate,
                upfront_cost: 0.0,
                currency: Currency::Usd,
                specs: InstanceSpecs::default(),
                sku: None,
                resolved_at: Utc::now(),
            })
            .unwrap(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_set_hits_and_counts() {
        let cache = TieredCache::local_only(10);
        assert!(cache.get("instance:k").await.is_none());

        let stored = quote(0.096);
        cache.set("instance:k", &stored, Duration::from_secs(60)).await;
        assert_eq!(cache.get("instance:k").await, Some(stored.clone()));
        assert_eq!(cache.get("instance:k").await, Some(stored));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate_percent - 66.666).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache = TieredCache::local_only(10);
        cache.set("k", &quote(0.1), Duration::from_secs(3600)).await;

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(cache.get("k").await.is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().local_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_not_stored() {
        let cache = TieredCache::local_only(10);
        cache.set("k", &quote(0.1), Duration::ZERO).await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evictions_are_counted() {
        let cache = TieredCache::local_only(2);
        for i in 0..5 {
            cache.set(&format!("k{i}"), &quote(0.1), Duration::from_secs(60)).await;
        }
        let stats = cache.stats();
        assert_eq!(stats.evictions, 3);
        assert_eq!(stats.local_entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_tier_is_checked_first() {
        let shared = Arc::new(InMemorySharedBackend::new());
        let writer = TieredCache::new(10, Some(shared.clone()));
        let stored = quote(0.096);
        writer.set("k", &stored, Duration::from_secs(60)).await;

        // A second process sharing the backend sees the entry
        let reader = TieredCache::new(10, Some(shared));
        assert_eq!(reader.get("k").await, Some(stored));
        assert_eq!(reader.stats().hits, 1);
        assert_eq!(reader.stats().local_entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_outage_degrades_to_local() {
        let shared = Arc::new(InMemorySharedBackend::new());
        let cache = TieredCache::new(10, Some(shared.clone()));
        shared.set_unavailable(true);

        cache.set("k", &quote(0.1), Duration::from_secs(60)).await;
        assert!(cache.get("k").await.is_some());
        assert_eq!(cache.invalidate("*").await.unwrap(), 1);
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_backend_errors_never_surface() {
        let mut backend = MockSharedCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Err(PricingError::CacheBackendUnavailable("refused".into())));
        backend
            .expect_set_with_expiry()
            .returning(|_, _, _| Err(PricingError::CacheBackendUnavailable("refused".into())));
        backend.expect_name().returning(|| "mock".to_string());

        let cache = TieredCache::new(10, Some(Arc::new(backend)));
        cache.set("k", &quote(0.1), Duration::from_secs(60)).await;
        assert!(cache.get("k").await.is_some());
        assert!(cache.get("other").await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_shared_entry_is_deleted_and_missed() {
        let mut backend = MockSharedCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Ok(Some(b"not json".to_vec())));
        backend.expect_delete().times(1).returning(|_| Ok(()));
        backend.expect_name().returning(|| "mock".to_string());

        let cache = TieredCache::new(10, Some(Arc::new(backend)));
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_counts_distinct_keys_across_tiers() {
        let shared = Arc::new(InMemorySharedBackend::new());
        let cache = TieredCache::new(10, Some(shared.clone()));
        cache.set("instance:a", &quote(0.1), Duration::from_secs(60)).await;
        cache.set("instance:b", &quote(0.1), Duration::from_secs(60)).await;
        cache.set("storage:c", &quote(0.1), Duration::from_secs(60)).await;

        assert_eq!(cache.invalidate("instance:*").await.unwrap(), 2);
        assert!(cache.get("instance:a").await.is_none());
        assert!(cache.get("storage:c").await.is_some());
        assert_eq!(shared.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_char_and_class_patterns_clear_both_tiers() {
        let shared = Arc::new(InMemorySharedBackend::new());
        let cache = TieredCache::new(10, Some(shared.clone()));
        for key in ["instance:m5.large", "instance:m6.large", "instance:m7.large"] {
            cache.set(key, &quote(0.1), Duration::from_secs(60)).await;
        }

        assert_eq!(cache.invalidate("instance:m5.?arge").await.unwrap(), 1);
        assert_eq!(cache.invalidate("instance:m[67].large").await.unwrap(), 2);
        assert_eq!(shared.len(), 0);

        // With the shared tier gone, nothing is left locally either
        shared.set_unavailable(true);
        for key in ["instance:m5.large", "instance:m6.large", "instance:m7.large"] {
            assert!(cache.get(key).await.is_none(), "{key} still cached");
        }
        assert_eq!(cache.stats().local_entries, 0);
    }

    #[tokio::test]
    async fn test_malformed_pattern_touches_neither_tier() {
        let mut backend = MockSharedCacheBackend::new();
        backend.expect_scan_by_prefix().never();
        backend.expect_name().returning(|| "mock".to_string());
        let cache = TieredCache::new(10, Some(Arc::new(backend)));

        assert!(matches!(
            cache.invalidate("instance:[m5").await,
            Err(PricingError::InvalidInput(_))
        ));
    }
}
