//! Engine configuration loaded from the environment.
//!
//! Every variable is optional and falls back to a default. A variable that is
//! set but unparsable is a startup error.

use core_config::{ConfigError, FromEnv, env_list, env_optional, env_or_default, env_parse_or};
use std::time::Duration;

use crate::availability::{AvailabilityConfig, RegionOverride};
use crate::batch::BatchConfig;
use crate::cache::DEFAULT_HASH_THRESHOLD;
use crate::catalog::http::DEFAULT_LISTING_PAGES;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

pub const DEFAULT_CATALOG_URL: &str = "https://api.pricing.us-east-1.amazonaws.com";

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub url: String,
    /// Pages fetched per price lookup before the result is truncated
    pub max_pages: usize,
    /// Pages fetched for complete listings (a region's instance types)
    pub listing_max_pages: usize,
    /// Per-attempt upstream timeout
    pub call_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CATALOG_URL.to_string(),
            max_pages: 10,
            listing_max_pages: DEFAULT_LISTING_PAGES,
            call_timeout: Duration::from_secs(10),
        }
    }
}

impl CatalogConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_max_pages(mut self, pages: usize) -> Self {
        self.max_pages = pages.max(1);
        self
    }

    pub fn with_listing_max_pages(mut self, pages: usize) -> Self {
        self.listing_max_pages = pages.max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Shared tier connection string; `None` keeps caching process-local
    pub redis_url: Option<String>,
    pub ttl: Duration,
    pub max_entries: usize,
    pub key_hash_threshold: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
            key_hash_threshold: DEFAULT_HASH_THRESHOLD,
        }
    }
}

impl CacheConfig {
    pub fn with_redis_url(mut self, url: Option<String>) -> Self {
        self.redis_url = url;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_entries(mut self, entries: usize) -> Self {
        self.max_entries = entries.max(1);
        self
    }

    pub fn with_key_hash_threshold(mut self, threshold: usize) -> Self {
        self.key_hash_threshold = threshold;
        self
    }
}

/// Everything needed to assemble a [`PricingService`](crate::PricingService)
#[derive(Debug, Clone, Default)]
pub struct PricingConfig {
    pub catalog: CatalogConfig,
    pub cache: CacheConfig,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreakerConfig,
    pub batch: BatchConfig,
    pub availability: AvailabilityConfig,
}

impl PricingConfig {
    pub fn with_catalog(mut self, catalog: CatalogConfig) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_availability(mut self, availability: AvailabilityConfig) -> Self {
        self.availability = availability;
        self
    }
}

fn secs(key: &str, default: u64) -> Result<Duration, ConfigError> {
    env_parse_or(key, default).map(Duration::from_secs)
}

fn millis(key: &str, default: u64) -> Result<Duration, ConfigError> {
    env_parse_or(key, default).map(Duration::from_millis)
}

fn positive(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = env_parse_or(key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            details: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

impl FromEnv for PricingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let catalog = CatalogConfig {
            url: env_or_default("PRICING_CATALOG_URL", DEFAULT_CATALOG_URL),
            max_pages: positive("PRICING_CATALOG_MAX_PAGES", 10)?,
            listing_max_pages: positive("PRICING_CATALOG_LISTING_MAX_PAGES", DEFAULT_LISTING_PAGES)?,
            call_timeout: secs("PRICING_CALL_TIMEOUT_SECS", 10)?,
        };

        // REDIS_URL first, REDIS_HOST for compatibility
        let cache = CacheConfig {
            redis_url: env_optional("REDIS_URL").or_else(|| env_optional("REDIS_HOST")),
            ttl: secs("PRICING_CACHE_TTL_SECS", 3600)?,
            max_entries: positive("PRICING_CACHE_MAX_ENTRIES", 10_000)?,
            key_hash_threshold: env_parse_or(
                "PRICING_CACHE_KEY_HASH_THRESHOLD",
                DEFAULT_HASH_THRESHOLD,
            )?,
        };

        let multiplier: f64 = env_parse_or("PRICING_RETRY_MULTIPLIER", 2.0)?;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ConfigError::InvalidValue {
                key: "PRICING_RETRY_MULTIPLIER".to_string(),
                details: format!("must be at least 1.0 (got {multiplier})"),
            });
        }
        let mut retry = RetryPolicy::new()
            .with_max_attempts(env_parse_or("PRICING_RETRY_MAX_ATTEMPTS", 3)?)
            .with_base_delay(millis("PRICING_RETRY_BASE_DELAY_MS", 200)?)
            .with_max_delay(millis("PRICING_RETRY_MAX_DELAY_MS", 5000)?)
            .with_multiplier(multiplier);
        if !env_parse_or("PRICING_RETRY_JITTER", true)? {
            retry = retry.without_jitter();
        }

        let breaker = CircuitBreakerConfig::new()
            .with_failure_threshold(env_parse_or("PRICING_BREAKER_THRESHOLD", 5)?)
            .with_recovery_timeout(secs("PRICING_BREAKER_RECOVERY_SECS", 60)?);

        let min_success_rate: f64 = env_parse_or("PRICING_BATCH_MIN_SUCCESS_RATE", 0.8)?;
        if !(0.0..=1.0).contains(&min_success_rate) {
            return Err(ConfigError::InvalidValue {
                key: "PRICING_BATCH_MIN_SUCCESS_RATE".to_string(),
                details: format!("must be within [0, 1] (got {min_success_rate})"),
            });
        }
        let batch = BatchConfig::new()
            .with_chunk_size(positive("PRICING_BATCH_CHUNK_SIZE", 20)?)
            .with_concurrency(positive("PRICING_BATCH_CONCURRENCY", 10)?)
            .with_chunk_timeout(secs("PRICING_BATCH_CHUNK_TIMEOUT_SECS", 30)?)
            .with_min_success_rate(min_success_rate);

        let mut availability = AvailabilityConfig::default()
            .with_snapshot_ttl(secs("PRICING_AVAILABILITY_TTL_SECS", 6 * 3600)?)
            .with_reference_region(env_or_default("PRICING_REFERENCE_REGION", "us-east-1"));
        for entry in env_list("PRICING_REGION_OVERRIDES").unwrap_or_default() {
            let region_override = entry.parse::<RegionOverride>().map_err(|details| {
                ConfigError::InvalidValue {
                    key: "PRICING_REGION_OVERRIDES".to_string(),
                    details,
                }
            })?;
            availability = availability.with_override(region_override);
        }

        Ok(Self {
            catalog,
            cache,
            retry,
            breaker,
            batch,
            availability,
        })
    }
}
