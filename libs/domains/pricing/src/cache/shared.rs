//! Shared cache tier seam

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::key::key_pattern;
use crate::error::{PricingError, PricingResult};

/// Byte-oriented key/value store shared across processes.
///
/// Errors are reported as [`PricingError::CacheBackendUnavailable`]; the cache
/// layer logs them and carries on with the local tier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedCacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> PricingResult<Option<Vec<u8>>>;

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> PricingResult<()>;

    async fn delete(&self, key: &str) -> PricingResult<()>;

    /// Keys matching a glob pattern (`*`, `?` and `[..]`)
    async fn scan_by_prefix(&self, pattern: &str) -> PricingResult<Vec<String>>;

    /// Backend name for logs
    fn name(&self) -> String;
}

/// In-process stand-in for a shared store, with a switch to simulate outages
#[derive(Debug, Default)]
pub struct InMemorySharedBackend {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    unavailable: AtomicBool,
}

impl InMemorySharedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (Vec<u8>, Instant)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> PricingResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PricingError::CacheBackendUnavailable(
                "in-memory backend marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SharedCacheBackend for InMemorySharedBackend {
    async fn get(&self, key: &str) -> PricingResult<Option<Vec<u8>>> {
        self.check()?;
        let now = Instant::now();
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            None => return Ok(None),
            Some((_, expires_at)) => now >= *expires_at,
        };
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> PricingResult<()> {
        self.check()?;
        self.lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> PricingResult<()> {
        self.check()?;
        self.lock().remove(key);
        Ok(())
    }

    async fn scan_by_prefix(&self, pattern: &str) -> PricingResult<Vec<String>> {
        self.check()?;
        let pattern = key_pattern(pattern)?;
        Ok(self
            .lock()
            .keys()
            .filter(|k| pattern.matches(k))
            .cloned()
            .collect())
    }

    fn name(&self) -> String {
        "in-memory".to_string()
    }
}
