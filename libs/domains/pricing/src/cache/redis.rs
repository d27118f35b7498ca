use async_trait::async_trait;
use redis::Client;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::info;

use super::shared::SharedCacheBackend;
use crate::error::PricingResult;
use crate::resilience::RetryPolicy;

const SCAN_BATCH: usize = 500;

/// Redis-backed shared tier.
///
/// [`ConnectionManager`] reconnects on its own after a dropped connection;
/// each call clones the handle, which is cheap.
#[derive(Clone)]
pub struct RedisCacheBackend {
    manager: ConnectionManager,
}

impl RedisCacheBackend {
    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Connect and verify the connection with `PING`
    pub async fn connect(url: &str) -> PricingResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("Connected to shared cache");
        Ok(Self { manager })
    }

    /// Connect, retrying with backoff on failure
    pub async fn connect_with_retry(url: &str, policy: &RetryPolicy) -> PricingResult<Self> {
        policy.run("redis-connect", |_| Self::connect(url)).await
    }
}

/// Redis `EX` takes whole seconds; round up so a short TTL never becomes "no expiry"
fn expiry_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl SharedCacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> PricingResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: Vec<u8>, ttl: Duration) -> PricingResult<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> PricingResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn scan_by_prefix(&self, pattern: &str) -> PricingResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(keys)
    }

    fn name(&self) -> String {
        "redis".to_string()
    }
}
