//! Redis backend over a deadpool connection pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config as PoolSettings, CreatePoolError, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use tracing::debug;

use super::{CacheBackend, CacheError};
use crate::config::RedisConfig;

/// Keys fetched per `SCAN` round trip.
const SCAN_BATCH: usize = 200;

/// Shared Redis backend. Cloning shares the pool.
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Build the pool. No connection is opened until first use.
    pub fn new(config: &RedisConfig) -> Result<Self, CreatePoolError> {
        let mut settings = PoolSettings::from_url(&config.url);

        let mut pool_config = PoolConfig::new(config.pool_size);
        pool_config.timeouts.wait = Some(config.timeout);
        pool_config.timeouts.create = Some(config.timeout);
        pool_config.timeouts.recycle = Some(config.timeout);
        settings.pool = Some(pool_config);

        let pool = settings.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }
}

/// Pull `used_memory_human` out of an `INFO memory` reply.
fn parse_used_memory(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory_human:"))
        .map(|v| v.trim().to_string())
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        // SET EX rejects 0
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.pool.get().await?;
        Ok(conn.del(keys).await?)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.pool.get().await?;
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

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();
        debug!(pattern = %pattern, matched = keys.len(), "redis scan");
        Ok(keys)
    }

    async fn key_count(&self) -> Result<u64, CacheError> {
        let mut conn = self.pool.get().await?;
        let count: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(count)
    }

    async fn memory_usage(&self) -> Result<Option<String>, CacheError> {
        let mut conn = self.pool.get().await?;
        let info: String = redis::cmd("INFO").arg("memory").query_async(&mut conn).await?;
        Ok(parse_used_memory(&info))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
