//! Key-value backend abstraction used by the cache store.

use std::time::Duration;

use async_trait::async_trait;

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend not configured")]
    Disabled,

    #[error("no keys to delete")]
    NoKeys,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether the error came from talking to the backend, as opposed to
    /// a local condition (disabled, empty input, bad payload).
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Redis(_) | Self::Pool(_))
    }
}

/// Raw string key-value store with per-entry expiry.
///
/// Implementations store values as opaque strings; (de)serialization happens
/// in [`CacheStore`](super::CacheStore).
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Delete keys in one call. Returns how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// List keys matching a glob pattern such as `composition*`.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError>;

    async fn key_count(&self) -> Result<u64, CacheError>;

    /// Human-readable memory usage, if the backend reports one.
    async fn memory_usage(&self) -> Result<Option<String>, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
