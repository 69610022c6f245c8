//! Cache-aside store.
//!
//! Wraps an optional [`CacheBackend`] and absorbs every backend failure at
//! its boundary. The only error that ever leaves this type is a producer
//! error from [`CacheStore::fetch_through`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{CacheBackend, CacheError, CacheKey, MemoryBackend, RedisBackend};
use crate::config::RedisConfig;

/// `REDIS_URL` scheme selecting the in-process backend (single instance only).
pub const MEMORY_URL_SCHEME: &str = "memory://";

/// Outcome of a cache read.
#[derive(Debug)]
pub enum Lookup<T> {
    Hit(T),
    Miss,
    /// The backend errored or the stored value could not be decoded.
    /// Callers treat this like a miss.
    Failed(CacheError),
}

impl<T> Lookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Hit(value) => Some(value),
            Self::Miss | Self::Failed(_) => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// Connection state of the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No backend configured. Terminal.
    Unconfigured,
    Connecting,
    Connected,
    /// Last backend call failed. Calls keep being attempted.
    Error,
}

/// Operational snapshot returned by [`CacheStore::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<String>,
}

impl CacheStats {
    fn disconnected() -> Self {
        Self {
            connected: false,
            key_count: None,
            memory_usage: None,
        }
    }
}

/// Best-effort cache in front of an origin.
///
/// Cloning is cheap and shares the backend handle and its state.
#[derive(Clone)]
pub struct CacheStore {
    backend: Option<Arc<dyn CacheBackend>>,
    state: Arc<RwLock<ConnectionState>>,
}

impl CacheStore {
    /// A store with no backend: every read misses, every write fails.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            state: Arc::new(RwLock::new(ConnectionState::Unconfigured)),
        }
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
            state: Arc::new(RwLock::new(ConnectionState::Connecting)),
        }
    }

    /// Build the store from optional Redis settings.
    ///
    /// A `memory://` URL selects [`MemoryBackend`] instead of Redis. Never
    /// fails: a missing or unusable configuration yields a disabled store,
    /// and an unreachable server leaves the store in `Error` state.
    pub async fn connect(config: Option<&RedisConfig>) -> Self {
        let Some(config) = config else {
            info!("REDIS_URL not set, caching disabled");
            return Self::disabled();
        };

        if config.url.starts_with(MEMORY_URL_SCHEME) {
            info!("Using in-process cache backend");
            let store = Self::with_backend(Arc::new(MemoryBackend::new()));
            let _ = store.observe(store.backend_ping().await);
            return store;
        }

        let backend = match RedisBackend::new(config) {
            Ok(backend) => backend,
            Err(e) => {
                warn!(error = %e, "Failed to create Redis pool, caching disabled");
                return Self::disabled();
            }
        };

        let store = Self::with_backend(Arc::new(backend));
        match store.observe(store.backend_ping().await) {
            Ok(()) => info!("Connected to Redis"),
            Err(e) => warn!(error = %e, "Redis unreachable at startup, will keep trying per request"),
        }
        store
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    async fn backend_ping(&self) -> Result<(), CacheError> {
        match &self.backend {
            Some(backend) => backend.ping().await,
            None => Err(CacheError::Disabled),
        }
    }

    /// Track connection state from the outcome of a backend call.
    fn observe<T>(&self, result: Result<T, CacheError>) -> Result<T, CacheError> {
        let next = match &result {
            Ok(_) => Some(ConnectionState::Connected),
            Err(e) if e.is_backend() => Some(ConnectionState::Error),
            Err(_) => None,
        };

        if let Some(next) = next {
            let mut state = self.state.write();
            if *state != next {
                debug!(from = ?*state, to = ?next, "cache connection state changed");
                *state = next;
            }
        }
        result
    }

    /// Look up `key` and decode it.
    pub async fn read<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let Some(backend) = &self.backend else {
            return Lookup::Miss;
        };

        match self.observe(backend.get(key).await) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key = %key, "cache hit");
                    Lookup::Hit(value)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                    Lookup::Failed(e.into())
                }
            },
            Ok(None) => {
                debug!(key = %key, "cache miss");
                Lookup::Miss
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed");
                Lookup::Failed(e)
            }
        }
    }

    /// Store `value` under `key` for `ttl`.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        if self.backend.is_none() {
            return Err(CacheError::Disabled);
        }
        let payload = serde_json::to_string(value).inspect_err(|e| {
            warn!(key = %key, error = %e, "Value not serializable, not caching");
        })?;
        self.write_raw(key, payload, ttl).await
    }

    async fn write_raw(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let Some(backend) = &self.backend else {
            return Err(CacheError::Disabled);
        };

        match self.observe(backend.set_ex(key, payload, ttl).await) {
            Ok(()) => {
                debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");
                Ok(())
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache write failed");
                Err(e)
            }
        }
    }

    /// Remove explicit keys in one batch. Returns how many existed.
    pub async fn delete(&self, keys: &[String]) -> Result<u64, CacheError> {
        let Some(backend) = &self.backend else {
            return Err(CacheError::Disabled);
        };
        if keys.is_empty() {
            return Err(CacheError::NoKeys);
        }

        match self.observe(backend.del(keys).await) {
            Ok(removed) => {
                debug!(requested = keys.len(), removed, "cache delete");
                Ok(removed)
            }
            Err(e) => {
                warn!(error = %e, "Cache delete failed");
                Err(e)
            }
        }
    }

    /// Delete every key starting with `prefix`. Glob metacharacters in
    /// `prefix` match literally.
    pub async fn invalidate_namespace(&self, prefix: &str) -> Result<u64, CacheError> {
        let Some(backend) = &self.backend else {
            return Err(CacheError::Disabled);
        };

        let pattern = format!("{}*", escape_glob(prefix));
        let keys = match self.observe(backend.scan(&pattern).await) {
            Ok(keys) => keys,
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Cache key discovery failed");
                return Err(e);
            }
        };

        if keys.is_empty() {
            debug!(prefix = %prefix, "Nothing to invalidate");
            return Ok(0);
        }

        let removed = self.delete(&keys).await?;
        info!(prefix = %prefix, removed, "Invalidated cache namespace");
        Ok(removed)
    }

    /// Connection and size snapshot. Never fails.
    pub async fn stats(&self) -> CacheStats {
        let Some(backend) = &self.backend else {
            return CacheStats::disconnected();
        };

        if let Err(e) = self.observe(backend.ping().await) {
            warn!(error = %e, "Cache backend unreachable");
            return CacheStats::disconnected();
        }

        CacheStats {
            connected: true,
            key_count: self.observe(backend.key_count().await).ok(),
            memory_usage: self.observe(backend.memory_usage().await).ok().flatten(),
        }
    }

    /// Return the cached value for `key`, or run `producer`, cache its
    /// result in the background and return it.
    ///
    /// Producer errors are returned unchanged and never cached. Concurrent
    /// misses on the same key each run the producer.
    pub async fn fetch_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Lookup::Hit(value) = self.read(key).await {
            return Ok(value);
        }

        let value = producer().await?;

        if self.backend.is_some() {
            match serde_json::to_string(&value) {
                Ok(payload) => {
                    let store = self.clone();
                    let key = key.to_string();
                    tokio::spawn(async move {
                        // failures are already logged by write_raw
                        let _ = store.write_raw(&key, payload, ttl).await;
                    });
                }
                Err(e) => warn!(key = %key, error = %e, "Value not serializable, not caching"),
            }
        }

        Ok(value)
    }

    /// [`fetch_through`](Self::fetch_through) using the key's own TTL.
    pub async fn fetch_key<T, E, F, Fut>(&self, key: &CacheKey, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.fetch_through(&key.to_string(), key.ttl(), producer).await
    }
}

/// Escape the characters `SCAN MATCH` treats as glob syntax.
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("state", &self.state())
            .finish()
    }
}
