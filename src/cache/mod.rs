//! Cache module - Cache-aside layer over an optional key-value backend.
//!
//! ## Architecture
//!
//! - `CacheStore` - read/write/delete/invalidate plus the `fetch_through`
//!   read-through helper; absorbs every backend failure
//! - `CacheBackend` - raw string store with per-entry TTL
//!   (`RedisBackend` in production, `MemoryBackend` in-process)
//! - `CacheKey` - the key namespace and each shape's TTL class
//!
//! ## Usage
//!
//! ```rust
//! let store = CacheStore::connect(config.redis.as_ref()).await;
//!
//! let compositions = store
//!     .fetch_key(&CacheKey::AllCompositions, || source.list_compositions())
//!     .await?;
//! ```
//!
//! Without `REDIS_URL` every read misses and `fetch_through` simply calls the
//! producer.

mod backend;
mod config;
mod keys;
mod memory;
mod redis_backend;
mod store;

pub use backend::{CacheBackend, CacheError};
pub use config::TtlClass;
pub use keys::{CacheKey, COMPOSITION_NAMESPACE};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
pub use store::{CacheStats, CacheStore, ConnectionState, Lookup};

#[cfg(test)]
pub(crate) use store::tests::{settle, BrokenBackend};
