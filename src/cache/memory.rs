//! In-process backend built on DashMap.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct StoredValue {
    data: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Single-instance backend with per-entry TTL.
///
/// Expiry is measured with `tokio::time::Instant`, so a paused tokio clock
/// controls it. Expired entries are dropped when read, and swept from the
/// whole map by `scan`, `key_count` and `memory_usage`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredValue>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(key)
            && !entry.is_expired()
        {
            return Some(entry.data.clone());
        }
        self.entries.remove_if(key, |_, v| v.is_expired());
        None
    }

    fn purge_expired(&self) {
        self.entries.retain(|_, v| !v.is_expired());
    }
}

/// Redis-style glob subset: `*`, `?` and backslash escapes. Character
/// classes are not supported and `[` matches itself.
fn matches_pattern(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    glob(&pattern, &key)
}

fn glob(pattern: &[char], key: &[char]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some(('*', rest)) => (0..=key.len()).any(|i| glob(rest, &key[i..])),
        Some(('?', rest)) => !key.is_empty() && glob(rest, &key[1..]),
        Some(('\\', [escaped, rest @ ..])) => {
            key.first() == Some(escaped) && glob(rest, &key[1..])
        }
        Some((c, rest)) => key.first() == Some(c) && glob(rest, &key[1..]),
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.live_value(key))
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, CacheError> {
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, v)| !v.is_expired())
            .count();
        Ok(removed as u64)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        self.purge_expired();
        Ok(self
            .entries
            .iter()
            .filter(|entry| matches_pattern(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn key_count(&self) -> Result<u64, CacheError> {
        self.purge_expired();
        Ok(self.entries.len() as u64)
    }

    async fn memory_usage(&self) -> Result<Option<String>, CacheError> {
        self.purge_expired();
        let bytes: usize = self
            .entries
            .iter()
            .map(|e| e.key().len() + e.data.len())
            .sum();
        Ok(Some(format!("{}B", bytes)))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("composition*", "compositions:all"));
        assert!(matches_pattern("composition*", "composition:1"));
        assert!(!matches_pattern("composition*", "health:status"));
        assert!(matches_pattern("*", "anything"));
        assert!(matches_pattern("health:status", "health:status"));
        assert!(!matches_pattern("health", "health:status"));
        assert!(matches_pattern("composition:?", "composition:1"));
        assert!(!matches_pattern("composition:?", "composition:12"));
    }

    #[test]
    fn test_escaped_metacharacters_match_literally() {
        assert!(matches_pattern(r"\**", "*:1"));
        assert!(!matches_pattern(r"\**", "composition:1"));
        assert!(matches_pattern(r"a\?b*", "a?b:1"));
        assert!(!matches_pattern(r"a\?b*", "axb:1"));
        assert!(matches_pattern(r"\[x\]*", "[x]:1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_are_swept() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(600);
        for i in 0..1000 {
            backend
                .set_ex(&format!("compositions:category:c{}", i), "[]".into(), ttl)
                .await
                .unwrap();
        }

        tokio::time::advance(Duration::from_secs(3600)).await;

        assert_eq!(backend.key_count().await.unwrap(), 0);
        assert!(backend.entries.is_empty());

        backend.set_ex("x", "1".into(), ttl).await.unwrap();
        tokio::time::advance(ttl).await;
        assert!(backend.scan("*").await.unwrap().is_empty());
        assert_eq!(backend.memory_usage().await.unwrap(), Some("0B".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let backend = MemoryBackend::new();
        backend
            .set_ex("k", "v".to_string(), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
        assert_eq!(backend.key_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_del_counts_existing_keys_only() {
        let backend = MemoryBackend::new();
        let ttl = Duration::from_secs(60);
        backend.set_ex("a", "1".into(), ttl).await.unwrap();
        backend.set_ex("b", "2".into(), ttl).await.unwrap();

        let removed = backend
            .del(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(backend.key_count().await.unwrap(), 0);
    }
}
