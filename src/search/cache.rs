//! Request-level cache (C6), pluggable behind a two-operation interface.
//!
//! The in-memory backend is hand-rolled (`HashMap` + manual recency
//! tracking), matching the teacher's own prompt cache rather than reaching
//! for the `lru` crate. The remote backend uses `redis`'s own `SETEX` TTL
//! instead of tracking expiry locally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Cache boundary metrics: hits, misses, evictions, items, bytes. Observed
/// here, not inside the tools that call the cache.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub items: usize,
    pub bytes: usize,
}

/// Namespaced cache key: `cache:{corpus}:{json-of-args}`.
pub fn cache_key(namespace: &str, args: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(args.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("cache:{namespace}:{digest:x}")
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration);
    fn metrics(&self) -> CacheMetrics;
}

struct Entry {
    value: String,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
    last_accessed: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        Utc::now().signed_duration_since(self.inserted_at)
            > chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero())
    }
}

/// In-memory LRU cache: `HashMap` plus manual recency tracking on access,
/// bounded by `max_items`.
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
    metrics: Mutex<CacheMetrics>,
    max_items: usize,
}

impl InMemoryCache {
    pub fn new(max_items: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            metrics: Mutex::new(CacheMetrics::default()),
            max_items,
        }
    }

    fn evict_if_needed(&self, entries: &mut HashMap<String, Entry>, metrics: &mut CacheMetrics) {
        while entries.len() > self.max_items {
            let oldest_key = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            if let Some(key) = oldest_key {
                entries.remove(&key);
                metrics.evictions += 1;
            } else {
                break;
            }
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let mut metrics = self.metrics.lock().expect("cache metrics lock poisoned");
        match entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.last_accessed = Utc::now();
                metrics.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                metrics.misses += 1;
                None
            }
            None => {
                metrics.misses += 1;
                None
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let mut metrics = self.metrics.lock().expect("cache metrics lock poisoned");
        let bytes = value.len();
        entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Utc::now(),
                ttl,
                last_accessed: Utc::now(),
            },
        );
        metrics.items = entries.len();
        metrics.bytes += bytes;
        self.evict_if_needed(&mut entries, &mut metrics);
        metrics.items = entries.len();
    }

    fn metrics(&self) -> CacheMetrics {
        self.metrics.lock().expect("cache metrics lock poisoned").clone()
    }
}

/// Sweeps expired entries. The spec calls for this to run on a dedicated
/// background worker every 10s for the in-memory backend.
impl InMemoryCache {
    pub fn sweep_expired(&self) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        let before = entries.len();
        entries.retain(|_, e| !e.is_expired());
        let removed = before - entries.len();
        if removed > 0 {
            let mut metrics = self.metrics.lock().expect("cache metrics lock poisoned");
            metrics.evictions += removed as u64;
            metrics.items = entries.len();
        }
    }
}

/// Remote key-value backend (TLS-authenticated `redis`), relying on the
/// store's own TTL rather than tracking expiry locally.
pub struct RemoteCache {
    manager: redis::aio::ConnectionManager,
    metrics: Mutex<CacheMetrics>,
}

impl RemoteCache {
    pub async fn connect(redis_url: &str) -> crate::error::Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| crate::error::Error::config(format!("invalid REDIS_URL: {e}")))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| crate::error::Error::DataError(format!("redis connect failed: {e}")))?;
        Ok(Self {
            manager,
            metrics: Mutex::new(CacheMetrics::default()),
        })
    }
}

#[async_trait]
impl CacheBackend for RemoteCache {
    async fn get(&self, key: &str) -> Option<String> {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let result: redis::RedisResult<Option<String>> = conn.get(key).await;
        let mut metrics = self.metrics.lock().expect("cache metrics lock poisoned");
        match result {
            Ok(Some(value)) => {
                metrics.hits += 1;
                Some(value)
            }
            Ok(None) => {
                metrics.misses += 1;
                None
            }
            Err(_) => {
                metrics.misses += 1;
                None
            }
        }
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        use redis::AsyncCommands;
        let mut conn = self.manager.clone();
        let _: redis::RedisResult<()> = conn.set_ex(key, value, ttl.as_secs().max(1)).await;
    }

    fn metrics(&self) -> CacheMetrics {
        self.metrics.lock().expect("cache metrics lock poisoned").clone()
    }
}

/// Disables caching entirely.
pub struct NoOpCache;

#[async_trait]
impl CacheBackend for NoOpCache {
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) {}

    fn metrics(&self) -> CacheMetrics {
        CacheMetrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_cache_round_trips_a_value() {
        let cache = InMemoryCache::new(10);
        cache
            .set_with_ttl("k", "v".to_string(), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("k").await, Some("v".to_string()));
    }

    #[tokio::test]
    async fn in_memory_cache_misses_expired_entries() {
        let cache = InMemoryCache::new(10);
        cache
            .set_with_ttl("k", "v".to_string(), Duration::from_millis(0))
            .await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn in_memory_cache_evicts_oldest_beyond_capacity() {
        let cache = InMemoryCache::new(2);
        cache.set_with_ttl("a", "1".into(), Duration::from_secs(60)).await;
        cache.set_with_ttl("b", "2".into(), Duration::from_secs(60)).await;
        cache.set_with_ttl("c", "3".into(), Duration::from_secs(60)).await;
        let metrics = cache.metrics();
        assert!(metrics.evictions >= 1);
    }

    #[tokio::test]
    async fn noop_cache_never_returns_a_value() {
        let cache = NoOpCache;
        cache.set_with_ttl("k", "v".into(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[test]
    fn cache_key_is_deterministic_for_the_same_args() {
        let args = serde_json::json!({"q": "hello", "limit": 20});
        assert_eq!(cache_key("personal", &args), cache_key("personal", &args));
    }

    #[test]
    fn cache_key_differs_by_namespace() {
        let args = serde_json::json!({"q": "hello"});
        assert_ne!(cache_key("personal", &args), cache_key("social", &args));
    }
}
