//! Read-through cache for list endpoints, backed by Redis.
//!
//! Each scope (e.g. `posts`, `contact_requests:<ca_id>`) owns a generation
//! counter. A miss hands back a [`CacheSlot`] pinned to the generation the
//! read observed, and the filled value is written under that generation only.
//! Invalidating a scope bumps the counter, so every older entry (including
//! one filled by a read that raced the write) becomes unreachable and expires
//! on its own TTL. Cache failures are logged and treated as misses.

use std::sync::Arc;

use async_trait::async_trait;
use redis::Client as RedisClient;
use redis::RedisResult;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

const KEY_PREFIX: &str = "camarket:list";

/// Raw key/value operations the cache needs from its store.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Current generation of a counter key; an absent key is generation 0.
    async fn generation(&self, key: &str) -> RedisResult<i64>;
    async fn bump(&self, key: &str) -> RedisResult<i64>;
    async fn read(&self, key: &str) -> RedisResult<Option<String>>;
    async fn write(&self, key: &str, value: String, ttl_secs: u64) -> RedisResult<()>;
}

struct RedisBackend {
    client: RedisClient,
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn generation(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let gen: Option<i64> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(gen.unwrap_or(0))
    }

    async fn bump(&self, key: &str) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("INCR").arg(key).query_async(&mut conn).await
    }

    async fn read(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("GET").arg(key).query_async(&mut conn).await
    }

    async fn write(&self, key: &str, value: String, ttl_secs: u64) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
    }
}

/// Where a missed read may be filled.
#[derive(Debug)]
pub struct CacheSlot {
    scope: String,
    key: String,
    /// `None` when the generation could not be read; such a slot is never filled.
    generation: Option<i64>,
}

#[derive(Debug)]
pub enum Lookup<T> {
    Hit(T),
    Miss(CacheSlot),
}

#[derive(Clone)]
pub struct ListCache {
    backend: Arc<dyn CacheBackend>,
    ttl_secs: u64,
}

impl ListCache {
    pub fn new(client: RedisClient, ttl_secs: u64) -> Self {
        Self::with_backend(Arc::new(RedisBackend { client }), ttl_secs)
    }

    pub fn with_backend(backend: Arc<dyn CacheBackend>, ttl_secs: u64) -> Self {
        Self { backend, ttl_secs }
    }

    pub async fn get<T: DeserializeOwned>(&self, scope: &str, key: &str) -> Lookup<T> {
        let generation = match self.backend.generation(&generation_key(scope)).await {
            Ok(gen) => Some(gen),
            Err(e) => {
                warn!("List cache generation lookup failed for {scope}: {e}");
                None
            }
        };
        let slot = CacheSlot {
            scope: scope.to_string(),
            key: key.to_string(),
            generation,
        };
        let Some(gen) = generation else {
            return Lookup::Miss(slot);
        };

        let raw = self
            .backend
            .read(&entry_key(scope, gen, key))
            .await
            .map_err(|e| warn!("List cache read failed for {scope}/{key}: {e}"))
            .ok()
            .flatten();
        let value = raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Discarding undecodable cache entry {scope}/{key}: {e}");
                None
            }
        });
        debug!(
            "List cache {} for {scope}/{key}",
            if value.is_some() { "hit" } else { "miss" }
        );
        match value {
            Some(v) => Lookup::Hit(v),
            None => Lookup::Miss(slot),
        }
    }

    /// Fills a slot returned by `get`, under the generation that read observed.
    pub async fn put<T: Serialize>(&self, slot: CacheSlot, value: &T) {
        let CacheSlot {
            scope,
            key,
            generation,
        } = slot;
        let Some(gen) = generation else {
            return;
        };
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                warn!("Could not serialize cache entry {scope}/{key}: {e}");
                return;
            }
        };
        if let Err(e) = self
            .backend
            .write(&entry_key(&scope, gen, &key), json, self.ttl_secs)
            .await
        {
            warn!("List cache write failed for {scope}/{key}: {e}");
        }
    }

    /// Makes every cached list in `scope` stale.
    pub async fn invalidate(&self, scope: &str) {
        match self.backend.bump(&generation_key(scope)).await {
            Ok(gen) => debug!("Invalidated list cache {scope} (generation {gen})"),
            Err(e) => warn!("List cache invalidation failed for {scope}: {e}"),
        }
    }
}

fn generation_key(scope: &str) -> String {
    format!("{KEY_PREFIX}:{scope}:gen")
}

fn entry_key(scope: &str, generation: i64, key: &str) -> String {
    format!("{KEY_PREFIX}:{scope}:{generation}:{key}")
}

#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    /// In-process stand-in for Redis; TTLs are ignored.
    #[derive(Default)]
    pub struct MemoryBackend {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl CacheBackend for MemoryBackend {
        async fn generation(&self, key: &str) -> RedisResult<i64> {
            let entries = self.entries.lock().unwrap();
            Ok(entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(0))
        }

        async fn bump(&self, key: &str) -> RedisResult<i64> {
            let mut entries = self.entries.lock().unwrap();
            let next = entries.get(key).and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1;
            entries.insert(key.to_string(), next.to_string());
            Ok(next)
        }

        async fn read(&self, key: &str) -> RedisResult<Option<String>> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn write(&self, key: &str, value: String, _ttl_secs: u64) -> RedisResult<()> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    pub fn memory_cache() -> ListCache {
        ListCache::with_backend(Arc::new(MemoryBackend::default()), 60)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::memory_cache;
    use super::*;

    async fn fill(cache: &ListCache, scope: &str, value: &[&str]) {
        match cache.get::<Vec<String>>(scope, "all").await {
            Lookup::Miss(slot) => cache.put(slot, &value).await,
            Lookup::Hit(_) => panic!("expected a miss"),
        }
    }

    #[test]
    fn test_entry_keys_change_with_generation() {
        let before = entry_key("posts", 3, "page=1&size=10");
        let after = entry_key("posts", 4, "page=1&size=10");
        assert_ne!(before, after);
        assert_eq!(before, "camarket:list:posts:3:page=1&size=10");
    }

    #[test]
    fn test_generation_key_is_per_scope() {
        assert_eq!(generation_key("posts"), "camarket:list:posts:gen");
        assert_ne!(
            generation_key("contact_requests:a"),
            generation_key("contact_requests:b")
        );
    }

    #[tokio::test]
    async fn test_filled_slot_is_served() {
        let cache = memory_cache();
        fill(&cache, "posts", &["a", "b"]).await;
        match cache.get::<Vec<String>>("posts", "all").await {
            Lookup::Hit(v) => assert_eq!(v, vec!["a", "b"]),
            Lookup::Miss(_) => panic!("expected a hit"),
        }
    }

    #[tokio::test]
    async fn test_fill_racing_an_invalidation_is_not_served() {
        let cache = memory_cache();
        let Lookup::Miss(slot) = cache.get::<Vec<String>>("inbox", "all").await else {
            panic!("expected a miss");
        };
        cache.invalidate("inbox").await;
        cache.put(slot, &vec!["old".to_string()]).await;

        assert!(matches!(
            cache.get::<Vec<String>>("inbox", "all").await,
            Lookup::Miss(_)
        ));
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_its_scope() {
        let cache = memory_cache();
        fill(&cache, "posts", &["p"]).await;
        fill(&cache, "locations", &["l"]).await;
        cache.invalidate("posts").await;
        assert!(matches!(
            cache.get::<Vec<String>>("posts", "all").await,
            Lookup::Miss(_)
        ));
        assert!(matches!(
            cache.get::<Vec<String>>("locations", "all").await,
            Lookup::Hit(_)
        ));
    }
}
