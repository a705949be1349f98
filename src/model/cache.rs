//! Time-bounded cache for library query results
//!
//! Keys compose category + sort + filter + offset so distinct query shapes
//! never collide. Expiry is lazy: `get` checks age at read time and an entry
//! past its TTL is indistinguishable from an absent one.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Generic key→value store with a single TTL for all entries.
pub struct TimedCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    ttl: Duration,
}

impl<V: Clone> TimedCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn set(&self, key: String, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Returns the cached value, or `None` when absent or expired. Expired
    /// entries are dropped on the way out.
    pub async fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.stored_at.elapsed() <= self.ttl => {
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }
        let mut entries = self.entries.write().await;
        if entries
            .get(key)
            .is_some_and(|entry| entry.stored_at.elapsed() > self.ttl)
        {
            entries.remove(key);
        }
        None
    }

    pub async fn remove(&self, key: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(key);
    }

    /// Drops every entry whose key starts with `prefix`. Used to invalidate
    /// all cached pages of one category after a mutating command.
    pub async fn remove_prefix(&self, prefix: &str) {
        let mut entries = self.entries.write().await;
        entries.retain(|key, _| !key.starts_with(prefix));
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn get_returns_absent_after_ttl() {
        let cache = TimedCache::new(Duration::from_millis(100));
        cache.set("k".to_string(), 7u32).await;
        assert_eq!(cache.get("k").await, Some(7));

        advance(Duration::from_millis(150)).await;
        assert_eq!(cache.get("k").await, None);
        // Expiry is idempotent: still absent on the next read.
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn set_refreshes_the_clock() {
        let cache = TimedCache::new(Duration::from_millis(100));
        cache.set("k".to_string(), 1u32).await;
        advance(Duration::from_millis(80)).await;
        cache.set("k".to_string(), 2u32).await;
        advance(Duration::from_millis(80)).await;
        assert_eq!(cache.get("k").await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_prefix_only_touches_matching_keys() {
        let cache = TimedCache::new(Duration::from_secs(300));
        cache.set("albums:name::0".to_string(), 1u32).await;
        cache.set("albums:name::50".to_string(), 2u32).await;
        cache.set("artists:name::0".to_string(), 3u32).await;

        cache.remove_prefix("albums:").await;
        assert_eq!(cache.get("albums:name::0").await, None);
        assert_eq!(cache.get("albums:name::50").await, None);
        assert_eq!(cache.get("artists:name::0").await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_and_remove() {
        let cache = TimedCache::new(Duration::from_secs(1));
        cache.set("a".to_string(), 1u32).await;
        cache.set("b".to_string(), 2u32).await;
        cache.remove("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("b").await, Some(2));
        cache.clear().await;
        assert_eq!(cache.get("b").await, None);
    }
}
