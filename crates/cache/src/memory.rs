//! In-memory LRU cache with per-key TTL.
//!
//! Expired entries are treated as absent and removed lazily when touched;
//! [`MemoryCache::purge_expired`] removes them eagerly and is meant to be
//! driven by a periodic job. Once more than `max_keys` live entries are
//! stored the least recently used one is evicted.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::DEFAULT_MAX_KEYS;
use crate::error::CacheError;
use crate::store::CacheStore;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
    /// Position in the recency index; larger is more recent.
    tick: u64,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Default)]
struct Lru {
    entries: HashMap<String, Entry>,
    recency: BTreeMap<u64, String>,
    next_tick: u64,
}

impl Lru {
    fn bump(&mut self) -> u64 {
        self.next_tick += 1;
        self.next_tick
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.tick);
        Some(entry)
    }

    /// Return the live entry for `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.remove(key);
            return None;
        }
        self.entries.get_mut(key)
    }

    fn touch(&mut self, key: &str) {
        let tick = self.bump();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.tick);
            entry.tick = tick;
            self.recency.insert(tick, key.to_string());
        }
    }

    fn insert(&mut self, key: &str, value: &str, expires_at: Option<Instant>, max_keys: usize) {
        self.remove(key);
        let tick = self.bump();
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
                tick,
            },
        );
        self.recency.insert(tick, key.to_string());

        while self.entries.len() > max_keys {
            let Some((_, oldest)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::debug!(key = %oldest, "Memory cache evicted least recently used key");
        }
    }
}

/// Single-instance cache backend.
///
/// Correct as a lock store only when one service instance is running,
/// since the state is not shared between processes.
pub struct MemoryCache {
    max_keys: usize,
    inner: Mutex<Lru>,
}

impl MemoryCache {
    /// Create a cache holding at most `max_keys` entries (minimum 1).
    pub fn new(max_keys: usize) -> Self {
        Self {
            max_keys: max_keys.max(1),
            inner: Mutex::new(Lru::default()),
        }
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut lru = self.state();
        let expired: Vec<String> = lru
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            lru.remove(key);
        }
        expired.len()
    }

    fn state(&self) -> MutexGuard<'_, Lru> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A TTL too large to represent as an instant never expires.
    fn expiry(ttl: Option<Duration>) -> Option<Instant> {
        ttl.and_then(|ttl| Instant::now().checked_add(ttl))
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYS)
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn connect(&self) -> Result<(), CacheError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), CacheError> {
        *self.state() = Lru::default();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut lru = self.state();
        let value = lru.live(key, Instant::now()).map(|e| e.value.clone());
        if value.is_some() {
            lru.touch(key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let expires_at = Self::expiry(ttl);
        self.state().insert(key, value, expires_at, self.max_keys);
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut lru = self.state();
        if lru.live(key, now).is_some() {
            return Ok(false);
        }
        lru.insert(key, value, now.checked_add(ttl), self.max_keys);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.state().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.state().live(key, Instant::now()).is_some())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        *self.state() = Lru::default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let cache = MemoryCache::default();
        cache.set("k", "v", None).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let cache = MemoryCache::default();
        assert!(cache.get("nope").await.unwrap().is_none());
        assert!(!cache.exists("nope").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_key_is_absent_and_removed() {
        let cache = MemoryCache::default();
        cache.set("k", "v", Some(Duration::from_secs(5))).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;

        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn oversized_ttl_never_expires() {
        let cache = MemoryCache::default();
        cache.set("k", "v", Some(Duration::MAX)).await.unwrap();
        assert!(cache.set_if_absent("lock", "a", Duration::MAX).await.unwrap());

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(!cache.set_if_absent("lock", "b", Duration::MAX).await.unwrap());
        assert_eq!(cache.purge_expired(), 0);
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();

        // Reading "a" makes "b" the eviction candidate.
        cache.get("a").await.unwrap();
        cache.set("c", "3", None).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.exists("a").await.unwrap());
        assert!(!cache.exists("b").await.unwrap());
        assert!(cache.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn overwrite_does_not_grow_cache() {
        let cache = MemoryCache::new(2);
        cache.set("a", "1", None).await.unwrap();
        cache.set("a", "2", None).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_live_value_until_expiry() {
        let cache = MemoryCache::default();
        let ttl = Duration::from_secs(60);

        assert!(cache.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!cache.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap().as_deref(), Some("a"));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(cache.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(cache.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_only_removes_expired_entries() {
        let cache = MemoryCache::default();
        cache.set("short", "1", Some(Duration::from_secs(1))).await.unwrap();
        cache.set("long", "2", Some(Duration::from_secs(100))).await.unwrap();
        cache.set("forever", "3", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn delete_and_flush_clear_entries() {
        let cache = MemoryCache::default();
        cache.set("a", "1", None).await.unwrap();
        cache.set("b", "2", None).await.unwrap();

        cache.delete("a").await.unwrap();
        assert!(!cache.exists("a").await.unwrap());

        cache.flush().await.unwrap();
        assert!(cache.is_empty());
    }
}
