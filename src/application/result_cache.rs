// TTL result cache - Immutable snapshots replaced atomically
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CacheEntry<V> {
    payload: Arc<V>,
    stored_at: Instant,
    stored_at_utc: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.stored_at.elapsed() >= ttl
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub age_secs: u64,
    pub stored_at: DateTime<Utc>,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub entries: usize,
    pub ttl_secs: u64,
    pub keys: Vec<CacheEntryInfo>,
}

/// Readers get `Arc` snapshots; a refresh inserts a new entry rather than
/// mutating the one a reader may still hold.
///
/// Every invalidation bumps a generation counter. A value computed under an
/// older generation is handed back to its caller but never stored.
pub struct ResultCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
    generation: AtomicU64,
}

impl<V> ResultCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Read before computing a value, then pass to `insert`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn get(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.payload.clone())
    }

    pub async fn insert(&self, key: impl Into<String>, value: V, generation: u64) -> Arc<V> {
        let payload = Arc::new(value);
        let mut entries = self.entries.write().await;
        if self.generation() != generation {
            tracing::debug!(generation, "Discarding result computed before invalidation");
            return payload;
        }
        let entry = CacheEntry {
            payload: payload.clone(),
            stored_at: Instant::now(),
            stored_at_utc: Utc::now(),
        };
        entries.insert(key.into(), entry);
        payload
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        entries.remove(key).is_some()
    }

    /// Removes every entry. Returns how many were dropped.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn info(&self) -> CacheInfo {
        let entries = self.entries.read().await;
        let mut keys: Vec<CacheEntryInfo> = entries
            .iter()
            .map(|(key, entry)| CacheEntryInfo {
                key: key.clone(),
                age_secs: entry.stored_at.elapsed().as_secs(),
                stored_at: entry.stored_at_utc,
                expired: entry.is_expired(self.ttl),
            })
            .collect();
        keys.sort_by(|a, b| a.key.cmp(&b.key));

        CacheInfo {
            entries: keys.len(),
            ttl_secs: self.ttl.as_secs(),
            keys,
        }
    }
}

/// Something holding derived results that must be dropped after a model run.
#[async_trait]
pub trait CacheControl: Send + Sync {
    async fn clear_cache(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = ResultCache::new(Duration::from_secs(300));
        let stored = cache.insert("analysis:all", 28.4_f64, 0).await;

        let hit = cache.get("analysis:all").await.unwrap();
        assert!(Arc::ptr_eq(&stored, &hit));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get("analysis:all").await.is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("analysis:all").await.is_none());
        assert!(cache.info().await.keys[0].expired);
    }

    #[tokio::test]
    async fn test_replacement_leaves_old_snapshot_intact() {
        let cache = ResultCache::new(Duration::from_secs(300));
        let old = cache.insert("k", vec![1, 2, 3], 0).await;
        cache.insert("k", vec![4], 0).await;

        assert_eq!(*old, vec![1, 2, 3]);
        assert_eq!(*cache.get("k").await.unwrap(), vec![4]);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = ResultCache::new(Duration::from_secs(300));
        cache.insert("a", 1, 0).await;
        cache.insert("b", 2, 0).await;

        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert_eq!(cache.info().await.entries, 1);
        assert_eq!(cache.clear().await, 1);
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_result_from_before_clear_is_not_stored() {
        let cache = ResultCache::new(Duration::from_secs(300));
        let generation = cache.generation();

        cache.clear().await;
        let late = cache.insert("analysis:all", 1, generation).await;

        assert_eq!(*late, 1);
        assert!(cache.get("analysis:all").await.is_none());

        cache.insert("analysis:all", 2, cache.generation()).await;
        assert_eq!(*cache.get("analysis:all").await.unwrap(), 2);
    }
}
