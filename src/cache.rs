//! cache.rs - Time-bounded cache for venue data
//!
//! Entries expire on read once older than the caller's `max_age`. There is no
//! capacity bound; keys are pair and price lookups, which stay small.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_stale(&self, max_age: Duration) -> bool {
        self.inserted_at.elapsed() > max_age
    }
}

/// TTL cache owned by exactly one adapter or aggregator
#[derive(Debug)]
pub struct VenueCache<V> {
    entries: RwLock<HashMap<String, CacheEntry<V>>>,
}

impl<V: Clone> VenueCache<V> {
    pub fn new() -> Self {
        VenueCache {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cached value unless it is older than `max_age`
    pub async fn get(&self, key: &str, max_age: Duration) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_stale(max_age))
            .map(|entry| entry.value.clone())
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl<V: Clone> Default for VenueCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
