use super::CacheBackend;
use crate::item::CacheItem;
use crate::stats::CacheStats;
use async_trait::async_trait;
use chrono::Duration;
use dashmap::DashMap;

/// Process-local backend. Each namespace owns its own map, so `clear` only
/// affects that namespace.
pub struct MemoryBackend {
    namespace: String,
    items: DashMap<String, CacheItem>,
    max_entries: usize,
}

impl MemoryBackend {
    pub fn new(namespace: &str, max_entries: usize) -> Self {
        Self {
            namespace: namespace.to_string(),
            items: DashMap::new(),
            max_entries,
        }
    }

    /// Remove entries past their expiry.
    fn evict_expired(&self) {
        let expired_keys: Vec<_> = self
            .items
            .iter()
            .filter(|entry| !entry.value().is_valid())
            .map(|entry| entry.key().clone())
            .collect();

        let expired_count = expired_keys.len();

        for key in expired_keys {
            self.items.remove(&key);
        }

        if expired_count > 0 {
            log::debug!(
                "[{}] evicted {} expired cache entries",
                self.namespace,
                expired_count
            );
        }
    }

    /// Remove the least-recently-accessed entries when at capacity.
    fn evict_least_recently_used(&self) {
        let mut entries: Vec<_> = self
            .items
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_accessed))
            .collect();

        entries.sort_by_key(|(_, last_accessed)| *last_accessed);

        // Evict in a batch so back-to-back inserts don't resort every time.
        let to_remove = (self.max_entries / 4).max(1);
        for (key, _) in entries.into_iter().take(to_remove) {
            self.items.remove(&key);
        }

        log::debug!(
            "[{}] evicted {} least-recently-used cache entries",
            self.namespace,
            to_remove
        );
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str, touch: bool) -> Option<String> {
        if let Some(mut entry) = self.items.get_mut(key) {
            if entry.is_valid() {
                log::debug!("[{}] cache hit for key: {}", self.namespace, key);
                if touch {
                    entry.touch();
                }
                return Some(entry.value.clone());
            }
            drop(entry);
            log::debug!("[{}] cache expired for key: {}", self.namespace, key);
            self.items.remove(key);
        }

        log::debug!("[{}] cache miss for key: {}", self.namespace, key);
        None
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl <= Duration::zero() {
            return;
        }

        // overwriting an existing key never grows the map
        if !self.items.contains_key(key) && self.items.len() >= self.max_entries {
            self.evict_expired();

            if self.items.len() >= self.max_entries {
                self.evict_least_recently_used();
            }
        }

        self.items.insert(key.to_string(), CacheItem::new(value, ttl));
        log::debug!("[{}] stored cache key: {}", self.namespace, key);
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool {
        if ttl <= Duration::zero() {
            return false;
        }

        match self.items.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().is_valid() {
                    false
                } else {
                    occupied.insert(CacheItem::new(value, ttl));
                    true
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(CacheItem::new(value, ttl));
                true
            }
        }
    }

    async fn update(&self, key: &str, value: String) {
        if let Some(mut entry) = self.items.get_mut(key) {
            if entry.is_valid() {
                entry.value = value;
            }
        }
    }

    async fn remove(&self, key: &str) {
        self.items.remove(key);
    }

    async fn clear(&self) {
        self.items.clear();
        log::info!("[{}] cache cleared", self.namespace);
    }

    async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.items.get(key)?;
        if entry.is_valid() {
            Some(entry.remaining_ttl())
        } else {
            None
        }
    }

    async fn wait_until_ready(&self) {}

    async fn stats(&self) -> Option<CacheStats> {
        let total_entries = self.items.len();
        let expired_entries = self
            .items
            .iter()
            .filter(|entry| !entry.value().is_valid())
            .count();

        Some(CacheStats {
            total_entries,
            valid_entries: total_entries - expired_entries,
            expired_entries,
            max_entries: self.max_entries,
        })
    }
}
