mod memory;
mod redis;
mod sqlite;

pub use memory::MemoryBackend;
pub use redis::RedisBackend;
pub use sqlite::SqliteBackend;

use crate::stats::CacheStats;
use async_trait::async_trait;
use chrono::Duration;

/// Uniform surface over the interchangeable cache backends.
///
/// Values are JSON strings; the typed `Cache` facade handles
/// encoding/decoding. Shared backends (redis, sqlite) must treat their own
/// unavailability as a cache miss and never return errors for it.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the value for `key`, deleting it first if it lazily expired.
    /// `touch` refreshes the entry's last-accessed time for LRU bookkeeping;
    /// it never extends the expiry.
    async fn get(&self, key: &str, touch: bool) -> Option<String>;

    /// Stores `value` under `key`. A zero or negative `ttl` is a silent
    /// no-op; non-cacheable results are never stored.
    async fn set(&self, key: &str, value: String, ttl: Duration);

    /// Atomically stores `value` only when `key` is absent (or expired).
    /// Returns whether this caller won. Backbone of the distributed lock.
    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool;

    /// Overwrites the payload of a still-live entry without touching its
    /// TTL. No-op when `key` is absent or expired.
    async fn update(&self, key: &str, value: String);

    async fn remove(&self, key: &str);

    /// Removes every entry owned by this backend instance.
    async fn clear(&self);

    /// Remaining time before `key` expires, if it is live.
    async fn remaining_ttl(&self, key: &str) -> Option<Duration>;

    /// Blocks until the backend answers, or gives up after a few probes.
    async fn wait_until_ready(&self);

    /// Entry counts, where the backend can report them cheaply.
    async fn stats(&self) -> Option<CacheStats> {
        None
    }
}
