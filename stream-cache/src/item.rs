use chrono::{DateTime, Duration, Utc};

/// A single cache entry with its TTL bookkeeping.
///
/// The payload is always a JSON string; typing lives in the `Cache` facade
/// so every backend stores the same representation.
#[derive(Clone, Debug)]
pub struct CacheItem {
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheItem {
    pub fn new(value: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            last_accessed: now,
            ttl,
        }
    }

    /// An item is readable only while `now < created_at + ttl`.
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.created_at + self.ttl
    }

    pub fn remaining_ttl(&self) -> Duration {
        (self.created_at + self.ttl) - Utc::now()
    }

    /// Records an access for LRU bookkeeping. Never extends the expiry.
    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }
}
