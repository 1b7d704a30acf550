use chrono::Duration;
use strum_macros::{Display, EnumString};

/// Which backend the registry builds for each namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BackendKind {
    /// Process-local map, lost on restart.
    Memory,
    /// Shared key-value store, coordinates multiple processes.
    Redis,
    /// Relational table, survives restarts of single-process deployments.
    Sqlite,
}

/// Configuration for the cache substrate, supplied once at startup.
#[derive(Clone, Debug)]
pub struct CacheOptions {
    pub backend: BackendKind,
    /// Connection URL, used when `backend` is `Redis`.
    pub redis_url: String,
    /// Database file path, used when `backend` is `Sqlite`.
    pub sqlite_path: String,
    /// Default TTL applied by `Cache::wrap` when none is given.
    pub default_ttl: Duration,
    /// Per-namespace entry cap for the memory backend.
    pub max_entries: usize,
    /// Global row cap for the relational backend.
    pub max_rows: usize,
    /// Budget for every shared-backend call; slower calls degrade to a miss.
    pub operation_timeout: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            backend: BackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            sqlite_path: "stream-cache.db".to_string(),
            default_ttl: Duration::minutes(15),
            max_entries: 1000,
            max_rows: 10_000,
            operation_timeout: Duration::seconds(5),
        }
    }
}

impl CacheOptions {
    pub fn operation_timeout_std(&self) -> std::time::Duration {
        self.operation_timeout
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(5))
    }
}

/// What a waiter does when the lock timeout elapses with no published result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
pub enum LockTimeoutPolicy {
    /// Run the closure locally. Guarantees forward progress at the cost of
    /// possible duplicate upstream work.
    ExecuteLocally,
    /// Surface `LockError::Timeout` to the caller.
    Fail,
}

/// Tunables for [`crate::lock::DistributedLock`].
#[derive(Clone, Debug)]
pub struct LockOptions {
    /// How long a waiter polls for the executor's result.
    pub timeout: Duration,
    /// Lock expiry; a crashed executor's lock self-releases after this.
    pub ttl: Duration,
    /// How long the published result stays readable. Zero disables result
    /// publication entirely, turning the lock into plain mutual exclusion
    /// where every caller eventually executes.
    pub result_ttl: Duration,
    /// Delay between waiter polls of the shared backend.
    pub poll_interval: Duration,
    pub on_timeout: LockTimeoutPolicy,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::seconds(30),
            ttl: Duration::seconds(60),
            result_ttl: Duration::seconds(60),
            poll_interval: Duration::milliseconds(100),
            on_timeout: LockTimeoutPolicy::ExecuteLocally,
        }
    }
}

/// Keys and cadence for [`crate::fetch::cached_fetch`].
#[derive(Clone, Debug)]
pub struct CachedFetchOptions {
    /// Where the fetched value lives.
    pub cache_key: String,
    /// Identifies the refresh schedule; several cache keys may share one.
    pub refresh_key: String,
    /// TTL for the cached value.
    pub ttl: Duration,
    /// A cache hit triggers at most one background refresh per interval.
    pub min_refresh_interval: Duration,
}

/// Whether a single-flight caller attaches to an in-flight fetch or not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitMode {
    /// Attach and wait for the in-flight result.
    Wait,
    /// Return "not yet available" immediately; staleness is acceptable and
    /// blocking the caller is worse than a temporary miss.
    Lazy,
}

/// Tunables for [`crate::single_flight::FetchTracker`].
#[derive(Clone, Debug)]
pub struct SingleFlightOptions {
    /// Size of the worker pool executing fetches.
    pub max_concurrent: usize,
    /// How long waiters and stale entries are kept before timing out.
    pub timeout: Duration,
    pub mode: WaitMode,
}

impl Default for SingleFlightOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            timeout: Duration::seconds(30),
            mode: WaitMode::Wait,
        }
    }
}
