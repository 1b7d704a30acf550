pub mod backend;
pub mod cache;
mod error;
mod fetch;
mod item;
mod key;
mod lock;
mod options;
mod single_flight;
mod stats;


pub use backend::{CacheBackend, MemoryBackend, RedisBackend, SqliteBackend};
pub use cache::{Cache, CacheRegistry};
pub use error::{CacheError, LockError, SingleFlightError};
pub use fetch::cached_fetch;
pub use item::CacheItem;
pub use key::fetch_key;
pub use lock::DistributedLock;
pub use options::{
    BackendKind, CacheOptions, CachedFetchOptions, LockOptions, LockTimeoutPolicy,
    SingleFlightOptions, WaitMode,
};
pub use single_flight::FetchTracker;
pub use stats::{CacheStats, SingleFlightStats};
