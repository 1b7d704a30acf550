use serde::{Deserialize, Serialize};

#[cfg(feature = "graphql")]
use async_graphql::SimpleObject;

/// Cache statistics, reported by the countable backends (memory, sqlite).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub max_entries: usize,
}

/// Statistics for the single-flight fetch tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(SimpleObject))]
pub struct SingleFlightStats {
    pub pending_requests: usize,
    pub total_waiters: usize,
}
