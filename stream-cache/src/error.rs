use thiserror::Error;

/// Errors raised while building the cache substrate.
///
/// Availability problems at runtime (backend timeouts, connection drops)
/// never surface as errors; backends degrade to a cache miss and log
/// instead. These variants cover startup and programmer mistakes only.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache options: {0}")]
    InvalidOptions(String),
    #[error("failed to open cache database: {0}")]
    Database(String),
    #[error("failed to connect to shared cache: {0}")]
    Connection(String),
}

/// Errors from [`crate::lock::DistributedLock::with_lock`].
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out waiting for lock on {0}")]
    Timeout(String),
}

/// Errors from [`crate::single_flight::FetchTracker::fetch`].
///
/// `Clone` so one failed execution can be fanned out to every waiter.
#[derive(Debug, Clone, Error)]
pub enum SingleFlightError {
    #[error("request timed out")]
    Timeout,
    #[error("sender was dropped")]
    SenderDropped,
    #[error("fetch failed: {0}")]
    FetchFailed(String),
}
