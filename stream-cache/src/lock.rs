use crate::backend::CacheBackend;
use crate::error::LockError;
use crate::options::{LockOptions, LockTimeoutPolicy};
use chrono::{Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

/// Named mutual exclusion with compute-once memoization, usable across
/// every process sharing the backend.
///
/// Exactly one concurrent caller per key becomes the executor; its result
/// is published on the backend so waiters reuse it instead of recomputing.
/// With `result_ttl` set to zero nothing is published and the lock is plain
/// mutual exclusion: waiters acquire in turn and each runs the closure.
pub struct DistributedLock {
    backend: Arc<dyn CacheBackend>,
    options: LockOptions,
}

impl DistributedLock {
    pub fn new(backend: Arc<dyn CacheBackend>, options: LockOptions) -> Self {
        Self { backend, options }
    }

    pub fn options(&self) -> &LockOptions {
        &self.options
    }

    /// Runs `f` under the named lock.
    ///
    /// Waiters poll the backend for the executor's published result until
    /// `timeout`. A crashed executor's lock self-releases via its TTL, at
    /// which point a waiter takes over. If the timeout elapses anyway
    /// (degraded backend, executor stuck past the lock TTL), the configured
    /// `LockTimeoutPolicy` decides between running `f` locally — duplicate
    /// upstream work, but forward progress — and surfacing
    /// `LockError::Timeout`.
    pub async fn with_lock<T, F, Fut>(&self, key: &str, f: F) -> Result<T, LockError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock_key = format!("lock:{}", key);
        let result_key = format!("lock-result:{}", key);
        let holder = format!("{}-{}", std::process::id(), Utc::now().timestamp_millis());
        let publish = self.options.result_ttl > Duration::zero();

        let deadline = Utc::now() + self.options.timeout;
        let poll_interval = self
            .options
            .poll_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_millis(100));
        let mut f = Some(f);
        let mut waited = false;

        loop {
            if publish {
                if let Some(raw) = self.backend.get(&result_key, false).await {
                    match serde_json::from_str(&raw) {
                        Ok(value) => {
                            log::debug!("reusing published result for lock {}", key);
                            return Ok(value);
                        }
                        Err(e) => {
                            log::warn!(
                                "published result for lock {} is undecodable ({}); executing locally",
                                key,
                                e
                            );
                            break;
                        }
                    }
                }
            }

            if self
                .backend
                .set_if_absent(&lock_key, holder.clone(), self.options.ttl)
                .await
            {
                // the previous holder may have published between our result
                // poll and this acquisition; re-check before recomputing
                if publish {
                    if let Some(raw) = self.backend.get(&result_key, false).await {
                        self.backend.remove(&lock_key).await;
                        if let Ok(value) = serde_json::from_str(&raw) {
                            log::debug!("reusing published result for lock {}", key);
                            return Ok(value);
                        }
                        break;
                    }
                }

                let Some(f) = f.take() else { break };
                log::debug!("acquired lock {}", key);
                let value = f().await;

                if publish {
                    match serde_json::to_string(&value) {
                        Ok(raw) => {
                            self.backend
                                .set(&result_key, raw, self.options.result_ttl)
                                .await
                        }
                        Err(e) => log::error!("failed to encode result for lock {}: {}", key, e),
                    }
                }
                self.backend.remove(&lock_key).await;
                return Ok(value);
            }

            if Utc::now() >= deadline {
                match self.options.on_timeout {
                    LockTimeoutPolicy::ExecuteLocally => break,
                    LockTimeoutPolicy::Fail => {
                        log::warn!("lock {} timed out after {}", key, self.options.timeout);
                        return Err(LockError::Timeout(key.to_string()));
                    }
                }
            }

            waited = true;
            tokio::time::sleep(poll_interval).await;
        }

        let Some(f) = f.take() else {
            // unreachable: the executor branch returns after consuming f
            return Err(LockError::Timeout(key.to_string()));
        };
        if waited {
            log::warn!(
                "lock {} timed out; executing locally (duplicate upstream work possible)",
                key
            );
        }
        Ok(f().await)
    }
}
