use crate::error::SingleFlightError;
use crate::options::{SingleFlightOptions, WaitMode};
use crate::stats::SingleFlightStats;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};

type Waiter<T> = oneshot::Sender<Result<T, SingleFlightError>>;

/// Collapses concurrent identical expensive fetches into one in-flight
/// operation.
///
/// Process-local only; cross-process collapsing is the distributed lock's
/// job. The first caller for a key becomes the executor and runs on a
/// fixed-size worker pool; concurrent callers for the same key attach to
/// the same result. Entries are removed when the fetch settles, success or
/// failure, so a later call starts fresh.
pub struct FetchTracker<T> {
    pending: DashMap<String, (DateTime<Utc>, Vec<Waiter<T>>)>,
    limiter: Arc<Semaphore>,
    options: SingleFlightOptions,
}

enum Role<T> {
    Executor,
    Waiter(oneshot::Receiver<Result<T, SingleFlightError>>),
    NotYetAvailable,
}

impl<T> FetchTracker<T>
where
    T: Clone,
{
    pub fn new(options: SingleFlightOptions) -> Self {
        Self {
            pending: DashMap::new(),
            limiter: Arc::new(Semaphore::new(options.max_concurrent)),
            options,
        }
    }

    /// Runs `f` for `key`, or attaches to the fetch already in flight.
    ///
    /// `Ok(None)` is only returned in `WaitMode::Lazy`, meaning a fetch is
    /// in flight and this caller chose not to wait for it.
    pub async fn fetch<F, Fut, E>(&self, key: &str, f: F) -> Result<Option<T>, SingleFlightError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.cleanup_expired();

        let role = match self.pending.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if self.options.mode == WaitMode::Lazy {
                    Role::NotYetAvailable
                } else {
                    let (tx, rx) = oneshot::channel();
                    occupied.get_mut().1.push(tx);
                    Role::Waiter(rx)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert((Utc::now(), Vec::new()));
                Role::Executor
            }
        };

        match role {
            Role::NotYetAvailable => {
                log::debug!("fetch for {} already in flight; not waiting", key);
                Ok(None)
            }
            Role::Waiter(rx) => {
                log::debug!("attaching to in-flight fetch for {}", key);
                let timeout = self
                    .options
                    .timeout
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(30));
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(result)) => result.map(Some),
                    Ok(Err(_)) => {
                        log::warn!("in-flight fetch for {} was dropped", key);
                        Err(SingleFlightError::SenderDropped)
                    }
                    Err(_) => {
                        log::warn!("timed out waiting on in-flight fetch for {}", key);
                        Err(SingleFlightError::Timeout)
                    }
                }
            }
            Role::Executor => {
                let outcome = match self.limiter.acquire().await {
                    Ok(_permit) => f().await.map_err(|e| {
                        log::warn!("fetch for {} failed: {}", key, e);
                        SingleFlightError::FetchFailed(e.to_string())
                    }),
                    Err(_) => Err(SingleFlightError::FetchFailed(
                        "worker pool closed".to_string(),
                    )),
                };

                if let Some((_, (_, waiters))) = self.pending.remove(key) {
                    log::debug!("notifying {} waiters for {}", waiters.len(), key);
                    for waiter in waiters {
                        let _ = waiter.send(outcome.clone());
                    }
                }

                outcome.map(Some)
            }
        }
    }

    /// Drops entries older than the timeout; their waiters receive a
    /// dropped-sender error. Guards against executors cancelled mid-flight.
    fn cleanup_expired(&self) {
        let now = Utc::now();
        let expired_keys: Vec<_> = self
            .pending
            .iter()
            .filter(|entry| (now - entry.value().0) > self.options.timeout)
            .map(|entry| entry.key().clone())
            .collect();

        for key in expired_keys {
            if let Some((_, (_, waiters))) = self.pending.remove(&key) {
                log::debug!(
                    "cleaning up expired fetch for {} with {} waiters",
                    key,
                    waiters.len()
                );
            }
        }
    }

    pub fn stats(&self) -> SingleFlightStats {
        let pending_requests = self.pending.len();
        let total_waiters = self
            .pending
            .iter()
            .map(|entry| entry.value().1.len())
            .sum();

        SingleFlightStats {
            pending_requests,
            total_waiters,
        }
    }

    pub fn clear(&self) {
        self.pending.clear();
        log::info!("fetch tracker cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn concurrent_fetches_collapse_to_one() {
        let tracker = Arc::new(FetchTracker::new(SingleFlightOptions::default()));
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..5 {
            let tracker = tracker.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .fetch("x", || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(100)).await;
                        Ok::<_, String>("payload".to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value, Some("payload".to_string()));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_are_not_collapsed() {
        let tracker = Arc::new(FetchTracker::new(SingleFlightOptions::default()));
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for key in ["a", "b"] {
            let tracker = tracker.clone();
            let executions = executions.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .fetch(key, || async move {
                        executions.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, String>(key.to_string())
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn lazy_mode_returns_not_yet_available() {
        let options = SingleFlightOptions {
            mode: WaitMode::Lazy,
            ..SingleFlightOptions::default()
        };
        let tracker = Arc::new(FetchTracker::<String>::new(options));

        let slow = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .fetch("x", || async {
                        tokio::time::sleep(StdDuration::from_millis(200)).await;
                        Ok::<_, String>("slow".to_string())
                    })
                    .await
            })
        };

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let immediate = tracker
            .fetch("x", || async { Ok::<_, String>("fast".to_string()) })
            .await
            .unwrap();
        assert_eq!(immediate, None);

        assert_eq!(slow.await.unwrap().unwrap(), Some("slow".to_string()));
    }

    #[tokio::test]
    async fn failure_is_shared_and_entry_removed() {
        let tracker = Arc::new(FetchTracker::<String>::new(SingleFlightOptions::default()));

        let outcome = tracker
            .fetch("x", || async { Err::<String, _>("boom".to_string()) })
            .await;
        assert!(matches!(outcome, Err(SingleFlightError::FetchFailed(_))));

        // a later call starts fresh
        let value = tracker
            .fetch("x", || async { Ok::<_, String>("ok".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, Some("ok".to_string()));
    }

    #[tokio::test]
    async fn worker_pool_bounds_concurrency() {
        let options = SingleFlightOptions {
            max_concurrent: 2,
            timeout: Duration::seconds(30),
            mode: WaitMode::Wait,
        };
        let tracker = Arc::new(FetchTracker::new(options));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for i in 0..6 {
            let tracker = tracker.clone();
            let running = running.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                tracker
                    .fetch(&format!("k{}", i), || async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(30)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(i)
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
