use crate::cache::Cache;
use crate::options::CachedFetchOptions;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;

/// Serves cached data immediately and refreshes it in the background at
/// most once per `min_refresh_interval`.
///
/// The refresh slot is claimed with an atomic marker on the backend whose
/// TTL equals the interval, so processes sharing the backend schedule at
/// most one refresh between them. Only a successful non-empty refresh
/// keeps the slot; a failing or empty refresh releases it again so the
/// next hit can retry, leaves the cached value untouched and is only
/// logged.
///
/// On a miss `fetch_fn` runs inline; an empty result (per `is_empty`) is
/// returned but never cached, so the next call retries from scratch.
pub async fn cached_fetch<V, F, Fut, E, P>(
    cache: Cache<V>,
    options: CachedFetchOptions,
    fetch_fn: F,
    is_empty: P,
) -> Result<V, E>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    E: Display + Send + 'static,
    P: Fn(&V) -> bool + Send + Sync + 'static,
{
    let refresh_marker = format!("swr:{}", options.refresh_key);

    if let Some(hit) = cache.get(&options.cache_key).await {
        let due = cache
            .backend()
            .set_if_absent(
                &refresh_marker,
                "1".to_string(),
                options.min_refresh_interval,
            )
            .await;

        if due {
            log::debug!(
                "scheduling background refresh for {}",
                options.refresh_key
            );
            let cache = cache.clone();
            // fire and forget: failures stay inside this task's boundary
            tokio::spawn(async move {
                match fetch_fn().await {
                    Ok(fresh) if is_empty(&fresh) => {
                        log::debug!(
                            "background refresh for {} returned empty; keeping cached value",
                            options.refresh_key
                        );
                        cache.backend().remove(&refresh_marker).await;
                    }
                    Ok(fresh) => {
                        cache.set(&options.cache_key, &fresh, options.ttl).await;
                        log::debug!("background refresh for {} complete", options.refresh_key);
                    }
                    Err(e) => {
                        log::warn!("background refresh for {} failed: {}", options.refresh_key, e);
                        cache.backend().remove(&refresh_marker).await;
                    }
                }
            });
        }

        return Ok(hit);
    }

    let value = fetch_fn().await?;
    if !is_empty(&value) {
        cache.set(&options.cache_key, &value, options.ttl).await;
        cache
            .backend()
            .set_if_absent(
                &refresh_marker,
                "1".to_string(),
                options.min_refresh_interval,
            )
            .await;
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheRegistry;
    use crate::options::CacheOptions;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn options(min_refresh_millis: i64) -> CachedFetchOptions {
        CachedFetchOptions {
            cache_key: "results".to_string(),
            refresh_key: "results".to_string(),
            ttl: Duration::seconds(60),
            min_refresh_interval: Duration::milliseconds(min_refresh_millis),
        }
    }

    async fn registry() -> CacheRegistry {
        CacheRegistry::new(CacheOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn repeated_hits_trigger_no_refresh_within_interval() {
        let registry = registry().await;
        let cache: Cache<Vec<String>> = registry.cache("swr");
        let fetches = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let fetches = fetches.clone();
            let value: Result<_, std::convert::Infallible> = cached_fetch(
                cache.clone(),
                options(60_000),
                move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["a".to_string()])
                },
                |v: &Vec<String>| v.is_empty(),
            )
            .await;
            assert_eq!(value.unwrap(), vec!["a".to_string()]);
        }

        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_runs_after_interval_elapses() {
        let registry = registry().await;
        let cache: Cache<u32> = registry.cache("swr");
        let fetches = Arc::new(AtomicUsize::new(0));

        let fetch = |value: u32| {
            let fetches = fetches.clone();
            move || async move {
                fetches.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::convert::Infallible>(value)
            }
        };

        // populate inline
        cached_fetch(cache.clone(), options(50), fetch(1), |_| false)
            .await
            .unwrap();

        tokio::time::sleep(StdDuration::from_millis(80)).await;

        // hit: returns the stale value, refreshes in the background
        let stale = cached_fetch(cache.clone(), options(50), fetch(2), |_| false)
            .await
            .unwrap();
        assert_eq!(stale, 1);

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("results").await, Some(2));
    }

    #[tokio::test]
    async fn empty_results_are_never_cached() {
        let registry = registry().await;
        let cache: Cache<Vec<String>> = registry.cache("swr");

        let value: Result<_, std::convert::Infallible> = cached_fetch(
            cache.clone(),
            options(60_000),
            || async { Ok(Vec::<String>::new()) },
            |v: &Vec<String>| v.is_empty(),
        )
        .await;

        assert_eq!(value.unwrap(), Vec::<String>::new());
        assert_eq!(cache.get("results").await, None);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_cached_value() {
        let registry = registry().await;
        let cache: Cache<u32> = registry.cache("swr");

        cached_fetch(cache.clone(), options(50), || async { Ok::<_, String>(1) }, |_| {
            false
        })
        .await
        .unwrap();

        tokio::time::sleep(StdDuration::from_millis(80)).await;

        let value = cached_fetch(
            cache.clone(),
            options(50),
            || async { Err::<u32, _>("upstream down".to_string()) },
            |_| false,
        )
        .await
        .unwrap();
        assert_eq!(value, 1);

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(cache.get("results").await, Some(1));
    }

    #[tokio::test]
    async fn failed_refresh_releases_the_slot_for_retry() {
        let registry = registry().await;
        let cache: Cache<u32> = registry.cache("swr");
        let fetches = Arc::new(AtomicUsize::new(0));

        cached_fetch(
            cache.clone(),
            options(60_000),
            || async { Ok::<_, String>(1) },
            |_| false,
        )
        .await
        .unwrap();

        // a failing refresh must not consume the slot for a full interval
        cache.backend().remove("swr:results").await;
        cached_fetch(
            cache.clone(),
            options(60_000),
            || async { Err::<u32, _>("upstream down".to_string()) },
            |_| false,
        )
        .await
        .unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let retried = {
            let fetches = fetches.clone();
            cached_fetch(
                cache.clone(),
                options(60_000),
                move || async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(2)
                },
                |_| false,
            )
            .await
            .unwrap()
        };
        assert_eq!(retried, 1);

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("results").await, Some(2));
    }

    #[tokio::test]
    async fn empty_refresh_releases_the_slot_for_retry() {
        let registry = registry().await;
        let cache: Cache<Vec<String>> = registry.cache("swr");

        cached_fetch(
            cache.clone(),
            options(60_000),
            || async { Ok::<_, String>(vec!["a".to_string()]) },
            |v: &Vec<String>| v.is_empty(),
        )
        .await
        .unwrap();

        cache.backend().remove("swr:results").await;
        cached_fetch(
            cache.clone(),
            options(60_000),
            || async { Ok::<_, String>(Vec::new()) },
            |v: &Vec<String>| v.is_empty(),
        )
        .await
        .unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        // the empty refresh kept the cached value and freed the slot
        assert_eq!(cache.get("results").await, Some(vec!["a".to_string()]));
        assert_eq!(cache.backend().get("swr:results", false).await, None);
    }
}
