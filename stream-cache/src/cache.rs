use crate::backend::{CacheBackend, MemoryBackend, RedisBackend, SqliteBackend};
use crate::error::CacheError;
use crate::options::{BackendKind, CacheOptions};
use crate::stats::CacheStats;
use chrono::Duration;
use dashmap::DashMap;
use getset::Getters;
use redis::aio::ConnectionManager;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// Typed view over a backend instance.
///
/// Values are encoded as JSON on the way in and decoded on the way out; a
/// value that no longer decodes (schema drift across deploys) is evicted
/// and treated as a miss.
#[derive(Getters)]
pub struct Cache<V> {
    backend: Arc<dyn CacheBackend>,
    #[getset(get = "pub")]
    namespace: String,
    default_ttl: Duration,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Cache<V> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            namespace: self.namespace.clone(),
            default_ttl: self.default_ttl,
            _marker: PhantomData,
        }
    }
}

impl<V> Cache<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(backend: Arc<dyn CacheBackend>, namespace: &str, default_ttl: Duration) -> Self {
        Self {
            backend,
            namespace: namespace.to_string(),
            default_ttl,
            _marker: PhantomData,
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let raw = self.backend.get(key, true).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(
                    "[{}] evicting undecodable cache value for {}: {}",
                    self.namespace,
                    key,
                    e
                );
                self.backend.remove(key).await;
                None
            }
        }
    }

    /// Stores `value` with `ttl`. Best effort: encoding failures and
    /// backend unavailability are logged, never returned.
    pub async fn set(&self, key: &str, value: &V, ttl: Duration) {
        match serde_json::to_string(value) {
            Ok(raw) => self.backend.set(key, raw, ttl).await,
            Err(e) => log::error!(
                "[{}] failed to encode cache value for {}: {}",
                self.namespace,
                key,
                e
            ),
        }
    }

    /// Overwrites the payload of a live entry; the TTL is preserved.
    pub async fn update(&self, key: &str, value: &V) {
        match serde_json::to_string(value) {
            Ok(raw) => self.backend.update(key, raw).await,
            Err(e) => log::error!(
                "[{}] failed to encode cache value for {}: {}",
                self.namespace,
                key,
                e
            ),
        }
    }

    pub async fn remove(&self, key: &str) {
        self.backend.remove(key).await;
    }

    pub async fn clear(&self) {
        self.backend.clear().await;
    }

    pub async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        self.backend.remaining_ttl(key).await
    }

    pub async fn stats(&self) -> Option<CacheStats> {
        self.backend.stats().await
    }

    /// Memoizes `f` under `key`: a hit skips `f` entirely, a miss runs it
    /// and caches the produced value with `ttl` (facade default when
    /// `None`).
    pub async fn wrap<F, Fut, E>(&self, key: &str, ttl: Option<Duration>, f: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = f().await?;
        self.set(key, &value, ttl.unwrap_or(self.default_ttl)).await;
        Ok(value)
    }
}

enum SharedHandle {
    None,
    Redis(ConnectionManager),
    Sqlite(Arc<Mutex<Connection>>),
}

/// One backend instance per named namespace, built once at startup and
/// passed by reference to every component that needs cache access.
#[derive(Getters)]
pub struct CacheRegistry {
    #[getset(get = "pub")]
    options: CacheOptions,
    shared: SharedHandle,
    instances: DashMap<String, Arc<dyn CacheBackend>>,
}

impl CacheRegistry {
    /// Connects to the configured backend. Memory needs no connection;
    /// redis and sqlite failures here are startup errors, not runtime
    /// degradation.
    pub async fn new(options: CacheOptions) -> Result<Self, CacheError> {
        let shared = match options.backend {
            BackendKind::Memory => SharedHandle::None,
            BackendKind::Redis => {
                let client = redis::Client::open(options.redis_url.as_str())
                    .map_err(|e| CacheError::Connection(e.to_string()))?;
                let conn = ConnectionManager::new(client)
                    .await
                    .map_err(|e| CacheError::Connection(e.to_string()))?;
                SharedHandle::Redis(conn)
            }
            BackendKind::Sqlite => {
                let conn = Connection::open(&options.sqlite_path)
                    .map_err(|e| CacheError::Database(e.to_string()))?;
                SqliteBackend::init_schema(&conn)
                    .map_err(|e| CacheError::Database(e.to_string()))?;
                SharedHandle::Sqlite(Arc::new(Mutex::new(conn)))
            }
        };

        log::info!("cache registry ready ({} backend)", options.backend);

        Ok(Self {
            options,
            shared,
            instances: DashMap::new(),
        })
    }

    /// Returns the one backend instance for `namespace`, creating it on
    /// first use.
    pub fn instance(&self, namespace: &str) -> Arc<dyn CacheBackend> {
        self.instances
            .entry(namespace.to_string())
            .or_insert_with(|| self.build_backend(namespace))
            .clone()
    }

    /// Typed facade over [`CacheRegistry::instance`].
    pub fn cache<V>(&self, namespace: &str) -> Cache<V>
    where
        V: Serialize + DeserializeOwned,
    {
        Cache::new(
            self.instance(namespace),
            namespace,
            self.options.default_ttl,
        )
    }

    fn build_backend(&self, namespace: &str) -> Arc<dyn CacheBackend> {
        match &self.shared {
            SharedHandle::None => {
                Arc::new(MemoryBackend::new(namespace, self.options.max_entries))
            }
            SharedHandle::Redis(conn) => Arc::new(RedisBackend::new(
                conn.clone(),
                namespace,
                self.options.operation_timeout_std(),
            )),
            SharedHandle::Sqlite(db) => Arc::new(SqliteBackend::new(
                db.clone(),
                namespace,
                self.options.max_rows,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        title: String,
        size: u64,
    }

    async fn memory_registry() -> CacheRegistry {
        CacheRegistry::new(CacheOptions::default())
            .await
            .expect("memory registry never fails")
    }

    #[tokio::test]
    async fn typed_roundtrip() {
        let registry = memory_registry().await;
        let cache: Cache<Record> = registry.cache("results");
        let record = Record {
            title: "show".to_string(),
            size: 42,
        };

        cache.set("k", &record, Duration::seconds(10)).await;
        assert_eq!(cache.get("k").await, Some(record));
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let registry = memory_registry().await;
        let a: Cache<u32> = registry.cache("a");
        let b: Cache<u32> = registry.cache("b");

        a.set("k", &1, Duration::seconds(10)).await;
        assert_eq!(b.get("k").await, None);

        b.clear().await;
        assert_eq!(a.get("k").await, Some(1));
    }

    #[tokio::test]
    async fn one_instance_per_namespace() {
        let registry = memory_registry().await;
        let first = registry.instance("shared");
        let second = registry.instance("shared");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn wrap_memoizes() {
        let registry = memory_registry().await;
        let cache: Cache<u32> = registry.cache("wrap");
        let mut calls = 0;

        for _ in 0..3 {
            let value: Result<u32, std::convert::Infallible> = cache
                .wrap("k", Some(Duration::seconds(10)), || {
                    calls += 1;
                    async { Ok(7) }
                })
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn undecodable_value_is_evicted() {
        let registry = memory_registry().await;
        let backend = registry.instance("mixed");
        backend
            .set("k", "not json at all".to_string(), Duration::seconds(10))
            .await;

        let cache: Cache<Record> = registry.cache("mixed");
        assert_eq!(cache.get("k").await, None);
        assert_eq!(backend.get("k", false).await, None);
    }
}
