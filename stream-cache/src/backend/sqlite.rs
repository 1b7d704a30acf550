use super::CacheBackend;
use crate::stats::CacheStats;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Only one expired-row sweep loop may exist per process, no matter how
/// many namespaces share the database.
static MAINTENANCE_STARTED: AtomicBool = AtomicBool::new(false);

const SWEEP_INTERVAL_SECS: u64 = 3600;

/// Relational backend over a single shared table:
/// `cache(key TEXT PRIMARY KEY, value TEXT, expires_at INTEGER, last_accessed TIMESTAMP)`.
///
/// Namespaces share the connection and table; keys are prefixed. A poisoned
/// connection mutex is treated like an unavailable backend: reads miss,
/// writes drop.
pub struct SqliteBackend {
    namespace: String,
    db: Arc<Mutex<Connection>>,
    max_rows: usize,
}

impl SqliteBackend {
    pub fn new(db: Arc<Mutex<Connection>>, namespace: &str, max_rows: usize) -> Self {
        let backend = Self {
            namespace: namespace.to_string(),
            db,
            max_rows,
        };
        backend.start_maintenance();
        backend
    }

    /// Creates the cache table. Called once when the registry opens the
    /// database.
    pub fn init_schema(db: &Connection) -> rusqlite::Result<()> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT,
                expires_at INTEGER,
                last_accessed TIMESTAMP
            )",
            [],
        )?;
        Ok(())
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Spawns the hourly sweep deleting rows past expiry. Idempotent: the
    /// process-wide flag makes later calls no-ops, and outside a tokio
    /// runtime (sync tests) no loop is started at all.
    fn start_maintenance(&self) {
        if MAINTENANCE_STARTED
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            MAINTENANCE_STARTED.store(false, Ordering::SeqCst);
            return;
        };

        let db = self.db.clone();
        handle.spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
            // the first tick fires immediately; skip it
            interval.tick().await;
            loop {
                interval.tick().await;
                let now = Utc::now().timestamp_millis();
                let swept = {
                    let Ok(db) = db.lock() else { continue };
                    db.execute("DELETE FROM cache WHERE expires_at <= ?1", params![now])
                };
                match swept {
                    Ok(rows) => log::debug!("cache sweep deleted {} expired rows", rows),
                    Err(e) => log::warn!("cache sweep failed: {}", e),
                }
            }
        });
        log::info!("started hourly cache sweep");
    }

    /// Evict the globally oldest-accessed rows once the row cap is exceeded.
    fn enforce_row_cap(&self, db: &Connection) {
        let count: i64 = match db.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0)) {
            Ok(count) => count,
            Err(e) => {
                log::warn!("[{}] row count failed: {}", self.namespace, e);
                return;
            }
        };

        let over = count - self.max_rows as i64;
        if over <= 0 {
            return;
        }

        let evicted = db.execute(
            "DELETE FROM cache WHERE key IN (
                SELECT key FROM cache ORDER BY last_accessed ASC LIMIT ?1
            )",
            params![over],
        );
        match evicted {
            Ok(rows) => log::debug!(
                "[{}] evicted {} oldest-accessed cache rows",
                self.namespace,
                rows
            ),
            Err(e) => log::warn!("[{}] row cap eviction failed: {}", self.namespace, e),
        }
    }
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn get(&self, key: &str, touch: bool) -> Option<String> {
        let full_key = self.full_key(key);
        let now = Utc::now().timestamp_millis();
        let Ok(db) = self.db.lock() else { return None };

        let row = db
            .query_row(
                "SELECT value, expires_at FROM cache WHERE key = ?1",
                params![full_key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional();

        let (value, expires_at) = match row {
            Ok(Some(row)) => row,
            Ok(None) => {
                log::debug!("[{}] cache miss for key: {}", self.namespace, key);
                return None;
            }
            Err(e) => {
                log::warn!("[{}] cache read failed: {}", self.namespace, e);
                return None;
            }
        };

        if expires_at <= now {
            log::debug!("[{}] cache expired for key: {}", self.namespace, key);
            if let Err(e) = db.execute("DELETE FROM cache WHERE key = ?1", params![full_key]) {
                log::warn!("[{}] stale row delete failed: {}", self.namespace, e);
            }
            return None;
        }

        if touch {
            if let Err(e) = db.execute(
                "UPDATE cache SET last_accessed = ?1 WHERE key = ?2",
                params![now, full_key],
            ) {
                log::warn!("[{}] touch failed: {}", self.namespace, e);
            }
        }

        log::debug!("[{}] cache hit for key: {}", self.namespace, key);
        Some(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl <= Duration::zero() {
            return;
        }
        let full_key = self.full_key(key);
        let now = Utc::now().timestamp_millis();
        let expires_at = now + ttl.num_milliseconds();
        let Ok(db) = self.db.lock() else { return };

        if let Err(e) = db.execute(
            "INSERT OR REPLACE INTO cache (key, value, expires_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4)",
            params![full_key, value, expires_at, now],
        ) {
            log::warn!("[{}] cache write failed: {}", self.namespace, e);
            return;
        }

        self.enforce_row_cap(&db);
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool {
        if ttl <= Duration::zero() {
            return false;
        }
        let full_key = self.full_key(key);
        let now = Utc::now().timestamp_millis();
        let expires_at = now + ttl.num_milliseconds();
        let Ok(db) = self.db.lock() else { return false };

        // drop an expired row first so it can be reclaimed
        if let Err(e) = db.execute(
            "DELETE FROM cache WHERE key = ?1 AND expires_at <= ?2",
            params![full_key, now],
        ) {
            log::warn!("[{}] stale row delete failed: {}", self.namespace, e);
        }

        match db.execute(
            "INSERT OR IGNORE INTO cache (key, value, expires_at, last_accessed)
             VALUES (?1, ?2, ?3, ?4)",
            params![full_key, value, expires_at, now],
        ) {
            Ok(rows) => rows > 0,
            Err(e) => {
                log::warn!("[{}] conditional write failed: {}", self.namespace, e);
                false
            }
        }
    }

    async fn update(&self, key: &str, value: String) {
        let full_key = self.full_key(key);
        let now = Utc::now().timestamp_millis();
        let Ok(db) = self.db.lock() else { return };

        if let Err(e) = db.execute(
            "UPDATE cache SET value = ?1 WHERE key = ?2 AND expires_at > ?3",
            params![value, full_key, now],
        ) {
            log::warn!("[{}] cache update failed: {}", self.namespace, e);
        }
    }

    async fn remove(&self, key: &str) {
        let full_key = self.full_key(key);
        let Ok(db) = self.db.lock() else { return };
        if let Err(e) = db.execute("DELETE FROM cache WHERE key = ?1", params![full_key]) {
            log::warn!("[{}] cache delete failed: {}", self.namespace, e);
        }
    }

    async fn clear(&self) {
        let prefix = format!("{}:%", self.namespace);
        let Ok(db) = self.db.lock() else { return };
        match db.execute("DELETE FROM cache WHERE key LIKE ?1", params![prefix]) {
            Ok(rows) => log::info!("[{}] cache cleared ({} rows)", self.namespace, rows),
            Err(e) => log::warn!("[{}] cache clear failed: {}", self.namespace, e),
        }
    }

    async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let full_key = self.full_key(key);
        let now = Utc::now().timestamp_millis();
        let Ok(db) = self.db.lock() else { return None };

        let expires_at = db
            .query_row(
                "SELECT expires_at FROM cache WHERE key = ?1",
                params![full_key],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .ok()
            .flatten()?;

        if expires_at <= now {
            return None;
        }
        Some(Duration::milliseconds(expires_at - now))
    }

    async fn wait_until_ready(&self) {
        let Ok(db) = self.db.lock() else { return };
        if let Err(e) = db.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)) {
            log::warn!("[{}] cache database probe failed: {}", self.namespace, e);
        }
    }

    async fn stats(&self) -> Option<CacheStats> {
        let prefix = format!("{}:%", self.namespace);
        let now = Utc::now().timestamp_millis();
        let Ok(db) = self.db.lock() else { return None };

        let total: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM cache WHERE key LIKE ?1",
                params![prefix],
                |row| row.get(0),
            )
            .ok()?;
        let expired: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM cache WHERE key LIKE ?1 AND expires_at <= ?2",
                params![prefix, now],
                |row| row.get(0),
            )
            .ok()?;

        Some(CacheStats {
            total_entries: total as usize,
            valid_entries: (total - expired) as usize,
            expired_entries: expired as usize,
            max_entries: self.max_rows,
        })
    }
}
