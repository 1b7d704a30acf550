use super::CacheBackend;
use async_trait::async_trait;
use chrono::Duration;
use redis::aio::ConnectionManager;
use redis::FromRedisValue;

/// Shared key-value backend over a multiplexed redis connection.
///
/// Every operation races against `operation_timeout`; a slow or unreachable
/// store degrades to a miss for reads and a silent drop for writes, so
/// callers never see backend unavailability as an error.
pub struct RedisBackend {
    namespace: String,
    conn: ConnectionManager,
    operation_timeout: std::time::Duration,
}

impl RedisBackend {
    pub fn new(
        conn: ConnectionManager,
        namespace: &str,
        operation_timeout: std::time::Duration,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            conn,
            operation_timeout,
        }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// Runs one command inside the timeout race. Timeouts and connection
    /// errors both collapse to `None`.
    async fn run<T: FromRedisValue>(&self, cmd: redis::Cmd, op: &str) -> Option<T> {
        let mut conn = self.conn.clone();
        match tokio::time::timeout(self.operation_timeout, cmd.query_async(&mut conn)).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log::warn!("[{}] redis {} failed: {}", self.namespace, op, e);
                None
            }
            Err(_) => {
                log::warn!(
                    "[{}] redis {} timed out after {:?}",
                    self.namespace,
                    op,
                    self.operation_timeout
                );
                None
            }
        }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str, _touch: bool) -> Option<String> {
        // redis expires entries itself; no LRU bookkeeping to touch
        let mut cmd = redis::cmd("GET");
        cmd.arg(self.full_key(key));
        self.run::<Option<String>>(cmd, "GET").await.flatten()
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        if ttl <= Duration::zero() {
            return;
        }
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.full_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.num_milliseconds());
        let _: Option<()> = self.run(cmd, "SET").await;
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> bool {
        if ttl <= Duration::zero() {
            return false;
        }
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.full_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.num_milliseconds());
        // nil reply when another caller holds the key
        matches!(
            self.run::<Option<String>>(cmd, "SET NX").await,
            Some(Some(_))
        )
    }

    async fn update(&self, key: &str, value: String) {
        // XX + KEEPTTL: only overwrite a live entry, never touch its expiry
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.full_key(key)).arg(value).arg("XX").arg("KEEPTTL");
        let _: Option<Option<String>> = self.run(cmd, "SET XX").await;
    }

    async fn remove(&self, key: &str) {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(self.full_key(key));
        let _: Option<i64> = self.run(cmd, "DEL").await;
    }

    async fn clear(&self) {
        // scan this namespace only; the store is shared with other
        // namespaces and processes
        let pattern = format!("{}:*", self.namespace);
        let mut cursor: u64 = 0;
        loop {
            let mut cmd = redis::cmd("SCAN");
            cmd.arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100);
            let Some((next, keys)) = self.run::<(u64, Vec<String>)>(cmd, "SCAN").await else {
                return;
            };
            if !keys.is_empty() {
                let mut del = redis::cmd("DEL");
                del.arg(&keys);
                let _: Option<i64> = self.run(del, "DEL").await;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        log::info!("[{}] cache cleared", self.namespace);
    }

    async fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(self.full_key(key));
        let millis: i64 = self.run(cmd, "PTTL").await?;
        // -2 missing key, -1 no expiry set
        if millis < 0 {
            None
        } else {
            Some(Duration::milliseconds(millis))
        }
    }

    async fn wait_until_ready(&self) {
        for attempt in 1..=10 {
            let cmd = redis::cmd("PING");
            if self.run::<String>(cmd, "PING").await.is_some() {
                return;
            }
            log::warn!(
                "[{}] redis not ready yet (attempt {}/10)",
                self.namespace,
                attempt
            );
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }
    }
}
