//! Fail-soft wrapper around the remote key-value store.
//!
//! Every operation carries a hard 1s budget and swallows transport errors:
//! reads degrade to misses, writes to no-ops, and a background probe flips
//! [`KvClient::is_connected`] so the cache layer can skip this tier entirely
//! while the store is down (fail-open to the system of record).

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::Duration,
};

use {
    redis::{AsyncCommands, aio::ConnectionManager},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

/// Hard budget per remote operation; beyond it the caller sees a miss.
pub const KV_TIMEOUT: Duration = Duration::from_secs(1);
/// Health probe cadence.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);
/// Consecutive probe failures before the client reports disconnected.
const PROBE_FAILURE_THRESHOLD: u32 = 2;

#[derive(Clone)]
pub struct KvClient {
    manager: Option<ConnectionManager>,
    connected: Arc<AtomicBool>,
    probe_failures: Arc<AtomicU32>,
}

impl KvClient {
    /// A client with no remote tier at all; every read is a miss and every
    /// write a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            manager: None,
            connected: Arc::new(AtomicBool::new(false)),
            probe_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Connect and spawn the background health probe. Connection failure is
    /// not fatal: the client starts disconnected and the probe keeps trying.
    pub async fn connect(url: &str, cancel: CancellationToken) -> Self {
        let client = match redis::Client::open(url) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "invalid key-value store URL, running without remote tier");
                return Self::disabled();
            },
        };
        let manager = match tokio::time::timeout(
            Duration::from_secs(5),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(Ok(m)) => Some(m),
            Ok(Err(e)) => {
                warn!(error = %e, "key-value store unreachable at startup");
                None
            },
            Err(_) => {
                warn!("key-value store connection timed out at startup");
                None
            },
        };

        let kv = Self {
            connected: Arc::new(AtomicBool::new(manager.is_some())),
            probe_failures: Arc::new(AtomicU32::new(0)),
            manager,
        };
        if kv.manager.is_some() {
            info!("key-value store connected");
            kv.spawn_probe(cancel);
        }
        kv
    }

    /// Whether the cache layer should consult the remote tier at all.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.manager.is_some() && self.connected.load(Ordering::Relaxed)
    }

    fn spawn_probe(&self, cancel: CancellationToken) {
        let kv = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PROBE_INTERVAL);
            interval.tick().await; // skip immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {},
                }
                if kv.ping().await {
                    if kv.probe_failures.swap(0, Ordering::Relaxed)
                        >= PROBE_FAILURE_THRESHOLD
                    {
                        info!("key-value store recovered");
                    }
                    kv.connected.store(true, Ordering::Relaxed);
                } else {
                    let failures = kv.probe_failures.fetch_add(1, Ordering::Relaxed) + 1;
                    if failures >= PROBE_FAILURE_THRESHOLD
                        && kv.connected.swap(false, Ordering::Relaxed)
                    {
                        warn!(failures, "key-value store unhealthy, skipping remote tier");
                    }
                }
            }
        });
    }

    async fn conn(&self) -> Option<ConnectionManager> {
        self.manager.clone()
    }

    /// Run a redis future under the per-op budget, translating every failure
    /// into `None`.
    async fn guarded<T>(
        &self,
        label: &str,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(KV_TIMEOUT, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                debug!(label, error = %e, "kv operation failed");
                None
            },
            Err(_) => {
                debug!(label, "kv operation timed out");
                None
            },
        }
    }

    // ── Strings & counters ───────────────────────────────────────────────

    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("set", conn.set_ex::<_, _, ()>(key, value, ttl.as_secs()))
            .await
            .is_some()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.conn().await?;
        self.guarded("get", conn.get::<_, Option<String>>(key))
            .await
            .flatten()
    }

    pub async fn del(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("del", conn.del::<_, ()>(key)).await.is_some()
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("exists", conn.exists::<_, bool>(key))
            .await
            .unwrap_or(false)
    }

    /// Increment a counter, setting its expiry on first increment.
    pub async fn incr(&self, key: &str, ttl: Option<Duration>) -> Option<i64> {
        let mut conn = self.conn().await?;
        let count = self.guarded("incr", conn.incr::<_, _, i64>(key, 1)).await?;
        if count == 1 {
            if let Some(ttl) = ttl {
                let _ = self
                    .guarded("expire", conn.expire::<_, ()>(key, ttl.as_secs() as i64))
                    .await;
            }
        }
        Some(count)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("expire", conn.expire::<_, ()>(key, ttl.as_secs() as i64))
            .await
            .is_some()
    }

    // ── Batches ──────────────────────────────────────────────────────────

    pub async fn mget(&self, keys: &[String]) -> Vec<Option<String>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let Some(mut conn) = self.conn().await else {
            return vec![None; keys.len()];
        };
        // MGET with a single key returns a scalar, so route through a pipe
        // for uniform decoding.
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key);
        }
        self.guarded("mget", pipe.query_async::<Vec<Option<String>>>(&mut conn))
            .await
            .unwrap_or_else(|| vec![None; keys.len()])
    }

    /// Pipelined multi-set, each entry with its own TTL.
    pub async fn mset(&self, entries: &[(String, String, Duration)]) -> bool {
        if entries.is_empty() {
            return true;
        }
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        let mut pipe = redis::pipe();
        for (key, value, ttl) in entries {
            pipe.set_ex(key, value, ttl.as_secs()).ignore();
        }
        self.guarded("mset", pipe.query_async::<()>(&mut conn))
            .await
            .is_some()
    }

    pub async fn del_many(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return true;
        }
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("del_many", conn.del::<_, ()>(keys)).await.is_some()
    }

    /// Collect keys matching `prefix*`. Bounded: gives up at `limit` keys.
    pub async fn scan_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        let Some(mut conn) = self.conn().await else {
            return Vec::new();
        };
        let pattern = format!("{prefix}*");
        let scan = async {
            let mut out = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn)
                    .await?;
                out.extend(keys);
                cursor = next;
                if cursor == 0 || out.len() >= limit {
                    break;
                }
            }
            out.truncate(limit);
            Ok::<_, redis::RedisError>(out)
        };
        self.guarded("scan", scan).await.unwrap_or_default()
    }

    // ── Lists ────────────────────────────────────────────────────────────

    pub async fn list_push(&self, key: &str, value: &str) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("rpush", conn.rpush::<_, _, ()>(key, value))
            .await
            .is_some()
    }

    pub async fn list_pop(&self, key: &str) -> Option<String> {
        let mut conn = self.conn().await?;
        self.guarded("lpop", conn.lpop::<_, Option<String>>(key, None))
            .await
            .flatten()
    }

    /// Remove every occurrence of `value`. Returns how many were removed.
    pub async fn list_remove(&self, key: &str, value: &str) -> i64 {
        let Some(mut conn) = self.conn().await else {
            return 0;
        };
        self.guarded("lrem", conn.lrem::<_, _, i64>(key, 0, value))
            .await
            .unwrap_or(0)
    }

    pub async fn list_range(&self, key: &str) -> Vec<String> {
        let Some(mut conn) = self.conn().await else {
            return Vec::new();
        };
        self.guarded("lrange", conn.lrange::<_, Vec<String>>(key, 0, -1))
            .await
            .unwrap_or_default()
    }

    pub async fn list_len(&self, key: &str) -> i64 {
        let Some(mut conn) = self.conn().await else {
            return 0;
        };
        self.guarded("llen", conn.llen::<_, i64>(key))
            .await
            .unwrap_or(0)
    }

    pub async fn list_trim(&self, key: &str, start: i64, stop: i64) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("ltrim", conn.ltrim::<_, ()>(key, start as isize, stop as isize))
            .await
            .is_some()
    }

    // ── Health ───────────────────────────────────────────────────────────

    pub async fn ping(&self) -> bool {
        let Some(mut conn) = self.conn().await else {
            return false;
        };
        self.guarded("ping", async {
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_client_fails_soft() {
        let kv = KvClient::disabled();
        assert!(!kv.is_connected());
        assert_eq!(kv.get("k").await, None);
        assert!(!kv.set("k", "v", Duration::from_secs(1)).await);
        assert!(!kv.exists("k").await);
        assert_eq!(kv.incr("k", None).await, None);
        assert_eq!(kv.mget(&["a".into(), "b".into()]).await, vec![None, None]);
        assert_eq!(kv.list_range("k").await, Vec::<String>::new());
        assert_eq!(kv.list_len("k").await, 0);
        assert!(!kv.ping().await);
    }
}
