//! Key/value backends shared by the response cache and the rate limiter.
//!
//! Callers hold an `Option<SharedStore>`: `None` means "no store configured
//! or reachable" and every consumer treats it as a pass-through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::ConnectionInfo;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{Config, StoreBackend};
use crate::constants::{
    MEMORY_STORE_SWEEP_INTERVAL_SECONDS, STORE_CONNECT_ATTEMPTS, STORE_RETRY_MAX_DELAY_MS,
    STORE_RETRY_STEP_MS,
};
use crate::types::SharedStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()>;

    /// Atomically increments the integer at `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64>;

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()>;
}

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(info: ConnectionInfo) -> Result<Self> {
        let client = redis::Client::open(info).context("Invalid Redis connection settings")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis GET {key} failed"))?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis SETEX {key} failed"))?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis INCR {key} failed"))?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .with_context(|| format!("Redis EXPIRE {key} failed"))?;
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| deadline > now)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, MemoryEntry>,
    last_sweep: Option<Instant>,
}

impl MemoryState {
    fn live_mut(&mut self, key: &str, now: Instant) -> Option<&mut MemoryEntry> {
        if self.entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Drops expired keys nobody reads again (old rate-limit windows), at most
    /// once per sweep interval.
    fn sweep_if_due(&mut self, now: Instant) {
        let interval = Duration::from_secs(MEMORY_STORE_SWEEP_INTERVAL_SECONDS);
        if self
            .last_sweep
            .is_some_and(|last| now.duration_since(last) < interval)
        {
            return;
        }
        self.entries.retain(|_, entry| entry.is_live(now));
        self.last_sweep = Some(now);
    }
}

/// Single-process store with Redis-like TTL and INCR semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn live_entries(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().await;
        state.entries.values().filter(|entry| entry.is_live(now)).count()
    }

    #[cfg(test)]
    async fn stored_keys(&self) -> usize {
        self.state.lock().await.entries.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state.live_mut(key, now).map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: String, ttl_seconds: u64) -> Result<()> {
        if ttl_seconds == 0 {
            bail!("Invalid expire time for {key}");
        }
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep_if_due(now);
        state.entries.insert(
            key.to_string(),
            MemoryEntry {
                value,
                expires_at: Some(now + Duration::from_secs(ttl_seconds)),
            },
        );
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.sweep_if_due(now);
        match state.live_mut(key, now) {
            Some(entry) => {
                let current = entry
                    .value
                    .parse::<i64>()
                    .with_context(|| format!("Value at {key} is not an integer"))?;
                let next = current
                    .checked_add(1)
                    .with_context(|| format!("Increment would overflow at {key}"))?;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                state.entries.insert(
                    key.to_string(),
                    MemoryEntry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl_seconds: u64) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        if let Some(entry) = state.live_mut(key, now) {
            entry.expires_at = Some(now + Duration::from_secs(ttl_seconds));
        }
        Ok(())
    }
}

/// Builds the configured store, or `None` when it is disabled, unconfigured
/// or unreachable. Never fails the process.
pub async fn connect_store(cfg: &Config) -> Option<SharedStore> {
    match cfg.store_backend {
        StoreBackend::Disabled => {
            info!("Key/value store disabled, running without cache or rate limits");
            None
        }
        StoreBackend::Memory => {
            info!("Using in-process key/value store");
            Some(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Redis => {
            match cfg.redis.connection_info() {
                Ok(Some(info)) => connect_redis_with_retry(info, cfg.request_timeout).await,
                Ok(None) => {
                    info!("Redis not configured, running without cache or rate limits");
                    None
                }
                Err(error) => {
                    warn!("{error:#}, running without cache or rate limits");
                    None
                }
            }
        }
    }
}

async fn connect_redis_with_retry(
    info: ConnectionInfo,
    attempt_timeout: Duration,
) -> Option<SharedStore> {
    for attempt in 1..=STORE_CONNECT_ATTEMPTS {
        match tokio::time::timeout(attempt_timeout, RedisStore::connect(info.clone())).await {
            Ok(Ok(store)) => {
                info!("Redis connected to {}", info.addr);
                return Some(Arc::new(store));
            }
            Ok(Err(error)) => {
                warn!("Redis connection attempt {attempt} failed: {error:#}");
            }
            Err(_) => {
                warn!("Redis connection attempt {attempt} timed out");
            }
        }
        if attempt < STORE_CONNECT_ATTEMPTS {
            tokio::time::sleep(retry_delay(attempt)).await;
        }
    }

    warn!(
        "Redis connection failed after {} attempts, running without cache",
        STORE_CONNECT_ATTEMPTS
    );
    None
}

fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis((u64::from(attempt) * STORE_RETRY_STEP_MS).min(STORE_RETRY_MAX_DELAY_MS))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn set_ex_expires_after_ttl() {
        let store = MemoryStore::new();
        store.set_ex("k", "v".to_string(), 10).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.live_entries().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_are_swept_once_per_interval() {
        let store = MemoryStore::new();
        for window in 0..5 {
            let key = format!("rl:user:ip:10.0.0.1:{window}");
            store.incr(&key).await.unwrap();
            store.expire(&key, 1).await.unwrap();
        }
        assert_eq!(store.stored_keys().await, 5);

        tokio::time::advance(Duration::from_secs(2)).await;
        store.incr("rl:user:ip:10.0.0.1:5").await.unwrap();
        assert_eq!(store.stored_keys().await, 6);
        assert_eq!(store.live_entries().await, 1);

        tokio::time::advance(Duration::from_secs(MEMORY_STORE_SWEEP_INTERVAL_SECONDS)).await;
        store.set_ex("cache:/x", "{}".to_string(), 600).await.unwrap();
        assert_eq!(store.stored_keys().await, 2);
    }

    #[tokio::test]
    async fn set_ex_rejects_zero_ttl() {
        let store = MemoryStore::new();
        assert!(store.set_ex("k", "v".to_string(), 0).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn incr_counts_and_restarts_after_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("counter").await.unwrap(), 1);
        store.expire("counter", 60).await.unwrap();
        assert_eq!(store.incr("counter").await.unwrap(), 2);
        assert_eq!(store.incr("counter").await.unwrap(), 3);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(store.incr("counter").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn incr_on_text_value_is_an_error() {
        let store = MemoryStore::new();
        store.set_ex("k", "hello".to_string(), 30).await.unwrap();
        assert!(store.incr("k").await.is_err());
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_a_no_op() {
        let store = MemoryStore::new();
        store.expire("missing", 30).await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn disabled_and_unconfigured_backends_yield_no_store() {
        let mut cfg = Config::default();
        cfg.store_backend = StoreBackend::Disabled;
        assert!(connect_store(&cfg).await.is_none());

        cfg.store_backend = StoreBackend::Redis;
        assert!(connect_store(&cfg).await.is_none());

        cfg.store_backend = StoreBackend::Memory;
        assert!(connect_store(&cfg).await.is_some());
    }

    #[test]
    fn retry_delay_grows_linearly_and_is_capped() {
        assert_eq!(retry_delay(1), Duration::from_millis(50));
        assert_eq!(retry_delay(3), Duration::from_millis(150));
        assert_eq!(retry_delay(100), Duration::from_millis(2000));
    }
}
