//! Durable tier
//!
//! The durable tier keeps the same records as the memory tier, minus the
//! access count, so data survives a restart. Records are never expired here;
//! they are only superseded by newer writes or cleared.

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::{OnceCell, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::clock::{from_epoch_millis, to_epoch_millis};
use crate::{CacheConfig, CacheError};

/// A record as persisted in the durable tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurableRecord {
    pub key: String,
    pub data: Value,
    /// Write time in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl DurableRecord {
    pub fn new(key: impl Into<String>, data: Value, timestamp: SystemTime) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp_ms: to_epoch_millis(timestamp),
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        from_epoch_millis(self.timestamp_ms)
    }
}

/// Persistent key-value store backing the memory tier.
#[async_trait]
pub trait DurableStore: Send + Sync + 'static {
    /// Read the record for `key`, or None if nothing was written.
    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, CacheError>;

    /// Write a record, replacing any previous one for the same key.
    async fn put(&self, record: &DurableRecord) -> Result<(), CacheError>;

    /// Remove every record owned by this store.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Redis-backed durable tier.
///
/// The connection is opened on first use and shared afterwards. Connecting
/// and every command are bounded by `timeout`. After a failed connect, calls
/// fail immediately until `retry_cooldown` has passed, so an unreachable
/// server costs one timeout per cooldown rather than one per lookup.
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    timeout: Duration,
    retry_cooldown: Duration,
    conn: OnceCell<ConnectionManager>,
    last_failure: Mutex<Option<Instant>>,
}

impl RedisStore {
    /// Create a store whose keys are all placed under `prefix`.
    ///
    /// No connection is made until the first operation.
    pub fn new(client: redis::Client, prefix: impl Into<String>) -> Self {
        let defaults = CacheConfig::default();
        Self {
            client,
            prefix: prefix.into(),
            timeout: defaults.durable_timeout,
            retry_cooldown: defaults.durable_retry_cooldown,
            conn: OnceCell::new(),
            last_failure: Mutex::new(None),
        }
    }

    /// Create a store using the prefix and timeouts from `config`.
    pub fn from_config(client: redis::Client, config: &CacheConfig) -> Self {
        Self::new(client, config.durable_key_prefix.clone())
            .with_timeout(config.durable_timeout)
            .with_retry_cooldown(config.durable_retry_cooldown)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_cooldown(mut self, cooldown: Duration) -> Self {
        self.retry_cooldown = cooldown;
        self
    }

    fn format_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn last_failure(&self) -> MutexGuard<'_, Option<Instant>> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let conn = self.conn.get_or_try_init(|| self.open()).await?;
        Ok(conn.clone())
    }

    async fn open(&self) -> Result<ConnectionManager, CacheError> {
        if let Some(failed_at) = *self.last_failure()
            && failed_at.elapsed() < self.retry_cooldown
        {
            return Err(CacheError::Store(
                "durable tier unreachable, waiting before reconnecting".to_owned(),
            ));
        }

        debug!(prefix = %self.prefix, "Opening durable tier connection");
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(self.timeout)
            .set_response_timeout(self.timeout);
        match ConnectionManager::new_with_config(self.client.clone(), config).await {
            Ok(conn) => {
                *self.last_failure() = None;
                Ok(conn)
            }
            Err(e) => {
                warn!(prefix = %self.prefix, error = %e, "Durable tier connection failed");
                *self.last_failure() = Some(Instant::now());
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl DurableStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, CacheError> {
        let mut conn = self.connection().await?;
        let raw = conn
            .get::<_, Option<String>>(self.format_key(key))
            .await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put(&self, record: &DurableRecord) -> Result<(), CacheError> {
        let json = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(self.format_key(&record.key), json).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let pattern = format!("{}*", self.prefix);
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
            if !keys.is_empty() {
                debug!(count = keys.len(), "Deleting durable tier keys");
                conn.del::<_, ()>(keys).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(())
    }
}

/// Process-local durable tier, used when no persistent backend is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, DurableRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, CacheError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, record: &DurableRecord) -> Result<(), CacheError> {
        self.records
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.records.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn memory_store_replaces_by_key() {
        let store = MemoryStore::new();
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        let t1 = t0 + Duration::from_secs(10);

        store
            .put(&DurableRecord::new("cursos", json!([1]), t0))
            .await
            .unwrap();
        store
            .put(&DurableRecord::new("cursos", json!([2]), t1))
            .await
            .unwrap();

        let record = store.get("cursos").await.unwrap().unwrap();
        assert_eq!(record.data, json!([2]));
        assert_eq!(record.timestamp(), t1);
        assert_eq!(store.len().await, 1);

        store.clear().await.unwrap();
        assert!(store.get("cursos").await.unwrap().is_none());
    }

    #[test]
    fn record_json_shape() {
        let record = DurableRecord::new(
            "audioaulas",
            json!([{ "id": 7 }]),
            SystemTime::UNIX_EPOCH + Duration::from_millis(1_500),
        );
        let encoded = serde_json::to_value(&record).unwrap();
        assert_eq!(
            encoded,
            json!({ "key": "audioaulas", "data": [{ "id": 7 }], "timestamp_ms": 1500 })
        );
    }

    #[test]
    fn redis_store_prefixes_keys() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let store = RedisStore::new(client, "warmcache:");
        assert_eq!(store.format_key("cursos"), "warmcache:cursos");
    }

    #[tokio::test]
    async fn unreachable_redis_fails_fast() {
        let client = redis::Client::open("redis://127.0.0.1:1/").unwrap();
        let store = RedisStore::new(client, "warmcache:test:")
            .with_timeout(Duration::from_millis(500))
            .with_retry_cooldown(Duration::from_secs(60));

        let result = tokio::time::timeout(Duration::from_secs(10), async {
            let first = store.get("cursos").await;
            let second = store
                .put(&DurableRecord::new("cursos", json!([1]), SystemTime::now()))
                .await;
            (first, second)
        })
        .await
        .expect("unreachable store should not stall");

        assert!(matches!(result.0, Err(CacheError::Redis(_))));
        // inside the cooldown no new connection is attempted
        assert!(matches!(result.1, Err(CacheError::Store(_))));
    }

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_owned())
    }

    #[tokio::test]
    #[ignore = "requires a running Redis at REDIS_URL"]
    async fn redis_store_round_trip_and_prefix_clear() {
        let client = redis::Client::open(redis_url()).unwrap();
        let store = RedisStore::new(client.clone(), "warmcache:test:rt:");
        let other = RedisStore::new(client, "warmcache:test:other:");
        let written = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        store.clear().await.unwrap();
        other.clear().await.unwrap();
        assert!(store.get("cursos").await.unwrap().is_none());

        let record = DurableRecord::new("cursos", json!([{ "id": 1, "titulo": "Penal" }]), written);
        store.put(&record).await.unwrap();
        other
            .put(&DurableRecord::new("cursos", json!([]), written))
            .await
            .unwrap();

        let stored = store.get("cursos").await.unwrap().unwrap();
        assert_eq!(stored, record);
        assert_eq!(stored.timestamp(), written);

        store.clear().await.unwrap();
        assert!(store.get("cursos").await.unwrap().is_none());
        assert!(other.get("cursos").await.unwrap().is_some());

        other.clear().await.unwrap();
    }
}
