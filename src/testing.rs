//! Test doubles shared by the unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::data_layer::DataLayer;
use crate::durable::{DurableRecord, DurableStore, MemoryStore};
use crate::origin::{Origin, TableQuery};
use crate::{BoxError, CacheError};

/// Durable store that fails every operation, like a full or missing store.
pub struct FailingStore;

#[async_trait]
impl DurableStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<DurableRecord>, CacheError> {
        Err(CacheError::Store("store unavailable".to_owned()))
    }

    async fn put(&self, _record: &DurableRecord) -> Result<(), CacheError> {
        Err(CacheError::Store("quota exceeded".to_owned()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::Store("store unavailable".to_owned()))
    }
}

/// In-process store whose every operation takes `delay`.
pub struct SlowStore {
    records: MemoryStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            records: MemoryStore::new(),
            delay,
        }
    }

    pub fn records(&self) -> &MemoryStore {
        &self.records
    }
}

#[async_trait]
impl DurableStore for SlowStore {
    async fn get(&self, key: &str) -> Result<Option<DurableRecord>, CacheError> {
        tokio::time::sleep(self.delay).await;
        self.records.get(key).await
    }

    async fn put(&self, record: &DurableRecord) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.records.put(record).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        tokio::time::sleep(self.delay).await;
        self.records.clear().await
    }
}

/// Origin answering from canned rows and counting every fetch.
#[derive(Default)]
pub struct CountingOrigin {
    rows: HashMap<&'static str, Value>,
    failing: HashSet<&'static str>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    per_table: Mutex<HashMap<&'static str, usize>>,
}

impl CountingOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, table: &'static str, rows: Value) -> Self {
        self.rows.insert(table, rows);
        self
    }

    pub fn failing(mut self, table: &'static str) -> Self {
        self.failing.insert(table);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, table: &str) -> usize {
        self.per_table
            .lock()
            .unwrap()
            .get(table)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl Origin for CountingOrigin {
    async fn fetch(&self, query: &TableQuery) -> Result<Value, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .per_table
            .lock()
            .unwrap()
            .entry(query.table)
            .or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(query.table) {
            return Err(format!("origin refused {}", query.table).into());
        }
        Ok(self
            .rows
            .get(query.table)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }
}

/// Data layer that records every publish.
#[derive(Default)]
pub struct RecordingDataLayer {
    calls: Mutex<Vec<(String, Arc<Value>)>>,
}

impl RecordingDataLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<(String, Arc<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, key: &str) -> Vec<Arc<Value>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| Arc::clone(v))
            .collect()
    }
}

#[async_trait]
impl DataLayer for RecordingDataLayer {
    async fn set_query_data(&self, key: &str, data: Arc<Value>) {
        self.calls.lock().unwrap().push((key.to_owned(), data));
    }
}
