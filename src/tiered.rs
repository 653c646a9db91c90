//! Two-tier read-through cache accessor
//!
//! - Memory tier: bounded, least-frequently-used eviction
//! - Durable tier: pluggable [`DurableStore`] consulted on memory miss
//!
//! Entries are classified by age against two thresholds: younger than
//! `fresh_ttl` is fresh, younger than `usable_ttl` is served but flagged
//! stale, anything older is treated as missing.
//!
//! Durable-tier failures never reach callers. They are counted, logged, and
//! the accessor carries on with the memory tier alone.
//!
//! Writes land in memory immediately. Durable writes are queued to a single
//! background writer so they apply in the order they were made and never
//! hold up the caller.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock, age};
use crate::durable::{DurableRecord, DurableStore, MemoryStore};
use crate::memory::MemoryTier;
use crate::{CacheConfig, CacheError};

/// A cache lookup that found usable data
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub data: Arc<Value>,
    /// True when the entry is older than the fresh threshold
    pub is_stale: bool,
}

/// Point-in-time counters for a [`TwoTierCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub durable_failures: u64,
    pub resident: usize,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    durable_failures: AtomicU64,
}

/// Apply the best-effort policy to a durable-tier result.
fn best_effort<T>(
    counters: &Counters,
    op: &'static str,
    key: &str,
    result: Result<T, CacheError>,
) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            counters.durable_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                op,
                key,
                error = %e,
                "Durable tier error, continuing with memory tier only"
            );
            None
        }
    }
}

enum DurableOp {
    Put(DurableRecord),
    Clear(oneshot::Sender<()>),
    Flush(oneshot::Sender<()>),
}

/// Drain queued durable operations one at a time.
async fn write_behind(
    store: Arc<dyn DurableStore>,
    counters: Arc<Counters>,
    mut rx: mpsc::UnboundedReceiver<DurableOp>,
) {
    while let Some(op) = rx.recv().await {
        match op {
            DurableOp::Put(record) => {
                best_effort(&counters, "put", &record.key, store.put(&record).await);
            }
            DurableOp::Clear(done) => {
                best_effort(&counters, "clear", "*", store.clear().await);
                let _ = done.send(());
            }
            DurableOp::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Durable writer stopped");
}

/// Memory + durable cache keyed by dataset key
pub struct TwoTierCache {
    memory: Mutex<MemoryTier>,
    durable: Arc<dyn DurableStore>,
    clock: Arc<dyn Clock>,
    fresh_ttl: Duration,
    usable_ttl: Duration,
    counters: Arc<Counters>,
    writer: OnceLock<mpsc::UnboundedSender<DurableOp>>,
}

impl TwoTierCache {
    /// Create a cache over the given durable store, timed by the system clock.
    pub fn new(config: &CacheConfig, durable: Arc<dyn DurableStore>) -> Self {
        Self::with_clock(config, durable, Arc::new(SystemClock))
    }

    /// Create a cache whose durable tier lives in process memory.
    pub fn in_memory(config: &CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_clock(
        config: &CacheConfig,
        durable: Arc<dyn DurableStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memory: Mutex::new(MemoryTier::new(config.memory_capacity)),
            durable,
            clock,
            fresh_ttl: config.fresh_ttl,
            usable_ttl: config.usable_ttl,
            counters: Arc::new(Counters::default()),
            writer: OnceLock::new(),
        }
    }

    fn memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an operation for the durable writer, starting it on first use.
    ///
    /// Must be called from within a tokio runtime.
    fn enqueue(&self, op: DurableOp) {
        let tx = self.writer.get_or_init(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(write_behind(
                Arc::clone(&self.durable),
                Arc::clone(&self.counters),
                rx,
            ));
            tx
        });
        if tx.send(op).is_err() {
            self.counters.durable_failures.fetch_add(1, Ordering::Relaxed);
            warn!("Durable writer is gone, continuing with memory tier only");
        }
    }

    /// Get usable data for `key` from memory, then from the durable tier.
    ///
    /// Returns None when neither tier holds an entry younger than the usable
    /// threshold; the caller decides whether to go to the origin.
    pub async fn get(&self, key: &str) -> Option<CacheHit> {
        let now = self.clock.now();

        {
            let mut memory = self.memory();
            let memory_age = memory.peek(key).map(|r| age(now, r.timestamp));
            match memory_age {
                Some(entry_age) if entry_age < self.usable_ttl => {
                    if let Some(record) = memory.get(key) {
                        self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                        debug!(key, access_count = record.access_count, "Cache hit memory");
                        return Some(CacheHit {
                            data: Arc::clone(&record.data),
                            is_stale: entry_age > self.fresh_ttl,
                        });
                    }
                }
                Some(_) => {
                    debug!(key, "Memory entry past usable threshold, dropping");
                    memory.remove(key);
                }
                None => {}
            }
        }

        debug!(key, "Cache miss memory");

        let record = best_effort(&self.counters, "get", key, self.durable.get(key).await).flatten();

        let Some(record) = record else {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Cache miss durable");
            return None;
        };

        let timestamp = record.timestamp();
        let entry_age = age(now, timestamp);
        if entry_age >= self.usable_ttl {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            debug!(
                key,
                age_secs = entry_age.as_secs(),
                "Durable entry past usable threshold"
            );
            return None;
        }

        self.counters.durable_hits.fetch_add(1, Ordering::Relaxed);
        debug!(key, "Cache hit durable, promoting to memory");

        let data = Arc::new(record.data);
        let evicted = self.memory().insert(key, Arc::clone(&data), timestamp);
        if !evicted.is_empty() {
            debug!(?evicted, "Memory tier pruned");
        }

        Some(CacheHit {
            data,
            is_stale: entry_age > self.fresh_ttl,
        })
    }

    /// Write `data` through both tiers.
    ///
    /// The memory write lands before this returns. The durable write is
    /// queued; a failure there is logged and dropped. Must be called from
    /// within a tokio runtime.
    pub fn put(&self, key: &str, data: Arc<Value>) {
        let now = self.clock.now();
        let evicted = self.memory().insert(key, Arc::clone(&data), now);
        if !evicted.is_empty() {
            debug!(?evicted, "Memory tier pruned");
        }

        let record = DurableRecord::new(key, Value::clone(&data), now);
        self.enqueue(DurableOp::Put(record));
    }

    /// Wait until every durable write queued so far has been attempted.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        self.enqueue(DurableOp::Flush(done));
        let _ = wait.await;
    }

    /// Empty both tiers.
    ///
    /// Durable writes queued before the call are applied first, so none of
    /// them can outlive the clear.
    pub async fn clear(&self) {
        self.memory().clear();
        let (done, wait) = oneshot::channel();
        self.enqueue(DurableOp::Clear(done));
        let _ = wait.await;
    }

    /// Whether `key` has usable data resident in memory.
    pub fn is_in_memory(&self, key: &str) -> bool {
        self.get_from_memory(key).is_some()
    }

    /// Memory-only lookup that leaves the access count untouched.
    pub fn get_from_memory(&self, key: &str) -> Option<Arc<Value>> {
        let now = self.clock.now();
        let memory = self.memory();
        let record = memory.peek(key)?;
        if age(now, record.timestamp) >= self.usable_ttl {
            return None;
        }
        Some(Arc::clone(&record.data))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            durable_hits: self.counters.durable_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            durable_failures: self.counters.durable_failures.load(Ordering::Relaxed),
            resident: self.memory().len(),
        }
    }
}
