//! Bounded in-memory tier with least-frequently-used eviction
//!
//! Records are ranked by `(access_count, insertion sequence)` in an ordered
//! index, so the eviction victim is always the least accessed record and,
//! among equals, the one inserted first.

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;

/// A record resident in the memory tier
#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub data: Arc<Value>,
    pub timestamp: SystemTime,
    pub access_count: u64,
    seq: u64,
}

impl MemoryRecord {
    fn rank(&self) -> (u64, u64) {
        (self.access_count, self.seq)
    }
}

/// Memory tier keyed by dataset key
#[derive(Debug)]
pub struct MemoryTier {
    capacity: usize,
    records: HashMap<String, MemoryRecord>,
    ranking: BTreeMap<(u64, u64), String>,
    next_seq: u64,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: HashMap::new(),
            ranking: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Insert or replace a record with `access_count = 1`, then prune.
    ///
    /// Returns the keys evicted to stay within capacity.
    pub fn insert(&mut self, key: &str, data: Arc<Value>, timestamp: SystemTime) -> Vec<String> {
        if let Some(old) = self.records.remove(key) {
            self.ranking.remove(&old.rank());
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let record = MemoryRecord {
            data,
            timestamp,
            access_count: 1,
            seq,
        };
        self.ranking.insert(record.rank(), key.to_owned());
        self.records.insert(key.to_owned(), record);

        self.prune()
    }

    /// Look up a record, counting the access.
    pub fn get(&mut self, key: &str) -> Option<&MemoryRecord> {
        let record = self.records.get_mut(key)?;
        self.ranking.remove(&record.rank());
        record.access_count += 1;
        self.ranking.insert(record.rank(), key.to_owned());
        Some(record)
    }

    /// Look up a record without counting the access.
    pub fn peek(&self, key: &str) -> Option<&MemoryRecord> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<MemoryRecord> {
        let record = self.records.remove(key)?;
        self.ranking.remove(&record.rank());
        Some(record)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.ranking.clear();
    }

    fn prune(&mut self) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.records.len() > self.capacity {
            let Some((_, key)) = self.ranking.pop_first() else {
                break;
            };
            self.records.remove(&key);
            evicted.push(key);
        }
        evicted
    }
}
