//! Cache configuration

use serde::Deserialize;
use std::time::Duration;

use crate::CacheError;

/// Configuration for the two-tier cache and its warmers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of records resident in the memory tier
    pub memory_capacity: usize,
    /// Entries younger than this are served as fresh
    pub fresh_ttl: Duration,
    /// Entries older than this are treated as missing
    pub usable_ttl: Duration,
    /// Delay before the one-shot background revalidation fires
    pub revalidation_delay: Duration,
    /// Gap between consecutive idle route prefetches
    pub prefetch_stagger: Duration,
    /// Delay before warming routes related to the current one
    pub contextual_delay: Duration,
    /// Prefix applied to every durable-tier key
    pub durable_key_prefix: String,
    /// Bound on connecting to, and each command against, the durable tier
    pub durable_timeout: Duration,
    /// How long a durable tier that failed to connect is left alone
    pub durable_retry_cooldown: Duration,
    /// Maximum number of query keys held by the UI query cache
    pub query_cache_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 100,
            fresh_ttl: Duration::from_secs(12 * 60 * 60), // 12 hours
            usable_ttl: Duration::from_secs(24 * 60 * 60), // 24 hours
            revalidation_delay: Duration::from_secs(5 * 60), // 5 minutes
            prefetch_stagger: Duration::from_millis(150),
            contextual_delay: Duration::from_millis(300),
            durable_key_prefix: "warmcache:".to_owned(),
            durable_timeout: Duration::from_secs(2),
            durable_retry_cooldown: Duration::from_secs(30),
            query_cache_capacity: 1000,
        }
    }
}

impl CacheConfig {
    /// Check the thresholds are coherent.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.memory_capacity == 0 {
            return Err(CacheError::Config(
                "memory_capacity must be at least 1".to_owned(),
            ));
        }
        if self.fresh_ttl > self.usable_ttl {
            return Err(CacheError::Config(format!(
                "fresh_ttl ({:?}) exceeds usable_ttl ({:?})",
                self.fresh_ttl, self.usable_ttl
            )));
        }
        Ok(())
    }
}
