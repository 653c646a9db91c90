//! Downstream UI data layer
//!
//! Warmers push every dataset they obtain into the UI's query cache so the
//! interface can render without issuing its own request.

use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::CacheConfig;

/// Receiver of warmed datasets, shaped like a query client's `setQueryData`.
#[async_trait]
pub trait DataLayer: Send + Sync + 'static {
    async fn set_query_data(&self, key: &str, data: Arc<Value>);
}

/// In-process query cache backed by Moka.
///
/// Holds the latest value published for each query key; a publish replaces
/// the previous value.
#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<String, Arc<Value>>,
}

impl QueryCache {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
        }
    }

    /// Create a query cache sized by `query_cache_capacity`.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.query_cache_capacity)
    }

    pub async fn get_query_data(&self, key: &str) -> Option<Arc<Value>> {
        self.entries.get(key).await
    }

    pub async fn remove_query_data(&self, key: &str) {
        self.entries.invalidate(key).await;
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

#[async_trait]
impl DataLayer for QueryCache {
    async fn set_query_data(&self, key: &str, data: Arc<Value>) {
        debug!(key, "Query data updated");
        self.entries.insert(key.to_owned(), data).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn latest_publish_wins() {
        let layer = QueryCache::default();
        layer.set_query_data("cursos", Arc::new(json!([1]))).await;
        layer.set_query_data("cursos", Arc::new(json!([2]))).await;

        assert_eq!(*layer.get_query_data("cursos").await.unwrap(), json!([2]));
        assert!(layer.get_query_data("biblioteca").await.is_none());

        layer.remove_query_data("cursos").await;
        assert!(layer.get_query_data("cursos").await.is_none());
    }

    #[tokio::test]
    async fn capacity_comes_from_config() {
        let config = CacheConfig {
            query_cache_capacity: 2,
            ..Default::default()
        };
        let layer = QueryCache::from_config(&config);
        for key in ["cursos", "biblioteca", "audioaulas", "videoaulas"] {
            layer.set_query_data(key, Arc::new(json!([]))).await;
        }
        layer.entries.run_pending_tasks().await;

        assert!(layer.entries.entry_count() <= 2);
    }
}
