//! Cache-then-origin loading shared by every warmer
//!
//! A [`Loader`] ties the two-tier cache, the origin and the (optional) UI data
//! layer together:
//! - cached data is published to the data layer as soon as it is found
//! - origin results are written through both cache tiers, then published
//! - concurrent refreshes of one key share a single origin fetch

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::CacheError;
use crate::data_layer::DataLayer;
use crate::origin::{Origin, TableQuery};
use crate::tiered::{CacheHit, TwoTierCache};

/// Represents an in-flight origin fetch that other refreshes can wait on
type InFlightFetch = watch::Receiver<Option<Result<Arc<Value>, String>>>;
type InFlightSender = watch::Sender<Option<Result<Arc<Value>, String>>>;
type InFlightMap = Arc<Mutex<HashMap<String, InFlightFetch>>>;

fn lock(map: &InFlightMap) -> MutexGuard<'_, HashMap<String, InFlightFetch>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Guard that clears the in-flight entry even if the fetch is cancelled.
///
/// When dropped without [`InFlightGuard::complete`], waiters are told the
/// fetch was abandoned.
struct InFlightGuard {
    key: String,
    in_flight: InFlightMap,
    tx: Option<InFlightSender>,
}

impl InFlightGuard {
    fn complete(mut self, result: Result<Arc<Value>, String>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(result));
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Some(Err("Fetch was cancelled".to_owned())));
        }
        lock(&self.in_flight).remove(&self.key);
    }
}

enum Slot {
    Leader(InFlightGuard),
    Follower(InFlightFetch),
}

async fn wait_for(key: &str, mut rx: InFlightFetch) -> Result<Arc<Value>, CacheError> {
    debug!(key, "Waiting for in-flight origin fetch");
    loop {
        if let Some(result) = rx.borrow().as_ref() {
            return match result {
                Ok(value) => Ok(Arc::clone(value)),
                Err(e) => Err(CacheError::Backend(e.clone().into())),
            };
        }
        if rx.changed().await.is_err() {
            return Err(CacheError::Backend("In-flight fetch was cancelled".into()));
        }
    }
}

/// Cache-then-origin loader
pub struct Loader {
    cache: Arc<TwoTierCache>,
    origin: Arc<dyn Origin>,
    data_layer: Option<Arc<dyn DataLayer>>,
    in_flight: InFlightMap,
}

impl Loader {
    pub fn new(
        cache: Arc<TwoTierCache>,
        origin: Arc<dyn Origin>,
        data_layer: Option<Arc<dyn DataLayer>>,
    ) -> Self {
        Self {
            cache,
            origin,
            data_layer,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn cache(&self) -> &Arc<TwoTierCache> {
        &self.cache
    }

    /// Push `data` to the UI data layer, if one is attached.
    pub async fn publish(&self, key: &str, data: Arc<Value>) {
        if let Some(layer) = &self.data_layer {
            layer.set_query_data(key, data).await;
        }
    }

    /// Look `key` up in the cache and publish whatever is found.
    pub async fn serve_cached(&self, key: &str) -> Option<CacheHit> {
        let hit = self.cache.get(key).await?;
        self.publish(key, Arc::clone(&hit.data)).await;
        Some(hit)
    }

    /// Fetch `key` from the origin, write it through and publish it.
    ///
    /// No staleness check is made. A refresh already running for `key` is
    /// joined instead of issuing a second fetch.
    pub async fn refresh(
        &self,
        key: &str,
        query: &TableQuery,
    ) -> Result<Arc<Value>, CacheError> {
        let slot = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(key) {
                Some(rx) => Slot::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key.to_owned(), rx);
                    Slot::Leader(InFlightGuard {
                        key: key.to_owned(),
                        in_flight: Arc::clone(&self.in_flight),
                        tx: Some(tx),
                    })
                }
            }
        };

        let guard = match slot {
            Slot::Follower(rx) => return wait_for(key, rx).await,
            Slot::Leader(guard) => guard,
        };

        let result = match self.origin.fetch(query).await {
            Ok(rows) => {
                debug!(key, %query, "Fetched from origin");
                let data = Arc::new(rows);
                self.cache.put(key, Arc::clone(&data));
                self.publish(key, Arc::clone(&data)).await;
                Ok(data)
            }
            Err(e) => {
                warn!(key, %query, error = %e, "Origin fetch failed");
                Err(CacheError::Backend(e))
            }
        };

        guard.complete(match &result {
            Ok(data) => Ok(Arc::clone(data)),
            Err(e) => Err(e.to_string()),
        });

        result
    }

    /// Serve `key` from the cache, going to the origin when it is missing or
    /// stale. A stale value is published before the refresh starts.
    pub async fn load(&self, key: &str, query: &TableQuery) -> Result<Arc<Value>, CacheError> {
        match self.serve_cached(key).await {
            Some(hit) if !hit.is_stale => Ok(hit.data),
            Some(_) => {
                debug!(key, "Serving stale value while refreshing");
                self.refresh(key, query).await
            }
            None => self.refresh(key, query).await,
        }
    }
}
