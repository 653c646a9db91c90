//! Composition root for the cache and its warmers
//!
//! A [`CacheContext`] owns the shared two-tier cache and loader. The host
//! builds one at startup and hands out the preloader, revalidator and route
//! prefetcher from it, so independent contexts never share state.

use std::sync::Arc;

use crate::catalog::{CRITICAL_TABLES, RELATED_ROUTES, ROUTES};
use crate::data_layer::DataLayer;
use crate::durable::DurableStore;
use crate::loader::Loader;
use crate::origin::Origin;
use crate::preloader::Preloader;
use crate::prefetcher::RoutePrefetcher;
use crate::revalidator::{Revalidator, Visibility};
use crate::tiered::TwoTierCache;
use crate::{CacheConfig, CacheError};

pub struct CacheContext {
    config: CacheConfig,
    loader: Arc<Loader>,
}

impl CacheContext {
    /// Build a context over the given durable store, origin and data layer.
    pub fn new(
        config: CacheConfig,
        durable: Arc<dyn DurableStore>,
        origin: Arc<dyn Origin>,
        data_layer: Option<Arc<dyn DataLayer>>,
    ) -> Result<Self, CacheError> {
        let cache = Arc::new(TwoTierCache::new(&config, durable));
        Self::from_cache(config, cache, origin, data_layer)
    }

    /// Build a context around an existing cache.
    pub fn from_cache(
        config: CacheConfig,
        cache: Arc<TwoTierCache>,
        origin: Arc<dyn Origin>,
        data_layer: Option<Arc<dyn DataLayer>>,
    ) -> Result<Self, CacheError> {
        config.validate()?;
        Ok(Self {
            loader: Arc::new(Loader::new(cache, origin, data_layer)),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TwoTierCache> {
        self.loader.cache()
    }

    pub fn loader(&self) -> &Arc<Loader> {
        &self.loader
    }

    /// Preloader over the built-in critical table catalogue.
    pub fn preloader(&self) -> Preloader {
        Preloader::new(Arc::clone(&self.loader), CRITICAL_TABLES)
    }

    /// Revalidator over the built-in critical table catalogue.
    pub fn revalidator(&self, visibility: Arc<dyn Visibility>) -> Revalidator {
        Revalidator::new(
            Arc::clone(&self.loader),
            CRITICAL_TABLES,
            visibility,
            self.config.revalidation_delay,
        )
    }

    /// Route prefetcher over the built-in route catalogue.
    pub fn route_prefetcher(&self) -> RoutePrefetcher {
        RoutePrefetcher::new(
            Arc::clone(&self.loader),
            ROUTES,
            RELATED_ROUTES,
            self.config.prefetch_stagger,
            self.config.contextual_delay,
        )
    }
}
