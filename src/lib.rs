//! warmcache - Two-tier dataset cache with warmers
//!
//! This library keeps the datasets a content-browsing front end needs close
//! at hand:
//! - Memory tier: bounded, least-frequently-used eviction
//! - Durable tier: Redis (or in-process) store that survives restarts
//! - Origin: pluggable upstream queried by table, projection, order and limit
//!
//! On top of the cache sit three warmers:
//! - [`Preloader`]: loads the critical tables once at startup
//! - [`Revalidator`]: one delayed, unconditional refresh of the critical tables
//! - [`RoutePrefetcher`]: warms route datasets on idle, hover and navigation
//!
//! The cache is an optimisation only. Durable-tier and origin failures are
//! logged and absorbed; callers see at worst a slower load.

mod clock;
mod config;
mod error;
mod memory;
#[cfg(test)]
mod testing;

pub mod catalog;
pub mod context;
pub mod data_layer;
pub mod durable;
pub mod loader;
pub mod origin;
pub mod prefetcher;
pub mod preloader;
pub mod revalidator;
pub mod task;
pub mod tiered;

pub use catalog::{
    CRITICAL_TABLES, CriticalTable, RELATED_ROUTES, ROUTES, RelatedRoutes, RouteDescriptor,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use context::CacheContext;
pub use data_layer::{DataLayer, QueryCache};
pub use durable::{DurableRecord, DurableStore, MemoryStore, RedisStore};
pub use error::{BoxError, CacheError};
pub use loader::Loader;
pub use memory::{MemoryRecord, MemoryTier};
pub use origin::{Order, Origin, RestOrigin, SortDirection, TableQuery};
pub use prefetcher::{HoverHandlers, RoutePrefetcher};
pub use preloader::{PreloadOutcome, PreloadReport, Preloader};
pub use revalidator::{Revalidation, Revalidator, Visibility, VisibilityFlag};
pub use task::TaskHandle;
pub use tiered::{CacheHit, CacheStats, TwoTierCache};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
