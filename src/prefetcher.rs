//! Route-scoped prefetching
//!
//! Warms the dataset behind likely-next routes:
//! - on idle, every configured route, staggered to avoid a fetch storm
//! - on hover or focus of a link, the target route immediately
//! - on navigation, the routes related to the new location after a short
//!   delay (exact match first, then the longest matching path prefix)
//!
//! Each route is prefetched at most once per prefetcher; a failed attempt
//! frees the route for a later retry.

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::catalog::{RelatedRoutes, RouteDescriptor};
use crate::loader::Loader;
use crate::task::TaskHandle;

/// Callbacks to attach to a navigational element
#[derive(Clone)]
pub struct HoverHandlers {
    pub on_mouse_enter: Arc<dyn Fn() + Send + Sync>,
    pub on_focus: Arc<dyn Fn() + Send + Sync>,
}

struct Inner {
    loader: Arc<Loader>,
    routes: Vec<RouteDescriptor>,
    related: Vec<RelatedRoutes>,
    prefetched: Mutex<HashSet<String>>,
    stagger: Duration,
    contextual_delay: Duration,
    runtime: Option<Handle>,
}

/// Prefetcher for route datasets; cheap to clone
#[derive(Clone)]
pub struct RoutePrefetcher {
    inner: Arc<Inner>,
}

impl RoutePrefetcher {
    /// Create a prefetcher. When built inside a tokio runtime, hover handlers
    /// spawn onto that runtime from any thread.
    pub fn new(
        loader: Arc<Loader>,
        routes: impl Into<Vec<RouteDescriptor>>,
        related: impl Into<Vec<RelatedRoutes>>,
        stagger: Duration,
        contextual_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                routes: routes.into(),
                related: related.into(),
                prefetched: Mutex::new(HashSet::new()),
                stagger,
                contextual_delay,
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    fn prefetched(&self) -> MutexGuard<'_, HashSet<String>> {
        self.inner
            .prefetched
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn descriptor(&self, route: &str) -> Option<&RouteDescriptor> {
        self.inner.routes.iter().find(|d| d.route == route)
    }

    pub fn is_prefetched(&self, route: &str) -> bool {
        self.prefetched().contains(route)
    }

    /// Related routes for `path`: exact match, else the longest route that
    /// is a path prefix of it.
    pub fn related_routes(&self, path: &str) -> Option<&'static [&'static str]> {
        if let Some(entry) = self.inner.related.iter().find(|e| e.route == path) {
            return Some(entry.related);
        }
        self.inner
            .related
            .iter()
            .filter(|e| {
                path.strip_prefix(e.route)
                    .is_some_and(|rest| rest.starts_with('/'))
            })
            .max_by_key(|e| e.route.len())
            .map(|e| e.related)
    }

    /// Warm the dataset for `route`.
    ///
    /// Returns true when this call loaded it; false if the route is unknown,
    /// already prefetched, or the load failed.
    pub async fn prefetch_route(&self, route: &str) -> bool {
        let Some(descriptor) = self.descriptor(route).copied() else {
            debug!(route, "No prefetch descriptor for route");
            return false;
        };
        if !self.prefetched().insert(route.to_owned()) {
            return false;
        }

        let key = descriptor.cache_key();
        match self.inner.loader.load(&key, &descriptor.query).await {
            Ok(_) => {
                debug!(route, "Route data prefetched");
                true
            }
            Err(e) => {
                warn!(route, error = %e, "Route prefetch failed");
                self.prefetched().remove(route);
                false
            }
        }
    }

    /// Prefetch `routes` one after another, `delay` apart.
    ///
    /// The task yields how many routes it loaded.
    pub fn prefetch_batch<I, S>(&self, routes: I, delay: Duration) -> TaskHandle<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let routes: Vec<String> = routes.into_iter().map(Into::into).collect();
        let this = self.clone();
        TaskHandle::spawn("route-prefetch-batch", async move {
            let mut loaded = 0;
            for (i, route) in routes.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(delay).await;
                }
                if this.prefetch_route(route).await {
                    loaded += 1;
                }
            }
            loaded
        })
    }

    /// Prefetch every configured route, staggered.
    pub fn prefetch_on_idle(&self) -> TaskHandle<usize> {
        let routes: Vec<&'static str> = self.inner.routes.iter().map(|d| d.route).collect();
        debug!(count = routes.len(), "Prefetching all routes on idle");
        self.prefetch_batch(routes, self.inner.stagger)
    }

    /// Handlers that prefetch `route` when a link is hovered or focused.
    ///
    /// The callbacks may be invoked from any thread. They spawn onto the
    /// runtime current at this call, else the one the prefetcher was built
    /// in; with neither, they only log.
    pub fn on_hover(&self, route: &str) -> HoverHandlers {
        let runtime = Handle::try_current()
            .ok()
            .or_else(|| self.inner.runtime.clone());
        let this = self.clone();
        let route = route.to_owned();
        let handler: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            let Some(runtime) = &runtime else {
                warn!(route = %route, "No tokio runtime for hover prefetch, skipping");
                return;
            };
            let this = this.clone();
            let route = route.clone();
            runtime.spawn(async move {
                this.prefetch_route(&route).await;
            });
        });
        HoverHandlers {
            on_mouse_enter: Arc::clone(&handler),
            on_focus: handler,
        }
    }

    /// Warm the routes related to `path` after the contextual delay.
    ///
    /// Returns None when nothing is configured for `path`.
    pub fn on_route_change(&self, path: &str) -> Option<TaskHandle<usize>> {
        let related = self.related_routes(path)?;
        debug!(path, ?related, "Scheduling contextual prefetch");
        let this = self.clone();
        let delay = self.inner.contextual_delay;
        Some(TaskHandle::spawn("route-prefetch-contextual", async move {
            tokio::time::sleep(delay).await;
            join_all(related.iter().map(|route| this.prefetch_route(route)))
                .await
                .into_iter()
                .filter(|loaded| *loaded)
                .count()
        }))
    }
}
