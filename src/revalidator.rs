//! One-shot background revalidation of the critical tables
//!
//! After a fixed delay the revalidator re-fetches every critical table from
//! the origin, without looking at the cache first. Nothing happens if the
//! page is hidden when the timer fires. There is no retry; the returned
//! [`TaskHandle`] can cancel the pending work.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::CriticalTable;
use crate::loader::Loader;
use crate::task::TaskHandle;

/// Reports whether the host page is currently visible
pub trait Visibility: Send + Sync + 'static {
    fn is_visible(&self) -> bool;
}

/// Visibility flag the host flips from its own visibility events.
#[derive(Debug)]
pub struct VisibilityFlag(AtomicBool);

impl VisibilityFlag {
    pub fn new(visible: bool) -> Self {
        Self(AtomicBool::new(visible))
    }

    pub fn set_visible(&self, visible: bool) {
        self.0.store(visible, Ordering::Release);
    }
}

impl Default for VisibilityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Visibility for VisibilityFlag {
    fn is_visible(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Result of one revalidation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revalidation {
    /// The page was hidden, nothing was fetched
    Hidden,
    Refreshed { ok: usize, failed: usize },
}

/// Delayed refresher for the critical tables
#[derive(Clone)]
pub struct Revalidator {
    loader: Arc<Loader>,
    tables: Arc<[CriticalTable]>,
    visibility: Arc<dyn Visibility>,
    delay: Duration,
}

impl Revalidator {
    pub fn new(
        loader: Arc<Loader>,
        tables: impl Into<Arc<[CriticalTable]>>,
        visibility: Arc<dyn Visibility>,
        delay: Duration,
    ) -> Self {
        Self {
            loader,
            tables: tables.into(),
            visibility,
            delay,
        }
    }

    /// Schedule a single revalidation `delay` from now.
    pub fn schedule_background_revalidation(&self) -> TaskHandle<Revalidation> {
        let this = self.clone();
        debug!(
            delay_ms = self.delay.as_millis() as u64,
            "Scheduling background revalidation"
        );
        TaskHandle::spawn("background-revalidation", async move {
            tokio::time::sleep(this.delay).await;
            this.revalidate_now().await
        })
    }

    /// Re-fetch every critical table now, if the page is visible.
    pub async fn revalidate_now(&self) -> Revalidation {
        if !self.visibility.is_visible() {
            debug!("Page hidden, skipping revalidation");
            return Revalidation::Hidden;
        }

        let results = join_all(self.tables.iter().map(|table| async move {
            match self.loader.refresh(table.key, &table.query).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(key = table.key, error = %e, "Revalidation fetch failed");
                    false
                }
            }
        }))
        .await;

        let ok = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - ok;
        info!(ok, failed, "Background revalidation finished");
        Revalidation::Refreshed { ok, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheConfig;
    use crate::data_layer::DataLayer;
    use crate::origin::TableQuery;
    use crate::testing::{CountingOrigin, RecordingDataLayer};
    use crate::tiered::TwoTierCache;
    use serde_json::json;

    const TABLES: &[CriticalTable] = &[
        CriticalTable {
            key: "cursos",
            query: TableQuery::new("cursos", "*"),
        },
        CriticalTable {
            key: "videoaulas",
            query: TableQuery::new("videoaulas", "*"),
        },
    ];

    const DELAY: Duration = Duration::from_secs(300);

    fn setup(
        origin: CountingOrigin,
    ) -> (
        Revalidator,
        Arc<Loader>,
        Arc<CountingOrigin>,
        Arc<RecordingDataLayer>,
        Arc<VisibilityFlag>,
    ) {
        let cache = Arc::new(TwoTierCache::in_memory(&CacheConfig::default()));
        let origin = Arc::new(origin);
        let layer = Arc::new(RecordingDataLayer::new());
        let loader = Arc::new(Loader::new(
            cache,
            origin.clone(),
            Some(layer.clone() as Arc<dyn DataLayer>),
        ));
        let visibility = Arc::new(VisibilityFlag::default());
        let revalidator = Revalidator::new(
            Arc::clone(&loader),
            TABLES,
            visibility.clone(),
            DELAY,
        );
        (revalidator, loader, origin, layer, visibility)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay_and_ignores_freshness() {
        let (revalidator, loader, origin, layer, _) =
            setup(CountingOrigin::new().with_rows("cursos", json!(["new"])));
        loader.cache().put("cursos", Arc::new(json!(["old"])));

        let handle = revalidator.schedule_background_revalidation();

        tokio::time::sleep(DELAY - Duration::from_secs(1)).await;
        assert_eq!(origin.calls(), 0);

        assert_eq!(
            handle.join().await,
            Some(Revalidation::Refreshed { ok: 2, failed: 0 })
        );
        assert_eq!(origin.calls(), 2);
        assert_eq!(
            *loader.cache().get_from_memory("cursos").unwrap(),
            json!(["new"])
        );
        assert_eq!(layer.calls_for("videoaulas").len(), 1);

        // one-shot: nothing else fires later
        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_page_skips_fetches() {
        let (revalidator, _, origin, layer, visibility) = setup(CountingOrigin::new());
        visibility.set_visible(false);

        let handle = revalidator.schedule_background_revalidation();

        assert_eq!(handle.join().await, Some(Revalidation::Hidden));
        assert_eq!(origin.calls(), 0);
        assert!(layer.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_firing_does_nothing() {
        let (revalidator, _, origin, _, _) = setup(CountingOrigin::new());

        let handle = revalidator.schedule_background_revalidation();
        tokio::time::sleep(Duration::from_secs(10)).await;
        handle.cancel();

        assert_eq!(handle.join().await, None);
        tokio::time::sleep(DELAY).await;
        assert_eq!(origin.calls(), 0);
    }

    #[tokio::test]
    async fn failures_are_counted_not_raised() {
        let (revalidator, loader, _, _, _) =
            setup(CountingOrigin::new().failing("videoaulas"));

        assert_eq!(
            revalidator.revalidate_now().await,
            Revalidation::Refreshed { ok: 1, failed: 1 }
        );
        assert!(loader.cache().is_in_memory("cursos"));
        assert!(!loader.cache().is_in_memory("videoaulas"));
    }
}
