//! Startup preloading of the critical dataset catalogue
//!
//! The preloader runs once per instance:
//! 1. every critical table is looked up in the cache concurrently, and hits
//!    (fresh or stale) are published to the data layer straight away
//! 2. misses and stale hits are fetched from the origin in one concurrent
//!    fan-out, each result written through and published as it lands
//!
//! A failed fetch only leaves its own key unpopulated for this cycle.

use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::catalog::CriticalTable;
use crate::loader::Loader;

/// What a call to [`Preloader::preload_critical_data`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadOutcome {
    /// Another call is running or already finished
    Skipped,
    Completed(PreloadReport),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Tables served from the cache (fresh or stale)
    pub from_cache: usize,
    /// Tables fetched from the origin
    pub fetched: usize,
    /// Origin fetches that failed
    pub failed: usize,
}

/// Clears the in-progress flag however the preload ends.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One-shot loader for the critical tables
pub struct Preloader {
    loader: Arc<Loader>,
    tables: Arc<[CriticalTable]>,
    is_preloading: AtomicBool,
    has_preloaded: AtomicBool,
}

impl Preloader {
    pub fn new(loader: Arc<Loader>, tables: impl Into<Arc<[CriticalTable]>>) -> Self {
        Self {
            loader,
            tables: tables.into(),
            is_preloading: AtomicBool::new(false),
            has_preloaded: AtomicBool::new(false),
        }
    }

    pub fn has_preloaded(&self) -> bool {
        self.has_preloaded.load(Ordering::Acquire)
    }

    pub fn is_preloading(&self) -> bool {
        self.is_preloading.load(Ordering::Acquire)
    }

    /// Load every critical table from the cache or the origin.
    ///
    /// Only the first call does any work; later or overlapping calls return
    /// [`PreloadOutcome::Skipped`].
    pub async fn preload_critical_data(&self) -> PreloadOutcome {
        if self.has_preloaded() {
            debug!("Critical data already preloaded");
            return PreloadOutcome::Skipped;
        }
        if self
            .is_preloading
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Critical data preload already running");
            return PreloadOutcome::Skipped;
        }
        let _running = RunningFlag(&self.is_preloading);

        // a preload may have finished between the two checks
        if self.has_preloaded() {
            return PreloadOutcome::Skipped;
        }

        let report = self.run().await;
        self.has_preloaded.store(true, Ordering::Release);

        info!(
            tables = self.tables.len(),
            from_cache = report.from_cache,
            fetched = report.fetched,
            failed = report.failed,
            "Critical data preloaded"
        );
        PreloadOutcome::Completed(report)
    }

    async fn run(&self) -> PreloadReport {
        let lookups = join_all(self.tables.iter().map(|table| async move {
            let hit = self.loader.serve_cached(table.key).await;
            (table, hit)
        }))
        .await;

        let mut report = PreloadReport::default();
        let mut pending = Vec::new();
        for (table, hit) in lookups {
            match hit {
                Some(hit) => {
                    report.from_cache += 1;
                    if hit.is_stale {
                        debug!(key = table.key, "Cached critical data is stale");
                        pending.push(table);
                    }
                }
                None => pending.push(table),
            }
        }

        let fetches = join_all(pending.into_iter().map(|table| async move {
            match self.loader.refresh(table.key, &table.query).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(key = table.key, error = %e, "Critical data fetch failed");
                    false
                }
            }
        }))
        .await;

        for ok in fetches {
            if ok {
                report.fetched += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }
}
