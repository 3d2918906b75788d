//! Counters shared between the crawl iterator and jwalk's read-dir callback.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use nfspider_core::{CrawlStats, CrawlWarning};

/// Counters updated while jwalk lists directories.
///
/// The read-dir callback must be `Send + Sync`, so pruning decisions are
/// counted here and folded into [`CrawlStats`] when the crawl finishes.
#[derive(Debug, Default)]
pub(crate) struct CrawlCounters {
    dirs_pruned: AtomicU64,
    dirs_revisited: AtomicU64,
    warnings: Mutex<Vec<CrawlWarning>>,
}

impl CrawlCounters {
    pub fn record_pruned(&self) {
        self.dirs_pruned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revisit(&self, warning: CrawlWarning) {
        self.dirs_revisited.fetch_add(1, Ordering::Relaxed);
        self.push_warning(warning);
    }

    pub fn push_warning(&self, warning: CrawlWarning) {
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(warning);
        }
    }

    /// Fold the shared counters into the iterator's stats and drain warnings.
    pub fn drain_into(&self, stats: &mut CrawlStats) -> Vec<CrawlWarning> {
        stats.dirs_pruned = self.dirs_pruned.load(Ordering::Relaxed);
        stats.dirs_revisited = self.dirs_revisited.load(Ordering::Relaxed);
        self.warnings
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default()
    }
}
