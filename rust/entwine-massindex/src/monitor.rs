//! Progress monitoring hooks for a mass indexing run.

use std::sync::atomic::{AtomicU64, Ordering};

/// Observes the progress of one run.
///
/// Callbacks arrive concurrently from the scroll phase and every loader
/// thread; implementations must be thread safe and should return quickly.
pub trait MassIndexingMonitor: Send + Sync {
    /// Called once per type group as soon as its identifier count is known.
    /// The grand total is the sum over all groups.
    fn add_to_total_count(&self, count: u64);

    /// Called after each bulk fetch with the number of entities actually
    /// returned by the store.
    fn entities_loaded(&self, count: u64);

    /// Called after each backend acknowledgement with the number of
    /// documents successfully written.
    fn documents_added(&self, count: u64);

    /// Called once, after the optional final merge, when the run is over.
    fn indexing_completed(&self);
}

/// Default monitor: totals are accumulated and progress is periodically
/// written to the log.
#[derive(Debug, Default)]
pub struct LoggingMonitor {
    total: AtomicU64,
    loaded: AtomicU64,
    added: AtomicU64,
}

impl LoggingMonitor {
    pub fn new() -> LoggingMonitor {
        LoggingMonitor::default()
    }
}

impl MassIndexingMonitor for LoggingMonitor {
    fn add_to_total_count(&self, count: u64) {
        let total = self.total.fetch_add(count, Ordering::Relaxed) + count;
        log::info!("mass indexing: {total} entities to index");
    }

    fn entities_loaded(&self, count: u64) {
        self.loaded.fetch_add(count, Ordering::Relaxed);
    }

    fn documents_added(&self, count: u64) {
        let added = self.added.fetch_add(count, Ordering::Relaxed) + count;
        let total = self.total.load(Ordering::Relaxed);
        log::debug!("mass indexing: {added}/{total} documents written");
    }

    fn indexing_completed(&self) {
        log::info!(
            "mass indexing complete: {} entities loaded, {} documents written",
            self.loaded.load(Ordering::Relaxed),
            self.added.load(Ordering::Relaxed)
        );
    }
}
