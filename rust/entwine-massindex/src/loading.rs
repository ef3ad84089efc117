//! Bulk loading contracts between the mass indexer and the mapper.
//!
//! The indexer never talks to the data store directly. For every type group
//! it asks the [`MassLoadingStrategy`] for an identifier scroll and an
//! entity loader, and drives them under a shared [`LoadingContext`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use entwine_common::{Result, error::Error};
use entwine_engine::EntityRef;
use entwine_model::EntityId;

/// Second-level cache interaction requested for bulk loads.
///
/// Mass indexing touches every entity exactly once, so populating a cache
/// along the way usually just evicts hot entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Bypass any cache layer entirely.
    Ignore,
    /// Use the store's regular caching behavior.
    Normal,
}

/// Tuning knobs the strategy should honor when creating scrolls and
/// loaders.
#[derive(Debug, Clone)]
pub struct LoadingOptions {
    pub cache_mode: CacheMode,
    /// Number of identifiers fetched per scroll round trip.
    pub fetch_size: u32,
    /// Loaded entities are never written back to the store.
    pub read_only: bool,
    /// Number of identifiers per loading batch, which is also the number of
    /// operations per submitted backend batch.
    pub batch_size: usize,
}

impl Default for LoadingOptions {
    fn default() -> LoadingOptions {
        LoadingOptions {
            cache_mode: CacheMode::Ignore,
            fetch_size: 100,
            read_only: true,
            batch_size: 10,
        }
    }
}

/// Shared liveness handle for one mass indexing run.
///
/// Scrolls and loaders observe the same flag; clearing it makes every
/// in-flight phase stop at its next checkpoint instead of finishing its
/// full workload.
#[derive(Clone)]
pub struct LoadingContext {
    options: LoadingOptions,
    active: Arc<AtomicBool>,
}

impl LoadingContext {
    pub fn new(options: LoadingOptions, active: Arc<AtomicBool>) -> LoadingContext {
        LoadingContext { options, active }
    }

    pub fn options(&self) -> &LoadingOptions {
        &self.options
    }

    /// Whether the run is still live.
    pub fn active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Fails with [`Error::not_active`] once the run has been stopped.
    pub fn ensure_active(&self, what: &str) -> Result<()> {
        if self.active() {
            Ok(())
        } else {
            Err(Error::not_active(what))
        }
    }
}

/// A forward-only cursor over all identifiers of a type group.
pub trait IdentifierScroll: Send {
    /// Total number of identifiers the scroll will produce, counted up
    /// front for progress reporting.
    fn total_count(&self) -> u64;

    /// Produces the next chunk of identifiers, or `None` once exhausted.
    /// Chunk sizes are chosen by the implementation, typically the
    /// configured fetch size.
    fn next_batch(&mut self) -> Result<Option<Vec<EntityId>>>;
}

/// Bulk-fetches entities of a type group by identifier.
///
/// Implementations may be called concurrently from multiple loader threads.
pub trait EntityLoader: Send + Sync {
    /// Loads the entities for `ids`. Identifiers of entities deleted since
    /// the scroll observed them are silently absent from the result.
    fn load(&self, ids: &[EntityId]) -> Result<Vec<EntityRef>>;
}

/// Factory for the per-group loading machinery, implemented by the mapper.
pub trait MassLoadingStrategy: Send + Sync {
    /// Creates the identifier scroll for one type group, rooted at the
    /// group's common supertype.
    fn create_identifier_scroll(
        &self,
        context: &LoadingContext,
        group: &crate::grouping::TypeGroup,
    ) -> Result<Box<dyn IdentifierScroll>>;

    /// Creates the entity loader shared by the group's loader threads.
    fn create_entity_loader(
        &self,
        context: &LoadingContext,
        group: &crate::grouping::TypeGroup,
    ) -> Result<Arc<dyn EntityLoader>>;
}
