//! Bulk (re)population of search indexes from the primary data store.
//!
//! The mass indexer rebuilds the documents of selected types from scratch:
//! it enumerates all identifiers of the targeted types, loads entities in
//! batches, derives their documents and feeds them through the same
//! submission machinery as live change propagation, under bounded memory,
//! bounded concurrency and partial-failure tolerance.
//!
//! # Pipeline
//!
//! A run moves through these stages:
//!
//! 1. configuration (builder calls on [`indexer::MassIndexer`])
//! 2. optional index preparation: drop-and-create the schema, or purge all
//!    documents (optionally followed by a segment merge)
//! 3. per type group, a pipelined scroll / load / submit phase: one
//!    identifier scroll feeds fixed-size id batches over a bounded channel
//!    to a configurable number of loader workers, which bulk-fetch the
//!    entities, derive documents and submit them to the shared operation
//!    queue
//! 4. optional segment merge on finish
//!
//! Polymorphic target sets are grouped by [`grouping::group_types`] so that
//! a hierarchy is scrolled once through its common supertype and no entity
//! is indexed twice.
//!
//! Failures of individual entities never abort a run; they are counted per
//! type and reported through the configured
//! [`failure::MassIndexingFailureHandler`], with reporting suppressed (but
//! still counted) beyond the flooding threshold.

pub mod failure;
pub mod grouping;
pub mod indexer;
pub mod loading;
pub mod monitor;
pub mod report;

pub use failure::{LogFailureHandler, MassIndexingFailure, MassIndexingFailureHandler};
pub use grouping::{Grouping, TypeGroup, group_types};
pub use indexer::{MassIndexer, MassIndexingContext, MassIndexingHandle};
pub use loading::{
    CacheMode, EntityLoader, IdentifierScroll, LoadingContext, LoadingOptions, MassLoadingStrategy,
};
pub use monitor::{LoggingMonitor, MassIndexingMonitor};
pub use report::MassIndexingReport;
