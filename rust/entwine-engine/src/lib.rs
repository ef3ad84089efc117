//! The Entwine indexing engine: change propagation and plan execution.
//!
//! This crate keeps a full-text index consistent with a mutable entity
//! graph. Given a mutated entity and the set of properties that changed, it
//! determines the complete set of index documents that must be re-derived,
//! accumulates the resulting intents in a unit-of-work-scoped plan, and
//! flushes them as a batch through an admission-controlled operation queue.
//!
//! # Architecture
//!
//! Data flows through four stages:
//!
//! 1. [`resolver::ReindexingResolver`] walks the static
//!    [`entwine_model::DependencyModel`] from the mutated (type, property)
//!    pair and produces a duplicate-free
//!    [`resolution::ReindexingResolution`] of affected document keys.
//! 2. [`plan::IndexingPlan`] records add/update/delete intents keyed by
//!    document, merging same-key intents so at most one operation per key
//!    survives to the flush.
//! 3. At flush, documents are derived from *current* entity state via the
//!    [`collaborator::DocumentDeriver`] and the surviving operations are
//!    handed to the [`submitter::OperationSubmitter`].
//! 4. A [`worker::BackendWorker`] drains the bounded operation queue and
//!    applies each batch through the [`collaborator::BackendClient`].
//!
//! The external world (entity store, document builder, wire client) is only
//! ever touched through the trait seams in [`collaborator`]; everything in
//! this crate is pure computation plus channel plumbing, which keeps the
//! whole pipeline testable with in-memory fakes.

pub mod collaborator;
pub mod operation;
pub mod plan;
pub mod resolution;
pub mod resolver;
pub mod submitter;
pub mod worker;

pub use collaborator::{
    AssociationNavigator, BackendClient, DocumentDeriver, EntityRef, EntitySource, IndexedEntity,
    entity_key,
};
pub use operation::{BatchOutcome, Document, IndexOperation, OperationKind, SubmittedBatch};
pub use plan::{IndexingPlan, PlanContext, PlanOutcome};
pub use resolution::ReindexingResolution;
pub use resolver::ReindexingResolver;
pub use submitter::{OperationSubmitter, RetryExecutor};
pub use worker::BackendWorker;
