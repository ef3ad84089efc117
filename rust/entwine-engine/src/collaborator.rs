//! Trait seams to the external collaborators of the engine.
//!
//! The engine owns no persistence, no document mapping and no wire protocol.
//! Everything it needs from the outside world comes through the traits in
//! this module, resolved once at setup and shared across threads via `Arc`.

use std::sync::Arc;

use entwine_common::Result;
use entwine_model::{DependencyEdge, DocumentKey, EntityId, TypeName};

use crate::operation::{BatchOutcome, Document, IndexOperation};

/// A handle to one loaded entity.
///
/// The handle doubles as the concrete-type detector: even when an entity was
/// loaded through a query against a common supertype, [`concrete_type`]
/// reports the exact mapped type, because resolutions and plan keys are
/// type-exact.
///
/// [`concrete_type`]: IndexedEntity::concrete_type
///
/// `Any` is a supertrait so that document derivers can downcast the handle
/// to the mapper's concrete entity representation.
pub trait IndexedEntity: Send + Sync + std::any::Any {
    /// The exact concrete mapped type of this entity.
    fn concrete_type(&self) -> TypeName;

    /// The entity's identifier in the primary store.
    fn id(&self) -> EntityId;
}

/// A shared entity handle.
pub type EntityRef = Arc<dyn IndexedEntity>;

/// The exact-typed document key of an entity handle.
pub fn entity_key(entity: &dyn IndexedEntity) -> DocumentKey {
    DocumentKey::new(entity.concrete_type(), entity.id())
}

/// Looks entities up by key at plan-flush time.
///
/// Returning `Ok(None)` means the entity no longer exists in the primary
/// store; the plan converts the pending intent into a delete.
pub trait EntitySource: Send + Sync {
    fn entity(&self, key: &DocumentKey) -> Result<Option<EntityRef>>;
}

/// Derives the index document for one entity.
///
/// Must be a pure function of the current entity state. A failure is a
/// per-entity derivation error: it is isolated and never aborts the rest of
/// a batch.
pub trait DocumentDeriver: Send + Sync {
    fn derive(&self, entity: &dyn IndexedEntity) -> Result<Document>;
}

/// Navigates dependency edges backwards through the entity graph.
///
/// Given an edge and the key of a mutated source entity, returns the keys of
/// the entities that embed it through that edge's embedding path. Returned
/// keys must be concrete-typed, even when the edge's declared target is a
/// common supertype.
pub trait AssociationNavigator: Send + Sync {
    fn inverse(&self, edge: &DependencyEdge, source: &DocumentKey) -> Result<Vec<DocumentKey>>;
}

/// The wire client talking to the search backend.
///
/// Batch application follows best-effort semantics: the returned
/// [`BatchOutcome`] enumerates the keys that failed, and a transport-level
/// fault is reported as a failure of every key in the batch.
pub trait BackendClient: Send + Sync {
    /// Applies a batch of document operations.
    fn apply_batch(&self, operations: Vec<IndexOperation>) -> BatchOutcome;

    /// Removes all documents of the given types.
    fn purge(&self, types: &[TypeName]) -> Result<()>;

    /// Drops the indexes of the given types together with their schema and
    /// re-creates them empty.
    fn drop_and_create_schema(&self, types: &[TypeName]) -> Result<()>;

    /// Merges each index into a single segment.
    fn merge_segments(&self) -> Result<()>;
}
