//! The unit-of-work-scoped indexing plan.

use ahash::AHashMap;
use entwine_common::{Result, error::Error};
use entwine_model::{DocumentKey, EntityId, TypeName};
use entwine_workflow::{oneshot, queue, thread_pool::ThreadPool};

use crate::collaborator::{DocumentDeriver, EntityRef, EntitySource};
use crate::operation::{IndexOperation, SubmittedBatch};
use crate::resolution::ReindexingResolution;
use crate::submitter::OperationSubmitter;
use std::sync::Arc;

/// Accumulates add/update/delete intents within one unit of work and
/// flushes them as a single batch at commit time.
///
/// At most one live entry exists per (type, identifier) key; a later intent
/// on the same key merges with the earlier one:
///
/// - delete followed by add collapses to update (net effect: still present,
///   refreshed)
/// - add or update followed by delete collapses to delete
/// - add or update followed by another add or update keeps only the latest
///   entity reference
///
/// Intents are keys of *intent* only: document derivation is deferred to
/// flush time and always reads current entity state, so the order of
/// same-key intents within a unit of work cannot change the final document.
#[derive(Default)]
pub struct IndexingPlan {
    entries: AHashMap<DocumentKey, Intent>,
    order: Vec<DocumentKey>,
}

#[derive(Clone)]
enum Intent {
    Add(EntityRef),
    Update(EntityRef),
    Delete,
}

/// Everything a plan needs to flush: the document deriver, the submission
/// policy, the shared operation queue and the pool the flush runs on.
#[derive(Clone)]
pub struct PlanContext {
    pub deriver: Arc<dyn DocumentDeriver>,
    pub submitter: OperationSubmitter,
    pub queue: queue::Sender<SubmittedBatch>,
    pub pool: ThreadPool,
}

/// The outcome of one flushed plan.
///
/// Best-effort batch semantics: a failed entry never aborts the remaining
/// entries, and the outcome enumerates which keys failed and why.
#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub succeeded: Vec<DocumentKey>,
    pub failed: Vec<(DocumentKey, Error)>,
}

impl PlanOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl IndexingPlan {
    pub fn new() -> IndexingPlan {
        IndexingPlan::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records the intent to add the document of a new entity.
    pub fn add(
        &mut self,
        type_name: impl Into<TypeName>,
        id: impl Into<EntityId>,
        entity: EntityRef,
    ) {
        self.apply(DocumentKey::new(type_name, id), Intent::Add(entity));
    }

    /// Records the intent to re-derive the document of a changed entity.
    pub fn update(
        &mut self,
        type_name: impl Into<TypeName>,
        id: impl Into<EntityId>,
        entity: EntityRef,
    ) {
        self.apply(DocumentKey::new(type_name, id), Intent::Update(entity));
    }

    /// Records the intent to delete the document of a removed entity.
    pub fn delete(&mut self, type_name: impl Into<TypeName>, id: impl Into<EntityId>) {
        self.apply(DocumentKey::new(type_name, id), Intent::Delete);
    }

    /// Folds a reindexing resolution into the plan, looking entities up
    /// through the entity source. A key whose entity no longer exists in
    /// the primary store becomes a delete, so a vanished entity cannot
    /// leave a stale document behind.
    pub fn add_or_update_from_resolution(
        &mut self,
        resolution: &ReindexingResolution,
        source: &dyn EntitySource,
    ) -> Result<()> {
        for key in resolution.keys() {
            match source.entity(key)? {
                Some(entity) => self.apply(key.clone(), Intent::Update(entity)),
                None => self.apply(key.clone(), Intent::Delete),
            }
        }
        Ok(())
    }

    fn apply(&mut self, key: DocumentKey, incoming: Intent) {
        let merged = match (self.entries.get(&key), incoming) {
            (None, incoming) => incoming,
            (Some(Intent::Delete), Intent::Add(entity) | Intent::Update(entity)) => {
                Intent::Update(entity)
            }
            (Some(Intent::Add(_) | Intent::Update(_)), Intent::Delete) => Intent::Delete,
            (Some(Intent::Add(_)), Intent::Add(entity) | Intent::Update(entity)) => {
                Intent::Add(entity)
            }
            (Some(Intent::Update(_)), Intent::Add(entity) | Intent::Update(entity)) => {
                Intent::Update(entity)
            }
            (Some(Intent::Delete), Intent::Delete) => Intent::Delete,
        };
        if self.entries.insert(key.clone(), merged).is_none() {
            self.order.push(key);
        }
    }

    /// Flushes the plan: derives the document of every still-live entry,
    /// submits the surviving operations as one batch and resolves the
    /// returned outcome once the backend has acknowledged the batch.
    ///
    /// The flush runs on the context's pool; the caller decides whether to
    /// wait on the receiver or let the outcome resolve in the background.
    pub fn execute(self, context: PlanContext) -> oneshot::Receiver<PlanOutcome> {
        if self.entries.is_empty() {
            return oneshot::ready(PlanOutcome::default());
        }
        let (sender, receiver) = oneshot::channel();
        let pool = context.pool.clone();
        pool.spawn_detached(move || {
            let outcome = flush(self.order, self.entries, &context);
            let _ = sender.send(outcome);
        });
        receiver
    }
}

fn flush(
    order: Vec<DocumentKey>,
    mut entries: AHashMap<DocumentKey, Intent>,
    context: &PlanContext,
) -> PlanOutcome {
    let mut outcome = PlanOutcome::default();
    let mut operations = Vec::with_capacity(order.len());

    for key in order {
        let Some(intent) = entries.remove(&key) else {
            continue;
        };
        match intent {
            Intent::Delete => operations.push(IndexOperation::delete(key)),
            Intent::Add(entity) => match context.deriver.derive(entity.as_ref()) {
                Ok(document) => operations.push(IndexOperation::add(key, document)),
                Err(error) => outcome.failed.push((key, error)),
            },
            Intent::Update(entity) => match context.deriver.derive(entity.as_ref()) {
                Ok(document) => operations.push(IndexOperation::update(key, document)),
                Err(error) => outcome.failed.push((key, error)),
            },
        }
    }

    if operations.is_empty() {
        return outcome;
    }

    log::debug!("flushing indexing plan with {} operations", operations.len());
    let pending: Vec<DocumentKey> = operations.iter().map(|op| op.key.clone()).collect();
    let (batch, ack) = SubmittedBatch::new(operations);

    let retry_queue = context.queue.clone();
    let submitted = context.submitter.submit(&context.queue, batch, move |batch| {
        let _ = retry_queue.send(batch);
    });
    if let Err(error) = submitted {
        for key in pending {
            outcome.failed.push((key, error.clone()));
        }
        return outcome;
    }

    match ack.recv() {
        Some(batch_outcome) => {
            let mut failed_keys: Vec<DocumentKey> = Vec::new();
            for (key, error) in batch_outcome.failures {
                failed_keys.push(key.clone());
                outcome.failed.push((key, error));
            }
            outcome.succeeded = pending
                .into_iter()
                .filter(|key| !failed_keys.contains(key))
                .collect();
        }
        None => {
            let error = Error::interrupted("backend acknowledgement");
            for key in pending {
                outcome.failed.push((key, error.clone()));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::IndexedEntity;
    use crate::operation::{BatchOutcome, Document, OperationKind};
    use entwine_common::error::ErrorKind;
    use serde_json::json;
    use std::sync::Mutex;
    use std::thread;

    struct TestEntity {
        type_name: &'static str,
        id: u64,
        name: Mutex<String>,
    }

    impl TestEntity {
        fn new(type_name: &'static str, id: u64, name: &str) -> EntityRef {
            Arc::new(TestEntity {
                type_name,
                id,
                name: Mutex::new(name.to_string()),
            })
        }
    }

    impl IndexedEntity for TestEntity {
        fn concrete_type(&self) -> TypeName {
            TypeName::from(self.type_name)
        }

        fn id(&self) -> EntityId {
            EntityId::from(self.id)
        }
    }

    struct JsonDeriver;

    impl DocumentDeriver for JsonDeriver {
        fn derive(&self, entity: &dyn IndexedEntity) -> Result<Document> {
            let entity = (entity as &dyn std::any::Any)
                .downcast_ref::<TestEntity>()
                .expect("test entity");
            Ok(Document::new(
                json!({ "name": entity.name.lock().unwrap().clone() }),
            ))
        }
    }

    /// Deriver that fails for one specific identifier.
    struct FailingDeriver {
        poisoned_id: u64,
    }

    impl DocumentDeriver for FailingDeriver {
        fn derive(&self, entity: &dyn IndexedEntity) -> Result<Document> {
            if entity.id() == EntityId::from(self.poisoned_id) {
                Err(Error::derivation(entity.id().to_string(), "boom"))
            } else {
                Ok(Document::new(json!({})))
            }
        }
    }

    /// Spawns a backend worker thread that applies every batch successfully
    /// and records the operations it saw.
    fn recording_backend(
        receiver: queue::Receiver<SubmittedBatch>,
    ) -> Arc<Mutex<Vec<IndexOperation>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        thread::spawn(move || {
            while let Ok(batch) = receiver.recv() {
                sink.lock().unwrap().extend(batch.operations.clone());
                let _ = batch.ack.send(BatchOutcome::success());
            }
        });
        seen
    }

    fn context(
        deriver: Arc<dyn DocumentDeriver>,
        sender: queue::Sender<SubmittedBatch>,
    ) -> PlanContext {
        PlanContext {
            deriver,
            submitter: OperationSubmitter::blocking(),
            queue: sender,
            pool: ThreadPool::with_name(1, "plan-test"),
        }
    }

    #[test]
    fn test_update_twice_produces_single_update() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);
        let entity = TestEntity::new("Author", 1, "Isaac Asimov");

        let mut plan = IndexingPlan::new();
        plan.update("Author", 1u64, entity.clone());
        plan.update("Author", 1u64, entity);
        let outcome = plan
            .execute(context(Arc::new(JsonDeriver), sender))
            .recv()
            .unwrap();

        assert!(outcome.is_success());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, OperationKind::Update);
        assert_eq!(seen[0].key, DocumentKey::new("Author", 1u64));
    }

    #[test]
    fn test_add_then_delete_collapses_to_delete() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);
        let entity = TestEntity::new("Book", 2, "Robots Of Dawn");

        let mut plan = IndexingPlan::new();
        plan.add("Book", 2u64, entity);
        plan.delete("Book", 2u64);
        let outcome = plan
            .execute(context(Arc::new(JsonDeriver), sender))
            .recv()
            .unwrap();

        assert!(outcome.is_success());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, OperationKind::Delete);
        assert!(seen[0].document.is_none());
    }

    #[test]
    fn test_delete_then_add_collapses_to_update() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);
        let entity = TestEntity::new("Book", 3, "Foundation");

        let mut plan = IndexingPlan::new();
        plan.delete("Book", 3u64);
        plan.add("Book", 3u64, entity);
        let outcome = plan
            .execute(context(Arc::new(JsonDeriver), sender))
            .recv()
            .unwrap();

        assert!(outcome.is_success());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, OperationKind::Update);
    }

    #[test]
    fn test_derivation_reads_state_at_flush_time() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);
        let entity = TestEntity::new("Author", 1, "Isaak Yudovich Ozimov");

        let mut plan = IndexingPlan::new();
        plan.update("Author", 1u64, entity.clone());

        // The entity changes after the intent was recorded.
        let concrete = (entity.as_ref() as &dyn std::any::Any)
            .downcast_ref::<TestEntity>()
            .unwrap();
        *concrete.name.lock().unwrap() = "Isaac Asimov".to_string();

        let outcome = plan
            .execute(context(Arc::new(JsonDeriver), sender))
            .recv()
            .unwrap();
        assert!(outcome.is_success());
        let seen = seen.lock().unwrap();
        assert_eq!(
            seen[0].document.as_ref().unwrap().value()["name"],
            "Isaac Asimov"
        );
    }

    #[test]
    fn test_failed_derivation_does_not_abort_batch() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);

        let mut plan = IndexingPlan::new();
        plan.update("Author", 1u64, TestEntity::new("Author", 1, "good"));
        plan.update("Author", 2u64, TestEntity::new("Author", 2, "bad"));
        plan.update("Author", 3u64, TestEntity::new("Author", 3, "good"));
        let outcome = plan
            .execute(context(Arc::new(FailingDeriver { poisoned_id: 2 }), sender))
            .recv()
            .unwrap();

        assert_eq!(outcome.succeeded.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, DocumentKey::new("Author", 2u64));
        assert!(matches!(
            outcome.failed[0].1.kind(),
            ErrorKind::Derivation { .. }
        ));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_rejected_submission_fails_all_pending_keys() {
        let (sender, _receiver) = queue::bounded(1);
        // Fill the queue so the plan's batch is rejected.
        let (filler, _ack) = SubmittedBatch::new(Vec::new());
        sender.send(filler).unwrap();

        let mut plan = IndexingPlan::new();
        plan.update("Author", 1u64, TestEntity::new("Author", 1, "a"));
        plan.delete("Author", 2u64);
        let context = PlanContext {
            deriver: Arc::new(JsonDeriver),
            submitter: OperationSubmitter::rejecting(),
            queue: sender,
            pool: ThreadPool::with_name(1, "plan-test"),
        };
        let outcome = plan.execute(context).recv().unwrap();

        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(
            outcome
                .failed
                .iter()
                .all(|(_, error)| matches!(error.kind(), ErrorKind::QueueFull))
        );
    }

    struct MissingEntitySource;

    impl EntitySource for MissingEntitySource {
        fn entity(&self, _key: &DocumentKey) -> Result<Option<EntityRef>> {
            Ok(None)
        }
    }

    #[test]
    fn test_resolution_of_vanished_entity_becomes_delete() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);

        let mut resolution = ReindexingResolution::new();
        resolution.insert(DocumentKey::new("Book", 9u64));

        let mut plan = IndexingPlan::new();
        plan.add_or_update_from_resolution(&resolution, &MissingEntitySource)
            .unwrap();
        let outcome = plan
            .execute(context(Arc::new(JsonDeriver), sender))
            .recv()
            .unwrap();

        assert!(outcome.is_success());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, OperationKind::Delete);
        assert_eq!(seen[0].key, DocumentKey::new("Book", 9u64));
    }

    #[test]
    fn test_empty_plan_flushes_nothing() {
        let (sender, receiver) = queue::bounded(4);
        let seen = recording_backend(receiver);
        let plan = IndexingPlan::new();
        let outcome = plan
            .execute(context(Arc::new(JsonDeriver), sender))
            .recv()
            .unwrap();
        assert!(outcome.is_success());
        assert!(outcome.succeeded.is_empty());
        assert!(seen.lock().unwrap().is_empty());
    }
}
