//! End-to-end tests of the mass indexing pipeline against in-memory fakes:
//! a fixture store serving identifier scrolls and bulk loads, the real
//! operation queue and a backend worker writing into an in-memory index.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use ahash::AHashMap;
use entwine_common::{Result, error::ErrorKind};
use entwine_engine::{
    BackendClient, BackendWorker, BatchOutcome, Document, DocumentDeriver, EntityRef,
    IndexOperation, IndexedEntity, OperationKind, OperationSubmitter, SubmittedBatch, entity_key,
};
use entwine_massindex::{
    EntityLoader, IdentifierScroll, LoadingContext, MassIndexer, MassIndexingContext,
    MassIndexingFailure, MassIndexingFailureHandler, MassIndexingMonitor, MassLoadingStrategy,
    TypeGroup,
};
use entwine_model::{DependencyModel, DocumentKey, EntityId, TypeDef, TypeName};
use entwine_workflow::{queue, thread_pool::ThreadPool};
use serde_json::json;

struct Record {
    type_name: &'static str,
    id: u64,
    fields: serde_json::Value,
}

impl IndexedEntity for Record {
    fn concrete_type(&self) -> TypeName {
        TypeName::from(self.type_name)
    }

    fn id(&self) -> EntityId {
        EntityId::from(self.id)
    }
}

fn record(type_name: &'static str, id: u64, fields: serde_json::Value) -> EntityRef {
    Arc::new(Record {
        type_name,
        id,
        fields,
    })
}

/// Serves scrolls and bulk loads from per-group entity lists keyed by the
/// group's root type.
#[derive(Default)]
struct FixtureStore {
    corpus: AHashMap<TypeName, Vec<EntityRef>>,
}

impl FixtureStore {
    fn with_group(mut self, root: &str, entities: Vec<EntityRef>) -> FixtureStore {
        self.corpus.insert(TypeName::from(root), entities);
        self
    }
}

struct FixtureScroll {
    ids: Vec<EntityId>,
    fetch_size: usize,
    position: usize,
}

impl IdentifierScroll for FixtureScroll {
    fn total_count(&self) -> u64 {
        self.ids.len() as u64
    }

    fn next_batch(&mut self) -> Result<Option<Vec<EntityId>>> {
        if self.position >= self.ids.len() {
            return Ok(None);
        }
        let end = (self.position + self.fetch_size).min(self.ids.len());
        let batch = self.ids[self.position..end].to_vec();
        self.position = end;
        Ok(Some(batch))
    }
}

struct FixtureLoader {
    by_id: AHashMap<EntityId, EntityRef>,
}

impl EntityLoader for FixtureLoader {
    fn load(&self, ids: &[EntityId]) -> Result<Vec<EntityRef>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.by_id.get(id).cloned())
            .collect())
    }
}

impl MassLoadingStrategy for FixtureStore {
    fn create_identifier_scroll(
        &self,
        context: &LoadingContext,
        group: &TypeGroup,
    ) -> Result<Box<dyn IdentifierScroll>> {
        let entities = self.corpus.get(group.root()).cloned().unwrap_or_default();
        Ok(Box::new(FixtureScroll {
            ids: entities.iter().map(|entity| entity.id()).collect(),
            fetch_size: context.options().fetch_size as usize,
            position: 0,
        }))
    }

    fn create_entity_loader(
        &self,
        _context: &LoadingContext,
        group: &TypeGroup,
    ) -> Result<Arc<dyn EntityLoader>> {
        let entities = self.corpus.get(group.root()).cloned().unwrap_or_default();
        Ok(Arc::new(FixtureLoader {
            by_id: entities
                .into_iter()
                .map(|entity| (entity.id(), entity))
                .collect(),
        }))
    }
}

struct FieldDeriver;

impl DocumentDeriver for FieldDeriver {
    fn derive(&self, entity: &dyn IndexedEntity) -> Result<Document> {
        let record = (entity as &dyn std::any::Any)
            .downcast_ref::<Record>()
            .expect("record entity");
        Ok(Document::new(record.fields.clone()))
    }
}

/// Fails derivation for a chosen set of entity ids.
struct SelectivelyFailingDeriver {
    failing_ids: Vec<u64>,
}

impl DocumentDeriver for SelectivelyFailingDeriver {
    fn derive(&self, entity: &dyn IndexedEntity) -> Result<Document> {
        let record = (entity as &dyn std::any::Any)
            .downcast_ref::<Record>()
            .expect("record entity");
        if self.failing_ids.contains(&record.id) {
            return Err(entwine_common::error::Error::derivation(
                entity_key(entity).to_string(),
                "simulated mapping bug",
            ));
        }
        Ok(Document::new(record.fields.clone()))
    }
}

#[derive(Default)]
struct InMemoryIndex {
    documents: Mutex<AHashMap<DocumentKey, Document>>,
    purges: AtomicUsize,
    schema_drops: AtomicUsize,
    merges: AtomicUsize,
}

impl BackendClient for InMemoryIndex {
    fn apply_batch(&self, operations: Vec<IndexOperation>) -> BatchOutcome {
        let mut documents = self.documents.lock().unwrap();
        for operation in operations {
            match operation.kind {
                OperationKind::Add | OperationKind::Update => {
                    documents.insert(operation.key, operation.document.unwrap());
                }
                OperationKind::Delete => {
                    documents.remove(&operation.key);
                }
            }
        }
        BatchOutcome::success()
    }

    fn purge(&self, types: &[TypeName]) -> Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .retain(|key, _| !types.contains(key.type_name()));
        Ok(())
    }

    fn drop_and_create_schema(&self, types: &[TypeName]) -> Result<()> {
        self.schema_drops.fetch_add(1, Ordering::SeqCst);
        self.documents
            .lock()
            .unwrap()
            .retain(|key, _| !types.contains(key.type_name()));
        Ok(())
    }

    fn merge_segments(&self) -> Result<()> {
        self.merges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingMonitor {
    total: AtomicU64,
    loaded: AtomicU64,
    added: AtomicU64,
    completed: AtomicUsize,
}

impl MassIndexingMonitor for RecordingMonitor {
    fn add_to_total_count(&self, count: u64) {
        self.total.fetch_add(count, Ordering::SeqCst);
    }

    fn entities_loaded(&self, count: u64) {
        self.loaded.fetch_add(count, Ordering::SeqCst);
    }

    fn documents_added(&self, count: u64) {
        self.added.fetch_add(count, Ordering::SeqCst);
    }

    fn indexing_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingFailureHandler {
    handled: Mutex<Vec<MassIndexingFailure>>,
    summaries: Mutex<Vec<(TypeName, u64)>>,
}

impl MassIndexingFailureHandler for RecordingFailureHandler {
    fn handle(&self, failure: &MassIndexingFailure) {
        self.handled.lock().unwrap().push(failure.clone());
    }

    fn summarize(&self, type_name: &TypeName, suppressed: u64) {
        self.summaries
            .lock()
            .unwrap()
            .push((type_name.clone(), suppressed));
    }
}

fn flat_model() -> Arc<DependencyModel> {
    Arc::new(
        DependencyModel::builder()
            .with_type(TypeDef::indexed("Author").property("name"))
            .with_type(TypeDef::indexed("Book").property("title"))
            .build()
            .unwrap(),
    )
}

struct Pipeline {
    index: Arc<InMemoryIndex>,
    pool: ThreadPool,
    worker: entwine_workflow::thread_pool::JoinHandle<()>,
}

impl Pipeline {
    fn new() -> (Pipeline, queue::Sender<SubmittedBatch>) {
        let index = Arc::new(InMemoryIndex::default());
        let pool = ThreadPool::with_name(1, "massindex-test-backend");
        let (sender, receiver) = queue::bounded(16);
        let worker = BackendWorker::spawn(&pool, receiver, index.clone());
        (
            Pipeline {
                index,
                pool,
                worker,
            },
            sender,
        )
    }

    fn shutdown(self) -> Arc<InMemoryIndex> {
        drop(self.pool);
        self.worker.join();
        self.index
    }
}

fn context(
    model: Arc<DependencyModel>,
    store: FixtureStore,
    deriver: Arc<dyn DocumentDeriver>,
    index: Arc<InMemoryIndex>,
    sender: queue::Sender<SubmittedBatch>,
) -> MassIndexingContext {
    MassIndexingContext {
        model,
        strategy: Arc::new(store),
        deriver,
        client: index,
        queue: sender,
        submitter: OperationSubmitter::blocking(),
    }
}

#[test]
fn test_full_run_repopulates_all_types() {
    let mut authors: Vec<EntityRef> = (1..=5)
        .map(|id| record("Author", id, json!({ "name": format!("author {id}") })))
        .collect();
    fastrand::shuffle(&mut authors);
    let books: Vec<EntityRef> = (1..=3)
        .map(|id| record("Book", id, json!({ "title": format!("book {id}") })))
        .collect();
    let store = FixtureStore::default()
        .with_group("Author", authors)
        .with_group("Book", books);

    let (pipeline, sender) = Pipeline::new();
    let monitor = Arc::new(RecordingMonitor::default());
    let report = MassIndexer::new(context(
        flat_model(),
        store,
        Arc::new(FieldDeriver),
        pipeline.index.clone(),
        sender,
    ))
    .types(["Author", "Book"])
    .types_in_parallel(2)
    .batch_size(2)
    .monitor(monitor.clone())
    .start_and_wait()
    .unwrap();

    assert!(report.is_success());
    let index = pipeline.shutdown();
    let documents = index.documents.lock().unwrap();
    assert_eq!(documents.len(), 8);
    assert_eq!(
        documents[&DocumentKey::new("Author", 3u64)].value()["name"],
        "author 3"
    );
    assert_eq!(monitor.total.load(Ordering::SeqCst), 8);
    assert_eq!(monitor.loaded.load(Ordering::SeqCst), 8);
    assert_eq!(monitor.added.load(Ordering::SeqCst), 8);
    assert_eq!(monitor.completed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_hierarchy_is_scrolled_once_through_its_root() {
    let model = Arc::new(
        DependencyModel::builder()
            .with_type(TypeDef::indexed("Work").property("title"))
            .with_type(TypeDef::indexed("Novel").supertype("Work").property("title"))
            .build()
            .unwrap(),
    );
    // The store scrolls the hierarchy through its root; the subtype entity
    // keeps its concrete type in the index.
    let store = FixtureStore::default().with_group(
        "Work",
        vec![
            record("Work", 1, json!({ "title": "collected essays" })),
            record("Novel", 2, json!({ "title": "the dispossessed" })),
        ],
    );

    let (pipeline, sender) = Pipeline::new();
    let monitor = Arc::new(RecordingMonitor::default());
    let report = MassIndexer::new(context(
        model,
        store,
        Arc::new(FieldDeriver),
        pipeline.index.clone(),
        sender,
    ))
    .types(["Work", "Novel"])
    .monitor(monitor.clone())
    .start_and_wait()
    .unwrap();

    assert!(report.is_success());
    let index = pipeline.shutdown();
    let documents = index.documents.lock().unwrap();
    assert_eq!(documents.len(), 2);
    assert!(documents.contains_key(&DocumentKey::new("Work", 1u64)));
    assert!(documents.contains_key(&DocumentKey::new("Novel", 2u64)));
    // One group, counted once.
    assert_eq!(monitor.total.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failure_flood_is_suppressed_beyond_threshold() {
    let books: Vec<EntityRef> = (1..=10)
        .map(|id| record("Book", id, json!({ "title": format!("book {id}") })))
        .collect();
    let store = FixtureStore::default().with_group("Book", books);

    let (pipeline, sender) = Pipeline::new();
    let handler = Arc::new(RecordingFailureHandler::default());
    let report = MassIndexer::new(context(
        flat_model(),
        store,
        Arc::new(SelectivelyFailingDeriver {
            failing_ids: (1..=8).collect(),
        }),
        pipeline.index.clone(),
        sender,
    ))
    .types(["Book"])
    .failure_threshold(5)
    .failure_handler(handler.clone())
    .start_and_wait()
    .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.entity_failures, vec![(TypeName::from("Book"), 8)]);
    assert_eq!(report.failed_entities(), 8);
    assert_eq!(handler.handled.lock().unwrap().len(), 5);
    assert_eq!(
        *handler.summaries.lock().unwrap(),
        vec![(TypeName::from("Book"), 3)]
    );

    // The two healthy entities still made it into the index.
    let index = pipeline.shutdown();
    assert_eq!(index.documents.lock().unwrap().len(), 2);
}

#[test]
fn test_objects_limit_caps_each_group() {
    let authors: Vec<EntityRef> = (1..=10)
        .map(|id| record("Author", id, json!({ "name": format!("author {id}") })))
        .collect();
    let store = FixtureStore::default().with_group("Author", authors);

    let (pipeline, sender) = Pipeline::new();
    let monitor = Arc::new(RecordingMonitor::default());
    let report = MassIndexer::new(context(
        flat_model(),
        store,
        Arc::new(FieldDeriver),
        pipeline.index.clone(),
        sender,
    ))
    .types(["Author"])
    .objects_limit(4)
    .batch_size(3)
    .monitor(monitor.clone())
    .start_and_wait()
    .unwrap();

    assert!(report.is_success());
    let index = pipeline.shutdown();
    assert_eq!(index.documents.lock().unwrap().len(), 4);
    assert_eq!(monitor.total.load(Ordering::SeqCst), 4);
}

#[test]
fn test_purge_on_start_with_merge_after_purge() {
    let store = FixtureStore::default().with_group(
        "Author",
        vec![record("Author", 1, json!({ "name": "fresh" }))],
    );
    let (pipeline, sender) = Pipeline::new();
    // A stale document that the purge must remove.
    pipeline.index.documents.lock().unwrap().insert(
        DocumentKey::new("Author", 99u64),
        Document::new(json!({ "name": "stale" })),
    );

    let report = MassIndexer::new(context(
        flat_model(),
        store,
        Arc::new(FieldDeriver),
        pipeline.index.clone(),
        sender,
    ))
    .types(["Author"])
    .start_and_wait()
    .unwrap();

    assert!(report.is_success());
    let index = pipeline.shutdown();
    assert_eq!(index.purges.load(Ordering::SeqCst), 1);
    assert_eq!(index.merges.load(Ordering::SeqCst), 1);
    assert_eq!(index.schema_drops.load(Ordering::SeqCst), 0);
    let documents = index.documents.lock().unwrap();
    assert_eq!(documents.len(), 1);
    assert!(documents.contains_key(&DocumentKey::new("Author", 1u64)));
}

#[test]
fn test_drop_and_create_schema_skips_purge() {
    let store = FixtureStore::default().with_group(
        "Author",
        vec![record("Author", 1, json!({ "name": "fresh" }))],
    );
    let (pipeline, sender) = Pipeline::new();

    let report = MassIndexer::new(context(
        flat_model(),
        store,
        Arc::new(FieldDeriver),
        pipeline.index.clone(),
        sender,
    ))
    .types(["Author"])
    .drop_and_create_schema_on_start(true)
    .merge_segments_on_finish(true)
    .start_and_wait()
    .unwrap();

    assert!(report.is_success());
    let index = pipeline.shutdown();
    assert_eq!(index.schema_drops.load(Ordering::SeqCst), 1);
    assert_eq!(index.purges.load(Ordering::SeqCst), 0);
    // The only merge is the final one.
    assert_eq!(index.merges.load(Ordering::SeqCst), 1);
}

#[test]
fn test_requesting_no_types_is_a_configuration_error() {
    let store = FixtureStore::default();
    let (pipeline, sender) = Pipeline::new();
    let error = MassIndexer::new(context(
        flat_model(),
        store,
        Arc::new(FieldDeriver),
        pipeline.index.clone(),
        sender,
    ))
    .start_and_wait()
    .unwrap_err();
    assert!(matches!(error.kind(), ErrorKind::Configuration { .. }));
    pipeline.shutdown();
}

struct EndlessScroll;

impl IdentifierScroll for EndlessScroll {
    fn total_count(&self) -> u64 {
        1_000_000
    }

    fn next_batch(&mut self) -> Result<Option<Vec<EntityId>>> {
        thread::sleep(Duration::from_millis(2));
        Ok(Some(vec![EntityId::from(fastrand::u64(..))]))
    }
}

struct VanishedLoader;

impl EntityLoader for VanishedLoader {
    fn load(&self, _ids: &[EntityId]) -> Result<Vec<EntityRef>> {
        Ok(Vec::new())
    }
}

struct EndlessStrategy;

impl MassLoadingStrategy for EndlessStrategy {
    fn create_identifier_scroll(
        &self,
        _context: &LoadingContext,
        _group: &TypeGroup,
    ) -> Result<Box<dyn IdentifierScroll>> {
        Ok(Box::new(EndlessScroll))
    }

    fn create_entity_loader(
        &self,
        _context: &LoadingContext,
        _group: &TypeGroup,
    ) -> Result<Arc<dyn EntityLoader>> {
        Ok(Arc::new(VanishedLoader))
    }
}

#[test]
fn test_request_stop_aborts_the_scroll() {
    let (pipeline, sender) = Pipeline::new();
    let handle = MassIndexer::new(MassIndexingContext {
        model: flat_model(),
        strategy: Arc::new(EndlessStrategy),
        deriver: Arc::new(FieldDeriver),
        client: pipeline.index.clone(),
        queue: sender,
        submitter: OperationSubmitter::blocking(),
    })
    .types(["Author"])
    .batch_size(2)
    .start();

    thread::sleep(Duration::from_millis(20));
    handle.request_stop();
    let report = handle.wait().unwrap();

    assert!(!report.is_success());
    assert_eq!(report.group_failures.len(), 1);
    assert_eq!(report.group_failures[0].0.as_str(), "Author");
    assert!(matches!(
        report.group_failures[0].1.kind(),
        ErrorKind::NotActive { .. }
    ));
    pipeline.shutdown();
}
