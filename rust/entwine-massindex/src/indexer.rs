//! The mass indexer: configuration builder and run coordinator.
//!
//! A run owns one coordinator thread, one pool of group tasks (index
//! preparation has already happened by then) and one pool of loader
//! workers. Per type group, the coordinator scrolls identifiers and feeds
//! fixed-size id batches over a bounded channel to the group's loader
//! workers, which bulk-fetch entities, derive documents and submit them to
//! the shared operation queue. The bounded channel is what keeps memory
//! flat: a slow backend stalls the loaders, which stalls the scroll.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use entwine_common::{Result, error::Error};
use entwine_engine::{
    BackendClient, DocumentDeriver, IndexOperation, OperationSubmitter, SubmittedBatch, entity_key,
};
use entwine_model::{DependencyModel, DocumentKey, EntityId, TypeName};
use entwine_workflow::{oneshot, queue, thread_pool::ThreadPool};

use crate::failure::{
    FailureCollector, LogFailureHandler, MassIndexingFailure, MassIndexingFailureHandler,
};
use crate::grouping::{TypeGroup, group_types};
use crate::loading::{CacheMode, EntityLoader, LoadingContext, LoadingOptions, MassLoadingStrategy};
use crate::monitor::{LoggingMonitor, MassIndexingMonitor};
use crate::report::MassIndexingReport;

/// The external collaborators a mass indexing run works against.
#[derive(Clone)]
pub struct MassIndexingContext {
    pub model: Arc<DependencyModel>,
    pub strategy: Arc<dyn MassLoadingStrategy>,
    pub deriver: Arc<dyn DocumentDeriver>,
    pub client: Arc<dyn BackendClient>,
    /// The shared operation queue, typically drained by the same backend
    /// workers that serve live change propagation.
    pub queue: queue::Sender<SubmittedBatch>,
    pub submitter: OperationSubmitter,
}

/// Builder-style configuration for one mass indexing run.
///
/// Defaults match a conservative setup: one type group at a time, two
/// loader threads per group, batches of ten documents, a purge of the
/// targeted indexes on start and up to a hundred individually reported
/// failures per type.
pub struct MassIndexer {
    context: MassIndexingContext,
    types: Vec<TypeName>,
    types_in_parallel: usize,
    loader_threads: usize,
    batch_size: usize,
    fetch_size: u32,
    cache_mode: CacheMode,
    objects_limit: Option<u64>,
    drop_and_create_schema_on_start: bool,
    purge_all_on_start: Option<bool>,
    merge_segments_on_finish: bool,
    merge_segments_after_purge: bool,
    failure_threshold: u64,
    monitor: Arc<dyn MassIndexingMonitor>,
    failure_handler: Arc<dyn MassIndexingFailureHandler>,
    active: Arc<AtomicBool>,
}

impl MassIndexer {
    pub fn new(context: MassIndexingContext) -> MassIndexer {
        MassIndexer {
            context,
            types: Vec::new(),
            types_in_parallel: 1,
            loader_threads: 2,
            batch_size: 10,
            fetch_size: 100,
            cache_mode: CacheMode::Ignore,
            objects_limit: None,
            drop_and_create_schema_on_start: false,
            purge_all_on_start: None,
            merge_segments_on_finish: false,
            merge_segments_after_purge: true,
            failure_threshold: 100,
            monitor: Arc::new(LoggingMonitor::new()),
            failure_handler: Arc::new(LogFailureHandler),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The root indexed types to repopulate.
    pub fn types<I, T>(mut self, types: I) -> MassIndexer
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeName>,
    {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Number of type groups indexed concurrently.
    pub fn types_in_parallel(mut self, count: usize) -> MassIndexer {
        self.types_in_parallel = count;
        self
    }

    /// Number of loader workers per concurrently indexed group.
    pub fn loader_threads(mut self, count: usize) -> MassIndexer {
        self.loader_threads = count;
        self
    }

    /// Number of entities per loading batch, and thus of operations per
    /// submitted backend batch.
    pub fn batch_size(mut self, size: usize) -> MassIndexer {
        self.batch_size = size;
        self
    }

    /// Number of identifiers fetched per scroll round trip.
    pub fn fetch_size(mut self, size: u32) -> MassIndexer {
        self.fetch_size = size;
        self
    }

    /// Cache interaction requested from the loading strategy.
    pub fn cache_mode(mut self, mode: CacheMode) -> MassIndexer {
        self.cache_mode = mode;
        self
    }

    /// Caps the number of entities indexed per type group; useful for
    /// smoke-testing a mapping against a production-sized store.
    pub fn objects_limit(mut self, limit: u64) -> MassIndexer {
        self.objects_limit = Some(limit);
        self
    }

    /// Drops and re-creates the target indexes before indexing. Implies no
    /// purge.
    pub fn drop_and_create_schema_on_start(mut self, enabled: bool) -> MassIndexer {
        self.drop_and_create_schema_on_start = enabled;
        self
    }

    /// Removes all documents of the target types before indexing. Defaults
    /// to on, unless the schema is dropped and re-created anyway.
    pub fn purge_all_on_start(mut self, enabled: bool) -> MassIndexer {
        self.purge_all_on_start = Some(enabled);
        self
    }

    /// Merges each index into a single segment once the run completes.
    pub fn merge_segments_on_finish(mut self, enabled: bool) -> MassIndexer {
        self.merge_segments_on_finish = enabled;
        self
    }

    /// Merges segments right after the initial purge, reclaiming the space
    /// of the purged documents before the new ones arrive. On by default.
    pub fn merge_segments_after_purge(mut self, enabled: bool) -> MassIndexer {
        self.merge_segments_after_purge = enabled;
        self
    }

    /// Number of failures per type reported individually before reporting
    /// switches to counting only.
    pub fn failure_threshold(mut self, threshold: u64) -> MassIndexer {
        self.failure_threshold = threshold;
        self
    }

    pub fn monitor(mut self, monitor: Arc<dyn MassIndexingMonitor>) -> MassIndexer {
        self.monitor = monitor;
        self
    }

    pub fn failure_handler(mut self, handler: Arc<dyn MassIndexingFailureHandler>) -> MassIndexer {
        self.failure_handler = handler;
        self
    }

    /// Starts the run on a dedicated coordinator thread and returns
    /// immediately.
    pub fn start(self) -> MassIndexingHandle {
        let (sender, outcome) = oneshot::channel();
        let active = self.active.clone();
        thread::Builder::new()
            .name("entwine-massindex".to_string())
            .spawn(move || {
                let _ = sender.send(self.run());
            })
            .expect("failed to spawn mass indexing coordinator");
        MassIndexingHandle { outcome, active }
    }

    /// Runs to completion on the calling thread's schedule.
    pub fn start_and_wait(self) -> Result<MassIndexingReport> {
        self.start().wait()
    }

    fn run(self) -> Result<MassIndexingReport> {
        if self.types.is_empty() {
            return Err(Error::configuration(
                "mass indexer",
                "at least one type must be selected for indexing",
            ));
        }
        entwine_common::verify_config!(types_in_parallel, self.types_in_parallel > 0);
        entwine_common::verify_config!(loader_threads, self.loader_threads > 0);
        entwine_common::verify_config!(batch_size, self.batch_size > 0);
        entwine_common::verify_config!(fetch_size, self.fetch_size > 0);
        let groups = group_types(&self.context.model, &self.types)?;
        let target_types: Vec<TypeName> = groups
            .iter()
            .flat_map(|group| group.types().iter().cloned())
            .collect();

        self.prepare_indexes(&target_types)?;

        let coordinator = Arc::new(Coordinator {
            context: self.context,
            loading: LoadingOptions {
                cache_mode: self.cache_mode,
                fetch_size: self.fetch_size,
                read_only: true,
                batch_size: self.batch_size,
            },
            objects_limit: self.objects_limit,
            loader_threads: self.loader_threads,
            monitor: self.monitor,
            collector: FailureCollector::new(self.failure_threshold, self.failure_handler),
            active: self.active,
        });

        let group_pool = ThreadPool::with_name(self.types_in_parallel, "entwine-massindex-group");
        let loader_pool = ThreadPool::with_name(
            self.types_in_parallel * self.loader_threads,
            "entwine-massindex-load",
        );

        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let coordinator = coordinator.clone();
                let loader_pool = loader_pool.clone();
                let root = group.root().clone();
                let handle = group_pool
                    .spawn(move || Coordinator::run_group(&coordinator, &group, &loader_pool));
                (root, handle)
            })
            .collect();

        let mut report = MassIndexingReport::default();
        for (root, handle) in handles {
            if let Err(error) = handle.join() {
                report.group_failures.push((root, error));
            }
        }
        drop(group_pool);
        drop(loader_pool);

        if self.merge_segments_on_finish {
            report.finish_error = coordinator.context.client.merge_segments().err();
        }
        report.entity_failures = coordinator.collector.finish();
        coordinator.monitor.indexing_completed();
        Ok(report)
    }

    fn prepare_indexes(&self, target_types: &[TypeName]) -> Result<()> {
        if self.drop_and_create_schema_on_start {
            self.context.client.drop_and_create_schema(target_types)?;
            return Ok(());
        }
        if self.purge_all_on_start.unwrap_or(true) {
            self.context.client.purge(target_types)?;
            if self.merge_segments_after_purge {
                self.context.client.merge_segments()?;
            }
        }
        Ok(())
    }
}

/// Handle of a started run.
pub struct MassIndexingHandle {
    outcome: oneshot::Receiver<Result<MassIndexingReport>>,
    active: Arc<AtomicBool>,
}

impl MassIndexingHandle {
    /// Requests a cooperative stop: the scroll of every group fails at its
    /// next liveness checkpoint and the run winds down. Entities already
    /// handed to the backend are not rolled back.
    pub fn request_stop(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Blocks until the run is over and returns its report.
    pub fn wait(self) -> Result<MassIndexingReport> {
        self.outcome
            .recv()
            .unwrap_or_else(|| Err(Error::interrupted("mass indexing coordinator")))
    }
}

struct Coordinator {
    context: MassIndexingContext,
    loading: LoadingOptions,
    objects_limit: Option<u64>,
    loader_threads: usize,
    monitor: Arc<dyn MassIndexingMonitor>,
    collector: FailureCollector,
    active: Arc<AtomicBool>,
}

impl Coordinator {
    fn run_group(
        this: &Arc<Coordinator>,
        group: &TypeGroup,
        loader_pool: &ThreadPool,
    ) -> Result<()> {
        let loading_context = LoadingContext::new(this.loading.clone(), this.active.clone());
        let mut scroll = this
            .context
            .strategy
            .create_identifier_scroll(&loading_context, group)?;
        let loader = this
            .context
            .strategy
            .create_entity_loader(&loading_context, group)?;

        let total = scroll.total_count();
        this.monitor
            .add_to_total_count(this.objects_limit.map_or(total, |limit| total.min(limit)));

        let (batch_sender, batch_receiver) = queue::bounded(this.loader_threads * 2);
        let workers: Vec<_> = (0..this.loader_threads)
            .map(|_| {
                let coordinator = this.clone();
                let receiver = batch_receiver.clone();
                let loader = loader.clone();
                let root = group.root().clone();
                loader_pool.spawn(move || {
                    while let Ok(ids) = receiver.recv() {
                        if coordinator.active.load(Ordering::Acquire) {
                            coordinator.load_and_index(loader.as_ref(), &root, ids);
                        }
                    }
                })
            })
            .collect();
        drop(batch_receiver);

        let scrolled = this.scroll_identifiers(&loading_context, scroll.as_mut(), &batch_sender);
        drop(batch_sender);
        for worker in workers {
            worker.join();
        }
        scrolled
    }

    /// Re-chunks scrolled identifiers into loading batches and feeds them
    /// to the group's workers, honoring the objects limit and the liveness
    /// flag.
    fn scroll_identifiers(
        &self,
        loading_context: &LoadingContext,
        scroll: &mut dyn crate::loading::IdentifierScroll,
        batches: &queue::Sender<Vec<EntityId>>,
    ) -> Result<()> {
        let mut budget = self.objects_limit;
        let mut pending: Vec<EntityId> = Vec::with_capacity(self.loading.batch_size);
        'scroll: loop {
            loading_context.ensure_active("identifier scroll")?;
            let Some(ids) = scroll.next_batch()? else {
                break;
            };
            for id in ids {
                if budget == Some(0) {
                    break 'scroll;
                }
                if let Some(remaining) = &mut budget {
                    *remaining -= 1;
                }
                pending.push(id);
                if pending.len() == self.loading.batch_size {
                    self.dispatch(batches, std::mem::take(&mut pending))?;
                    pending.reserve(self.loading.batch_size);
                }
            }
        }
        if !pending.is_empty() {
            self.dispatch(batches, pending)?;
        }
        Ok(())
    }

    fn dispatch(
        &self,
        batches: &queue::Sender<Vec<EntityId>>,
        ids: Vec<EntityId>,
    ) -> Result<()> {
        batches
            .send(ids)
            .map_err(|_| Error::interrupted("loader workers"))
    }

    /// One loader-worker step: bulk-fetch, derive, submit, await the
    /// backend acknowledgement. All failures are routed to the collector;
    /// nothing here aborts the group.
    fn load_and_index(&self, loader: &dyn EntityLoader, root: &TypeName, ids: Vec<EntityId>) {
        let entities = match loader.load(&ids) {
            Ok(entities) => entities,
            Err(error) => {
                self.collector
                    .report(MassIndexingFailure::for_type(root.clone(), error));
                return;
            }
        };
        self.monitor.entities_loaded(entities.len() as u64);

        let mut operations = Vec::with_capacity(entities.len());
        for entity in entities {
            let key = entity_key(entity.as_ref());
            match self.context.deriver.derive(entity.as_ref()) {
                Ok(document) => operations.push(IndexOperation::add(key, document)),
                Err(error) => self
                    .collector
                    .report(MassIndexingFailure::for_entity(key, error)),
            }
        }
        if operations.is_empty() {
            return;
        }

        let keys: Vec<DocumentKey> = operations
            .iter()
            .map(|operation| operation.key.clone())
            .collect();
        let (batch, ack) = SubmittedBatch::new(operations);
        let retry_queue = self.context.queue.clone();
        let submitted = self
            .context
            .submitter
            .submit(&self.context.queue, batch, move |batch| {
                let _ = retry_queue.send(batch);
            });
        if let Err(error) = submitted {
            for key in keys {
                self.collector
                    .report(MassIndexingFailure::for_entity(key, error.clone()));
            }
            return;
        }

        match ack.recv() {
            Some(outcome) => {
                let succeeded = keys.len() - outcome.failures.len();
                for (key, error) in outcome.failures {
                    self.collector
                        .report(MassIndexingFailure::for_entity(key, error));
                }
                self.monitor.documents_added(succeeded as u64);
            }
            None => {
                let error = Error::interrupted("backend acknowledgement");
                for key in keys {
                    self.collector
                        .report(MassIndexingFailure::for_entity(key, error.clone()));
                }
            }
        }
    }
}
