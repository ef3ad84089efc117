//! Per-entity failure handling with log-flooding protection.
//!
//! Mass indexing runs for hours over millions of entities; a systematic
//! mapping bug would otherwise produce one error report per entity. Each
//! type keeps its own failure counter, reports are forwarded to the handler
//! only up to the configured threshold, and everything beyond that is
//! counted silently and summarized at the end of the run.

use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use entwine_common::error::Error;
use entwine_model::{DocumentKey, TypeName};

/// One reportable failure of a mass indexing run.
#[derive(Debug, Clone)]
pub struct MassIndexingFailure {
    /// The entity type the failure is attributed to.
    pub type_name: TypeName,
    /// The failed entity, when the failure is attributable to one.
    pub key: Option<DocumentKey>,
    pub error: Error,
}

impl MassIndexingFailure {
    pub fn for_entity(key: DocumentKey, error: Error) -> MassIndexingFailure {
        MassIndexingFailure {
            type_name: key.type_name().clone(),
            key: Some(key),
            error,
        }
    }

    pub fn for_type(type_name: TypeName, error: Error) -> MassIndexingFailure {
        MassIndexingFailure {
            type_name,
            key: None,
            error,
        }
    }
}

/// Receives individual failure reports and the end-of-run suppression
/// summaries.
pub trait MassIndexingFailureHandler: Send + Sync {
    fn handle(&self, failure: &MassIndexingFailure);

    /// Called once per type that exceeded the threshold, with the number of
    /// failures that were counted but not individually reported.
    fn summarize(&self, type_name: &TypeName, suppressed: u64);
}

/// Default handler: every report goes to the log at error level.
#[derive(Debug, Default)]
pub struct LogFailureHandler;

impl MassIndexingFailureHandler for LogFailureHandler {
    fn handle(&self, failure: &MassIndexingFailure) {
        match &failure.key {
            Some(key) => log::error!("mass indexing failure for {key}: {}", failure.error),
            None => log::error!(
                "mass indexing failure for type '{}': {}",
                failure.type_name,
                failure.error
            ),
        }
    }

    fn summarize(&self, type_name: &TypeName, suppressed: u64) {
        log::warn!(
            "mass indexing of type '{type_name}': {suppressed} more failure(s) \
             occurred and were not reported individually"
        );
    }
}

/// Threshold-gated fan-in point for failures from all pipeline stages.
pub(crate) struct FailureCollector {
    threshold: u64,
    handler: Arc<dyn MassIndexingFailureHandler>,
    counters: Mutex<AHashMap<TypeName, u64>>,
}

impl FailureCollector {
    pub(crate) fn new(
        threshold: u64,
        handler: Arc<dyn MassIndexingFailureHandler>,
    ) -> FailureCollector {
        FailureCollector {
            threshold,
            handler,
            counters: Mutex::new(AHashMap::new()),
        }
    }

    /// Counts the failure and forwards it to the handler unless its type is
    /// already past the threshold.
    pub(crate) fn report(&self, failure: MassIndexingFailure) {
        let ordinal = {
            let mut counters = self.counters.lock().expect("failure counters lock");
            let counter = counters.entry(failure.type_name.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        if ordinal <= self.threshold {
            self.handler.handle(&failure);
        }
    }

    /// Emits the suppression summaries and returns the final per-type
    /// failure counts.
    pub(crate) fn finish(&self) -> Vec<(TypeName, u64)> {
        let counters = self.counters.lock().expect("failure counters lock");
        let mut counts: Vec<(TypeName, u64)> = counters
            .iter()
            .map(|(type_name, count)| (type_name.clone(), *count))
            .collect();
        counts.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        for (type_name, count) in &counts {
            if *count > self.threshold {
                self.handler.summarize(type_name, count - self.threshold);
            }
        }
        counts
    }
}
