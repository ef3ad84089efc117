//! The end-of-run report of a mass indexing run.

use entwine_common::error::Error;
use entwine_model::TypeName;

/// Summary returned when a run finishes, successfully or not.
///
/// A run that completed its pipeline but skipped some entities is still
/// returned as a report; only setup faults (bad configuration, failed index
/// preparation) surface as an `Err` from the indexer instead.
#[derive(Debug, Default)]
pub struct MassIndexingReport {
    /// Final per-type failure counts, suppressed reports included.
    pub entity_failures: Vec<(TypeName, u64)>,
    /// Failures that took down an entire type group, such as a scroll that
    /// could not be created.
    pub group_failures: Vec<(TypeName, Error)>,
    /// Failure of the final segment merge, when one was requested.
    pub finish_error: Option<Error>,
}

impl MassIndexingReport {
    /// Whether every targeted entity was indexed and the finish phase
    /// succeeded.
    pub fn is_success(&self) -> bool {
        self.entity_failures.iter().all(|(_, count)| *count == 0)
            && self.group_failures.is_empty()
            && self.finish_error.is_none()
    }

    /// Total number of entities that failed to index, across all types.
    pub fn failed_entities(&self) -> u64 {
        self.entity_failures.iter().map(|(_, count)| count).sum()
    }
}
