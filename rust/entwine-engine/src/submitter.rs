//! Admission-control policies in front of the bounded operation queue.
//!
//! Every producer (live indexing plans, bulk loader workers) reaches the
//! shared queue exclusively through an [`OperationSubmitter`] value, so the
//! backpressure policy can be swapped without touching any producer code.

use std::sync::Arc;

use entwine_common::{Result, error::Error};
use entwine_workflow::queue;

/// Runs an offloaded retry closure somewhere other than the calling thread.
pub type RetryExecutor = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// A submission policy, chosen once per producer and shared freely.
///
/// All variants are safe under arbitrary concurrent callers against the same
/// queue.
#[derive(Clone)]
pub enum OperationSubmitter {
    /// The caller blocks until the queue has room. Backpressure is
    /// preserved and no work is ever dropped; the consumer side must keep
    /// draining, or callers wait forever.
    Blocking,
    /// The caller fails immediately with [`Error::queue_full`] when the
    /// queue is at capacity. For latency-sensitive paths that must not be
    /// delayed and can surface the admission failure.
    Rejecting,
    /// The caller never blocks: when the queue is full, the submission
    /// itself is handed to the executor, which pays the blocking cost.
    Offloading(RetryExecutor),
}

impl OperationSubmitter {
    pub fn blocking() -> OperationSubmitter {
        OperationSubmitter::Blocking
    }

    pub fn rejecting() -> OperationSubmitter {
        OperationSubmitter::Rejecting
    }

    /// Creates an offloading submitter around the given executor. The
    /// executor receives the retry closure whenever the queue rejects an
    /// element.
    pub fn offloading(executor: RetryExecutor) -> OperationSubmitter {
        OperationSubmitter::Offloading(executor)
    }

    /// Submits `element` to the queue under this policy.
    ///
    /// `retry` performs the offloaded blocking submission: it receives the
    /// rejected element and is expected to regenerate whatever part of it
    /// cannot be requeued as-is, then block until the queue accepts it.
    /// Only the offloading policy ever invokes it.
    pub fn submit<T, F>(&self, queue: &queue::Sender<T>, element: T, retry: F) -> Result<()>
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        match self {
            OperationSubmitter::Blocking => queue
                .send(element)
                .map_err(|_| Error::interrupted("operation queue")),
            OperationSubmitter::Rejecting => match queue.try_send(element) {
                Ok(()) => Ok(()),
                Err(queue::TrySendError::Full(_)) => Err(Error::queue_full()),
                Err(queue::TrySendError::Disconnected(_)) => {
                    Err(Error::interrupted("operation queue"))
                }
            },
            OperationSubmitter::Offloading(executor) => match queue.try_send(element) {
                Ok(()) => Ok(()),
                Err(queue::TrySendError::Full(element)) => {
                    executor(Box::new(move || retry(element)));
                    Ok(())
                }
                Err(queue::TrySendError::Disconnected(_)) => {
                    Err(Error::interrupted("operation queue"))
                }
            },
        }
    }
}
