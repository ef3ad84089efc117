//! The backend worker draining the shared operation queue.

use std::sync::Arc;

use entwine_workflow::{
    queue,
    thread_pool::{JoinHandle, ThreadPool},
};

use crate::collaborator::BackendClient;
use crate::operation::SubmittedBatch;

/// Consumes submitted batches from the operation queue and applies them
/// through the backend client, acknowledging each batch with its outcome.
///
/// Multiple workers may drain the same queue; batches for distinct keys
/// carry no relative ordering guarantee, which matches the eventual
/// consistency contract of the index.
pub struct BackendWorker;

impl BackendWorker {
    /// Spawns a worker on the pool. The worker exits once every sender of
    /// the queue has been dropped and the buffered batches are applied.
    pub fn spawn(
        pool: &ThreadPool,
        receiver: queue::Receiver<SubmittedBatch>,
        client: Arc<dyn BackendClient>,
    ) -> JoinHandle<()> {
        pool.spawn(move || {
            while let Ok(batch) = receiver.recv() {
                let outcome = client.apply_batch(batch.operations);
                // The producer may have given up waiting; the outcome is
                // simply dropped then.
                let _ = batch.ack.send(outcome);
            }
        })
    }
}
