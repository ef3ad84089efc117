//! A plain thread pool for executing blocking work items.
//!
//! Worker threads take boxed tasks off a shared channel and run them.
//! The pool is used for loader workers and backend workers, which spend most
//! of their time blocked on store or backend I/O; there is no work stealing
//! and no nesting, so a fixed set of threads draining a channel is all that
//! is needed.

use std::thread;

use crate::{oneshot, queue};

type TaskFn = Box<dyn FnOnce() + Send + 'static>;

/// A pool of worker threads draining a shared task channel.
///
/// All clones share the same workers. The workers exit once every clone of
/// the pool has been dropped and the remaining tasks have run.
#[derive(Clone)]
pub struct ThreadPool(queue::Sender<TaskFn>);

impl ThreadPool {
    /// Creates a pool with `num_threads` workers.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub fn new(num_threads: usize) -> ThreadPool {
        Self::with_name(num_threads, "entwine-worker")
    }

    /// Creates a pool whose worker threads are named `{prefix}-{index}`.
    ///
    /// # Panics
    ///
    /// Panics if `num_threads` is zero.
    pub fn with_name(num_threads: usize, prefix: &str) -> ThreadPool {
        assert_ne!(num_threads, 0, "thread pool requires at least one thread");
        let (sender, receiver) = queue::unbounded::<TaskFn>();
        for index in 0..num_threads {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("{prefix}-{index}"))
                .spawn(move || {
                    while let Ok(task) = receiver.recv() {
                        task();
                    }
                })
                .expect("failed to spawn worker thread");
        }
        ThreadPool(sender)
    }

    /// Submits a task and returns a handle to wait for its result.
    pub fn spawn<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        self.spawn_detached(move || {
            let _ = sender.send(f());
        });
        JoinHandle(receiver)
    }

    /// Submits a task without keeping a handle to its completion.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.0
            .send(Box::new(f))
            .unwrap_or_else(|_| panic!("thread pool workers have shut down"));
    }
}

/// A handle for waiting on the result of a spawned task.
pub struct JoinHandle<R>(oneshot::Receiver<R>);

impl<R> JoinHandle<R> {
    /// Blocks until the task completes and returns its result.
    ///
    /// # Panics
    ///
    /// Panics if the task itself panicked and the result was lost.
    pub fn join(self) -> R {
        self.0.recv().expect("worker task dropped its result")
    }

    /// Returns the result if the task has already completed.
    pub fn try_join(&self) -> Option<R> {
        self.0.try_recv()
    }
}
