//! A bounded, blocking multi-producer multi-consumer queue.
//!
//! This is the channel behind the shared operation queue that feeds the
//! search backend: many producers (live indexing plans, bulk loader workers)
//! against one or more consuming backend workers.
//!
//! [`Sender::send`] blocks while the queue is at capacity; [`Sender::try_send`]
//! never blocks and hands the rejected element back to the caller, which is
//! what the rejecting and offloading submission policies are built on.
//! The queue disconnects when either side drops its last handle: senders then
//! fail, and receivers drain the remaining buffer before reporting
//! disconnection.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
};

/// Creates a bounded queue with the given capacity, returning the
/// sender/receiver halves. Both halves can be cloned and shared across
/// threads.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn bounded<T>(capacity: usize) -> (Sender<T>, Receiver<T>) {
    assert_ne!(capacity, 0, "queue capacity must be non-zero");
    let shared = Arc::new(Shared::new(Some(capacity)));
    (Sender(shared.clone()), Receiver(shared))
}

/// Creates a queue without a capacity bound; `send` never blocks.
pub fn unbounded<T>() -> (Sender<T>, Receiver<T>) {
    let shared = Arc::new(Shared::new(None));
    (Sender(shared.clone()), Receiver(shared))
}

/// Error returned by [`Sender::send`] when all receivers are gone. Carries
/// the element that could not be delivered.
#[derive(Debug, PartialEq, Eq)]
pub struct SendError<T>(pub T);

/// Error returned by [`Sender::try_send`]. Both variants hand the element
/// back so the caller can retry or regenerate it.
#[derive(Debug, PartialEq, Eq)]
pub enum TrySendError<T> {
    /// The queue is at capacity.
    Full(T),
    /// All receivers are gone.
    Disconnected(T),
}

/// Error returned by [`Receiver::recv`] once the buffer is drained and all
/// senders are gone.
#[derive(Debug, PartialEq, Eq)]
pub struct RecvError;

/// The sending half of the queue.
pub struct Sender<T>(Arc<Shared<T>>);

impl<T> Sender<T> {
    /// Enqueues an element, blocking while the queue is at capacity.
    pub fn send(&self, element: T) -> Result<(), SendError<T>> {
        self.0.push(element)
    }

    /// Attempts to enqueue an element without blocking.
    pub fn try_send(&self, element: T) -> Result<(), TrySendError<T>> {
        self.0.try_push(element)
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Sender<T> {
        self.0.attach_sender();
        Sender(self.0.clone())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.0.detach_sender();
    }
}

/// The receiving half of the queue.
pub struct Receiver<T>(Arc<Shared<T>>);

impl<T> Receiver<T> {
    /// Dequeues an element, blocking while the queue is empty.
    ///
    /// Once all senders are dropped, the remaining buffered elements are
    /// still delivered; after that, `recv` returns [`RecvError`].
    pub fn recv(&self) -> Result<T, RecvError> {
        self.0.pop()
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Receiver<T> {
        self.0.attach_receiver();
        Receiver(self.0.clone())
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.0.detach_receiver();
    }
}

struct Inner<T> {
    buf: VecDeque<T>,
    senders: usize,
    receivers: usize,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    capacity: Option<usize>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> Shared<T> {
    fn new(capacity: Option<usize>) -> Shared<T> {
        Shared {
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                senders: 1,
                receivers: 1,
            }),
            capacity,
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    fn is_full(&self, inner: &Inner<T>) -> bool {
        self.capacity.is_some_and(|cap| inner.buf.len() >= cap)
    }

    fn push(&self, element: T) -> Result<(), SendError<T>> {
        let mut inner = self.inner.lock().expect("queue lock");
        while self.is_full(&inner) && inner.receivers != 0 {
            inner = self.not_full.wait(inner).expect("queue lock");
        }
        if inner.receivers == 0 {
            return Err(SendError(element));
        }
        inner.buf.push_back(element);
        self.not_empty.notify_one();
        Ok(())
    }

    fn try_push(&self, element: T) -> Result<(), TrySendError<T>> {
        let mut inner = self.inner.lock().expect("queue lock");
        if inner.receivers == 0 {
            return Err(TrySendError::Disconnected(element));
        }
        if self.is_full(&inner) {
            return Err(TrySendError::Full(element));
        }
        inner.buf.push_back(element);
        self.not_empty.notify_one();
        Ok(())
    }

    fn pop(&self) -> Result<T, RecvError> {
        let mut inner = self.inner.lock().expect("queue lock");
        loop {
            if let Some(element) = inner.buf.pop_front() {
                self.not_full.notify_one();
                return Ok(element);
            }
            if inner.senders == 0 {
                return Err(RecvError);
            }
            inner = self.not_empty.wait(inner).expect("queue lock");
        }
    }

    fn attach_sender(&self) {
        self.inner.lock().expect("queue lock").senders += 1;
    }

    fn detach_sender(&self) {
        let mut inner = self.inner.lock().expect("queue lock");
        inner.senders -= 1;
        if inner.senders == 0 {
            self.not_empty.notify_all();
        }
    }

    fn attach_receiver(&self) {
        self.inner.lock().expect("queue lock").receivers += 1;
    }

    fn detach_receiver(&self) {
        let mut inner = self.inner.lock().expect("queue lock");
        inner.receivers -= 1;
        if inner.receivers == 0 {
            self.not_full.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_send_recv_in_order() {
        let (sender, receiver) = bounded(8);
        for i in 0..8 {
            sender.send(i).unwrap();
        }
        for i in 0..8 {
            assert_eq!(receiver.recv(), Ok(i));
        }
    }

    #[test]
    fn test_try_send_full() {
        let (sender, _receiver) = bounded(1);
        sender.try_send("a").unwrap();
        assert_eq!(sender.try_send("b"), Err(TrySendError::Full("b")));
    }

    #[test]
    fn test_try_send_disconnected() {
        let (sender, receiver) = bounded(1);
        drop(receiver);
        assert_eq!(sender.try_send(1), Err(TrySendError::Disconnected(1)));
    }

    #[test]
    fn test_send_blocks_until_room() {
        let (sender, receiver) = bounded(1);
        sender.send(1).unwrap();
        let handle = thread::spawn(move || sender.send(2));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(receiver.recv(), Ok(1));
        handle.join().unwrap().unwrap();
        assert_eq!(receiver.recv(), Ok(2));
    }

    #[test]
    fn test_recv_drains_after_senders_drop() {
        let (sender, receiver) = bounded(4);
        sender.send(1).unwrap();
        sender.send(2).unwrap();
        drop(sender);
        assert_eq!(receiver.recv(), Ok(1));
        assert_eq!(receiver.recv(), Ok(2));
        assert_eq!(receiver.recv(), Err(RecvError));
    }

    #[test]
    fn test_unbounded_never_blocks() {
        let (sender, receiver) = unbounded();
        for i in 0..1000 {
            sender.send(i).unwrap();
        }
        for i in 0..1000 {
            assert_eq!(receiver.recv(), Ok(i));
        }
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        let (sender, receiver) = bounded(4);
        let mut producers = Vec::new();
        for p in 0..4 {
            let sender = sender.clone();
            producers.push(thread::spawn(move || {
                for i in 0..100 {
                    sender.send(p * 100 + i).unwrap();
                }
            }));
        }
        drop(sender);
        let mut consumers = Vec::new();
        for _ in 0..2 {
            let receiver = receiver.clone();
            consumers.push(thread::spawn(move || {
                let mut count = 0usize;
                while receiver.recv().is_ok() {
                    count += 1;
                }
                count
            }));
        }
        drop(receiver);
        for producer in producers {
            producer.join().unwrap();
        }
        let total: usize = consumers.into_iter().map(|c| c.join().unwrap()).sum();
        assert_eq!(total, 400);
    }
}
