//! A thread-safe oneshot channel for single-value communication.
//!
//! A oneshot channel transmits exactly one value from a sender to a
//! receiver. It is used wherever a worker has to report a single final
//! result: a flushed indexing plan resolving its outcome, or a mass-indexing
//! run delivering its report.
//!
//! If the sender is dropped without sending, the channel closes and the
//! receiver observes `None`. Receiving supports blocking, non-blocking and
//! timed variants.

use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

/// Creates a new oneshot channel, returning the sender and receiver halves.
pub fn channel<T>() -> (Sender<T>, Receiver<T>) {
    let cell = Arc::new(Cell::new());
    (Sender(cell.clone()), Receiver(cell))
}

/// Creates a receiver that is already resolved with the given value.
pub fn ready<T>(value: T) -> Receiver<T> {
    let (sender, receiver) = channel();
    let _ = sender.send(value);
    receiver
}

/// The sending half of a oneshot channel.
///
/// Dropping the sender without sending closes the channel.
#[derive(Debug)]
pub struct Sender<T>(Arc<Cell<T>>);

impl<T> Sender<T> {
    /// Sends the value, consuming the sender.
    ///
    /// Returns `Err(value)` if the receiver has already gone away.
    pub fn send(self, value: T) -> Result<(), T> {
        self.0.set(value)
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// The receiving half of a oneshot channel.
pub struct Receiver<T>(Arc<Cell<T>>);

impl<T> Receiver<T> {
    /// Blocks until a value is sent or the channel is closed.
    ///
    /// Returns `None` if the sender was dropped without sending, or if the
    /// value was already consumed.
    pub fn recv(&self) -> Option<T> {
        self.0.take(None)
    }

    /// Returns the value if one is already available, without blocking.
    pub fn try_recv(&self) -> Option<T> {
        self.0.try_take()
    }

    /// Blocks until a value is sent, the channel is closed, or the timeout
    /// elapses.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<T> {
        self.0.take(Some(timeout))
    }
}

#[derive(Debug)]
enum State<T> {
    Pending,
    Ready(T),
    Closed,
}

#[derive(Debug)]
struct Cell<T> {
    state: Mutex<State<T>>,
    cond: Condvar,
}

impl<T> Cell<T> {
    fn new() -> Cell<T> {
        Cell {
            state: Mutex::new(State::Pending),
            cond: Condvar::new(),
        }
    }

    fn set(&self, value: T) -> Result<(), T> {
        let mut state = self.state.lock().expect("oneshot lock");
        match &*state {
            State::Pending => {
                *state = State::Ready(value);
                self.cond.notify_all();
                Ok(())
            }
            _ => Err(value),
        }
    }

    fn close(&self) {
        let mut state = self.state.lock().expect("oneshot lock");
        if matches!(&*state, State::Pending) {
            *state = State::Closed;
            self.cond.notify_all();
        }
    }

    fn try_take(&self) -> Option<T> {
        let mut state = self.state.lock().expect("oneshot lock");
        match std::mem::replace(&mut *state, State::Closed) {
            State::Ready(value) => Some(value),
            State::Pending => {
                *state = State::Pending;
                None
            }
            State::Closed => None,
        }
    }

    fn take(&self, timeout: Option<Duration>) -> Option<T> {
        let mut state = self.state.lock().expect("oneshot lock");
        loop {
            match std::mem::replace(&mut *state, State::Closed) {
                State::Ready(value) => return Some(value),
                State::Closed => return None,
                State::Pending => {
                    *state = State::Pending;
                }
            }
            match timeout {
                Some(timeout) => {
                    let (guard, result) = self
                        .cond
                        .wait_timeout(state, timeout)
                        .expect("oneshot lock");
                    state = guard;
                    if result.timed_out() && matches!(&*state, State::Pending) {
                        return None;
                    }
                }
                None => {
                    state = self.cond.wait(state).expect("oneshot lock");
                }
            }
        }
    }
}
