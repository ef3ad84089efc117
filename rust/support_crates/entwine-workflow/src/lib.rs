//! Threading and channel utilities for the Entwine pipelines.
//!
//! This crate provides the small set of concurrency building blocks the
//! indexing engine and the mass indexer are written against:
//!
//! - [`oneshot`] - single-value completion channels, used to hand a plan
//!   outcome or a mass-indexing report back to the caller
//! - [`queue`] - a bounded, blocking multi-producer multi-consumer queue,
//!   used as the shared operation queue in front of the backend
//! - [`thread_pool`] - a plain worker thread pool for loader and backend
//!   workers
//!
//! Everything here is built on `std` synchronization primitives; there is no
//! async runtime involved. Workers block on store and backend I/O and
//! communicate through these channels, which keeps the pipeline state
//! machines straightforward to drive deterministically from tests.

pub mod oneshot;
pub mod queue;
pub mod thread_pool;
