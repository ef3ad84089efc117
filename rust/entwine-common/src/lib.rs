//! Common error and result types shared by all Entwine crates.

pub mod error;
pub mod result;

pub use result::Result;
