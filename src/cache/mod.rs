//! Durable, cross-invocation record of per-asset build inputs and outputs.
//!
//! The cache decides whether a prior build is still valid and
//! garbage-collects outputs no longer produced by the current asset set.

pub mod event;
pub mod record;
pub mod store;

pub use event::*;
pub use record::*;
pub use store::*;
