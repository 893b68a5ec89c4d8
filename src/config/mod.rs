//! Project configuration for the build pipeline.
//!
//! Provides types and parsing for `cmill.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
