//! Content declarations: which files are handled, and how.
//!
//! A [`ContentCollection`] maps relative source paths to
//! [`ContentDescriptor`]s through explicit per-file entries and ordered
//! pattern rules.

pub mod collection;
pub mod descriptor;
pub mod rules;

pub use collection::*;
pub use descriptor::*;
pub use rules::*;

/// Normalize a relative content path: forward slashes, no leading `./`.
pub(crate) fn normalize_path(path: &str) -> String {
    let p = path.replace('\\', "/");
    p.strip_prefix("./").unwrap_or(&p).to_string()
}
