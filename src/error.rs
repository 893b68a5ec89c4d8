//! Error types shared across the build pipeline.
//!
//! Every failure carries its reach in the type: asset-scoped errors abort a
//! single asset and let the batch continue, run-scoped errors abort the
//! whole invocation.

use std::path::PathBuf;
use thiserror::Error;

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Aborts the current asset only; the batch continues.
    Asset,
    /// Aborts the whole run.
    Run,
}

/// Error raised while building content.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BuildError {
    /// No registered importer handles the file's extension
    #[error("no importer found for '{path}'")]
    NoImporter { path: String },

    /// The requested processor is not registered
    #[error("no processor named '{name}' for '{path}'")]
    NoProcessor { name: String, path: String },

    /// An importer rejected or failed on a source file
    #[error("importer '{importer}' failed on '{path}': {message}")]
    Import {
        path: String,
        importer: String,
        message: String,
    },

    /// A processor failed on an imported item
    #[error("processor '{processor}' failed on '{path}': {message}")]
    Process {
        path: String,
        processor: String,
        message: String,
    },

    /// The source file vanished between scan and build
    #[error("source file not found: {0}")]
    MissingSource(PathBuf),

    /// Writing the binary output failed
    #[error("failed to compile '{path}': {message}")]
    Compile { path: String, message: String },

    /// Verbatim copy to the output tree failed
    #[error("failed to copy '{path}': {message}")]
    CopyFailed { path: String, message: String },

    /// The requested asset is not part of the content collection
    #[error("no content entry for '{0}'")]
    UnknownAsset(String),

    /// Invalid wildcard or regex pattern in a content rule
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// IO error outside any single asset's build
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache persistence error
    #[error(transparent)]
    Cache(#[from] crate::cache::CacheError),

    /// Server queue or listener error
    #[error("server error: {0}")]
    Server(String),
}

impl BuildError {
    /// Classify this error's reach.
    pub fn scope(&self) -> ErrorScope {
        match self {
            BuildError::NoImporter { .. }
            | BuildError::NoProcessor { .. }
            | BuildError::Import { .. }
            | BuildError::Process { .. }
            | BuildError::MissingSource(_)
            | BuildError::Compile { .. }
            | BuildError::CopyFailed { .. }
            | BuildError::UnknownAsset(_) => ErrorScope::Asset,
            BuildError::InvalidPattern { .. }
            | BuildError::Io(_)
            | BuildError::Cache(_)
            | BuildError::Server(_) => ErrorScope::Run,
        }
    }

    /// Whether the batch may continue past this error.
    pub fn is_asset_scoped(&self) -> bool {
        self.scope() == ErrorScope::Asset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_are_asset_scoped() {
        let err = BuildError::NoImporter {
            path: "foo.xyz".to_string(),
        };
        assert_eq!(err.scope(), ErrorScope::Asset);
        assert!(err.is_asset_scoped());

        let err = BuildError::NoProcessor {
            name: "Missing".to_string(),
            path: "foo.png".to_string(),
        };
        assert!(err.is_asset_scoped());
    }

    #[test]
    fn test_capability_failures_are_asset_scoped() {
        let err = BuildError::Import {
            path: "a.png".to_string(),
            importer: "Texture".to_string(),
            message: "bad header".to_string(),
        };
        assert!(err.is_asset_scoped());

        let err = BuildError::MissingSource(PathBuf::from("gone.png"));
        assert!(err.is_asset_scoped());
    }

    #[test]
    fn test_io_errors_are_run_scoped() {
        let err = BuildError::Io(std::io::Error::other("disk full"));
        assert_eq!(err.scope(), ErrorScope::Run);
        assert!(!err.is_asset_scoped());
    }

    #[test]
    fn test_display_includes_context() {
        let err = BuildError::Process {
            path: "hero.png".to_string(),
            processor: "Texture".to_string(),
            message: "bad format".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("hero.png"));
        assert!(msg.contains("Texture"));
        assert!(msg.contains("bad format"));
    }
}
