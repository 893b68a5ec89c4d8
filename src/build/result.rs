//! Per-asset and per-run build results.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::BuildError;

/// Stage an asset's build was in when something happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Scanning,
    Resolving,
    Importing,
    Processing,
    Compiling,
    Copying,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStage::Scanning => write!(f, "scanning"),
            BuildStage::Resolving => write!(f, "resolving"),
            BuildStage::Importing => write!(f, "importing"),
            BuildStage::Processing => write!(f, "processing"),
            BuildStage::Compiling => write!(f, "compiling"),
            BuildStage::Copying => write!(f, "copying"),
        }
    }
}

/// Map an error to the stage it belongs to.
pub fn stage_of(error: &BuildError) -> BuildStage {
    match error {
        BuildError::MissingSource(_) => BuildStage::Scanning,
        BuildError::NoImporter { .. } | BuildError::NoProcessor { .. } => BuildStage::Resolving,
        BuildError::Import { .. } => BuildStage::Importing,
        BuildError::Process { .. } => BuildStage::Processing,
        BuildError::Compile { .. } => BuildStage::Compiling,
        BuildError::CopyFailed { .. } => BuildStage::Copying,
        _ => BuildStage::Scanning,
    }
}

/// Terminal status of one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    /// Imported, processed, and compiled
    Built,
    /// Copied verbatim
    Copied,
    /// Reused a valid prior build
    CacheHit,
    /// Nothing to do (unresolvable destination)
    Skipped,
    /// Failed at the given stage; the batch continued
    Failed { stage: BuildStage, message: String },
}

impl AssetStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, AssetStatus::Failed { .. })
    }

    pub fn is_success(&self) -> bool {
        !self.is_failure()
    }
}

/// Outcome of one asset's build.
#[derive(Debug, Clone)]
pub struct AssetResult {
    /// Logical asset key (relative source path, possibly suffixed)
    pub key: String,
    pub status: AssetStatus,
    /// Destination path, when one was produced or reused
    pub dest: Option<PathBuf>,
    pub duration: Duration,
}

impl AssetResult {
    pub fn built(key: String, dest: PathBuf, duration: Duration) -> Self {
        Self {
            key,
            status: AssetStatus::Built,
            dest: Some(dest),
            duration,
        }
    }

    pub fn copied(key: String, dest: PathBuf, duration: Duration) -> Self {
        Self {
            key,
            status: AssetStatus::Copied,
            dest: Some(dest),
            duration,
        }
    }

    pub fn cache_hit(key: String, dest: PathBuf) -> Self {
        Self {
            key,
            status: AssetStatus::CacheHit,
            dest: Some(dest),
            duration: Duration::ZERO,
        }
    }

    pub fn skipped(key: String) -> Self {
        Self {
            key,
            status: AssetStatus::Skipped,
            dest: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failed(key: String, stage: BuildStage, message: String, duration: Duration) -> Self {
        Self {
            key,
            status: AssetStatus::Failed { stage, message },
            dest: None,
            duration,
        }
    }
}

/// Aggregate result of a batch run.
#[derive(Debug, Default)]
pub struct BuildResult {
    pub assets: Vec<AssetResult>,
    /// Asset keys purged by orphan cleanup
    pub removed: Vec<String>,
    pub total_duration: Duration,
}

impl BuildResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, asset: AssetResult) {
        self.assets.push(asset);
    }

    pub fn built_count(&self) -> usize {
        self.count(|s| matches!(s, AssetStatus::Built))
    }

    pub fn copied_count(&self) -> usize {
        self.count(|s| matches!(s, AssetStatus::Copied))
    }

    pub fn cache_hit_count(&self) -> usize {
        self.count(|s| matches!(s, AssetStatus::CacheHit))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|s| matches!(s, AssetStatus::Skipped))
    }

    pub fn failed_count(&self) -> usize {
        self.count(AssetStatus::is_failure)
    }

    /// Assets that reached a terminal state without failing.
    pub fn succeeded_count(&self) -> usize {
        self.count(AssetStatus::is_success)
    }

    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    fn count(&self, predicate: impl Fn(&AssetStatus) -> bool) -> usize {
        self.assets.iter().filter(|a| predicate(&a.status)).count()
    }

    /// One-line summary for the end of a batch.
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{} built", self.built_count())];
        if self.copied_count() > 0 {
            parts.push(format!("{} copied", self.copied_count()));
        }
        if self.cache_hit_count() > 0 {
            parts.push(format!("{} up to date", self.cache_hit_count()));
        }
        if !self.removed.is_empty() {
            parts.push(format!("{} removed", self.removed.len()));
        }
        parts.push(format!("{} failed", self.failed_count()));
        format!(
            "{} ({} total in {:.2?})",
            parts.join(", "),
            self.assets.len(),
            self.total_duration
        )
    }
}
