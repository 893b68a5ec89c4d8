//! The persisted per-asset cache entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::pipeline::{GraphicsProfile, ParameterSet, TargetPlatform};

/// A file's last-write time, captured verbatim.
///
/// Staleness is decided by exact equality in both directions: a dependency
/// whose on-disk time moved forward *or* backward by any amount invalidates
/// the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileStamp {
    pub secs: u64,
    pub nanos: u32,
}

impl FileStamp {
    /// Capture the current last-write time of a file.
    pub fn of(path: &Path) -> std::io::Result<FileStamp> {
        let modified = std::fs::metadata(path)?.modified()?;
        let duration = modified
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(FileStamp {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        })
    }
}

impl fmt::Display for FileStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

impl FromStr for FileStamp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (secs, nanos) = s
            .split_once('.')
            .ok_or_else(|| format!("invalid stamp '{}'", s))?;
        Ok(FileStamp {
            secs: secs.parse().map_err(|_| format!("invalid stamp '{}'", s))?,
            nanos: nanos.parse().map_err(|_| format!("invalid stamp '{}'", s))?,
        })
    }
}

/// Everything the cache remembers about one successful build.
///
/// The identity fields (content root, build flag, capabilities, normalized
/// parameters, compression, profile, platform, configuration, source) must
/// match a new request exactly for the entry to be reusable; the dependency
/// stamps and output list must then still agree with the filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub content_root: String,
    pub should_build: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    /// Parameters after default-normalization
    #[serde(default, skip_serializing_if = "ParameterSet::is_empty")]
    pub parameters: ParameterSet,
    pub compressed: bool,
    pub profile: GraphicsProfile,
    pub platform: TargetPlatform,
    pub config: String,
    /// Absolute source path
    pub source: String,
    /// Absolute destination path
    pub dest: String,
    /// Destination last-write time after the build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_stamp: Option<FileStamp>,
    /// Dependency path -> last-write time captured at successful-build time.
    /// `None` means the stamp could not be captured; such entries never
    /// validate.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, Option<FileStamp>>,
    /// Additional output files beyond the destination
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    /// Asset keys of nested builds triggered by this asset's processor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl BuildRecord {
    /// Start a record for a build request. Dependencies and outputs are
    /// registered during the build and stamped on success.
    pub fn request(
        content_root: &str,
        should_build: bool,
        importer: Option<&str>,
        processor: Option<&str>,
        parameters: ParameterSet,
        compressed: bool,
        profile: GraphicsProfile,
        platform: TargetPlatform,
        config: &str,
        source: &Path,
        dest: &Path,
    ) -> Self {
        Self {
            content_root: content_root.to_string(),
            should_build,
            importer: importer.map(str::to_string),
            processor: processor.map(str::to_string),
            parameters,
            compressed,
            profile,
            platform,
            config: config.to_string(),
            source: source.to_string_lossy().to_string(),
            dest: dest.to_string_lossy().to_string(),
            dest_stamp: None,
            dependencies: BTreeMap::new(),
            outputs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Register a dependency. The stamp is captured later, on success.
    pub fn add_dependency(&mut self, path: &Path) {
        self.dependencies
            .entry(path.to_string_lossy().to_string())
            .or_insert(None);
    }

    /// Register an extra output file.
    pub fn add_output(&mut self, path: &Path) {
        let s = path.to_string_lossy().to_string();
        if !self.outputs.contains(&s) {
            self.outputs.push(s);
        }
    }

    /// Register a nested asset built on behalf of this one.
    pub fn add_child(&mut self, asset_key: &str) {
        let s = asset_key.to_string();
        if !self.children.contains(&s) {
            self.children.push(s);
        }
    }

    /// Absorb a nested build's dependencies and outputs, so invalidating
    /// the child also invalidates this record.
    pub fn absorb(&mut self, child: &BuildRecord) {
        for (path, stamp) in &child.dependencies {
            self.dependencies.insert(path.clone(), *stamp);
        }
        for output in &child.outputs {
            if !self.outputs.contains(output) {
                self.outputs.push(output.clone());
            }
        }
        if !self.outputs.contains(&child.dest) {
            self.outputs.push(child.dest.clone());
        }
    }

    /// Capture dependency and destination stamps from the filesystem.
    /// Called once, after a successful build.
    pub fn stamp(&mut self) {
        for (path, stamp) in self.dependencies.iter_mut() {
            *stamp = FileStamp::of(Path::new(path)).ok();
        }
        self.dest_stamp = FileStamp::of(Path::new(&self.dest)).ok();
    }

    /// Whether this record was produced by the same request: identity
    /// fields compared structurally, parameters assumed pre-normalized on
    /// both sides.
    pub fn matches_request(&self, request: &BuildRecord) -> bool {
        self.content_root == request.content_root
            && self.should_build == request.should_build
            && self.importer == request.importer
            && self.processor == request.processor
            && self.parameters == request.parameters
            && self.compressed == request.compressed
            && self.profile == request.profile
            && self.platform == request.platform
            && self.config == request.config
            && self.source == request.source
    }

    /// Whether the recorded build still holds on disk: every dependency's
    /// current last-write time equals the recorded one exactly, and the
    /// destination plus every extra output still exists.
    pub fn is_valid(&self) -> bool {
        if !Path::new(&self.dest).exists() {
            return false;
        }
        for output in &self.outputs {
            if !Path::new(output).exists() {
                return false;
            }
        }
        for (path, recorded) in &self.dependencies {
            let Some(recorded) = recorded else {
                return false;
            };
            match FileStamp::of(Path::new(path)) {
                Ok(current) if current == *recorded => {}
                _ => return false,
            }
        }
        true
    }
}
