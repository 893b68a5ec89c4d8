//! In-memory cache map with durable persistence and orphan cleanup.
//!
//! The cache is stored as a JSON document mapping asset keys to
//! [`BuildRecord`]s:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "textures/hero.png": {
//!       "source": "/project/content/textures/hero.png",
//!       "dest": "/project/bin/textures/hero.xnb",
//!       "importer": "Texture",
//!       "processor": "Texture",
//!       "dependencies": { "/project/content/textures/hero.png": { "secs": 1700000000, "nanos": 0 } },
//!       "...": "..."
//!     }
//!   }
//! }
//! ```
//!
//! A missing or corrupt document degrades to an empty cache; staleness is
//! always safe to assume.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::event;
use crate::cache::record::BuildRecord;

/// Current cache document version.
const CACHE_VERSION: u32 = 1;

/// Default cache document filename, kept in the intermediate directory.
pub const CACHE_FILENAME: &str = ".mill-cache.json";

/// Error during cache persistence.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CacheError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Version mismatch
    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    /// Malformed per-asset event file
    #[error("malformed build event: {0}")]
    MalformedEvent(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    entries: BTreeMap<String, BuildRecord>,
}

/// Durable cache of per-asset build records.
///
/// Keys are logical asset names: the relative source path, suffixed when a
/// source is built multiple ways in one run. Entries loaded from disk start
/// out in the "unused" set; [`ContentCache::record`] marks them used, and
/// [`ContentCache::clean`] purges whatever is still unused at the end of a
/// full batch.
#[derive(Debug)]
pub struct ContentCache {
    path: PathBuf,
    /// When set, each recorded build also writes a per-asset event file
    /// beside its destination, and `load` falls back to scanning these.
    event_dir: Option<PathBuf>,
    entries: HashMap<String, BuildRecord>,
    unused: HashSet<String>,
}

impl ContentCache {
    /// Cache persisted in the given intermediate directory.
    pub fn new(intermediate_dir: &Path) -> Self {
        Self {
            path: intermediate_dir.join(CACHE_FILENAME),
            event_dir: None,
            entries: HashMap::new(),
            unused: HashSet::new(),
        }
    }

    /// Also maintain legacy one-file-per-asset build events under the given
    /// output directory.
    pub fn with_event_files(mut self, output_dir: &Path) -> Self {
        self.event_dir = Some(output_dir.to_path_buf());
        self
    }

    /// Read the persisted cache into memory.
    ///
    /// A missing document yields an empty cache; a corrupt one is logged as
    /// an error and likewise degrades to empty rather than failing the run.
    pub fn load(&mut self) {
        self.entries.clear();
        self.unused.clear();

        match self.load_document() {
            Ok(Some(entries)) => {
                self.entries = entries;
            }
            Ok(None) => {
                if let Some(dir) = self.event_dir.clone() {
                    self.load_events(&dir);
                }
            }
            Err(e) => {
                tracing::error!("cache unreadable, rebuilding everything: {}", e);
            }
        }

        self.unused = self.entries.keys().cloned().collect();
    }

    fn load_document(&self) -> Result<Option<HashMap<String, BuildRecord>>, CacheError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)?;
        let document: CacheDocument = serde_json::from_reader(BufReader::new(file))?;
        if document.version != CACHE_VERSION {
            return Err(CacheError::VersionMismatch {
                expected: CACHE_VERSION,
                found: document.version,
            });
        }
        Ok(Some(document.entries.into_iter().collect()))
    }

    /// Scan for per-asset event files; individually corrupt files are
    /// skipped with a log line.
    fn load_events(&mut self, dir: &Path) {
        for path in event::find_events(dir) {
            match event::load_event(&path) {
                Ok((key, record)) => {
                    self.entries.insert(key, record);
                }
                Err(e) => {
                    tracing::error!("skipping build event '{}': {}", path.display(), e);
                }
            }
        }
    }

    /// Find a reusable prior build for an asset key.
    ///
    /// A hit requires the stored record to match the request's identity
    /// fields exactly and still be valid on disk (every dependency stamp
    /// equal, every output present). Anything else is a miss.
    pub fn lookup(&self, key: &str, request: &BuildRecord) -> Option<&BuildRecord> {
        let stored = self.entries.get(key)?;
        if !stored.matches_request(request) {
            tracing::debug!(asset = key, "cache miss: request changed");
            return None;
        }
        if !stored.is_valid() {
            tracing::debug!(asset = key, "cache miss: stale on disk");
            return None;
        }
        Some(stored)
    }

    /// Insert or overwrite an entry and mark it used.
    pub fn record(&mut self, key: &str, record: BuildRecord) {
        self.unused.remove(key);
        if let Some(dir) = &self.event_dir {
            if let Err(e) = event::save_event(dir, key, &record) {
                tracing::warn!(asset = key, "could not write build event: {}", e);
            }
        }
        self.entries.insert(key.to_string(), record);
    }

    /// Serialize the whole cache to disk. Called exactly once at the end of
    /// every run, success or failure, so completed builds are never lost.
    pub fn flush(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let document = CacheDocument {
            version: CACHE_VERSION,
            entries: self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let file = File::create(&self.path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &document)?;
        Ok(())
    }

    /// Purge entries loaded at `load` time but never touched by `record`
    /// this run, deleting their output files from disk. Returns the removed
    /// asset keys.
    ///
    /// Only meaningful after a full batch walked the complete asset set;
    /// server runs skip this entirely.
    pub fn clean(&mut self) -> Vec<String> {
        let orphaned: Vec<String> = self.unused.drain().collect();
        let mut removed = Vec::new();

        for key in orphaned {
            if let Some(entry) = self.entries.remove(&key) {
                delete_quietly(Path::new(&entry.dest));
                for output in &entry.outputs {
                    delete_quietly(Path::new(output));
                }
                if let Some(dir) = &self.event_dir {
                    delete_quietly(&event::event_path(dir, &key));
                }
                tracing::info!(asset = %key, "removed orphaned asset");
                removed.push(key);
            }
        }

        removed.sort();
        removed
    }

    pub fn get(&self, key: &str) -> Option<&BuildRecord> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Asset keys currently cached, unordered.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

fn delete_quietly(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("could not delete '{}': {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{GraphicsProfile, ParameterSet, ParameterValue, TargetPlatform};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn record_for(source: &Path, dest: &Path) -> BuildRecord {
        BuildRecord::request(
            "",
            true,
            Some("Texture"),
            Some("Texture"),
            ParameterSet::new(),
            false,
            GraphicsProfile::Reach,
            TargetPlatform::Windows,
            "Debug",
            source,
            dest,
        )
    }

    fn built_record(temp: &TempDir, name: &str) -> (String, BuildRecord) {
        let source = create_test_file(temp.path(), &format!("src/{}.png", name), "pixels");
        let dest = create_test_file(temp.path(), &format!("out/{}.xnb", name), "binary");
        let mut record = record_for(&source, &dest);
        record.add_dependency(&source);
        record.stamp();
        (format!("{}.png", name), record)
    }

    #[test]
    fn test_load_missing_document_is_empty() {
        let temp = TempDir::new().unwrap();
        let mut cache = ContentCache::new(temp.path());
        cache.load();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_record_flush_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let (key, record) = built_record(&temp, "hero");

        let mut cache = ContentCache::new(temp.path());
        cache.load();
        cache.record(&key, record.clone());
        cache.flush().unwrap();

        let mut reloaded = ContentCache::new(temp.path());
        reloaded.load();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get(&key), Some(&record));
    }

    #[test]
    fn test_corrupt_document_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        create_test_file(temp.path(), CACHE_FILENAME, "{ not json !!");

        let mut cache = ContentCache::new(temp.path());
        cache.load();
        assert!(cache.is_empty());

        // Still usable afterwards
        let (key, record) = built_record(&temp, "hero");
        cache.record(&key, record);
        cache.flush().unwrap();
    }

    #[test]
    fn test_version_mismatch_degrades_to_empty() {
        let temp = TempDir::new().unwrap();
        create_test_file(
            temp.path(),
            CACHE_FILENAME,
            "{\"version\": 99, \"entries\": {}}",
        );

        let mut cache = ContentCache::new(temp.path());
        cache.load();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lookup_hit_when_unchanged() {
        let temp = TempDir::new().unwrap();
        let (key, record) = built_record(&temp, "hero");

        let mut cache = ContentCache::new(temp.path());
        cache.record(&key, record.clone());

        let request = record_for(
            Path::new(&record.source),
            Path::new(&record.dest),
        );
        assert!(cache.lookup(&key, &request).is_some());
    }

    #[test]
    fn test_lookup_miss_on_parameter_change() {
        let temp = TempDir::new().unwrap();
        let (key, record) = built_record(&temp, "hero");

        let mut cache = ContentCache::new(temp.path());
        cache.record(&key, record.clone());

        let mut request = record_for(
            Path::new(&record.source),
            Path::new(&record.dest),
        );
        request.parameters = ParameterSet::new().with("ColorKeyEnabled", ParameterValue::Bool(true));
        assert!(cache.lookup(&key, &request).is_none());
    }

    #[test]
    fn test_lookup_miss_on_touched_dependency() {
        let temp = TempDir::new().unwrap();
        let (key, record) = built_record(&temp, "hero");

        let mut cache = ContentCache::new(temp.path());
        cache.record(&key, record.clone());

        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        File::open(Path::new(&record.source))
            .unwrap()
            .set_modified(past)
            .unwrap();

        let request = record_for(
            Path::new(&record.source),
            Path::new(&record.dest),
        );
        assert!(cache.lookup(&key, &request).is_none());
    }

    #[test]
    fn test_clean_purges_untouched_entries_and_outputs() {
        let temp = TempDir::new().unwrap();
        let (stale_key, stale) = built_record(&temp, "gone");
        let (live_key, live) = built_record(&temp, "kept");
        let stale_dest = PathBuf::from(&stale.dest);
        let live_dest = PathBuf::from(&live.dest);

        {
            let mut cache = ContentCache::new(temp.path());
            cache.record(&stale_key, stale);
            cache.record(&live_key, live.clone());
            cache.flush().unwrap();
        }

        let mut cache = ContentCache::new(temp.path());
        cache.load();
        // Only the live asset is rebuilt/touched this run
        cache.record(&live_key, live);

        let removed = cache.clean();
        assert_eq!(removed, vec![stale_key.clone()]);
        assert!(!cache.contains(&stale_key));
        assert!(cache.contains(&live_key));
        assert!(!stale_dest.exists());
        assert!(live_dest.exists());
    }

    #[test]
    fn test_clean_with_nothing_loaded_is_noop() {
        let temp = TempDir::new().unwrap();
        let mut cache = ContentCache::new(temp.path());
        cache.load();
        assert!(cache.clean().is_empty());
    }

    #[test]
    fn test_event_files_written_and_loaded() {
        let temp = TempDir::new().unwrap();
        let out_dir = temp.path().join("out");
        let (key, record) = built_record(&temp, "hero");

        {
            let mut cache = ContentCache::new(temp.path()).with_event_files(&out_dir);
            cache.record(&key, record.clone());
            // No flush: the document is absent on purpose
        }

        let mut reloaded = ContentCache::new(temp.path()).with_event_files(&out_dir);
        reloaded.load();
        assert_eq!(reloaded.get(&key), Some(&record));
    }
}
