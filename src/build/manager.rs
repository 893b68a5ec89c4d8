//! The pipeline manager: top-level build driver.
//!
//! For each asset the manager resolves capabilities, asks the cache whether
//! a valid prior build exists, and on a miss runs import, process, and
//! compile, recording a fresh cache entry. Copy assets bypass the pipeline
//! and go straight to the output tree. Failures are scoped to the asset
//! that raised them; the batch always runs to completion and the cache is
//! flushed at the end of every run.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use crate::build::{
    stage_of, AssetResult, BuildContext, BuildResult, ImportContext, ProcessContext,
};
use crate::cache::{BuildRecord, ContentCache};
use crate::content::{ContentCollection, ContentDescriptor, Resolution};
use crate::error::BuildError;
use crate::pipeline::{ContentItem, ParameterSet, Registry};

/// How a single asset's build concluded.
#[derive(Debug)]
pub enum Outcome {
    /// A valid prior build was reused
    CacheHit(BuildRecord),
    /// Fresh import/process/compile; the item is returned for
    /// load-only builds that skip the compile step
    Built(BuildRecord, Option<ContentItem>),
    /// Verbatim copy
    Copied(BuildRecord),
    /// Nothing to build (unresolvable destination)
    Skipped,
}

/// One importer/processor/parameter combination seen for a source file
/// this run, with the asset key assigned to it.
#[derive(Debug)]
struct Variant {
    importer: Option<String>,
    processor: Option<String>,
    parameters: ParameterSet,
    key: String,
}

/// Top-level build orchestrator.
pub struct PipelineManager {
    context: BuildContext,
    collection: ContentCollection,
    registry: Registry,
    cache: ContentCache,
    /// Distinct build requests per source file, for name disambiguation
    variants: HashMap<String, Vec<Variant>>,
    force: bool,
    cache_loaded: bool,
}

impl PipelineManager {
    pub fn new(context: BuildContext) -> Self {
        let mut cache = ContentCache::new(&context.intermediate_dir());
        if context.legacy_events() {
            cache = cache.with_event_files(&context.output_dir());
        }
        Self {
            context,
            collection: ContentCollection::new(),
            registry: Registry::with_builtins(),
            cache,
            variants: HashMap::new(),
            force: false,
            cache_loaded: false,
        }
    }

    /// Replace the capability registry.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Rebuild everything regardless of the cache.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn collection(&self) -> &ContentCollection {
        &self.collection
    }

    pub fn collection_mut(&mut self) -> &mut ContentCollection {
        &mut self.collection
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Read the persisted cache, once per manager lifetime.
    pub fn load_cache(&mut self) {
        if !self.cache_loaded {
            self.cache.load();
            self.cache_loaded = true;
        }
    }

    /// Persist the cache. Safe to call after a failed batch; successful
    /// builds recorded before the failure are kept.
    pub fn flush(&mut self) -> Result<(), BuildError> {
        self.cache.flush().map_err(BuildError::from)
    }

    /// One-shot batch build: scan the source tree, build every handled
    /// asset, purge orphans (unless skipped), and flush the cache.
    ///
    /// Per-asset failures land in the result; only run-level problems
    /// (unreadable source tree, unwritable cache) surface as errors, and
    /// the cache is flushed even then.
    pub fn build_all(&mut self, skip_clean: bool) -> Result<BuildResult, BuildError> {
        let start = Instant::now();
        self.load_cache();

        let batch = self.run_batch(skip_clean);
        let flushed = self.cache.flush();

        let mut result = batch?;
        flushed?;
        result.total_duration = start.elapsed();
        Ok(result)
    }

    fn run_batch(&mut self, skip_clean: bool) -> Result<BuildResult, BuildError> {
        let scanned = self.collection.scan(&self.context.source_dir())?;
        tracing::info!(assets = scanned.len(), "scanned source tree");

        let mut result = BuildResult::new();
        for (rel, descriptor) in &scanned {
            result.add(self.build_one(rel, descriptor));
        }

        if !skip_clean {
            result.removed = self.cache.clean();
        }
        Ok(result)
    }

    /// Build a single asset, capturing any failure in the result.
    pub fn build_one(&mut self, rel: &str, descriptor: &ContentDescriptor) -> AssetResult {
        let start = Instant::now();
        match self.build_internal(rel, descriptor, None, None, None, false, true, false) {
            Ok((key, Outcome::CacheHit(record))) => {
                AssetResult::cache_hit(key, PathBuf::from(record.dest))
            }
            Ok((key, Outcome::Built(record, _))) => {
                AssetResult::built(key, PathBuf::from(record.dest), start.elapsed())
            }
            Ok((key, Outcome::Copied(record))) => {
                AssetResult::copied(key, PathBuf::from(record.dest), start.elapsed())
            }
            Ok((key, Outcome::Skipped)) => AssetResult::skipped(key),
            Err(error) => {
                tracing::error!(asset = rel, "{}", error);
                AssetResult::failed(
                    rel.to_string(),
                    stage_of(&error),
                    error.to_string(),
                    start.elapsed(),
                )
            }
        }
    }

    /// Fast-path cache probe: the destination of a valid prior build for a
    /// source-relative path, if one exists. Never builds.
    pub fn find_cached(&self, rel: &str) -> Option<PathBuf> {
        let Resolution::Include(descriptor) = self.collection.resolve(rel) else {
            return None;
        };
        let source_abs = self.context.source_dir().join(rel);

        let (importer, processor, normalized) = if descriptor.should_build() {
            let importer = self
                .registry
                .find_importer(&source_abs, descriptor.importer())
                .ok()?;
            let processor = self
                .registry
                .find_processor(importer, descriptor.processor(), &source_abs)
                .ok()?;
            let normalized = self
                .registry
                .normalize_parameters(Some(&processor.name), descriptor.parameters());
            (
                Some(importer.name.clone()),
                Some(processor.name.clone()),
                normalized,
            )
        } else {
            (None, None, ParameterSet::new())
        };

        let dest_abs = self.context.output_dir().join(descriptor.output_path(rel));
        let request = BuildRecord::request(
            descriptor.content_root(),
            descriptor.should_build(),
            importer.as_deref(),
            processor.as_deref(),
            normalized,
            self.context.compress(),
            self.context.profile(),
            self.context.platform(),
            self.context.build_config(),
            &source_abs,
            &dest_abs,
        );
        self.cache
            .lookup(rel, &request)
            .map(|record| PathBuf::from(&record.dest))
    }

    /// Build one requested asset on demand and return its destination.
    /// Used by the standing server; the cache is not cleaned here.
    pub fn build_requested(&mut self, rel: &str) -> Result<PathBuf, BuildError> {
        self.load_cache();
        let Resolution::Include(descriptor) = self.collection.resolve(rel) else {
            return Err(BuildError::UnknownAsset(rel.to_string()));
        };
        let (_, outcome) =
            self.build_internal(rel, &descriptor, None, None, None, false, true, false)?;
        match outcome {
            Outcome::CacheHit(record) | Outcome::Built(record, _) | Outcome::Copied(record) => {
                Ok(PathBuf::from(record.dest))
            }
            Outcome::Skipped => Err(BuildError::UnknownAsset(rel.to_string())),
        }
    }

    /// Map every handled source file to its output path, relative on both
    /// sides. Lets a server translate requested outputs back to sources.
    pub fn output_index(&self) -> Result<HashMap<String, String>, BuildError> {
        let scanned = self.collection.scan(&self.context.source_dir())?;
        Ok(scanned
            .into_iter()
            .map(|(rel, descriptor)| (descriptor.output_path(&rel), rel))
            .collect())
    }

    /// The full build algorithm for one asset.
    ///
    /// `prefer_suffix` forces a disambiguation suffix even for the first
    /// variant (nested builds). `persist` records the result in the cache;
    /// `load_only` skips the cache check and the compile step and returns
    /// the processed item instead of writing it out.
    pub(crate) fn build_internal(
        &mut self,
        rel: &str,
        descriptor: &ContentDescriptor,
        importer_override: Option<&str>,
        processor_override: Option<&str>,
        params_override: Option<&ParameterSet>,
        prefer_suffix: bool,
        persist: bool,
        load_only: bool,
    ) -> Result<(String, Outcome), BuildError> {
        let source_abs = self.context.source_dir().join(rel);
        if !source_abs.exists() {
            return Err(BuildError::MissingSource(source_abs));
        }

        // Resolve the request's identity: capability names plus the
        // normalized parameter bag the cache compares across runs.
        let (importer_name, processor_name, effective, normalized) = if descriptor.should_build() {
            let importer = self
                .registry
                .find_importer(&source_abs, importer_override.or(descriptor.importer()))?;
            let importer_name = importer.name.clone();
            let processor = self.registry.find_processor(
                importer,
                processor_override.or(descriptor.processor()),
                &source_abs,
            )?;
            let processor_name = processor.name.clone();

            let mut requested = descriptor.parameters().clone();
            if let Some(overrides) = params_override {
                for (name, value) in overrides.iter() {
                    requested.insert(name.clone(), value.clone());
                }
            }
            let effective = self
                .registry
                .effective_parameters(&processor_name, &requested);
            let normalized = self
                .registry
                .normalize_parameters(Some(&processor_name), &requested);
            (Some(importer_name), Some(processor_name), effective, normalized)
        } else {
            (None, None, ParameterSet::new(), ParameterSet::new())
        };

        let key = self.assign_key(
            rel,
            importer_name.as_deref(),
            processor_name.as_deref(),
            &normalized,
            prefer_suffix,
        );

        let dest_rel = descriptor.output_path(&key);
        if dest_rel.is_empty() {
            return Ok((key, Outcome::Skipped));
        }
        let dest_abs = self.context.output_dir().join(&dest_rel);

        let mut record = BuildRecord::request(
            descriptor.content_root(),
            descriptor.should_build(),
            importer_name.as_deref(),
            processor_name.as_deref(),
            normalized,
            self.context.compress(),
            self.context.profile(),
            self.context.platform(),
            self.context.build_config(),
            &source_abs,
            &dest_abs,
        );

        if !self.force && !load_only {
            if let Some(stored) = self.cache.lookup(&key, &record) {
                let stored = stored.clone();
                // Touch the entry so orphan cleanup keeps it
                self.cache.record(&key, stored.clone());
                tracing::info!(asset = %key, "up to date");
                return Ok((key, Outcome::CacheHit(stored)));
            }
        }

        if !descriptor.should_build() {
            return self.copy_asset(key, record, &source_abs, &dest_abs, persist);
        }

        tracing::info!(asset = %key, "building");
        record.add_dependency(&source_abs);

        // These lookups cannot miss: the names were resolved above
        let importer_name = importer_name.unwrap_or_default();
        let processor_name = processor_name.unwrap_or_default();
        let importer_instance = match self.registry.importer(&importer_name) {
            Some(info) => info.create(),
            None => {
                return Err(BuildError::NoImporter {
                    path: source_abs.display().to_string(),
                })
            }
        };
        let processor_instance = match self.registry.processor(&processor_name) {
            Some(info) => info.create(&effective),
            None => {
                return Err(BuildError::NoProcessor {
                    name: processor_name,
                    path: source_abs.display().to_string(),
                })
            }
        };

        let imported = {
            let mut ctx = ImportContext::new(
                self.context.intermediate_dir(),
                self.context.output_dir(),
                &mut record,
            );
            importer_instance
                .import(&source_abs, &mut ctx)
                .map_err(|message| BuildError::Import {
                    path: rel.to_string(),
                    importer: importer_name.clone(),
                    message,
                })?
        };

        let processed = {
            let mut ctx = ProcessContext::new(self, &mut record, effective);
            processor_instance
                .process(imported, &mut ctx)
                .map_err(|message| BuildError::Process {
                    path: rel.to_string(),
                    processor: processor_name.clone(),
                    message,
                })?
        };

        if load_only {
            record.stamp();
            if persist {
                self.cache.record(&key, record.clone());
            }
            return Ok((key, Outcome::Built(record, Some(processed))));
        }

        crate::pipeline::compiler::write_container(
            &processed,
            &dest_abs,
            self.context.platform(),
            self.context.profile(),
            self.context.compress(),
        )
        .map_err(|e| BuildError::Compile {
            path: dest_rel.clone(),
            message: e.to_string(),
        })?;

        record.stamp();
        if persist {
            self.cache.record(&key, record.clone());
        }
        tracing::info!(asset = %key, dest = %dest_rel, "built");
        Ok((key, Outcome::Built(record, None)))
    }

    fn copy_asset(
        &mut self,
        key: String,
        mut record: BuildRecord,
        source_abs: &std::path::Path,
        dest_abs: &std::path::Path,
        persist: bool,
    ) -> Result<(String, Outcome), BuildError> {
        let copy = || -> std::io::Result<()> {
            if let Some(parent) = dest_abs.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source_abs, dest_abs)?;
            Ok(())
        };
        copy().map_err(|e| BuildError::CopyFailed {
            path: record.source.clone(),
            message: e.to_string(),
        })?;

        record.add_dependency(source_abs);
        record.stamp();
        if persist {
            self.cache.record(&key, record.clone());
        }
        tracing::info!(asset = %key, "copied");
        Ok((key, Outcome::Copied(record)))
    }

    /// Assign the asset key for a request, disambiguating when the same
    /// source is built with different capabilities or parameters in one
    /// run.
    fn assign_key(
        &mut self,
        rel: &str,
        importer: Option<&str>,
        processor: Option<&str>,
        normalized: &ParameterSet,
        prefer_suffix: bool,
    ) -> String {
        let variants = self.variants.entry(rel.to_string()).or_default();
        if let Some(existing) = variants.iter().find(|v| {
            v.importer.as_deref() == importer
                && v.processor.as_deref() == processor
                && v.parameters == *normalized
        }) {
            return existing.key.clone();
        }

        let index = variants.len();
        let key = if index == 0 && !prefer_suffix {
            rel.to_string()
        } else {
            suffixed(rel, index)
        };
        if index > 0 {
            tracing::warn!(
                asset = rel,
                output = %key,
                "same source requested with different settings, output renamed"
            );
        }
        variants.push(Variant {
            importer: importer.map(str::to_string),
            processor: processor.map(str::to_string),
            parameters: normalized.clone(),
            key: key.clone(),
        });
        key
    }
}

/// Insert a numeric suffix before the file extension.
fn suffixed(rel: &str, index: usize) -> String {
    match rel.rfind('.') {
        Some(dot) if !rel[dot + 1..].contains('/') => {
            format!("{}_{}{}", &rel[..dot], index, &rel[dot..])
        }
        _ => format!("{}_{}", rel, index),
    }
}
