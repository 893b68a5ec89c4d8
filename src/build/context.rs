//! Build settings and the context objects handed to capabilities.

use std::path::{Path, PathBuf};

use crate::build::manager::PipelineManager;
use crate::cache::BuildRecord;
use crate::content::Resolution;
use crate::error::BuildError;
use crate::pipeline::{ContentItem, GraphicsProfile, ParameterSet, TargetPlatform};

/// Settings for a build run: directories, target, and flags.
///
/// Relative directories resolve against the project root.
#[derive(Debug, Clone)]
pub struct BuildContext {
    project_root: PathBuf,
    source_dir: PathBuf,
    output_dir: PathBuf,
    intermediate_dir: PathBuf,
    platform: TargetPlatform,
    profile: GraphicsProfile,
    compress: bool,
    config: String,
    legacy_events: bool,
}

impl BuildContext {
    /// Context rooted at a project directory, with conventional defaults
    /// for the source, output, and intermediate trees.
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            source_dir: PathBuf::from("content"),
            output_dir: PathBuf::from("bin"),
            intermediate_dir: PathBuf::from("obj"),
            platform: TargetPlatform::default(),
            profile: GraphicsProfile::default(),
            compress: false,
            config: "Debug".to_string(),
            legacy_events: false,
        }
    }

    pub fn with_source(mut self, dir: &Path) -> Self {
        self.source_dir = dir.to_path_buf();
        self
    }

    pub fn with_output(mut self, dir: &Path) -> Self {
        self.output_dir = dir.to_path_buf();
        self
    }

    pub fn with_intermediate(mut self, dir: &Path) -> Self {
        self.intermediate_dir = dir.to_path_buf();
        self
    }

    pub fn with_platform(mut self, platform: TargetPlatform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_profile(mut self, profile: GraphicsProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_config(mut self, config: &str) -> Self {
        self.config = config.to_string();
        self
    }

    /// Maintain per-asset build event files beside the outputs.
    pub fn with_legacy_events(mut self, enabled: bool) -> Self {
        self.legacy_events = enabled;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve_path(&self.source_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output_dir)
    }

    pub fn intermediate_dir(&self) -> PathBuf {
        self.resolve_path(&self.intermediate_dir)
    }

    pub fn platform(&self) -> TargetPlatform {
        self.platform
    }

    pub fn profile(&self) -> GraphicsProfile {
        self.profile
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    pub fn build_config(&self) -> &str {
        &self.config
    }

    pub fn legacy_events(&self) -> bool {
        self.legacy_events
    }

    /// Resolve a path relative to the project root.
    ///
    /// Absolute paths are returned unchanged.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Context handed to an importer for one asset.
pub struct ImportContext<'a> {
    intermediate_dir: PathBuf,
    output_dir: PathBuf,
    record: &'a mut BuildRecord,
}

impl<'a> ImportContext<'a> {
    pub(crate) fn new(
        intermediate_dir: PathBuf,
        output_dir: PathBuf,
        record: &'a mut BuildRecord,
    ) -> Self {
        Self {
            intermediate_dir,
            output_dir,
            record,
        }
    }

    pub fn intermediate_dir(&self) -> &Path {
        &self.intermediate_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Register an extra file this asset's build depends on. Its
    /// last-write time is captured when the build succeeds.
    pub fn add_dependency(&mut self, path: &Path) {
        self.record.add_dependency(path);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(source = %self.record.source, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(source = %self.record.source, "{}", message);
    }
}

/// Context handed to a processor for one asset.
///
/// Besides dependency/output registration, processors can recurse into the
/// pipeline to build referenced assets; those nested builds run through the
/// same orchestration, and this asset's record absorbs their dependencies
/// and outputs.
pub struct ProcessContext<'a> {
    manager: &'a mut PipelineManager,
    record: &'a mut BuildRecord,
    parameters: ParameterSet,
}

impl<'a> ProcessContext<'a> {
    pub(crate) fn new(
        manager: &'a mut PipelineManager,
        record: &'a mut BuildRecord,
        parameters: ParameterSet,
    ) -> Self {
        Self {
            manager,
            record,
            parameters,
        }
    }

    pub fn platform(&self) -> TargetPlatform {
        self.manager.context().platform()
    }

    pub fn profile(&self) -> GraphicsProfile {
        self.manager.context().profile()
    }

    pub fn build_config(&self) -> String {
        self.manager.context().build_config().to_string()
    }

    pub fn intermediate_dir(&self) -> PathBuf {
        self.manager.context().intermediate_dir()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.manager.context().output_dir()
    }

    /// The effective parameter bag this processor was constructed with.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn add_dependency(&mut self, path: &Path) {
        self.record.add_dependency(path);
    }

    /// Register an extra output file produced alongside the destination.
    pub fn add_output_file(&mut self, path: &Path) {
        self.record.add_output(path);
    }

    pub fn info(&self, message: &str) {
        tracing::info!(source = %self.record.source, "{}", message);
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(source = %self.record.source, "{}", message);
    }

    /// Build a referenced asset in memory and return its final item.
    ///
    /// Nothing is written to disk or persisted to the cache; the referenced
    /// file still becomes a dependency of this asset.
    pub fn build_and_load_asset(
        &mut self,
        source: &str,
        processor: Option<&str>,
        parameters: Option<ParameterSet>,
    ) -> Result<ContentItem, BuildError> {
        let descriptor = self.manager.descriptor_for(source);
        let (key, outcome) = self.manager.build_internal(
            source,
            &descriptor,
            None,
            processor,
            parameters.as_ref(),
            true,
            false,
            true,
        )?;
        let crate::build::manager::Outcome::Built(child, Some(item)) = outcome else {
            return Err(BuildError::UnknownAsset(source.to_string()));
        };
        self.record.absorb(&child);
        self.record.add_child(&key);
        Ok(item)
    }

    /// Build a referenced asset to disk and return its output path.
    pub fn build_asset(
        &mut self,
        source: &str,
        importer: Option<&str>,
        processor: Option<&str>,
        parameters: Option<ParameterSet>,
    ) -> Result<PathBuf, BuildError> {
        let descriptor = self.manager.descriptor_for(source);
        let (key, outcome) = self.manager.build_internal(
            source,
            &descriptor,
            importer,
            processor,
            parameters.as_ref(),
            true,
            true,
            false,
        )?;
        let child = match outcome {
            crate::build::manager::Outcome::Built(child, _) => child,
            crate::build::manager::Outcome::Copied(child) => child,
            crate::build::manager::Outcome::CacheHit(child) => child,
            crate::build::manager::Outcome::Skipped => {
                return Err(BuildError::UnknownAsset(source.to_string()))
            }
        };
        let dest = PathBuf::from(&child.dest);
        self.record.absorb(&child);
        self.record.add_child(&key);
        Ok(dest)
    }

    /// Run another processor over an item in place, without touching disk.
    pub fn convert(
        &mut self,
        input: ContentItem,
        processor: &str,
        parameters: Option<ParameterSet>,
    ) -> Result<ContentItem, BuildError> {
        let requested = parameters.unwrap_or_default();
        let effective = self
            .manager
            .registry()
            .effective_parameters(processor, &requested);
        let instance = {
            let info =
                self.manager
                    .registry()
                    .processor(processor)
                    .ok_or_else(|| BuildError::NoProcessor {
                        name: processor.to_string(),
                        path: self.record.source.clone(),
                    })?;
            info.create(&effective)
        };

        let source = self.record.source.clone();
        let mut ctx = ProcessContext::new(&mut *self.manager, &mut *self.record, effective);
        instance
            .process(input, &mut ctx)
            .map_err(|message| BuildError::Process {
                path: source,
                processor: processor.to_string(),
                message,
            })
    }
}

impl PipelineManager {
    /// Descriptor for a nested build: the collection's entry when the
    /// source is handled, a plain build descriptor otherwise.
    pub(crate) fn descriptor_for(&self, source: &str) -> crate::content::ContentDescriptor {
        match self.collection().resolve(source) {
            Resolution::Include(descriptor) => descriptor,
            _ => crate::content::ContentDescriptor::build(None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_resolves_relative_dirs() {
        let ctx = BuildContext::new(Path::new("/project"));
        assert_eq!(ctx.source_dir(), PathBuf::from("/project/content"));
        assert_eq!(ctx.output_dir(), PathBuf::from("/project/bin"));
        assert_eq!(ctx.intermediate_dir(), PathBuf::from("/project/obj"));
    }

    #[test]
    fn test_context_keeps_absolute_dirs() {
        let ctx = BuildContext::new(Path::new("/project")).with_output(Path::new("/elsewhere/out"));
        assert_eq!(ctx.output_dir(), PathBuf::from("/elsewhere/out"));
    }

    #[test]
    fn test_context_builders() {
        let ctx = BuildContext::new(Path::new("/p"))
            .with_platform(TargetPlatform::Linux)
            .with_profile(GraphicsProfile::HiDef)
            .with_compression(true)
            .with_config("Release")
            .with_legacy_events(true);

        assert_eq!(ctx.platform(), TargetPlatform::Linux);
        assert_eq!(ctx.profile(), GraphicsProfile::HiDef);
        assert!(ctx.compress());
        assert_eq!(ctx.build_config(), "Release");
        assert!(ctx.legacy_events());
    }

    #[test]
    fn test_import_context_registers_dependencies() {
        let mut record = BuildRecord::request(
            "",
            true,
            None,
            None,
            ParameterSet::new(),
            false,
            GraphicsProfile::Reach,
            TargetPlatform::Windows,
            "Debug",
            Path::new("/src/a.png"),
            Path::new("/out/a.xnb"),
        );
        let mut ctx = ImportContext::new(
            PathBuf::from("/obj"),
            PathBuf::from("/out"),
            &mut record,
        );
        assert_eq!(ctx.intermediate_dir(), Path::new("/obj"));
        ctx.add_dependency(Path::new("/src/shared.inc"));
        assert!(record.dependencies.contains_key("/src/shared.inc"));
    }
}
