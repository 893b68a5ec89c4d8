//! Explicit importer/processor registry.
//!
//! The registry is assembled once at startup from the compiled-in
//! capability modules, plus whatever plugins the host registers, and is
//! immutable during a build. Resolution is by file extension for importers
//! and by name for processors; an importer names its default processor.

use std::path::Path;
use std::sync::OnceLock;

use crate::error::BuildError;
use crate::pipeline::{Importer, ParameterSet, Processor};

/// Factory for a registered importer.
pub type ImporterFactory = fn() -> Box<dyn Importer>;

/// Factory for a registered processor, parameterized by its settings.
pub type ProcessorFactory = fn(&ParameterSet) -> Box<dyn Processor>;

/// Capability descriptor for an importer.
pub struct ImporterInfo {
    pub name: String,
    pub display_name: String,
    /// Lowercase extensions without the dot
    pub extensions: Vec<String>,
    /// Name of the processor used when none is requested
    pub default_processor: String,
    factory: ImporterFactory,
}

impl ImporterInfo {
    pub fn new(
        name: &str,
        display_name: &str,
        extensions: &[&str],
        default_processor: &str,
        factory: ImporterFactory,
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            extensions: extensions.iter().map(|e| e.to_lowercase()).collect(),
            default_processor: default_processor.to_string(),
            factory,
        }
    }

    /// Extension match, case-insensitive.
    pub fn handles_extension(&self, extension: &str) -> bool {
        let ext = extension.to_lowercase();
        self.extensions.iter().any(|e| *e == ext)
    }

    /// Instantiate the importer.
    pub fn create(&self) -> Box<dyn Importer> {
        (self.factory)()
    }
}

impl std::fmt::Debug for ImporterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImporterInfo")
            .field("name", &self.name)
            .field("extensions", &self.extensions)
            .field("default_processor", &self.default_processor)
            .finish()
    }
}

/// Capability descriptor for a processor.
pub struct ProcessorInfo {
    pub name: String,
    pub display_name: String,
    factory: ProcessorFactory,
    defaults: OnceLock<ParameterSet>,
}

impl ProcessorInfo {
    pub fn new(name: &str, display_name: &str, factory: ProcessorFactory) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            factory,
            defaults: OnceLock::new(),
        }
    }

    /// Instantiate the processor with an effective parameter bag.
    pub fn create(&self, parameters: &ParameterSet) -> Box<dyn Processor> {
        (self.factory)(parameters)
    }

    /// The processor's default parameter values, captured once by
    /// instantiating it with an empty bag.
    pub fn defaults(&self) -> &ParameterSet {
        self.defaults
            .get_or_init(|| (self.factory)(&ParameterSet::new()).parameters())
    }
}

impl std::fmt::Debug for ProcessorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorInfo")
            .field("name", &self.name)
            .finish()
    }
}

/// The capability registry.
#[derive(Debug, Default)]
pub struct Registry {
    importers: Vec<ImporterInfo>,
    processors: Vec<ProcessorInfo>,
}

impl Registry {
    /// Empty registry, for hosts that register everything themselves.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the compiled-in capabilities.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::pipeline::builtin::register_builtins(&mut registry);
        registry
    }

    pub fn register_importer(&mut self, info: ImporterInfo) {
        self.importers.push(info);
    }

    pub fn register_processor(&mut self, info: ProcessorInfo) {
        self.processors.push(info);
    }

    pub fn importers(&self) -> &[ImporterInfo] {
        &self.importers
    }

    pub fn processors(&self) -> &[ProcessorInfo] {
        &self.processors
    }

    /// Look up an importer by registered name.
    pub fn importer(&self, name: &str) -> Option<&ImporterInfo> {
        self.importers.iter().find(|i| i.name == name)
    }

    /// Look up a processor by registered name.
    pub fn processor(&self, name: &str) -> Option<&ProcessorInfo> {
        self.processors.iter().find(|p| p.name == name)
    }

    /// Resolve the importer for a file.
    ///
    /// An explicit name bypasses extension matching; otherwise the first
    /// registered importer whose extension set contains the file's
    /// extension (case-insensitive) wins.
    pub fn find_importer(
        &self,
        path: &Path,
        explicit: Option<&str>,
    ) -> Result<&ImporterInfo, BuildError> {
        if let Some(name) = explicit {
            return self.importer(name).ok_or_else(|| BuildError::NoImporter {
                path: format!("{} (requested importer '{}')", path.display(), name),
            });
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.importers
            .iter()
            .find(|i| i.handles_extension(extension))
            .ok_or_else(|| BuildError::NoImporter {
                path: path.display().to_string(),
            })
    }

    /// Resolve the processor for a resolved importer.
    ///
    /// An explicit name wins; otherwise the importer's declared default
    /// processor is looked up by name.
    pub fn find_processor(
        &self,
        importer: &ImporterInfo,
        explicit: Option<&str>,
        path: &Path,
    ) -> Result<&ProcessorInfo, BuildError> {
        let name = explicit.unwrap_or(&importer.default_processor);
        self.processor(name).ok_or_else(|| BuildError::NoProcessor {
            name: name.to_string(),
            path: path.display().to_string(),
        })
    }

    /// Apply a requested parameter bag against a processor's defaults.
    ///
    /// Each requested entry is matched to a default by name; mismatched
    /// types are converted where a conversion exists. Unknown and
    /// unconvertible parameters are dropped silently.
    pub fn apply_parameters(&self, processor: &str, requested: &ParameterSet) -> ParameterSet {
        let Some(info) = self.processor(processor) else {
            return ParameterSet::new();
        };
        let defaults = info.defaults();

        let mut applied = ParameterSet::new();
        for (name, value) in requested.iter() {
            let Some(template) = defaults.get(name) else {
                tracing::debug!(processor, parameter = %name, "dropping unknown parameter");
                continue;
            };
            match value.convert_like(template) {
                Some(converted) => applied.insert(name.clone(), converted),
                None => {
                    tracing::debug!(processor, parameter = %name, "dropping unconvertible parameter");
                }
            }
        }
        applied
    }

    /// The full parameter bag a processor instance is constructed with:
    /// defaults overlaid with the applied request.
    pub fn effective_parameters(&self, processor: &str, requested: &ParameterSet) -> ParameterSet {
        let mut effective = self
            .processor(processor)
            .map(|p| p.defaults().clone())
            .unwrap_or_default();
        for (name, value) in self.apply_parameters(processor, requested).iter() {
            effective.insert(name.clone(), value.clone());
        }
        effective
    }

    /// Requested parameters reduced to the entries that differ from the
    /// processor's defaults. This is the form stored in the cache and
    /// compared across runs.
    pub fn normalize_parameters(
        &self,
        processor: Option<&str>,
        requested: &ParameterSet,
    ) -> ParameterSet {
        match processor {
            Some(name) => match self.processor(name) {
                Some(info) => self
                    .apply_parameters(name, requested)
                    .normalized(info.defaults()),
                None => requested.clone(),
            },
            None => requested.clone(),
        }
    }
}
