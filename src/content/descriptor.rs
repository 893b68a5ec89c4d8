//! Per-asset build intent.

use crate::pipeline::ParameterSet;

/// Binary asset extension used for built output.
pub const BINARY_EXTENSION: &str = "xnb";

/// How a source path maps to its output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMapping {
    /// Output keeps the source path verbatim
    Identity,
    /// Output swaps the source extension for the given one
    Extension(String),
}

impl OutputMapping {
    /// Apply this mapping to a relative source path.
    pub fn apply(&self, relative: &str) -> String {
        match self {
            OutputMapping::Identity => relative.to_string(),
            OutputMapping::Extension(ext) => match relative.rfind('.') {
                Some(dot) if !relative[dot + 1..].contains('/') => {
                    format!("{}.{}", &relative[..dot], ext)
                }
                _ => format!("{}.{}", relative, ext),
            },
        }
    }
}

/// Declares how a single asset is handled: built through the pipeline or
/// copied verbatim, with which capabilities, under which content root.
///
/// Descriptors are constructed once when a rule or explicit registration
/// matches a file, and are immutable afterwards. A copy descriptor never
/// carries an importer or processor.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDescriptor {
    content_root: String,
    should_build: bool,
    importer: Option<String>,
    processor: Option<String>,
    parameters: ParameterSet,
    output: OutputMapping,
}

impl ContentDescriptor {
    /// Descriptor for an asset built through import/process/compile.
    ///
    /// Importer and processor may be left `None` to be resolved from the
    /// file extension at build time.
    pub fn build(importer: Option<&str>, processor: Option<&str>) -> Self {
        Self {
            content_root: String::new(),
            should_build: true,
            importer: importer.map(str::to_string),
            processor: processor.map(str::to_string),
            parameters: ParameterSet::new(),
            output: OutputMapping::Extension(BINARY_EXTENSION.to_string()),
        }
    }

    /// Descriptor for an asset copied verbatim to the output tree.
    pub fn copy() -> Self {
        Self {
            content_root: String::new(),
            should_build: false,
            importer: None,
            processor: None,
            parameters: ParameterSet::new(),
            output: OutputMapping::Identity,
        }
    }

    /// Set the content root prefix applied to output paths.
    pub fn with_content_root(mut self, root: &str) -> Self {
        self.content_root = super::normalize_path(root);
        self
    }

    /// Set processor parameters.
    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.parameters = parameters;
        self
    }

    /// Override the output path mapping.
    pub fn with_output(mut self, output: OutputMapping) -> Self {
        self.output = output;
        self
    }

    pub fn content_root(&self) -> &str {
        &self.content_root
    }

    pub fn should_build(&self) -> bool {
        self.should_build
    }

    pub fn importer(&self) -> Option<&str> {
        self.importer.as_deref()
    }

    pub fn processor(&self) -> Option<&str> {
        self.processor.as_deref()
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn output_mapping(&self) -> &OutputMapping {
        &self.output
    }

    /// Resolve the output path (relative to the output directory) for a
    /// relative source path, applying content root and mapping.
    pub fn output_path(&self, relative: &str) -> String {
        let mapped = self.output.apply(&super::normalize_path(relative));
        if self.content_root.is_empty() {
            mapped
        } else {
            format!("{}/{}", self.content_root, mapped)
        }
    }
}
