//! Capability contracts implemented by importers and processors.
//!
//! Capabilities report failures as plain strings; the orchestrator wraps
//! them with the asset path and capability name before they surface.

use std::path::Path;

use crate::build::{ImportContext, ProcessContext};
use crate::pipeline::{ContentItem, ParameterSet};

/// Parses a source file's native format into an in-memory content item.
pub trait Importer: Send {
    fn import(&self, source: &Path, ctx: &mut ImportContext<'_>) -> Result<ContentItem, String>;
}

/// Transforms an imported item into its final, runtime-ready form.
pub trait Processor: Send {
    /// Current parameter values.
    ///
    /// Instantiating a processor with an empty parameter bag and reading
    /// this yields the processor's defaults, which the registry captures
    /// for parameter normalization.
    fn parameters(&self) -> ParameterSet;

    fn process(
        &self,
        input: ContentItem,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<ContentItem, String>;
}
