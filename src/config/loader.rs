//! Configuration loading and discovery for `cmill.toml`.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{MillConfig, RuleActionConfig, RuleConfig};
use crate::content::{ContentCollection, ContentDescriptor, ContentRule, RuleAction};
use crate::error::BuildError;
use crate::pipeline::{GraphicsProfile, ParameterSet, ParameterValue, Registry, TargetPlatform};

/// Config filename searched for in the project tree.
pub const CONFIG_FILENAME: &str = "cmill.toml";

/// Configuration loading error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("failed to parse {CONFIG_FILENAME}: {0}")]
    Parse(#[from] toml::de::Error),
}

/// CLI arguments that can override config values.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub source: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub intermediate: Option<PathBuf>,
    pub platform: Option<TargetPlatform>,
    pub profile: Option<GraphicsProfile>,
    pub compress: Option<bool>,
    pub config: Option<String>,
}

/// Find `cmill.toml` by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find `cmill.toml` by walking up from the given directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut dir = Some(start.as_path());
    while let Some(current) = dir {
        let candidate = current.join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

/// Load configuration from a path, or defaults when `None`.
pub fn load_config(path: Option<&Path>) -> Result<MillConfig, ConfigError> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            Ok(toml::from_str(&text)?)
        }
        None => Ok(default_config()),
    }
}

/// Configuration used when no `cmill.toml` exists.
pub fn default_config() -> MillConfig {
    MillConfig::default()
}

/// Apply CLI overrides on top of loaded configuration.
pub fn merge_cli_overrides(config: &mut MillConfig, overrides: &CliOverrides) {
    if let Some(source) = &overrides.source {
        config.project.source = source.clone();
    }
    if let Some(output) = &overrides.output {
        config.project.output = output.clone();
    }
    if let Some(intermediate) = &overrides.intermediate {
        config.project.intermediate = intermediate.clone();
    }
    if let Some(platform) = overrides.platform {
        config.target.platform = platform;
    }
    if let Some(profile) = overrides.profile {
        config.target.profile = profile;
    }
    if let Some(compress) = overrides.compress {
        config.target.compress = compress;
    }
    if let Some(build_config) = &overrides.config {
        config.target.config = build_config.clone();
    }
}

/// Build a content collection from configured rules, or from the default
/// per-importer-extension rules when none are configured.
pub fn build_collection(
    config: &MillConfig,
    registry: &Registry,
) -> Result<ContentCollection, BuildError> {
    let mut collection = ContentCollection::new();

    if config.content.rules.is_empty() {
        for importer in registry.importers() {
            for extension in &importer.extensions {
                collection.include_pattern(
                    &format!("**/*.{}", extension),
                    ContentDescriptor::build(None, None),
                )?;
            }
        }
        return Ok(collection);
    }

    for rule in &config.content.rules {
        collection.add_rule(rule_from_config(rule)?);
    }
    Ok(collection)
}

fn rule_from_config(rule: &RuleConfig) -> Result<ContentRule, BuildError> {
    let action = match rule.action {
        RuleActionConfig::Exclude => RuleAction::Exclude,
        RuleActionConfig::Copy => RuleAction::Include(
            ContentDescriptor::copy().with_content_root(&rule.root),
        ),
        RuleActionConfig::Build => {
            let mut params = ParameterSet::new();
            for (name, value) in &rule.params {
                params.insert(name.clone(), ParameterValue::Text(value.clone()));
            }
            RuleAction::Include(
                ContentDescriptor::build(rule.importer.as_deref(), rule.processor.as_deref())
                    .with_content_root(&rule.root)
                    .with_parameters(params),
            )
        }
    };
    ContentRule::wildcard(&rule.pattern, action)
}
