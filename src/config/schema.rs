//! Configuration schema types for `cmill.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::pipeline::{GraphicsProfile, TargetPlatform};

/// What a configured content rule does with matching files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleActionConfig {
    /// Run the file through import/process/compile
    #[default]
    Build,
    /// Copy the file verbatim
    Copy,
    /// Leave the file out entirely
    Exclude,
}

/// One content rule from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Wildcard pattern over relative source paths
    pub pattern: String,
    #[serde(default)]
    pub action: RuleActionConfig,
    /// Explicit importer name; resolved by extension when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importer: Option<String>,
    /// Explicit processor name; the importer's default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor: Option<String>,
    /// Content root prefix applied to outputs
    #[serde(default)]
    pub root: String,
    /// Processor parameters as plain strings; converted to the
    /// processor's declared types when applied
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// Content section: the ordered rule list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Project metadata and directory layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (required)
    pub name: String,
    /// Source content directory
    #[serde(default = "default_source")]
    pub source: PathBuf,
    /// Compiled output directory
    #[serde(default = "default_output")]
    pub output: PathBuf,
    /// Intermediate directory (cache, scratch files)
    #[serde(default = "default_intermediate")]
    pub intermediate: PathBuf,
}

fn default_source() -> PathBuf {
    PathBuf::from("content")
}

fn default_output() -> PathBuf {
    PathBuf::from("bin")
}

fn default_intermediate() -> PathBuf {
    PathBuf::from("obj")
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "content".to_string(),
            source: default_source(),
            output: default_output(),
            intermediate: default_intermediate(),
        }
    }
}

/// Target settings applied to every asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub platform: TargetPlatform,
    #[serde(default)]
    pub profile: GraphicsProfile,
    /// Compress compiled payloads
    #[serde(default)]
    pub compress: bool,
    /// Build configuration string recorded in the cache
    #[serde(default = "default_build_config")]
    pub config: String,
}

fn default_build_config() -> String {
    "Debug".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            platform: TargetPlatform::default(),
            profile: GraphicsProfile::default(),
            compress: false,
            config: default_build_config(),
        }
    }
}

/// Root configuration loaded from `cmill.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MillConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_parses() {
        let config: MillConfig = toml::from_str(
            r#"
            [project]
            name = "my-game"
            "#,
        )
        .unwrap();

        assert_eq!(config.project.name, "my-game");
        assert_eq!(config.project.source, PathBuf::from("content"));
        assert_eq!(config.target.platform, TargetPlatform::Windows);
        assert_eq!(config.target.config, "Debug");
        assert!(config.content.rules.is_empty());
    }

    #[test]
    fn test_full_config_parses() {
        let config: MillConfig = toml::from_str(
            r#"
            [project]
            name = "my-game"
            source = "assets"
            output = "dist"
            intermediate = "scratch"

            [target]
            platform = "linux"
            profile = "hidef"
            compress = true
            config = "Release"

            [[content.rules]]
            pattern = "**/*.png"
            action = "build"
            processor = "Texture"
            root = "Textures"

            [content.rules.params]
            ColorKeyEnabled = "true"

            [[content.rules]]
            pattern = "tmp/**"
            action = "exclude"
            "#,
        )
        .unwrap();

        assert_eq!(config.project.source, PathBuf::from("assets"));
        assert_eq!(config.target.platform, TargetPlatform::Linux);
        assert_eq!(config.target.profile, GraphicsProfile::HiDef);
        assert!(config.target.compress);
        assert_eq!(config.content.rules.len(), 2);

        let rule = &config.content.rules[0];
        assert_eq!(rule.action, RuleActionConfig::Build);
        assert_eq!(rule.processor.as_deref(), Some("Texture"));
        assert_eq!(rule.params.get("ColorKeyEnabled"), Some(&"true".to_string()));
        assert_eq!(config.content.rules[1].action, RuleActionConfig::Exclude);
    }
}
