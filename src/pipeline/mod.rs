//! Importer/processor capabilities, their registry, and the binary compiler.
//!
//! The pipeline module owns everything between a source file on disk and a
//! compiled `.xnb` asset: the parameter model, the interchange item types,
//! the capability traits, the registry that resolves capabilities per file,
//! and the container writer.

pub mod builtin;
pub mod compiler;
pub mod item;
pub mod params;
pub mod plugin;
pub mod registry;

pub use item::*;
pub use params::*;
pub use plugin::*;
pub use registry::*;

use serde::{Deserialize, Serialize};

/// Platform an asset is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[derive(clap::ValueEnum)]
pub enum TargetPlatform {
    #[default]
    Windows,
    Linux,
    MacOs,
    Android,
    Ios,
    Web,
}

impl TargetPlatform {
    /// Single-byte platform tag used in the compiled container header.
    pub fn tag(&self) -> u8 {
        match self {
            TargetPlatform::Windows => b'w',
            TargetPlatform::Linux => b'l',
            TargetPlatform::MacOs => b'm',
            TargetPlatform::Android => b'a',
            TargetPlatform::Ios => b'i',
            TargetPlatform::Web => b'b',
        }
    }
}

impl std::fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetPlatform::Windows => write!(f, "windows"),
            TargetPlatform::Linux => write!(f, "linux"),
            TargetPlatform::MacOs => write!(f, "macos"),
            TargetPlatform::Android => write!(f, "android"),
            TargetPlatform::Ios => write!(f, "ios"),
            TargetPlatform::Web => write!(f, "web"),
        }
    }
}

impl std::str::FromStr for TargetPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "windows" => Ok(TargetPlatform::Windows),
            "linux" => Ok(TargetPlatform::Linux),
            "macos" => Ok(TargetPlatform::MacOs),
            "android" => Ok(TargetPlatform::Android),
            "ios" => Ok(TargetPlatform::Ios),
            "web" => Ok(TargetPlatform::Web),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// Graphics feature level an asset is compiled against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[derive(clap::ValueEnum)]
pub enum GraphicsProfile {
    /// Baseline feature set
    #[default]
    Reach,
    /// Full feature set
    HiDef,
}

impl std::fmt::Display for GraphicsProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphicsProfile::Reach => write!(f, "reach"),
            GraphicsProfile::HiDef => write!(f, "hidef"),
        }
    }
}

impl std::str::FromStr for GraphicsProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reach" => Ok(GraphicsProfile::Reach),
            "hidef" => Ok(GraphicsProfile::HiDef),
            other => Err(format!("unknown graphics profile '{}'", other)),
        }
    }
}
