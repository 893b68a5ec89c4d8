//! Command-line interface implementation.
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod build;
mod serve;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::pipeline::{GraphicsProfile, TargetPlatform};

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Contentmill - incremental build pipeline for game content
#[derive(Parser)]
#[command(name = "cmill")]
#[command(about = "Contentmill - incremental build pipeline for game content")]
#[command(version)]
pub struct Cli {
    /// Working directory; source/output/intermediate resolve against it
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Source content directory
    #[arg(long, global = true)]
    pub source: Option<PathBuf>,

    /// Compiled output directory
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Intermediate directory (cache, scratch files)
    #[arg(long, global = true)]
    pub intermediate: Option<PathBuf>,

    /// Target platform
    #[arg(long, global = true, value_enum)]
    pub platform: Option<TargetPlatform>,

    /// Graphics profile
    #[arg(long, global = true, value_enum)]
    pub profile: Option<GraphicsProfile>,

    /// Compress compiled payloads
    #[arg(long, global = true)]
    pub compress: bool,

    /// Build configuration string recorded in the cache
    #[arg(long, global = true)]
    pub build_config: Option<String>,

    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every handled asset once and exit
    Build {
        /// Keep orphaned cache entries and outputs
        #[arg(long)]
        skip_clean: bool,

        /// Rebuild everything, ignoring the cache
        #[arg(long)]
        force: bool,
    },
    /// Run a standing server that builds assets on request
    Serve {
        /// Port to listen on; 0 picks a free port
        #[arg(long, default_value = "7710")]
        port: u16,

        /// Skip writing per-asset build event files
        #[arg(long)]
        no_events: bool,
    },
}

/// Run the CLI application.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log_level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(dir) = &cli.working_dir {
        if let Err(e) = std::env::set_current_dir(dir) {
            eprintln!("Error: cannot enter working directory '{}': {}", dir.display(), e);
            return ExitCode::from(EXIT_INVALID_ARGS);
        }
    }

    match cli.command {
        Commands::Build { skip_clean, force } => build::run_build(&cli, skip_clean, force),
        Commands::Serve { port, no_events } => serve::run_serve(&cli, port, no_events),
    }
}
