//! Batch build command.

use std::path::PathBuf;
use std::process::ExitCode;

use super::{Cli, EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, PipelineManager};
use crate::config::{self, MillConfig};
use crate::pipeline::Registry;

/// Load config, apply CLI overrides, and assemble a manager.
pub(crate) fn setup_manager(cli: &Cli, legacy_events: bool) -> Result<PipelineManager, String> {
    let (config, project_root) = load_project(cli)?;

    let context = BuildContext::new(&project_root)
        .with_source(&config.project.source)
        .with_output(&config.project.output)
        .with_intermediate(&config.project.intermediate)
        .with_platform(config.target.platform)
        .with_profile(config.target.profile)
        .with_compression(config.target.compress)
        .with_config(&config.target.config)
        .with_legacy_events(legacy_events);

    let registry = Registry::with_builtins();
    let collection =
        config::build_collection(&config, &registry).map_err(|e| e.to_string())?;

    let mut manager = PipelineManager::new(context).with_registry(registry);
    *manager.collection_mut() = collection;
    Ok(manager)
}

fn load_project(cli: &Cli) -> Result<(MillConfig, PathBuf), String> {
    let (mut config, project_root) = match config::find_config() {
        Some(config_path) => {
            let loaded = config::load_config(Some(&config_path))
                .map_err(|e| format!("error loading config: {}", e))?;
            let root = config_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
            (loaded, root)
        }
        None => {
            let root = std::env::current_dir().unwrap_or_default();
            (config::default_config(), root)
        }
    };

    let overrides = config::CliOverrides {
        source: cli.source.clone(),
        output: cli.output.clone(),
        intermediate: cli.intermediate.clone(),
        platform: cli.platform,
        profile: cli.profile,
        compress: cli.compress.then_some(true),
        config: cli.build_config.clone(),
    };
    config::merge_cli_overrides(&mut config, &overrides);
    Ok((config, project_root))
}

/// Run the build command.
pub fn run_build(cli: &Cli, skip_clean: bool, force: bool) -> ExitCode {
    let manager = match setup_manager(cli, false) {
        Ok(manager) => manager,
        Err(message) => {
            eprintln!("Error: {}", message);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    let mut manager = manager.with_force(force);

    if !manager.context().source_dir().exists() {
        eprintln!(
            "Error: source directory not found: {}",
            manager.context().source_dir().display()
        );
        eprintln!("Create the directory or specify a different path with --source");
        return ExitCode::from(EXIT_ERROR);
    }

    if force {
        println!("Building (force rebuild, ignoring cache)...");
    } else {
        println!("Building (incremental)...");
    }

    match manager.build_all(skip_clean) {
        Ok(result) => {
            if result.is_success() {
                println!("{}", result.summary());
                ExitCode::from(EXIT_SUCCESS)
            } else {
                eprintln!("{}", result.summary());
                ExitCode::from(EXIT_ERROR)
            }
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
