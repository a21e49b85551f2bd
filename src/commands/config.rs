use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::Workspace;
use crate::cli::ConfigCommands;
use crate::config::PlanStoreConfig;

pub fn run(command: &ConfigCommands, workspace: &Workspace) -> Result<()> {
    match command {
        ConfigCommands::Example => example(),
        ConfigCommands::Validate { path } => validate(path),
        ConfigCommands::Show => show(workspace),
    }
}

fn example() -> Result<()> {
    println!("{}", PlanStoreConfig::example()?);
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    info!("Validating config file: {}", path.display());

    let config = PlanStoreConfig::from_file(path)?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    println!("✓ Configuration file is valid: {}", path.display());
    println!("\nSummary:");
    println!(
        "  - Cache directory: {}",
        config.cache.dir.as_deref().unwrap_or("(platform default)")
    );
    println!(
        "  - Configuration cache: {}",
        if config.configuration_cache.enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  - Problems: {}", config.tolerance()?);
    println!("  - Workers: {}", config.workers());

    Ok(())
}

fn show(workspace: &Workspace) -> Result<()> {
    info!("Showing effective configuration");

    println!("Project: {}", workspace.project_dir.display());
    println!("Cache directory: {}", workspace.cache_dir.display());
    println!("\nEffective Configuration:\n");
    println!(
        "{}",
        toml::to_string_pretty(&workspace.config).context("Failed to serialize configuration")?
    );

    Ok(())
}
