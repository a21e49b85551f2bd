use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use crate::cli::CommonConfigArgs;
use crate::config::PlanStoreConfig;
use crate::config_discovery::load_config_with_discovery;
use crate::storage::PlanStore;

pub mod cache;
pub mod config;
pub mod run;

/// Project directory and effective configuration for one invocation
#[derive(Debug, Clone)]
pub struct Workspace {
    pub project_dir: PathBuf,
    pub config: PlanStoreConfig,
    pub cache_dir: PathBuf,
}

impl Workspace {
    pub fn load(args: &CommonConfigArgs) -> Result<Self> {
        let project_dir = match &args.project {
            Some(dir) => dir.clone(),
            None => env::current_dir().context("Failed to get current directory")?,
        };
        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("Project directory not found: {}", project_dir.display()))?;

        let config = load_config_with_discovery(args.config.as_deref(), &project_dir)?;

        let cache_dir = match &args.cache_dir {
            Some(dir) => dir.clone(),
            None => config.cache_dir(&project_dir),
        };

        Ok(Self {
            project_dir,
            config,
            cache_dir,
        })
    }

    pub fn store(&self) -> Result<PlanStore> {
        PlanStore::new(&self.cache_dir).with_context(|| {
            format!(
                "Failed to initialize plan store at {}",
                self.cache_dir.display()
            )
        })
    }
}
