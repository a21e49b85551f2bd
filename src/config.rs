use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::LogFormat;
use crate::problems::Tolerance;
use crate::storage::default_cache_dir;

/// Complete planstore configuration (loaded from TOML file)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanStoreConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub configuration_cache: ConfigurationCacheConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Plan store location
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Cache directory; relative paths resolve against the project directory.
    /// Defaults to the platform cache directory (e.g. ~/.cache/planstore).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationCacheConfig {
    /// Reuse the configured plan across builds
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// What capability problems do to the build: warn, fail
    #[serde(default = "default_problems")]
    pub problems: String,
}

impl Default for ConfigurationCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            problems: default_problems(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    /// Worker threads (0 = one per CPU)
    #[serde(default)]
    pub workers: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Default log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: pretty, compact, json (PLANSTORE_LOG_FORMAT wins)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: None,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_problems() -> String {
    "warn".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PlanStoreConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: PlanStoreConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let config = PlanStoreConfig {
            cache: CacheConfig {
                dir: Some(".planstore/cache".to_string()),
            },
            configuration_cache: ConfigurationCacheConfig {
                enabled: true,
                problems: "fail".to_string(),
            },
            execution: ExecutionConfig { workers: 4 },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: Some("compact".to_string()),
            },
        };

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.cache.dir {
            if dir.is_empty() {
                anyhow::bail!("cache.dir must not be empty");
            }
        }

        self.tolerance()?;

        if let Some(format) = &self.observability.log_format {
            if LogFormat::parse(format).is_none() {
                anyhow::bail!("observability.log_format must be one of: pretty, compact, json");
            }
        }

        Ok(())
    }

    pub fn tolerance(&self) -> Result<Tolerance> {
        self.configuration_cache
            .problems
            .parse()
            .context("Invalid configuration_cache.problems")
    }

    /// Effective worker count
    pub fn workers(&self) -> usize {
        match self.execution.workers {
            0 => num_cpus::get(),
            n => n as usize,
        }
    }

    /// Effective cache directory for a project
    pub fn cache_dir(&self, project_dir: &Path) -> PathBuf {
        match &self.cache.dir {
            Some(dir) => project_dir.join(dir),
            None => default_cache_dir(),
        }
    }

    pub fn log_format(&self) -> Option<LogFormat> {
        self.observability
            .log_format
            .as_deref()
            .and_then(LogFormat::parse)
    }
}
