use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::PlanStoreConfig;

pub const CONFIG_FILE: &str = "planstore.toml";

/// Discovers planstore configuration by traversing up the directory tree
pub fn discover_config(start_dir: &Path) -> Result<Option<PathBuf>> {
    let mut current = start_dir.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(Some(config_path));
        }

        // Try to go up one level
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    // Fallback to global config
    if let Some(home) = dirs::home_dir() {
        let global_config = home.join(".config/planstore/config.toml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Loads configuration with auto-discovery support
///
/// If `explicit_path` is provided, loads config from that path.
/// Otherwise, auto-discovers config by traversing up the directory tree from
/// `start_dir`.
///
/// Returns defaults if no config is found; the result is validated.
pub fn load_config_with_discovery(
    explicit_path: Option<&Path>,
    start_dir: &Path,
) -> Result<PlanStoreConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(start_dir)?,
    };

    let config = match &path {
        Some(path) => {
            tracing::debug!(config = %path.display(), "Loading configuration");
            PlanStoreConfig::from_file(path)?
        }
        None => PlanStoreConfig::default(),
    };

    config.validate().with_context(|| match &path {
        Some(path) => format!("Invalid configuration in {}", path.display()),
        None => "Invalid default configuration".to_string(),
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_config_in_current_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(CONFIG_FILE);
        fs::write(&config_path, "[cache]\ndir = \"/tmp/cache\"").unwrap();

        let discovered = discover_config(temp.path()).unwrap();
        assert_eq!(discovered, Some(config_path));
    }

    #[test]
    fn test_discover_config_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join(CONFIG_FILE);
        fs::write(&config_path, "[cache]\ndir = \"/tmp/cache\"").unwrap();

        let subdir = temp.path().join("subdir/nested");
        fs::create_dir_all(&subdir).unwrap();

        let discovered = discover_config(&subdir).unwrap();
        assert_eq!(discovered, Some(config_path));
    }

    #[test]
    fn test_explicit_path_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            "[configuration_cache]\nproblems = \"fail\"",
        )
        .unwrap();
        let explicit = temp.path().join("other.toml");
        fs::write(&explicit, "[configuration_cache]\nenabled = false").unwrap();

        let config = load_config_with_discovery(Some(&explicit), temp.path()).unwrap();
        assert!(!config.configuration_cache.enabled);
        assert_eq!(config.configuration_cache.problems, "warn");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE),
            "[configuration_cache]\nproblems = \"ignore\"",
        )
        .unwrap();

        let err = load_config_with_discovery(None, temp.path()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid configuration in"));
    }
}
