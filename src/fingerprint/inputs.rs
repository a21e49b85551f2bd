/// Input file hashing for fingerprints
///
/// Handles glob expansion and content hashing of declared input files.
use anyhow::{Context, Result};
use glob::glob;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of hashing one input glob
#[derive(Debug, Clone)]
pub struct InputHash {
    pub pattern: String,
    pub files: Vec<PathBuf>,
    pub combined_hash: String,
}

/// Hash all input globs, in declaration order
pub fn hash_inputs(patterns: &[String], base_dir: &Path) -> Result<Vec<InputHash>> {
    let mut results = Vec::new();

    for pattern in patterns {
        let input_hash = hash_input(pattern, base_dir)
            .with_context(|| format!("Failed to hash input: {}", pattern))?;
        results.push(input_hash);
    }

    Ok(results)
}

fn hash_input(pattern: &str, base_dir: &Path) -> Result<InputHash> {
    let files = expand_glob(pattern, base_dir)?;

    if files.is_empty() {
        // No match is a valid state; creating a matching file changes the hash
        return Ok(InputHash {
            pattern: pattern.to_string(),
            files: vec![],
            combined_hash: String::from("empty"),
        });
    }

    let mut hasher = Sha256::new();

    for file in &files {
        let file_hash = hash_file_content(file)?;

        // Include the relative path so renames change the hash
        let rel_path = file
            .strip_prefix(base_dir)
            .unwrap_or(file)
            .to_string_lossy();
        hasher.update(rel_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(&file_hash);
    }

    Ok(InputHash {
        pattern: pattern.to_string(),
        files,
        combined_hash: hex::encode(hasher.finalize()),
    })
}

/// Expand glob pattern relative to base directory
pub fn expand_glob(pattern: &str, base_dir: &Path) -> Result<Vec<PathBuf>> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().to_string()
    };

    let mut paths = Vec::new();

    for entry in
        glob(&full_pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?
    {
        let path = entry.with_context(|| format!("Failed to read glob entry for: {}", pattern))?;

        // Only include files (not directories)
        if path.is_file() {
            paths.push(path);
        }
    }

    // Sort for deterministic ordering
    paths.sort();

    Ok(paths)
}

/// Hash file contents using SHA256
pub fn hash_file_content(path: &Path) -> Result<Vec<u8>> {
    let content =
        fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;

    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hasher.finalize().to_vec())
}
