/// Fingerprints and cache keys
///
/// The cache key says *which* plan a build wants (project, requested and
/// excluded work items); the fingerprint says whether the stored plan for that
/// key is still valid. The fingerprint covers:
/// - Build script contents
/// - Declared input files (content hashed)
/// - Declared environment variables
/// - Extra values supplied by the configurator
/// - The host OS
///
/// Only content hashing is used: a spurious miss costs one configuration run,
/// a spurious hit replays a stale plan.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub mod inputs;

use crate::start_parameter::StartParameter;
use inputs::hash_inputs;

/// Everything that influenced graph construction
#[derive(Debug, Clone, Default)]
pub struct FingerprintInputs {
    /// Directory relative paths are resolved against
    pub base_dir: PathBuf,
    /// Build scripts (manifests, plugin sources); hashed by content
    pub scripts: Vec<PathBuf>,
    /// Glob patterns of declared input files
    pub input_globs: Vec<String>,
    /// Environment variables read during configuration
    pub env_vars: Vec<String>,
    /// Other configuration inputs (name -> value)
    pub values: BTreeMap<String, String>,
}

impl FingerprintInputs {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    pub fn script(mut self, path: impl Into<PathBuf>) -> Self {
        self.scripts.push(path.into());
        self
    }

    pub fn input_glob(mut self, pattern: impl Into<String>) -> Self {
        self.input_globs.push(pattern.into());
        self
    }

    pub fn env_var(mut self, name: impl Into<String>) -> Self {
        self.env_vars.push(name.into());
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

/// Hex-encoded SHA-256 over the fingerprint inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(inputs: &FingerprintInputs) -> Result<Self> {
        let mut hasher = Sha256::new();

        // 1. Build scripts
        for script in &inputs.scripts {
            let path = if script.is_absolute() {
                script.clone()
            } else {
                inputs.base_dir.join(script)
            };
            let content = fs::read(&path)
                .with_context(|| format!("Failed to read build script: {}", path.display()))?;
            update_field(&mut hasher, b"script", script.to_string_lossy().as_bytes());
            update_field(&mut hasher, b"content", &content);
        }

        // 2. Declared input files
        let input_hashes = hash_inputs(&inputs.input_globs, &inputs.base_dir)
            .context("Failed to hash input files")?;
        for input_hash in input_hashes {
            update_field(&mut hasher, b"input", input_hash.pattern.as_bytes());
            update_field(&mut hasher, b"hash", input_hash.combined_hash.as_bytes());
        }

        // 3. Environment variables
        for var in &inputs.env_vars {
            update_field(&mut hasher, b"env", var.as_bytes());
            match env::var(var) {
                Ok(value) => update_field(&mut hasher, b"set", value.as_bytes()),
                // Unset differs from set-to-empty
                Err(_) => update_field(&mut hasher, b"unset", b""),
            }
        }

        // 4. Extra values
        for (name, value) in &inputs.values {
            update_field(&mut hasher, b"value", name.as_bytes());
            update_field(&mut hasher, b"is", value.as_bytes());
        }

        // 5. Host OS
        update_field(&mut hasher, b"os", env::consts::OS.as_bytes());

        Ok(Self(hex::encode(hasher.finalize())))
    }

    /// Wrap an already computed fingerprint (e.g. read from a snapshot)
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Length-prefixed field so adjacent fields cannot run into each other
fn update_field(hasher: &mut Sha256, tag: &[u8], data: &[u8]) {
    hasher.update(tag);
    hasher.update((data.len() as u64).to_le_bytes());
    hasher.update(data);
}

/// Identifies the stored plan for one kind of build invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Format: "plan-{hex}" where hex is the first 16 characters of a SHA-256
    /// over the project directory and the requested/excluded work items.
    pub fn compute(project_dir: &Path, start_parameter: &StartParameter) -> Self {
        let mut hasher = Sha256::new();

        let project_dir = project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf());
        update_field(&mut hasher, b"project", project_dir.to_string_lossy().as_bytes());

        for path in &start_parameter.requested {
            update_field(&mut hasher, b"requested", path.as_str().as_bytes());
        }
        for path in &start_parameter.excluded {
            update_field(&mut hasher, b"excluded", path.as_str().as_bytes());
        }

        let hash = hex::encode(hasher.finalize());
        Self(format!("plan-{}", &hash[..16]))
    }

    /// Use an existing key verbatim (as listed by the store)
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Key typed by a user. It names a file inside the store, so path
    /// separators and relative components are rejected.
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = key.is_empty()
            || key.starts_with('.')
            || key.contains("..")
            || key.contains(|c: char| c == '/' || c == '\\' || c.is_control());
        if invalid {
            anyhow::bail!("Invalid cache key: {:?}", key);
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problems::Tolerance;
    use serial_test::serial;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("plan.kdl"), "task \":a\"").unwrap();
        fs::create_dir(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/main.rs"), "fn main() {}").unwrap();
        temp
    }

    fn inputs(temp: &TempDir) -> FingerprintInputs {
        FingerprintInputs::new(temp.path())
            .script("plan.kdl")
            .input_glob("src/**/*.rs")
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let temp = workspace();
        let first = Fingerprint::compute(&inputs(&temp)).unwrap();
        let second = Fingerprint::compute(&inputs(&temp)).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_script() {
        let temp = workspace();
        let before = Fingerprint::compute(&inputs(&temp)).unwrap();

        fs::write(temp.path().join("plan.kdl"), "task \":b\"").unwrap();
        let after = Fingerprint::compute(&inputs(&temp)).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_fingerprint_changes_with_input_file() {
        let temp = workspace();
        let before = Fingerprint::compute(&inputs(&temp)).unwrap();

        fs::write(temp.path().join("src/main.rs"), "fn main() { loop {} }").unwrap();
        let changed = Fingerprint::compute(&inputs(&temp)).unwrap();
        assert_ne!(before, changed);

        fs::write(temp.path().join("src/lib.rs"), "").unwrap();
        let added = Fingerprint::compute(&inputs(&temp)).unwrap();
        assert_ne!(changed, added);
    }

    #[test]
    fn test_fingerprint_changes_with_value() {
        let temp = workspace();
        let a = Fingerprint::compute(&inputs(&temp).value("profile", "debug")).unwrap();
        let b = Fingerprint::compute(&inputs(&temp).value("profile", "release")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    #[serial]
    fn test_fingerprint_changes_with_env_var() {
        let temp = workspace();
        let var = "PLANSTORE_TEST_FINGERPRINT_VAR";
        let inputs = inputs(&temp).env_var(var);

        env::remove_var(var);
        let unset = Fingerprint::compute(&inputs).unwrap();

        env::set_var(var, "");
        let empty = Fingerprint::compute(&inputs).unwrap();

        env::set_var(var, "1");
        let set = Fingerprint::compute(&inputs).unwrap();
        env::remove_var(var);

        assert_ne!(unset, empty);
        assert_ne!(empty, set);
    }

    #[test]
    fn test_short_fingerprint() {
        assert_eq!(Fingerprint::from_hex("0123456789abcdef").short(), "0123456789ab");
        assert_eq!(Fingerprint::from_hex("abc").short(), "abc");
        assert_eq!(Fingerprint::from_hex("aéééééé").short(), "aéééééé");
    }

    #[test]
    fn test_missing_script_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = Fingerprint::compute(&FingerprintInputs::new(temp.path()).script("nope.kdl"));
        assert!(result.is_err());
    }

    #[test]
    fn test_cache_key_depends_on_requested_items() {
        let temp = TempDir::new().unwrap();
        let all = StartParameter::new(true, Tolerance::Warn);
        let build = StartParameter::new(true, Tolerance::Warn).with_requested([":build"]);
        let build_no_test = build.clone().with_excluded([":test"]);

        let keys = [
            CacheKey::compute(temp.path(), &all),
            CacheKey::compute(temp.path(), &build),
            CacheKey::compute(temp.path(), &build_no_test),
        ];

        assert!(keys[0].as_str().starts_with("plan-"));
        assert_eq!(keys[0].as_str().len(), "plan-".len() + 16);
        assert_ne!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_eq!(keys[1], CacheKey::compute(temp.path(), &build));
    }

    #[test]
    fn test_parse_cache_key() {
        assert_eq!(
            CacheKey::parse("plan-0123456789abcdef").unwrap().as_str(),
            "plan-0123456789abcdef"
        );
        for bad in ["", "../../x", "a/b", "a\\b", "..", ".hidden", "plan-..x"] {
            assert!(CacheKey::parse(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_cache_key_ignores_tolerance() {
        let temp = TempDir::new().unwrap();
        let warn = StartParameter::new(true, Tolerance::Warn);
        let fail = StartParameter::new(true, Tolerance::Fail);
        assert_eq!(
            CacheKey::compute(temp.path(), &warn),
            CacheKey::compute(temp.path(), &fail)
        );
    }
}
