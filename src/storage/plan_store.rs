use chrono::{DateTime, Utc};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fingerprint::CacheKey;
use crate::logging::operations;

const BLOB_EXTENSION: &str = "bin";

/// Directory of persisted plan blobs, one file per cache key
///
/// Layout:
/// - `<cache dir>/plans/plan-0123456789abcdef.bin`
///
/// Writes go to a temp file in the same directory, are synced, then renamed
/// over the final path. Readers see either the previous blob or the new one,
/// never a partial write.
#[derive(Debug, Clone)]
pub struct PlanStore {
    dir: PathBuf,
}

/// One stored blob
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

impl PlanStore {
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> io::Result<Self> {
        let dir = cache_dir.as_ref().join("plans");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.{}", key, BLOB_EXTENSION))
    }

    /// Atomically replace the blob for `key`
    pub fn put(&self, key: &CacheKey, data: &[u8]) -> io::Result<PathBuf> {
        let path = self.path_for(key);

        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{}.", key))
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        file.write_all(data)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;

        debug!(
            operation = operations::STORE_PUT,
            cache_key = %key,
            size_bytes = data.len(),
            "Stored plan blob"
        );

        Ok(path)
    }

    pub fn get(&self, key: &CacheKey) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Remove the blob for `key`; missing blobs are not an error
    pub fn remove(&self, key: &CacheKey) -> io::Result<bool> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {
                debug!(operation = operations::STORE_REMOVE, cache_key = %key, "Removed plan blob");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// All stored blobs, sorted by key. Leftover temp files are ignored.
    pub fn list(&self) -> io::Result<Vec<StoreEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }

            let metadata = entry.metadata()?;
            entries.push(StoreEntry {
                key: CacheKey::from_raw(stem),
                path: path.clone(),
                size_bytes: metadata.len(),
                modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove every blob (and stray temp file); returns the number of blobs removed
    pub fn clean_all(&self) -> io::Result<usize> {
        let removed = self.list()?.len();
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
        }
        fs::create_dir_all(&self.dir)?;
        Ok(removed)
    }
}
