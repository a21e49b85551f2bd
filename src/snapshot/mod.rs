/// Persisted build plans
///
/// A snapshot is the work item graph of one build, written after a cold
/// configuration and read back instead of configuring on the next build with
/// the same cache key and fingerprint.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::fingerprint::{CacheKey, Fingerprint};
use crate::graph::GraphError;
use crate::problems::PropertyTrace;

pub mod codec;
mod reader;
mod writer;

pub use codec::{FORMAT_VERSION, MAGIC};
pub use reader::GraphSnapshotReader;
pub use writer::GraphSnapshotWriter;

/// Where a snapshot was written
#[derive(Debug, Clone)]
pub struct StoreHandle {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Cannot store {trace}: values of type `{type_name}` are not supported by the configuration cache")]
    UnsupportedValue {
        trace: PropertyTrace,
        type_name: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Failed to encode snapshot")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to compress snapshot")]
    Compress(#[source] io::Error),

    #[error("Failed to write snapshot to {}", path.display())]
    Store {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl WriteError {
    /// Storage failures lose the cache entry but not the build
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store { .. })
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No stored plan for {0}")]
    Missing(CacheKey),

    #[error("Failed to read stored plan")]
    Unreadable(#[source] io::Error),

    #[error("Stored plan is truncated")]
    Truncated,

    #[error("Stored plan is not a plan snapshot")]
    BadMagic,

    #[error("Stored plan has format version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Stored plan failed its integrity check")]
    IntegrityMismatch,

    #[error("Stored plan is corrupt: {0}")]
    Corrupt(String),

    #[error("Failed to decompress stored plan")]
    Decompress(#[source] io::Error),

    #[error("Failed to decode stored plan")]
    Payload(#[source] serde_json::Error),

    #[error("Stored plan references unknown value #{0}")]
    DanglingValue(u32),

    #[error("Stored plan contains an invalid graph: {0}")]
    Graph(GraphError),
}

impl From<GraphError> for DecodeError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

impl DecodeError {
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing(_))
    }
}
