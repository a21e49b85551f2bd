use tracing::debug;

use super::{codec, DecodeError};
use crate::fingerprint::{CacheKey, Fingerprint};
use crate::graph::Graph;
use crate::logging::operations;
use crate::storage::PlanStore;

/// Restores graphs written by [`super::GraphSnapshotWriter`]
pub struct GraphSnapshotReader<'a> {
    store: &'a PlanStore,
}

impl<'a> GraphSnapshotReader<'a> {
    pub fn new(store: &'a PlanStore) -> Self {
        Self { store }
    }

    fn load(&self, key: &CacheKey) -> Result<Vec<u8>, DecodeError> {
        self.store
            .get(key)
            .map_err(DecodeError::Unreadable)?
            .ok_or_else(|| DecodeError::Missing(key.clone()))
    }

    /// Fingerprint recorded with the entry, from the header only
    pub fn stored_fingerprint(&self, key: &CacheKey) -> Result<Fingerprint, DecodeError> {
        let blob = self.load(key)?;
        Ok(codec::decode_header(&blob)?.fingerprint)
    }

    /// Fully decode and verify the entry
    pub fn read(&self, key: &CacheKey) -> Result<(Graph, Fingerprint), DecodeError> {
        let blob = self.load(key)?;
        let (graph, fingerprint) = codec::decode_snapshot(&blob)?;

        debug!(
            operation = operations::SNAPSHOT_READ,
            cache_key = %key,
            items = graph.len(),
            size_bytes = blob.len(),
            "Restored plan snapshot"
        );

        Ok((graph, fingerprint))
    }
}
