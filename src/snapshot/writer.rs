use tracing::{debug, info};

use super::{codec, StoreHandle, WriteError};
use crate::fingerprint::{CacheKey, Fingerprint};
use crate::graph::Graph;
use crate::logging::operations;
use crate::storage::PlanStore;

/// Serializes a configured graph into the plan store
pub struct GraphSnapshotWriter<'a> {
    store: &'a PlanStore,
    key: &'a CacheKey,
}

impl<'a> GraphSnapshotWriter<'a> {
    pub fn new(store: &'a PlanStore, key: &'a CacheKey) -> Self {
        Self { store, key }
    }

    /// Validate, encode and atomically store `graph`.
    ///
    /// Nothing is written unless the whole graph encodes: an unsupported value
    /// anywhere leaves the previous entry (if any) untouched.
    pub fn write(&self, graph: &Graph, fingerprint: &Fingerprint) -> Result<StoreHandle, WriteError> {
        graph.validate()?;

        let blob = codec::encode_snapshot(graph, fingerprint)?;
        debug!(
            operation = operations::SNAPSHOT_ENCODE,
            cache_key = %self.key,
            items = graph.len(),
            edges = graph.edge_count(),
            size_bytes = blob.len(),
            "Encoded plan snapshot"
        );

        let path = self
            .store
            .put(self.key, &blob)
            .map_err(|source| WriteError::Store {
                path: self.store.path_for(self.key),
                source,
            })?;

        info!(
            operation = operations::SNAPSHOT_WRITE,
            cache_key = %self.key,
            fingerprint = fingerprint.short(),
            size_bytes = blob.len(),
            "Stored configuration cache entry"
        );

        Ok(StoreHandle {
            key: self.key.clone(),
            path,
            size_bytes: blob.len() as u64,
            fingerprint: fingerprint.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{CapturedValue, WorkItem};
    use std::fs;
    use tempfile::TempDir;

    fn fingerprint() -> Fingerprint {
        Fingerprint::from_hex("cd".repeat(32))
    }

    #[test]
    fn test_write_creates_entry() {
        let temp = TempDir::new().unwrap();
        let store = PlanStore::new(temp.path()).unwrap();
        let key = CacheKey::from_raw("plan-write");
        let graph = Graph::from_iter([WorkItem::new(":a", "DefaultTask")]);

        let handle = GraphSnapshotWriter::new(&store, &key)
            .write(&graph, &fingerprint())
            .unwrap();

        assert_eq!(handle.path, store.path_for(&key));
        assert_eq!(handle.size_bytes, fs::metadata(&handle.path).unwrap().len());
        assert!(store.exists(&key));
    }

    #[test]
    fn test_unsupported_value_keeps_previous_entry() {
        let temp = TempDir::new().unwrap();
        let store = PlanStore::new(temp.path()).unwrap();
        let key = CacheKey::from_raw("plan-keep");

        let good = Graph::from_iter([WorkItem::new(":a", "DefaultTask")]);
        let writer = GraphSnapshotWriter::new(&store, &key);
        writer.write(&good, &fingerprint()).unwrap();
        let before = store.get(&key).unwrap();

        let bad = Graph::from_iter([
            WorkItem::new(":a", "DefaultTask").input("project", CapturedValue::opaque("Project"))
        ]);
        let err = writer.write(&bad, &fingerprint()).unwrap_err();

        assert!(matches!(err, WriteError::UnsupportedValue { .. }));
        assert!(!err.is_store_failure());
        assert_eq!(store.get(&key).unwrap(), before);
    }

    #[test]
    fn test_invalid_graph_is_not_written() {
        let temp = TempDir::new().unwrap();
        let store = PlanStore::new(temp.path()).unwrap();
        let key = CacheKey::from_raw("plan-cycle");

        let graph = Graph::from_iter([
            WorkItem::new(":a", "DefaultTask").depends_on(":b"),
            WorkItem::new(":b", "DefaultTask").depends_on(":a"),
        ]);

        let err = GraphSnapshotWriter::new(&store, &key)
            .write(&graph, &fingerprint())
            .unwrap_err();

        assert!(matches!(err, WriteError::Graph(_)));
        assert!(err.to_string().starts_with("Cyclic dependency detected"));
        assert!(!store.exists(&key));
    }
}
