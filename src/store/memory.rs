//! In-memory graph store.

use super::{validate_relation, GraphStoreReader, GraphStoreWriter};
use crate::error::Result;
use crate::types::id_key;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A store holding identifiers and edges in process memory.
///
/// Counts existence queries so callers can verify batching.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// key -> original spelling
    nodes: Mutex<HashMap<String, String>>,
    edges: Mutex<Vec<(String, String, String)>>,
    existence_queries: AtomicUsize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds the given identifiers.
    #[must_use]
    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for id in ids {
            store.insert(id);
        }
        store
    }

    pub fn insert(&self, id: impl Into<String>) {
        let id = id.into();
        if let Ok(mut nodes) = self.nodes.lock() {
            nodes.insert(id_key(&id), id);
        }
    }

    /// Number of `existing_ids` calls served so far.
    #[must_use]
    pub fn existence_queries(&self) -> usize {
        self.existence_queries.load(Ordering::SeqCst)
    }

    /// Snapshot of written edges as `(source, relation, target)`.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String, String)> {
        self.edges.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GraphStoreReader for InMemoryStore {
    async fn existing_ids(&self, ids: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        self.existence_queries.fetch_add(1, Ordering::SeqCst);
        let nodes = self
            .nodes
            .lock()
            .map_err(|e| crate::error::TenantGraphError::internal(e.to_string(), file!(), line!()))?;
        Ok(ids
            .iter()
            .filter_map(|id| nodes.get(&id_key(id)).cloned())
            .collect())
    }
}

#[async_trait]
impl GraphStoreWriter for InMemoryStore {
    async fn write_edge(&self, source_id: &str, relation: &str, target_id: &str) -> Result<()> {
        validate_relation(relation)?;
        let mut edges = self
            .edges
            .lock()
            .map_err(|e| crate::error::TenantGraphError::internal(e.to_string(), file!(), line!()))?;
        let edge = (source_id.to_string(), relation.to_string(), target_id.to_string());
        if !edges.contains(&edge) {
            edges.push(edge);
        }
        Ok(())
    }
}
