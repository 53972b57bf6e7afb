//! Graph store collaborators.
//!
//! The relationship engine reads from the graph store once per collection
//! call (a batched existence check) and writes edges through rules.
//!
//! - [`GraphStoreReader`]: `existing_ids` answers which identifiers the
//!   store already holds, in one round trip.
//! - [`GraphStoreWriter`]: persists one `(source)-[relation]->(target)` edge.
//!
//! Two implementations ship with the crate: [`Neo4jHttpStore`] talks to the
//! Neo4j HTTP transactional endpoint and [`InMemoryStore`] backs offline
//! runs and tests.

mod memory;
mod neo4j;

pub use memory::InMemoryStore;
pub use neo4j::Neo4jHttpStore;

use crate::error::Result;
use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Read side of the graph store.
#[async_trait]
pub trait GraphStoreReader: Send + Sync {
    /// Return the subset of `ids` that exist in the store.
    ///
    /// Implementations must answer with a single batched query. Returned
    /// identifiers may differ in case from the requested ones.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the caller: it cannot know which identifiers
    /// are missing.
    async fn existing_ids(&self, ids: &BTreeSet<String>) -> Result<BTreeSet<String>>;
}

/// Write side of the graph store.
#[async_trait]
pub trait GraphStoreWriter: Send + Sync {
    /// Persist a directed edge between two resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the relation label is invalid or the write fails.
    async fn write_edge(&self, source_id: &str, relation: &str, target_id: &str) -> Result<()>;
}

static RELATION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("Invalid regex"));

/// Relation labels end up as relationship types in queries and cannot be
/// parameterized, so they are restricted to upper snake case.
///
/// # Errors
///
/// Returns `InvalidRelation` for anything else.
pub fn validate_relation(relation: &str) -> Result<()> {
    if RELATION_LABEL.is_match(relation) {
        Ok(())
    } else {
        Err(crate::err!(InvalidRelation { relation: relation.to_string() }))
    }
}
