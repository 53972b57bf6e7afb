//! Graph type definitions.
//!
//! - `ArchitectureGraph`: the type-level multigraph
//! - `TypeNode`: a canonical resource type with its occurrence count
//! - `RelationEdge`: one relation type between two resource types

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Directed multigraph over canonical resource types.
///
/// ```text
/// ArchitectureGraph
/// ├── inner: DiGraph<TypeNode, RelationEdge>   // parallel edges allowed
/// └── node_index: HashMap<String, NodeIndex>   // lookup by type name
/// ```
///
/// Between one ordered pair of types there is at most one edge per relation
/// type; different relation types stay separate edges.
#[derive(Debug, Clone, Default)]
pub struct ArchitectureGraph {
    inner: DiGraph<TypeNode, RelationEdge>,
    node_index: HashMap<String, NodeIndex>,
}

impl ArchitectureGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the node for `name`, creating it with a zero count.
    pub(crate) fn ensure_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(name) {
            return idx;
        }
        let idx = self.inner.add_node(TypeNode {
            name: name.to_string(),
            count: 0,
        });
        self.node_index.insert(name.to_string(), idx);
        idx
    }

    /// Add `occurrences` to a type's count.
    pub(crate) fn add_occurrences(&mut self, name: &str, occurrences: u64) {
        let idx = self.ensure_node(name);
        self.inner[idx].count += occurrences;
    }

    /// Add `frequency` to the `relation` edge from `source` to `target`.
    ///
    /// Creates the edge (and missing nodes) if needed.
    pub(crate) fn add_relation(&mut self, source: &str, relation: &str, target: &str, frequency: u64) -> EdgeIndex {
        let from = self.ensure_node(source);
        let to = self.ensure_node(target);

        let existing = self
            .inner
            .edges_connecting(from, to)
            .find(|e| e.weight().relation == relation)
            .map(|e| e.id());
        match existing {
            Some(edge) => {
                self.inner[edge].frequency += frequency;
                edge
            }
            None => self.inner.add_edge(
                from,
                to,
                RelationEdge {
                    relation: relation.to_string(),
                    frequency,
                },
            ),
        }
    }

    /// Get a node by type name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&TypeNode> {
        self.node_index.get(name).map(|&idx| &self.inner[idx])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.node_index.contains_key(name)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Number of edges, counting parallel edges separately.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.node_count() == 0
    }

    /// Types reachable over one outgoing edge, each listed once.
    #[must_use]
    pub fn successors(&self, name: &str) -> Vec<&TypeNode> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Types with an edge into `name`, each listed once.
    #[must_use]
    pub fn predecessors(&self, name: &str) -> Vec<&TypeNode> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&TypeNode> {
        let Some(&idx) = self.node_index.get(name) else {
            return Vec::new();
        };
        let unique: BTreeSet<NodeIndex> = self.inner.neighbors_directed(idx, direction).collect();
        unique.into_iter().map(|n| &self.inner[n]).collect()
    }

    /// All edges from `source` to `target`, one per relation type.
    #[must_use]
    pub fn edges_between(&self, source: &str, target: &str) -> Vec<&RelationEdge> {
        match (self.node_index.get(source), self.node_index.get(target)) {
            (Some(&from), Some(&to)) => self.inner.edges_connecting(from, to).map(|e| e.weight()).collect(),
            _ => Vec::new(),
        }
    }

    /// Outgoing edges of a type as `(target, edge)`.
    #[must_use]
    pub fn outgoing(&self, name: &str) -> Vec<(&TypeNode, &RelationEdge)> {
        let Some(&idx) = self.node_index.get(name) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (&self.inner[e.target()], e.weight()))
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TypeNode> {
        self.inner.node_weights()
    }

    /// All edges as `(source, target, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (&TypeNode, &TypeNode, &RelationEdge)> {
        self.inner.edge_references().map(|edge| {
            (
                &self.inner[edge.source()],
                &self.inner[edge.target()],
                edge.weight(),
            )
        })
    }

    /// Underlying petgraph graph for algorithms not wrapped here.
    #[must_use]
    pub fn inner(&self) -> &DiGraph<TypeNode, RelationEdge> {
        &self.inner
    }
}

/// A canonical resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeNode {
    /// Canonical type name, e.g. `virtualMachines`
    pub name: String,
    /// Cumulative occurrences over every relationship touching this type
    pub count: u64,
}

/// A relation type between two resource types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    /// Relation label, e.g. `USES_SUBNET`
    pub relation: String,
    /// Number of relationship instances behind this edge
    pub frequency: u64,
}

impl std::fmt::Display for RelationEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.relation, self.frequency)
    }
}
