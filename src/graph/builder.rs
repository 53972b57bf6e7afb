//! Graph builder implementation.
//!
//! Turns aggregated relationships into an [`ArchitectureGraph`] plus the
//! node and edge count summaries used for reporting.

use crate::error::Result;
use crate::graph::types::ArchitectureGraph;
use crate::types::AggregatedRelationship;
use std::collections::BTreeMap;

/// Cumulative occurrence count per canonical type.
pub type NodeCounts = BTreeMap<String, u64>;

/// Cumulative frequency per ordered `(source, target)` type pair, summed
/// over every relation type between them.
pub type EdgeCounts = BTreeMap<(String, String), u64>;

/// Output of [`GraphBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct BuiltGraph {
    pub graph: ArchitectureGraph,
    pub node_counts: NodeCounts,
    pub edge_counts: EdgeCounts,
}

impl BuiltGraph {
    #[must_use]
    pub fn into_parts(self) -> (ArchitectureGraph, NodeCounts, EdgeCounts) {
        (self.graph, self.node_counts, self.edge_counts)
    }
}

/// Builder for type-level architecture graphs.
///
/// # Algorithm
///
/// For every aggregated relationship `(S, R, T, f)`:
///
/// 1. Add `f` to the occurrence count of `S` and of `T`. A self-relation
///    (`S == T`) adds `f` twice.
/// 2. Add `f` to the `R` edge from `S` to `T`, creating it if absent. Edges
///    with a different relation type between the same pair are separate.
/// 3. Add `f` to the `(S, T)` pair count.
///
/// # Example
///
/// ```rust
/// use tenantgraph::graph::GraphBuilder;
/// use tenantgraph::types::AggregatedRelationship;
///
/// let aggregated = vec![AggregatedRelationship {
///     source_type: "virtualMachines".to_string(),
///     relation: "USES_SUBNET".to_string(),
///     target_type: "subnets".to_string(),
///     frequency: 3,
/// }];
///
/// let built = GraphBuilder::build(&aggregated).unwrap();
/// assert_eq!(built.graph.node_count(), 2);
/// assert_eq!(built.node_counts["subnets"], 3);
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    built: BuiltGraph,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a complete aggregation.
    ///
    /// # Errors
    ///
    /// Returns `GraphBuild` if a relationship has a zero frequency or an
    /// empty type or relation.
    pub fn build(aggregated: &[AggregatedRelationship]) -> Result<BuiltGraph> {
        tracing::debug!(relationships = aggregated.len(), "Starting graph construction");
        let mut builder = Self::new();
        for relationship in aggregated {
            builder.add(relationship)?;
        }
        let built = builder.finish();
        tracing::debug!(
            nodes = built.graph.node_count(),
            edges = built.graph.edge_count(),
            "Graph construction complete"
        );
        Ok(built)
    }

    /// Fold one aggregated relationship into the graph.
    ///
    /// # Errors
    ///
    /// Returns `GraphBuild` for a malformed relationship.
    pub fn add(&mut self, relationship: &AggregatedRelationship) -> Result<()> {
        if relationship.frequency == 0 {
            return Err(crate::err!(GraphBuild {
                message: format!("relationship {} has zero frequency", relationship.key()),
            }));
        }
        if relationship.source_type.is_empty()
            || relationship.target_type.is_empty()
            || relationship.relation.is_empty()
        {
            return Err(crate::err!(GraphBuild {
                message: format!("relationship {} has an empty component", relationship.key()),
            }));
        }

        let AggregatedRelationship { source_type, relation, target_type, frequency } = relationship;
        let built = &mut self.built;

        built.graph.add_occurrences(source_type, *frequency);
        built.graph.add_occurrences(target_type, *frequency);
        *built.node_counts.entry(source_type.clone()).or_default() += frequency;
        *built.node_counts.entry(target_type.clone()).or_default() += frequency;

        built.graph.add_relation(source_type, relation, target_type, *frequency);
        *built
            .edge_counts
            .entry((source_type.clone(), target_type.clone()))
            .or_default() += frequency;
        Ok(())
    }

    #[must_use]
    pub fn finish(self) -> BuiltGraph {
        self.built
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rel(source: &str, relation: &str, target: &str, frequency: u64) -> AggregatedRelationship {
        AggregatedRelationship {
            source_type: source.to_string(),
            relation: relation.to_string(),
            target_type: target.to_string(),
            frequency,
        }
    }

    #[test]
    fn test_node_per_distinct_type() {
        let built = GraphBuilder::build(&[
            rel("virtualMachines", "CONNECTED_TO", "networkInterfaces", 4),
            rel("networkInterfaces", "USES_SUBNET", "subnets", 4),
            rel("subnets", "PART_OF", "virtualNetworks", 2),
        ])
        .unwrap();

        assert_eq!(built.graph.node_count(), 4);
        assert_eq!(built.graph.edge_count(), 3);
        assert_eq!(built.node_counts["networkInterfaces"], 8);
        assert_eq!(built.node_counts["virtualMachines"], 4);
        assert_eq!(built.graph.node("subnets").unwrap().count, 6);
    }

    #[test]
    fn test_parallel_relations_are_distinct_edges() {
        let built = GraphBuilder::build(&[
            rel("networkInterfaces", "USES_SUBNET", "subnets", 3),
            rel("networkInterfaces", "SECURED_BY", "subnets", 1),
        ])
        .unwrap();

        assert_eq!(built.graph.node_count(), 2);
        assert_eq!(built.graph.edge_count(), 2);
        assert_eq!(
            built.edge_counts[&("networkInterfaces".to_string(), "subnets".to_string())],
            4
        );
    }

    #[test]
    fn test_self_relation_counts_both_endpoints() {
        let built = GraphBuilder::build(&[rel("subnets", "PEERS_WITH", "subnets", 2)]).unwrap();
        assert_eq!(built.graph.node_count(), 1);
        assert_eq!(built.node_counts["subnets"], 4);
    }

    #[test]
    fn test_empty_input() {
        let (graph, nodes, edges) = GraphBuilder::build(&[]).unwrap().into_parts();
        assert!(graph.is_empty());
        assert!(nodes.is_empty());
        assert!(edges.is_empty());
    }

    #[test]
    fn test_rejects_zero_frequency() {
        assert!(GraphBuilder::build(&[rel("a", "R", "b", 0)]).is_err());
        assert!(GraphBuilder::build(&[rel("", "R", "b", 1)]).is_err());
    }
}
