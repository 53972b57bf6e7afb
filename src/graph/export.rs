//! Graph export functionality.
//!
//! Renders the architecture graph for visualization and for downstream
//! tooling. Output is sorted by type name so repeated runs diff cleanly.

use crate::error::Result;
use crate::graph::types::{ArchitectureGraph, RelationEdge, TypeNode};
use crate::types::GraphFormat;
use serde::Serialize;

/// Export the architecture graph to the specified format.
///
/// # Supported Formats
///
/// - **DOT**: Graphviz DOT format, edge width scaled by frequency
/// - **JSON**: nodes with counts, edges with relation and frequency
/// - **Mermaid**: Mermaid flowchart for documentation
///
/// # Example
///
/// ```rust
/// use tenantgraph::graph::{export_graph, GraphBuilder};
/// use tenantgraph::types::{AggregatedRelationship, GraphFormat};
///
/// let built = GraphBuilder::build(&[AggregatedRelationship {
///     source_type: "sites".to_string(),
///     relation: "HOSTED_ON".to_string(),
///     target_type: "serverfarms".to_string(),
///     frequency: 2,
/// }])
/// .unwrap();
/// let dot = export_graph(&built.graph, GraphFormat::Dot).unwrap();
/// assert!(dot.contains("HOSTED_ON"));
/// ```
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn export_graph(graph: &ArchitectureGraph, format: GraphFormat) -> Result<String> {
    match format {
        GraphFormat::Dot => Ok(export_dot(graph)),
        GraphFormat::Json => export_json(graph),
        GraphFormat::Mermaid => Ok(export_mermaid(graph)),
    }
}

fn sorted_nodes(graph: &ArchitectureGraph) -> Vec<&TypeNode> {
    let mut nodes: Vec<&TypeNode> = graph.nodes().collect();
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    nodes
}

fn sorted_edges(graph: &ArchitectureGraph) -> Vec<(&TypeNode, &TypeNode, &RelationEdge)> {
    let mut edges: Vec<_> = graph.edges().collect();
    edges.sort_by(|a, b| {
        (&a.0.name, &a.1.name, &a.2.relation).cmp(&(&b.0.name, &b.1.name, &b.2.relation))
    });
    edges
}

/// Export to Graphviz DOT format.
fn export_dot(graph: &ArchitectureGraph) -> String {
    let mut dot = String::new();
    dot.push_str("digraph TenantGraph {\n");
    dot.push_str("    rankdir=LR;\n");
    dot.push_str("    node [shape=box, style=\"rounded,filled\", fillcolor=lightblue];\n");
    dot.push_str("    \n");

    for node in sorted_nodes(graph) {
        let node_id = escape_dot_id(&node.name);
        let label = escape_dot_string(&format!("{}\n{}", node.name, node.count));
        dot.push_str(&format!("    \"{node_id}\" [label=\"{label}\"];\n"));
    }
    dot.push('\n');

    let max_frequency = graph.edges().map(|(_, _, e)| e.frequency).max().unwrap_or(1).max(1);
    for (from, to, edge) in sorted_edges(graph) {
        let from_id = escape_dot_id(&from.name);
        let to_id = escape_dot_id(&to.name);
        let label = escape_dot_string(&edge.to_string());
        let width = 1.0 + 4.0 * (edge.frequency as f64 / max_frequency as f64);
        dot.push_str(&format!(
            "    \"{from_id}\" -> \"{to_id}\" [label=\"{label}\", penwidth={width:.1}];\n"
        ));
    }

    dot.push_str("}\n");
    dot
}

/// Export to JSON format.
fn export_json(graph: &ArchitectureGraph) -> Result<String> {
    #[derive(Serialize)]
    struct JsonGraph<'a> {
        nodes: Vec<&'a TypeNode>,
        edges: Vec<JsonEdge<'a>>,
        metadata: JsonMetadata,
    }

    #[derive(Serialize)]
    struct JsonEdge<'a> {
        from: &'a str,
        to: &'a str,
        relation: &'a str,
        frequency: u64,
    }

    #[derive(Serialize)]
    struct JsonMetadata {
        total_nodes: usize,
        total_edges: usize,
        total_frequency: u64,
    }

    let edges: Vec<JsonEdge<'_>> = sorted_edges(graph)
        .into_iter()
        .map(|(from, to, edge)| JsonEdge {
            from: &from.name,
            to: &to.name,
            relation: &edge.relation,
            frequency: edge.frequency,
        })
        .collect();

    let json_graph = JsonGraph {
        metadata: JsonMetadata {
            total_nodes: graph.node_count(),
            total_edges: edges.len(),
            total_frequency: edges.iter().map(|e| e.frequency).sum(),
        },
        nodes: sorted_nodes(graph),
        edges,
    };

    serde_json::to_string_pretty(&json_graph).map_err(|e| {
        crate::err!(ReportGeneration {
            message: format!("Failed to serialize graph to JSON: {e}"),
        })
    })
}

/// Export to Mermaid diagram format.
fn export_mermaid(graph: &ArchitectureGraph) -> String {
    let mut mermaid = String::new();
    mermaid.push_str("graph LR\n");
    mermaid.push_str("    %% TenantGraph architecture graph\n\n");

    for node in sorted_nodes(graph) {
        let id = sanitize_mermaid_id(&node.name);
        let label = escape_mermaid_string(&node.name);
        mermaid.push_str(&format!("    {id}[\"{label} ({})\"]\n", node.count));
    }

    mermaid.push('\n');

    for (from, to, edge) in sorted_edges(graph) {
        let from_id = sanitize_mermaid_id(&from.name);
        let to_id = sanitize_mermaid_id(&to.name);
        let label = escape_mermaid_string(&edge.to_string());
        mermaid.push_str(&format!("    {from_id} -->|\"{label}\"| {to_id}\n"));
    }

    mermaid
}

/// Escape a string for use in DOT labels.
fn escape_dot_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Escape a string for use as a DOT node ID.
fn escape_dot_id(s: &str) -> String {
    s.replace(['/', '.', '-', ':'], "_")
}

/// Sanitize a string for use as a Mermaid node ID.
fn sanitize_mermaid_id(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Escape a string for use in Mermaid labels.
fn escape_mermaid_string(s: &str) -> String {
    s.replace('"', "'").replace('\n', " ")
}
