//! Architecture Graph Module
//!
//! Relationship instances between concrete resources are collapsed into a
//! type-level view: which kinds of resources talk to which, over what
//! relation, and how often.
//!
//! ```text
//! ┌──────────────────┐  CONNECTED_TO (12)  ┌───────────────────┐
//! │ virtualMachines  │────────────────────▶│ networkInterfaces │
//! │       12         │                     │        28         │
//! └──────────────────┘                     └───────────────────┘
//!                                             │            │
//!                              USES_SUBNET(14)│            │SECURED_BY (2)
//!                                             ▼            ▼
//!                                          ┌───────────────────┐
//!                                          │      subnets      │
//!                                          │        16         │
//!                                          └───────────────────┘
//! ```
//!
//! The graph is a multigraph: `networkInterfaces → subnets` above carries
//! two edges, one per relation type.
//!
//! # Data Flow
//!
//! ```text
//! Resources ──▶ RelationshipExtractor ──▶ RelationshipInstance*
//!                                                │
//!                                                ▼
//!                                     RelationshipAggregator
//!                                                │
//!                                                ▼
//!                                 GraphBuilder ──▶ ArchitectureGraph
//!                                                │
//!                              ┌─────────────────┼──────────────┐
//!                              ▼                 ▼              ▼
//!                        pattern analysis    Exporter       Reporter
//! ```
//!
//! # Example
//!
//! ```rust
//! use tenantgraph::graph::{aggregate, GraphBuilder};
//! use tenantgraph::types::RelationshipInstance;
//!
//! let instance = |n: u32| RelationshipInstance {
//!     source_id: format!("/vm/{n}"),
//!     source_type: "virtualMachines".to_string(),
//!     relation: "CONNECTED_TO".to_string(),
//!     target_id: format!("/nic/{n}"),
//!     target_type: "networkInterfaces".to_string(),
//! };
//! let instances: Vec<_> = (0..3).map(instance).collect();
//!
//! let aggregated = aggregate(&instances);
//! assert_eq!(aggregated[0].frequency, 3);
//!
//! let built = GraphBuilder::build(&aggregated).unwrap();
//! assert_eq!(built.graph.successors("virtualMachines")[0].name, "networkInterfaces");
//! ```

mod aggregator;
mod builder;
mod export;
mod extract;
mod types;

pub use aggregator::{aggregate, RelationshipAggregator, SharedAggregator};
pub use builder::{BuiltGraph, EdgeCounts, GraphBuilder, NodeCounts};
pub use export::export_graph;
pub use extract::{Extraction, RelationshipExtractor};
pub use types::{ArchitectureGraph, RelationEdge, TypeNode};
