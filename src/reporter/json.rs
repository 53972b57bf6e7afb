//! JSON report generator.

use crate::config::Config;
use crate::error::Result;
use crate::reporter::ReportGenerator;
use crate::types::{AggregatedRelationship, GraphResult, MissingDependencyRecord, ResolutionState};
use serde::Serialize;
use std::collections::BTreeMap;

/// JSON report generator.
pub struct JsonReporter {
    /// Whether to pretty-print the output
    pretty: bool,
}

impl JsonReporter {
    /// Create a new JSON reporter.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            pretty: config.output.pretty,
        }
    }
}

impl ReportGenerator for JsonReporter {
    fn generate(&self, result: &GraphResult) -> Result<String> {
        let report = JsonReport::from(result);

        let json = if self.pretty {
            serde_json::to_string_pretty(&report)
        } else {
            serde_json::to_string(&report)
        };

        json.map_err(|e| crate::err!(ReportGeneration {
            message: format!("Failed to serialize JSON report: {e}"),
        }))
    }
}

/// JSON report structure.
#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    pub metadata: ReportMetadata,
    pub summary: ReportSummary,
    /// Occurrence count per canonical type
    pub node_counts: &'a BTreeMap<String, u64>,
    pub relationships: &'a [AggregatedRelationship],
    /// Missing dependencies and how each was resolved
    pub dependencies: Vec<JsonDependency<'a>>,
}

impl<'a> From<&'a GraphResult> for JsonReport<'a> {
    fn from(result: &'a GraphResult) -> Self {
        let mut by_state: BTreeMap<&'static str, usize> = BTreeMap::new();
        for record in &result.records {
            *by_state.entry(state_name(&record.state)).or_default() += 1;
        }

        Self {
            metadata: ReportMetadata {
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            },
            summary: ReportSummary {
                total_types: result.node_counts.len(),
                total_relationships: result.relationships.len(),
                total_edges: result.graph.edge_count(),
                discovered_resources: result.discovered.len(),
                dropped_relationships: result.dropped_relationships,
                dependencies_by_state: by_state,
                partial: result.partial,
            },
            node_counts: &result.node_counts,
            relationships: &result.relationships,
            dependencies: result.records.iter().map(JsonDependency::from).collect(),
        }
    }
}

/// Report metadata.
#[derive(Debug, Serialize)]
pub struct ReportMetadata {
    /// TenantGraph version
    pub version: String,
    /// Report generation timestamp
    pub timestamp: String,
}

/// Report summary.
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub total_types: usize,
    pub total_relationships: usize,
    /// Edges in the multigraph, parallel edges counted separately
    pub total_edges: usize,
    pub discovered_resources: usize,
    pub dropped_relationships: usize,
    pub dependencies_by_state: BTreeMap<&'static str, usize>,
    /// Collection was cut short
    pub partial: bool,
}

/// One missing dependency in the report.
#[derive(Debug, Serialize)]
pub struct JsonDependency<'a> {
    pub id: &'a str,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
    pub referenced_by: &'a [String],
}

impl<'a> From<&'a MissingDependencyRecord> for JsonDependency<'a> {
    fn from(record: &'a MissingDependencyRecord) -> Self {
        let reason = match &record.state {
            ResolutionState::Unresolved { reason } => Some(reason.as_str()),
            _ => None,
        };
        Self {
            id: &record.target_id,
            state: state_name(&record.state),
            reason,
            referenced_by: &record.referenced_by,
        }
    }
}

pub(crate) fn state_name(state: &ResolutionState) -> &'static str {
    match state {
        ResolutionState::Pending => "pending",
        ResolutionState::FoundInStore => "found_in_store",
        ResolutionState::FetchedFromSource => "fetched_from_source",
        ResolutionState::Unresolved { .. } => "unresolved",
    }
}
