//! # TenantGraph
//!
//! Dependency-aware architecture graphs for filtered cloud tenant scans.
//!
//! A scan narrowed to a resource group or a handful of types routinely
//! references resources outside that filter: the hub subnet a spoke VM's
//! NIC attaches to, the shared Log Analytics workspace every diagnostic
//! setting points at. TenantGraph finds those references, asks the graph
//! store which of them are already known, fetches the rest from the cloud
//! API, and collapses the resulting relationships into a type-level
//! multigraph.
//!
//! ## Pipeline
//!
//! ```text
//! filtered resources
//!        │
//!        ▼
//! DependencyCollector ── store.existing_ids(batch) ── cloud.fetch_by_id(..)*
//!        │
//!        ▼
//! working set ──▶ RelationshipExtractor ──▶ RelationshipAggregator ──▶ GraphBuilder
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenantgraph::cloud::ArmClient;
//! use tenantgraph::store::Neo4jHttpStore;
//! use tenantgraph::types::{FilterDescription, ReportFormat};
//! use tenantgraph::{Config, TenantGrapher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let resources = tenantgraph::load_snapshot("resources.json")?;
//!     let filter = FilterDescription {
//!         resource_groups: vec!["spoke-rg".to_string()],
//!         ..FilterDescription::default()
//!     };
//!     let filtered = filter.apply(&resources);
//!
//!     let timeout = config.collector.retry_policy().attempt_timeout;
//!     let store = Arc::new(Neo4jHttpStore::new(&config.neo4j, config.collector.store_timeout())?);
//!     let cloud = Arc::new(ArmClient::new(&config.azure, timeout)?);
//!
//!     let grapher = TenantGrapher::new(config);
//!     let result = grapher.build(&filtered, &filter, store, cloud).await?;
//!
//!     println!("{}", result.generate_report(ReportFormat::Text)?);
//!     Ok(())
//! }
//! ```

#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod cli;
pub mod cloud;
pub mod collector;
pub mod config;
pub mod error;
pub mod graph;
pub mod normalizer;
pub mod reporter;
pub mod rules;
pub mod store;
pub mod types;

// Re-export commonly used types at crate root
pub use collector::{CollectionOutcome, DependencyCollector, ResolutionCache};
pub use config::Config;
pub use error::{Result, TenantGraphError};
pub use rules::{RelationshipRule, RuleRegistry};
pub use types::{
    FilterDescription, GraphFormat, GraphResult, MissingDependencyRecord, ReportFormat, Resource,
    ResolutionState,
};

use cloud::CloudResourceClient;
use graph::{GraphBuilder, RelationshipExtractor};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use store::GraphStoreReader;
use tokio_util::sync::CancellationToken;

/// Pipeline orchestrator: collect, merge, extract, aggregate, build.
///
/// Holds the configuration and the rule registry; the store and cloud
/// collaborators are passed per call so one grapher can serve several
/// tenants.
#[derive(Debug, Clone)]
pub struct TenantGrapher {
    config: Config,
    rules: Arc<RuleRegistry>,
}

impl TenantGrapher {
    /// Create a grapher with the built-in rules.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_rules(config, RuleRegistry::builtin())
    }

    /// Create a grapher with a custom rule registry.
    #[must_use]
    pub fn with_rules(config: Config, rules: RuleRegistry) -> Self {
        Self {
            config,
            rules: Arc::new(rules),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    /// A collector wired to the given collaborators and this grapher's rules.
    #[must_use]
    pub fn collector(
        &self,
        store: Arc<dyn GraphStoreReader>,
        cloud: Arc<dyn CloudResourceClient>,
    ) -> DependencyCollector {
        DependencyCollector::new(store, cloud, Arc::clone(&self.rules), self.config.collector.clone())
    }

    /// Resolve the filtered set's dependencies and build the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph store existence check fails or the
    /// graph cannot be built. Individual fetch failures only show up as
    /// unresolved records.
    pub async fn build(
        &self,
        filtered: &[Resource],
        filter: &FilterDescription,
        store: Arc<dyn GraphStoreReader>,
        cloud: Arc<dyn CloudResourceClient>,
    ) -> Result<GraphResult> {
        self.build_with(filtered, filter, store, cloud, &CancellationToken::new(), None)
            .await
    }

    /// Like [`build`](Self::build), with cancellation and a resolution cache.
    ///
    /// A cancelled or timed-out collection still produces a graph, built
    /// from whatever was resolved, with `partial` set.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub async fn build_with(
        &self,
        filtered: &[Resource],
        filter: &FilterDescription,
        store: Arc<dyn GraphStoreReader>,
        cloud: Arc<dyn CloudResourceClient>,
        cancel: &CancellationToken,
        cache: Option<&mut ResolutionCache>,
    ) -> Result<GraphResult> {
        let outcome = self
            .collector(store, cloud)
            .collect_with(filtered, filter, cancel, cache)
            .await?;
        self.assemble(filtered, outcome)
    }

    /// Build the graph from the filtered set alone.
    ///
    /// References leaving the filter cannot be typed and are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be built.
    pub fn build_offline(&self, filtered: &[Resource]) -> Result<GraphResult> {
        tracing::info!(resources = filtered.len(), "Building graph without dependency collection");
        self.assemble(filtered, CollectionOutcome::default())
    }

    fn assemble(&self, filtered: &[Resource], outcome: CollectionOutcome) -> Result<GraphResult> {
        let working_set = merge_working_set(filtered, &outcome.resources);
        let extractor = RelationshipExtractor::new(&self.rules, &working_set, &outcome.records);
        let (aggregator, dropped_relationships) = extractor.aggregate_parallel(&working_set);

        let relationships = aggregator.finish();
        let (graph, node_counts, edge_counts) = GraphBuilder::build(&relationships)?.into_parts();

        tracing::info!(
            working_set = working_set.len(),
            discovered = outcome.resources.len(),
            types = graph.node_count(),
            edges = graph.edge_count(),
            dropped = dropped_relationships,
            partial = outcome.partial,
            "Architecture graph built"
        );

        Ok(GraphResult {
            graph,
            node_counts,
            edge_counts,
            relationships,
            discovered: outcome.resources,
            records: outcome.records,
            dropped_relationships,
            partial: outcome.partial,
        })
    }
}

/// Filtered resources followed by discovered ones, without duplicate ids.
fn merge_working_set(filtered: &[Resource], discovered: &[Resource]) -> Vec<Resource> {
    let mut seen = HashSet::new();
    filtered
        .iter()
        .chain(discovered)
        .filter(|r| seen.insert(r.id_key()))
        .cloned()
        .collect()
}

/// Load a resource snapshot from disk.
///
/// The file holds either a JSON array of cloud resource documents or a
/// list response of the form `{"value": [...]}`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a snapshot.
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Vec<Resource>> {
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).map_err(|e| TenantGraphError::io(path, e, file!(), line!()))?;
    parse_snapshot(&content, path)
}

/// Parse snapshot content; `path` is only used for error context.
///
/// Documents without an `id` are skipped with a warning.
///
/// # Errors
///
/// Returns an error if the content is not JSON or has no resource list.
pub fn parse_snapshot(content: &str, path: &Path) -> Result<Vec<Resource>> {
    let snapshot_error = |detail: String| {
        crate::err!(Snapshot {
            path: path.to_path_buf(),
            message: detail,
        })
    };

    let value: Value = serde_json::from_str(content).map_err(|e| snapshot_error(e.to_string()))?;
    let documents = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("value") {
            Some(Value::Array(items)) => items,
            _ => return Err(snapshot_error("expected a 'value' array".to_string())),
        },
        _ => return Err(snapshot_error("expected an array of resources".to_string())),
    };

    let total = documents.len();
    let resources: Vec<Resource> = documents.into_iter().filter_map(Resource::from_arm).collect();
    if resources.len() < total {
        tracing::warn!(
            path = %path.display(),
            skipped = total - resources.len(),
            "Skipping snapshot entries without an id"
        );
    }
    tracing::debug!(path = %path.display(), resources = resources.len(), "Snapshot loaded");
    Ok(resources)
}
