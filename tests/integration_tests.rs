//! Integration tests for TenantGraph.
//!
//! These tests run the full pipeline over a small hub-and-spoke tenant
//! snapshot, with in-process collaborators standing in for the graph store
//! and the cloud API, and drive the binary end to end in offline mode.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tenantgraph::cloud::CloudResourceClient;
use tenantgraph::store::InMemoryStore;
use tenantgraph::types::{id_key, FilterDescription, Resource, ResolutionState};
use tenantgraph::{Config, TenantGrapher};

/// Get the path to the test fixtures directory.
fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn snapshot() -> Vec<Resource> {
    tenantgraph::load_snapshot(fixtures_path().join("tenant.json")).unwrap()
}

fn find<'a>(resources: &'a [Resource], name: &str) -> &'a Resource {
    resources.iter().find(|r| r.name == name).unwrap()
}

/// Cloud API backed by the full snapshot.
struct SnapshotCloud {
    resources: HashMap<String, Resource>,
    calls: AtomicUsize,
}

impl SnapshotCloud {
    fn new(resources: &[Resource]) -> Self {
        Self {
            resources: resources.iter().map(|r| (r.id_key(), r.clone())).collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CloudResourceClient for SnapshotCloud {
    async fn fetch_by_id(&self, id: &str) -> tenantgraph::Result<Option<Resource>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.resources.get(&id_key(id)).cloned())
    }
}

fn spoke_filter() -> FilterDescription {
    FilterDescription {
        resource_groups: vec!["spoke-rg".to_string()],
        ..FilterDescription::default()
    }
}

mod snapshot_tests {
    use super::*;

    #[test]
    fn test_load_snapshot() {
        let resources = snapshot();
        assert_eq!(resources.len(), 13);

        let vm = find(&resources, "vm1");
        assert_eq!(vm.canonical_type(), "virtualMachines");
        assert_eq!(vm.resource_group.as_deref(), Some("spoke-rg"));
        assert_eq!(vm.tag("env"), Some("prod"));
    }

    #[test]
    fn test_filter_spoke() {
        let filtered = spoke_filter().apply(&snapshot());
        assert_eq!(filtered.len(), 7);
        assert!(filtered.iter().all(|r| r.resource_group.as_deref() == Some("spoke-rg")));
    }

    #[test]
    fn test_missing_snapshot() {
        assert!(tenantgraph::load_snapshot(fixtures_path().join("absent.json")).is_err());
    }
}

mod pipeline_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_spoke_scan_resolves_hub_dependencies() {
        let resources = snapshot();
        let filter = spoke_filter();
        let filtered = filter.apply(&resources);

        let subnet = find(&resources, "default").id.clone();
        let nsg = find(&resources, "hub-nsg").id.clone();

        // The hub subnet was written by an earlier scan; the NSG was not
        let store = Arc::new(InMemoryStore::with_ids([subnet.clone()]));
        let cloud = Arc::new(SnapshotCloud::new(&resources));

        let grapher = TenantGrapher::new(Config::default());
        let result = grapher
            .build(&filtered, &filter, Arc::clone(&store) as _, Arc::clone(&cloud) as _)
            .await
            .unwrap();

        assert!(!result.partial);
        assert_eq!(store.existence_queries(), 1);
        assert_eq!(cloud.calls.load(Ordering::SeqCst), 1);

        assert_eq!(result.records.len(), 2);
        let state_of = |id: &str| {
            result
                .records
                .iter()
                .find(|r| id_key(&r.target_id) == id_key(id))
                .map(|r| r.state.clone())
                .unwrap()
        };
        assert_eq!(state_of(&subnet), ResolutionState::FoundInStore);
        assert_eq!(state_of(&nsg), ResolutionState::FetchedFromSource);

        assert_eq!(result.discovered.len(), 1);
        assert_eq!(result.discovered[0].name, "hub-nsg");
        assert_eq!(result.dropped_relationships, 0);

        let graph = &result.graph;
        assert_eq!(graph.node_count(), 6);
        assert_eq!(graph.edge_count(), 5);
        assert_eq!(graph.edges_between("networkInterfaces", "subnets")[0].frequency, 2);
        assert_eq!(
            graph.edges_between("networkInterfaces", "networkSecurityGroups")[0].relation,
            "SECURED_BY"
        );
        assert_eq!(result.node_counts.get("networkInterfaces"), Some(&7));
        assert_eq!(result.node_counts.get("virtualMachines"), Some(&4));
        assert_eq!(
            result
                .edge_counts
                .get(&("networkInterfaces".to_string(), "publicIPAddresses".to_string())),
            Some(&1)
        );
    }

    #[tokio::test]
    async fn test_fetch_failures_leave_a_trace() {
        let resources = snapshot();
        let filter = spoke_filter();
        let filtered = filter.apply(&resources);

        // Neither the store nor the cloud knows the hub resources
        let cloud = Arc::new(SnapshotCloud::new(&filtered));
        let grapher = TenantGrapher::new(Config::default());
        let result = grapher
            .build(&filtered, &filter, Arc::new(InMemoryStore::new()), cloud)
            .await
            .unwrap();

        assert_eq!(result.unresolved_ids().len(), 2);
        assert!(result.discovered.is_empty());
        // two USES_SUBNET and two SECURED_BY instances have no typed target
        assert_eq!(result.dropped_relationships, 4);
        assert!(result.graph.edges_between("networkInterfaces", "subnets").is_empty());
    }

    #[test]
    fn test_full_snapshot_offline() {
        let resources = snapshot();
        let result = TenantGrapher::new(Config::default()).build_offline(&resources).unwrap();

        assert_eq!(result.dropped_relationships, 0);
        assert_eq!(result.graph.node_count(), 10);
        assert_eq!(result.graph.edge_count(), 10);

        // Both endpoints of the subnet/vnet pair are linked in each direction
        assert_eq!(result.graph.edges_between("subnets", "virtualNetworks")[0].relation, "PART_OF");
        assert_eq!(result.graph.edges_between("virtualNetworks", "subnets")[0].relation, "CONTAINS");
        assert_eq!(result.graph.successors("sites").len(), 2);
    }
}

mod reporter_tests {
    use super::*;
    use tenantgraph::graph::export_graph;
    use tenantgraph::types::{GraphFormat, ReportFormat};

    #[test]
    fn test_json_report() {
        let result = TenantGrapher::new(Config::default()).build_offline(&snapshot()).unwrap();
        let report = result.generate_report(ReportFormat::Json).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert!(parsed.get("metadata").is_some());
        assert_eq!(parsed["summary"]["total_types"], 10);
        assert_eq!(parsed["summary"]["partial"], false);
    }

    #[test]
    fn test_text_report() {
        let result = TenantGrapher::new(Config::default()).build_offline(&snapshot()).unwrap();
        let report = result.generate_report(ReportFormat::Text).unwrap();

        assert!(report.contains("TenantGraph Report"));
        assert!(report.contains("virtualMachines"));
    }

    #[test]
    fn test_graph_export_mermaid() {
        let result = TenantGrapher::new(Config::default()).build_offline(&snapshot()).unwrap();
        let mermaid = export_graph(&result.graph, GraphFormat::Mermaid).unwrap();

        assert!(mermaid.starts_with("graph LR"));
        assert!(mermaid.contains("sites -->|\"HOSTED_ON (1)\"| serverfarms"));
    }
}

mod cli_tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn tenantgraph(dir: &tempfile::TempDir) -> Command {
        let mut cmd = Command::cargo_bin("tenantgraph").unwrap();
        cmd.current_dir(dir.path()).env_remove("TENANTGRAPH_CONFIG").env_remove("RUST_LOG");
        cmd
    }

    #[test]
    fn test_build_offline_json_graph() {
        let dir = tempfile::tempdir().unwrap();
        tenantgraph(&dir)
            .args(["build", "--offline", "--format", "json", "-g", "app-rg"])
            .arg(fixtures_path().join("tenant.json"))
            .assert()
            .success()
            .stdout(predicate::str::contains("HOSTED_ON"))
            .stdout(predicate::str::contains("USES_IDENTITY"));
    }

    #[test]
    fn test_build_offline_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.json");
        tenantgraph(&dir)
            .args(["build", "--offline", "--report", "json", "--output"])
            .arg(&output)
            .arg(fixtures_path().join("tenant.json"))
            .assert()
            .success();

        let report: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(output).unwrap()).unwrap();
        assert_eq!(report["summary"]["total_types"], 10);
    }

    #[test]
    fn test_build_missing_snapshot_fails() {
        let dir = tempfile::tempdir().unwrap();
        tenantgraph(&dir)
            .args(["build", "--offline", "missing.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("missing.json"));
    }

    #[test]
    fn test_init_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        tenantgraph(&dir).arg("init").assert().success();
        assert!(dir.path().join("tenantgraph.yaml").exists());

        tenantgraph(&dir)
            .arg("validate")
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid"));

        // A second init must not overwrite
        tenantgraph(&dir).arg("init").assert().failure();
    }

    #[test]
    fn test_validate_rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "collector:\n  max_concurrent_fetches: 0\n").unwrap();
        tenantgraph(&dir).args(["validate", "bad.yaml"]).assert().failure();
    }
}

mod config_tests {
    use super::*;

    #[test]
    fn test_example_config_round_trips() {
        let config = Config::from_yaml(&Config::example_yaml()).unwrap();
        assert_eq!(config.collector.max_concurrent_fetches, 8);
        assert_eq!(config.collector.max_depth, 1);
        assert!(config.collector.deadline_secs.is_none());
    }
}
