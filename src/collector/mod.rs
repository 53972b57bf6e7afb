//! Dependency collection for filtered scans.
//!
//! A filtered scan only discovers part of a tenant. Resources inside the
//! filter reference resources outside it (a VM in a spoke resource group
//! attached to a subnet in the hub), and without those targets the graph
//! loses edges. The collector closes that gap:
//!
//! 1. Apply every rule to the filtered resources and gather the referenced
//!    identifiers that are not in the filtered set.
//! 2. Ask the graph store which of them it already holds, in one batched
//!    query bounded by a timeout.
//! 3. Fetch the rest from the cloud API with bounded concurrency, retrying
//!    transient failures with exponential backoff.
//!
//! Each missing identifier is fetched at most once per call and ends in
//! exactly one terminal state. Collection can be cancelled or given a
//! deadline; either way the caller gets back whatever was collected, with
//! the untouched identifiers left `Pending`.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tenantgraph::collector::DependencyCollector;
//! use tenantgraph::cloud::ArmClient;
//! use tenantgraph::rules::RuleRegistry;
//! use tenantgraph::store::Neo4jHttpStore;
//! use tenantgraph::types::FilterDescription;
//! use tenantgraph::Config;
//!
//! # async fn example(resources: Vec<tenantgraph::types::Resource>) -> tenantgraph::Result<()> {
//! let config = Config::default();
//! let store = Neo4jHttpStore::new(&config.neo4j, config.collector.store_timeout())?;
//! let cloud = ArmClient::new(&config.azure, config.collector.retry_policy().attempt_timeout)?;
//!
//! let collector = DependencyCollector::new(
//!     Arc::new(store),
//!     Arc::new(cloud),
//!     Arc::new(RuleRegistry::builtin()),
//!     config.collector.clone(),
//! );
//! let outcome = collector
//!     .collect_missing_dependencies(&resources, &FilterDescription::default())
//!     .await?;
//! println!("fetched {} resources", outcome.resources.len());
//! # Ok(())
//! # }
//! ```

mod retry;

pub use retry::RetryPolicy;

use crate::cloud::CloudResourceClient;
use crate::config::CollectorOptions;
use crate::error::{Result, TenantGraphError};
use crate::rules::RuleRegistry;
use crate::store::GraphStoreReader;
use crate::types::{
    id_key, FilterDescription, MissingDependencyRecord, Resource, ResourceId, ResolutionState,
};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// What a collection call produced.
#[derive(Debug, Clone, Default)]
pub struct CollectionOutcome {
    /// Resources fetched from the cloud API, not yet in the store
    pub resources: Vec<Resource>,
    /// One record per missing identifier, in discovery order
    pub records: Vec<MissingDependencyRecord>,
    /// Cancellation or the deadline cut collection short
    pub partial: bool,
}

impl CollectionOutcome {
    /// Records in the given state.
    pub fn records_in<'a>(&'a self, state: &'a ResolutionState) -> impl Iterator<Item = &'a MissingDependencyRecord> + 'a {
        self.records.iter().filter(move |r| &r.state == state)
    }

    /// Number of identifiers the store already held.
    #[must_use]
    pub fn found_in_store(&self) -> usize {
        self.records_in(&ResolutionState::FoundInStore).count()
    }

    /// Number of identifiers that were abandoned.
    #[must_use]
    pub fn unresolved(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.state, ResolutionState::Unresolved { .. }))
            .count()
    }
}

/// Resolution results that outlive a single collection call.
///
/// Owned by the caller and passed in explicitly; repeated scans of the same
/// tenant skip identifiers already confirmed or fetched.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    in_store: HashSet<String>,
    fetched: HashMap<String, Resource>,
    not_found: HashSet<String>,
}

impl ResolutionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.in_store.len() + self.fetched.len() + self.not_found.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.in_store.clear();
        self.fetched.clear();
        self.not_found.clear();
    }

    fn lookup(&self, key: &str) -> Option<(ResolutionState, Option<Resource>)> {
        if self.in_store.contains(key) {
            return Some((ResolutionState::FoundInStore, None));
        }
        if let Some(resource) = self.fetched.get(key) {
            return Some((ResolutionState::FetchedFromSource, Some(resource.clone())));
        }
        self.not_found.contains(key).then(|| {
            (
                ResolutionState::Unresolved { reason: "not found (cached)".to_string() },
                None,
            )
        })
    }
}

/// A referenced identifier outside the known set.
#[derive(Debug, Clone)]
struct Candidate {
    target_id: String,
    referenced_by: Vec<String>,
}

enum FetchOutcome {
    Fetched(Resource),
    NotFound,
    Failed(TenantGraphError),
}

/// Finds, confirms and fetches resources referenced from outside a filter.
pub struct DependencyCollector {
    store: Arc<dyn GraphStoreReader>,
    cloud: Arc<dyn CloudResourceClient>,
    rules: Arc<RuleRegistry>,
    options: CollectorOptions,
}

impl std::fmt::Debug for DependencyCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCollector")
            .field("rules", &self.rules)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DependencyCollector {
    pub fn new(
        store: Arc<dyn GraphStoreReader>,
        cloud: Arc<dyn CloudResourceClient>,
        rules: Arc<RuleRegistry>,
        options: CollectorOptions,
    ) -> Self {
        Self { store, cloud, rules, options }
    }

    #[must_use]
    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    /// Collect the resources referenced by `filtered` but absent from it.
    ///
    /// # Errors
    ///
    /// Fails only when the graph store existence check fails or times out.
    /// Individual fetch failures are recorded as `Unresolved`.
    pub async fn collect_missing_dependencies(
        &self,
        filtered: &[Resource],
        filter: &FilterDescription,
    ) -> Result<CollectionOutcome> {
        self.collect_with(filtered, filter, &CancellationToken::new(), None)
            .await
    }

    /// Like [`collect_missing_dependencies`](Self::collect_missing_dependencies),
    /// with a cancellation token and an optional cross-call cache.
    ///
    /// # Errors
    ///
    /// Fails only when the graph store existence check fails or times out.
    pub async fn collect_with(
        &self,
        filtered: &[Resource],
        filter: &FilterDescription,
        cancel: &CancellationToken,
        mut cache: Option<&mut ResolutionCache>,
    ) -> Result<CollectionOutcome> {
        let deadline = self.options.deadline().map(|d| Instant::now() + d);
        let mut known: HashSet<String> = filtered.iter().map(Resource::id_key).collect();
        let mut outcome = CollectionOutcome::default();

        tracing::info!(
            filter = %filter,
            resources = filtered.len(),
            max_depth = self.options.max_depth,
            "Collecting missing dependencies"
        );

        let mut frontier_start = 0;
        for depth in 1..=self.options.max_depth {
            let frontier: &[Resource] = if depth == 1 {
                filtered
            } else {
                &outcome.resources[frontier_start..]
            };
            let candidates = self.find_candidates(frontier, &known);
            frontier_start = outcome.resources.len();
            if candidates.is_empty() {
                break;
            }
            tracing::debug!(depth, candidates = candidates.len(), "Missing identifiers found");

            let mut unconfirmed = BTreeMap::new();
            for (key, candidate) in candidates {
                known.insert(key.clone());
                match cache.as_deref().and_then(|c| c.lookup(&key)) {
                    Some((state, resource)) => {
                        if let Some(resource) = &resource {
                            outcome.resources.push(resource.clone());
                        }
                        outcome.records.push(MissingDependencyRecord {
                            target_id: candidate.target_id,
                            referenced_by: candidate.referenced_by,
                            state,
                            resource,
                        });
                    }
                    None => {
                        unconfirmed.insert(key, candidate);
                    }
                }
            }

            if cancel.is_cancelled() || deadline.is_some_and(|d| Instant::now() >= d) {
                outcome.records.extend(
                    unconfirmed
                        .into_values()
                        .map(|c| MissingDependencyRecord::pending(c.target_id, c.referenced_by)),
                );
                outcome.partial = true;
                break;
            }

            let missing = self.confirm_with_store(unconfirmed, &mut outcome, cache.as_deref_mut()).await?;
            if missing.is_empty() {
                continue;
            }

            let interrupted = self
                .fetch_missing(missing, &mut outcome, cancel, deadline, cache.as_deref_mut())
                .await;
            if interrupted {
                outcome.partial = true;
                break;
            }
        }

        tracing::info!(
            fetched = outcome.resources.len(),
            found_in_store = outcome.found_in_store(),
            unresolved = outcome.unresolved(),
            partial = outcome.partial,
            "Dependency collection complete"
        );
        Ok(outcome)
    }

    /// Referenced identifiers not in `known`, keyed case-insensitively.
    fn find_candidates(&self, resources: &[Resource], known: &HashSet<String>) -> BTreeMap<String, Candidate> {
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
        for resource in resources {
            for target_id in self.rules.extract_target_ids(resource) {
                let key = id_key(&target_id);
                if known.contains(&key) {
                    continue;
                }
                if ResourceId::parse(&target_id).is_err() {
                    tracing::debug!(
                        source_id = %resource.id,
                        target_id = %target_id,
                        "Ignoring malformed reference"
                    );
                    continue;
                }
                let candidate = candidates.entry(key).or_insert_with(|| Candidate {
                    target_id,
                    referenced_by: Vec::new(),
                });
                if !candidate.referenced_by.contains(&resource.id) {
                    candidate.referenced_by.push(resource.id.clone());
                }
            }
        }
        candidates
    }

    /// Run the batched existence check and return what the store lacks.
    async fn confirm_with_store(
        &self,
        unconfirmed: BTreeMap<String, Candidate>,
        outcome: &mut CollectionOutcome,
        mut cache: Option<&mut ResolutionCache>,
    ) -> Result<Vec<Candidate>> {
        if unconfirmed.is_empty() {
            return Ok(Vec::new());
        }

        let ids: BTreeSet<String> = unconfirmed.values().map(|c| c.target_id.clone()).collect();
        let timeout = self.options.store_timeout();
        let existing = match tokio::time::timeout(timeout, self.store.existing_ids(&ids)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(crate::err!(StoreTimeout {
                    timeout_secs: timeout.as_secs(),
                    id_count: ids.len(),
                }))
            }
        };
        let existing: HashSet<String> = existing.iter().map(|id| id_key(id)).collect();
        tracing::debug!(queried = ids.len(), existing = existing.len(), "Graph store existence check");

        let mut missing = Vec::new();
        for (key, candidate) in unconfirmed {
            if existing.contains(&key) {
                if let Some(cache) = cache.as_deref_mut() {
                    cache.in_store.insert(key);
                }
                outcome.records.push(MissingDependencyRecord {
                    target_id: candidate.target_id,
                    referenced_by: candidate.referenced_by,
                    state: ResolutionState::FoundInStore,
                    resource: None,
                });
            } else {
                missing.push(candidate);
            }
        }
        Ok(missing)
    }

    /// Fetch candidates with bounded concurrency.
    ///
    /// Returns `true` when cancellation or the deadline interrupted the
    /// batch; candidates that did not finish are recorded as `Pending`.
    async fn fetch_missing(
        &self,
        missing: Vec<Candidate>,
        outcome: &mut CollectionOutcome,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
        mut cache: Option<&mut ResolutionCache>,
    ) -> bool {
        let policy = self.options.retry_policy();
        let concurrency = self.options.max_concurrent_fetches.max(1);
        tracing::info!(count = missing.len(), concurrency, "Fetching missing resources");

        let mut pending: BTreeMap<String, Candidate> = missing
            .into_iter()
            .map(|c| (id_key(&c.target_id), c))
            .collect();
        let jobs: Vec<(String, String)> = pending
            .iter()
            .map(|(key, c)| (key.clone(), c.target_id.clone()))
            .collect();

        let cloud = &self.cloud;
        let policy = &policy;
        let mut fetches = std::pin::pin!(stream::iter(jobs)
            .map(|(key, target_id)| async move {
                let id = target_id.as_str();
                let result = policy.run(id, move || cloud.fetch_by_id(id)).await;
                let fetched = match result {
                    Ok(Some(resource)) => FetchOutcome::Fetched(resource),
                    Ok(None) => FetchOutcome::NotFound,
                    Err(e) => FetchOutcome::Failed(e),
                };
                (key, fetched)
            })
            .buffer_unordered(concurrency));

        let expired = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        let mut expired = std::pin::pin!(expired);

        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::warn!(remaining = pending.len(), "Dependency collection cancelled");
                    interrupted = true;
                    break;
                }
                () = &mut expired => {
                    tracing::warn!(remaining = pending.len(), "Dependency collection deadline reached");
                    interrupted = true;
                    break;
                }
                next = fetches.next() => {
                    let Some((key, fetched)) = next else { break };
                    let Some(candidate) = pending.remove(&key) else { continue };
                    let (state, resource) = match fetched {
                        FetchOutcome::Fetched(resource) => {
                            tracing::debug!(resource_id = %candidate.target_id, "Fetched missing resource");
                            if let Some(cache) = cache.as_deref_mut() {
                                cache.fetched.insert(key, resource.clone());
                            }
                            outcome.resources.push(resource.clone());
                            (ResolutionState::FetchedFromSource, Some(resource))
                        }
                        FetchOutcome::NotFound => {
                            tracing::warn!(resource_id = %candidate.target_id, "Missing resource not found, abandoning");
                            if let Some(cache) = cache.as_deref_mut() {
                                cache.not_found.insert(key);
                            }
                            (ResolutionState::Unresolved { reason: "not found".to_string() }, None)
                        }
                        FetchOutcome::Failed(e) => {
                            let reason = retry::abandon_reason(&e);
                            tracing::warn!(resource_id = %candidate.target_id, reason = %reason, "Fetch abandoned");
                            (ResolutionState::Unresolved { reason }, None)
                        }
                    };
                    outcome.records.push(MissingDependencyRecord {
                        target_id: candidate.target_id,
                        referenced_by: candidate.referenced_by,
                        state,
                        resource,
                    });
                }
            }
        }

        outcome.records.extend(
            pending
                .into_values()
                .map(|c| MissingDependencyRecord::pending(c.target_id, c.referenced_by)),
        );
        interrupted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::SubnetRule;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use mockall::mock;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SUB: &str = "/subscriptions/0000/resourceGroups";

    fn vm_id(name: &str) -> String {
        format!("{SUB}/spoke-rg/providers/Microsoft.Compute/virtualMachines/{name}")
    }

    fn nic_id(name: &str) -> String {
        format!("{SUB}/spoke-rg/providers/Microsoft.Network/networkInterfaces/{name}")
    }

    fn subnet_id(name: &str) -> String {
        format!("{SUB}/hub-rg/providers/Microsoft.Network/virtualNetworks/hub-vnet/subnets/{name}")
    }

    fn vm(name: &str, subnets: &[String]) -> Resource {
        let configs: Vec<_> = subnets
            .iter()
            .map(|s| json!({ "properties": { "subnet": { "id": s } } }))
            .collect();
        Resource::from_arm(json!({
            "id": vm_id(name),
            "type": "Microsoft.Compute/virtualMachines",
            "properties": { "networkProfile": { "networkInterfaces": [
                { "id": nic_id(name), "properties": { "ipConfigurations": configs } }
            ] } }
        }))
        .unwrap()
    }

    fn nic(name: &str) -> Resource {
        Resource::from_arm(json!({
            "id": nic_id(name),
            "type": "Microsoft.Network/networkInterfaces"
        }))
        .unwrap()
    }

    /// Cloud fake serving a fixed set of documents and counting calls.
    #[derive(Default)]
    struct FakeCloud {
        documents: HashMap<String, serde_json::Value>,
        calls: Mutex<Vec<String>>,
        throttle_first: AtomicUsize,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
    }

    impl FakeCloud {
        fn serving(ids: &[String]) -> Self {
            Self {
                documents: ids
                    .iter()
                    .map(|id| (id_key(id), json!({ "id": id })))
                    .collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CloudResourceClient for FakeCloud {
        async fn fetch_by_id(&self, id: &str) -> Result<Option<Resource>> {
            self.calls.lock().unwrap().push(id.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let throttled = self
                .throttle_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if throttled {
                return Err(crate::err!(Throttled { resource_id: id.to_string(), retry_after_secs: None }));
            }
            Ok(self.documents.get(&id_key(id)).cloned().and_then(Resource::from_arm))
        }
    }

    mock! {
        Store {}

        #[async_trait]
        impl GraphStoreReader for Store {
            async fn existing_ids(&self, ids: &BTreeSet<String>) -> Result<BTreeSet<String>>;
        }
    }

    fn options() -> CollectorOptions {
        CollectorOptions {
            max_concurrent_fetches: 4,
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            fetch_timeout_secs: 5,
            store_timeout_secs: 5,
            ..CollectorOptions::default()
        }
    }

    fn collector(store: Arc<dyn GraphStoreReader>, cloud: Arc<FakeCloud>, options: CollectorOptions) -> DependencyCollector {
        DependencyCollector::new(store, cloud, Arc::new(RuleRegistry::builtin()), options)
    }

    #[tokio::test]
    async fn test_cross_group_subnet_is_fetched_once() {
        // spoke-rg scan: VM and NIC inside, subnet lives in hub-rg
        let subnet = subnet_id("default");
        let filtered = vec![vm("vm1", &[subnet.clone()]), nic("vm1")];
        let store = Arc::new(InMemoryStore::new());
        let cloud = Arc::new(FakeCloud::serving(&[subnet.clone()]));

        let outcome = collector(store.clone(), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(store.existence_queries(), 1);
        assert_eq!(cloud.calls(), vec![subnet.clone()]);
        assert_eq!(outcome.resources.len(), 1);
        assert_eq!(outcome.resources[0].id, subnet);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].state, ResolutionState::FetchedFromSource);
        assert_eq!(outcome.records[0].referenced_by, vec![vm_id("vm1")]);
        assert!(!outcome.partial);
    }

    #[tokio::test]
    async fn test_single_vm_with_subnet_rule() {
        let subnet = subnet_id("default");
        let filtered = vec![vm("vm1", &[subnet.clone()])];

        let mut store = MockStore::new();
        let expected = subnet.clone();
        store
            .expect_existing_ids()
            .withf(move |ids: &BTreeSet<String>| ids.len() == 1 && ids.contains(&expected))
            .times(1)
            .returning(|_| Ok(BTreeSet::new()));
        let cloud = Arc::new(FakeCloud::serving(&[subnet.clone()]));
        let rules = Arc::new(RuleRegistry::new().with(SubnetRule));

        let outcome = DependencyCollector::new(Arc::new(store), cloud.clone(), rules, options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(cloud.calls(), vec![subnet.clone()]);
        assert_eq!(outcome.resources.len(), 1);
        assert_eq!(outcome.resources[0].id, subnet);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].state, ResolutionState::FetchedFromSource);
        assert!(!outcome.partial);
    }

    #[tokio::test]
    async fn test_shared_target_fetched_at_most_once() {
        let subnet = subnet_id("default");
        let filtered: Vec<Resource> = (0..10)
            .map(|i| vm(&format!("vm{i}"), &[subnet.clone(), subnet.to_uppercase()]))
            .collect();
        let mut serving: Vec<String> = (0..10).map(|i| nic_id(&format!("vm{i}"))).collect();
        serving.push(subnet.clone());
        let cloud = Arc::new(FakeCloud::serving(&serving));

        let outcome = collector(Arc::new(InMemoryStore::new()), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        let calls = cloud.calls();
        let unique: HashSet<String> = calls.iter().map(|c| id_key(c)).collect();
        assert_eq!(calls.len(), unique.len());
        assert_eq!(calls.len(), 11);
        let subnet_record = outcome
            .records
            .iter()
            .find(|r| id_key(&r.target_id) == id_key(&subnet))
            .unwrap();
        assert_eq!(subnet_record.referenced_by.len(), 10);
    }

    #[tokio::test]
    async fn test_every_missing_id_reaches_a_terminal_state() {
        let in_store = subnet_id("in-store");
        let fetchable = subnet_id("fetchable");
        let gone = subnet_id("gone");
        let filtered = vec![
            vm("vm1", &[in_store.clone(), fetchable.clone(), gone.clone()]),
            nic("vm1"),
        ];
        let store = Arc::new(InMemoryStore::with_ids([in_store.to_uppercase()]));
        let cloud = Arc::new(FakeCloud::serving(&[fetchable.clone()]));

        let outcome = collector(store, cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 3);
        let state_of = |id: &str| {
            outcome
                .records
                .iter()
                .find(|r| r.target_id == id)
                .map(|r| r.state.clone())
                .unwrap()
        };
        assert_eq!(state_of(&in_store), ResolutionState::FoundInStore);
        assert_eq!(state_of(&fetchable), ResolutionState::FetchedFromSource);
        assert!(matches!(state_of(&gone), ResolutionState::Unresolved { .. }));
        assert!(!cloud.calls().contains(&in_store));
        assert!(outcome.records.iter().all(|r| r.state != ResolutionState::Pending));
    }

    #[tokio::test]
    async fn test_nothing_missing_skips_store_and_cloud() {
        let filtered = vec![nic("a")];
        let store = Arc::new(InMemoryStore::new());
        let cloud = Arc::new(FakeCloud::default());

        let outcome = collector(store.clone(), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert!(outcome.records.is_empty());
        assert_eq!(store.existence_queries(), 0);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_throttled_fetch_is_retried() {
        let subnet = subnet_id("default");
        let cloud = Arc::new(FakeCloud {
            throttle_first: AtomicUsize::new(2),
            ..FakeCloud::serving(&[subnet.clone(), nic_id("vm1")])
        });
        let filtered = vec![vm("vm1", &[subnet.clone()]), nic("vm1")];

        let outcome = collector(Arc::new(InMemoryStore::new()), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(cloud.calls().len(), 3);
        assert_eq!(outcome.records[0].state, ResolutionState::FetchedFromSource);
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_unresolved() {
        let subnet = subnet_id("default");
        let cloud = Arc::new(FakeCloud {
            throttle_first: AtomicUsize::new(100),
            ..FakeCloud::serving(&[subnet.clone()])
        });
        let filtered = vec![vm("vm1", &[subnet.clone()]), nic("vm1")];

        let outcome = collector(Arc::new(InMemoryStore::new()), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(cloud.calls().len(), 3);
        match &outcome.records[0].state {
            ResolutionState::Unresolved { reason } => assert!(reason.contains("throttled")),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_fatal() {
        let mut store = MockStore::new();
        store
            .expect_existing_ids()
            .times(1)
            .returning(|_| Err(TenantGraphError::graph_store("connection refused".to_string(), None, file!(), line!())));
        let cloud = Arc::new(FakeCloud::default());
        let filtered = vec![vm("vm1", &[subnet_id("default")]), nic("vm1")];

        let err = collector(Arc::new(store), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap_err();

        assert!(matches!(err, TenantGraphError::GraphStore { .. }));
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_store_receives_one_batch() {
        let mut store = MockStore::new();
        store
            .expect_existing_ids()
            .withf(|ids: &BTreeSet<String>| ids.len() == 3)
            .times(1)
            .returning(|ids| Ok(ids.clone()));
        let cloud = Arc::new(FakeCloud::default());
        let filtered = vec![vm("vm1", &[subnet_id("a"), subnet_id("b")])];

        let outcome = collector(Arc::new(store), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(outcome.found_in_store(), 3);
        assert!(cloud.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let subnets: Vec<String> = (0..12).map(|i| subnet_id(&format!("s{i}"))).collect();
        let cloud = Arc::new(FakeCloud {
            delay: Some(Duration::from_millis(20)),
            ..FakeCloud::serving(&subnets)
        });
        let filtered = vec![vm("vm1", &subnets), nic("vm1")];
        let opts = CollectorOptions { max_concurrent_fetches: 3, ..options() };

        let outcome = collector(Arc::new(InMemoryStore::new()), cloud.clone(), opts)
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert_eq!(outcome.resources.len(), 12);
        assert!(cloud.peak_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_cancellation_returns_partial_results() {
        let subnets: Vec<String> = (0..8).map(|i| subnet_id(&format!("s{i}"))).collect();
        let cloud = Arc::new(FakeCloud {
            delay: Some(Duration::from_secs(10)),
            ..FakeCloud::serving(&subnets)
        });
        let filtered = vec![vm("vm1", &subnets), nic("vm1")];
        let collector = collector(Arc::new(InMemoryStore::new()), cloud, options());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = collector
            .collect_with(&filtered, &FilterDescription::default(), &cancel, None)
            .await
            .unwrap();

        assert!(outcome.partial);
        assert_eq!(outcome.records.len(), 8);
        assert!(outcome.records.iter().all(|r| r.state == ResolutionState::Pending));
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_results() {
        let subnets: Vec<String> = (0..2).map(|i| subnet_id(&format!("s{i}"))).collect();
        let cloud = Arc::new(FakeCloud {
            delay: Some(Duration::from_secs(3)),
            ..FakeCloud::serving(&subnets)
        });
        let filtered = vec![vm("vm1", &subnets), nic("vm1")];
        let opts = CollectorOptions { deadline_secs: Some(1), ..options() };

        let outcome = collector(Arc::new(InMemoryStore::new()), cloud, opts)
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();

        assert!(outcome.partial);
        assert!(outcome.resources.is_empty());
    }

    #[tokio::test]
    async fn test_cache_skips_repeat_work() {
        let subnet = subnet_id("default");
        let filtered = vec![vm("vm1", &[subnet.clone()]), nic("vm1")];
        let store = Arc::new(InMemoryStore::new());
        let cloud = Arc::new(FakeCloud::serving(&[subnet.clone()]));
        let collector = collector(store.clone(), cloud.clone(), options());
        let cancel = CancellationToken::new();
        let mut cache = ResolutionCache::new();

        let first = collector
            .collect_with(&filtered, &FilterDescription::default(), &cancel, Some(&mut cache))
            .await
            .unwrap();
        let second = collector
            .collect_with(&filtered, &FilterDescription::default(), &cancel, Some(&mut cache))
            .await
            .unwrap();

        assert_eq!(cloud.calls().len(), 1);
        assert_eq!(store.existence_queries(), 1);
        assert_eq!(first.resources, second.resources);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_transitive_resolution_with_depth() {
        // VM -> subnet (fetched) -> parent vnet (fetched at depth 2)
        let subnet = subnet_id("default");
        let vnet = format!("{SUB}/hub-rg/providers/Microsoft.Network/virtualNetworks/hub-vnet");
        let filtered = vec![vm("vm1", &[subnet.clone()]), nic("vm1")];
        let cloud = Arc::new(FakeCloud::serving(&[subnet.clone(), vnet.clone()]));

        let shallow = collector(Arc::new(InMemoryStore::new()), cloud.clone(), options())
            .collect_missing_dependencies(&filtered, &FilterDescription::default())
            .await
            .unwrap();
        assert_eq!(shallow.resources.len(), 1);

        let deep = collector(
            Arc::new(InMemoryStore::new()),
            cloud,
            CollectorOptions { max_depth: 2, ..options() },
        )
        .collect_missing_dependencies(&filtered, &FilterDescription::default())
        .await
        .unwrap();
        let ids: Vec<&str> = deep.resources.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&vnet.as_str()));
    }
}
