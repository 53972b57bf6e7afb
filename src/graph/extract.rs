//! Relationship extraction over a working set.
//!
//! Applies the rule registry to every resource and turns each reference into
//! a [`RelationshipInstance`] whose endpoints carry canonical types. A
//! target's type comes from the working set, or from its identifier when
//! the graph store confirmed it exists. References whose target type cannot
//! be determined are dropped and counted, never guessed.

use super::aggregator::RelationshipAggregator;
use crate::normalizer;
use crate::rules::RuleRegistry;
use crate::types::{
    id_key, MissingDependencyRecord, RelationshipInstance, Resource, ResourceId, ResolutionState,
    RESOURCE_LABEL,
};
use rayon::prelude::*;
use std::collections::HashMap;

/// Instances produced for a set of resources.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub instances: Vec<RelationshipInstance>,
    /// References dropped because the target type was unknown
    pub dropped: usize,
}

/// Resolves references into typed relationship instances.
#[derive(Debug)]
pub struct RelationshipExtractor<'a> {
    rules: &'a RuleRegistry,
    /// id key -> canonical type
    types: HashMap<String, String>,
}

impl<'a> RelationshipExtractor<'a> {
    /// Index the working set and the collector's records.
    ///
    /// Records found in the store contribute a type derived from the
    /// identifier's provider type; unresolved and pending records contribute
    /// nothing.
    #[must_use]
    pub fn new(rules: &'a RuleRegistry, working_set: &[Resource], records: &[MissingDependencyRecord]) -> Self {
        let mut types: HashMap<String, String> = working_set
            .iter()
            .map(|r| (r.id_key(), r.canonical_type()))
            .collect();

        for record in records {
            let key = id_key(&record.target_id);
            if types.contains_key(&key) {
                continue;
            }
            match (&record.state, &record.resource) {
                (ResolutionState::FetchedFromSource, Some(resource)) => {
                    types.insert(key, resource.canonical_type());
                }
                (ResolutionState::FoundInStore, _) => {
                    let provider_type = ResourceId::parse(&record.target_id)
                        .ok()
                        .and_then(|id| id.resource_type().map(str::to_string));
                    if let Some(provider_type) = provider_type {
                        types.insert(key, normalizer::normalize(&[RESOURCE_LABEL], Some(provider_type.as_str())));
                    }
                }
                _ => {}
            }
        }

        Self { rules, types }
    }

    /// Canonical type of a target identifier, if known.
    #[must_use]
    pub fn target_type(&self, id: &str) -> Option<&str> {
        self.types.get(&id_key(id)).map(String::as_str)
    }

    /// Instances for one resource, plus the number of dropped references.
    #[must_use]
    pub fn instances_for(&self, resource: &Resource) -> (Vec<RelationshipInstance>, usize) {
        let source_type = resource.canonical_type();
        let mut instances = Vec::new();
        let mut dropped = 0;

        for reference in self.rules.references(resource) {
            match self.target_type(&reference.target_id) {
                Some(target_type) => instances.push(RelationshipInstance {
                    source_id: resource.id.clone(),
                    source_type: source_type.clone(),
                    relation: reference.relation,
                    target_id: reference.target_id,
                    target_type: target_type.to_string(),
                }),
                None => {
                    tracing::debug!(
                        source_id = %resource.id,
                        relation = %reference.relation,
                        target_id = %reference.target_id,
                        "Dropping relationship with unresolved target"
                    );
                    dropped += 1;
                }
            }
        }
        (instances, dropped)
    }

    /// Extract instances for every resource, in input order.
    #[must_use]
    pub fn extract(&self, resources: &[Resource]) -> Extraction {
        let mut extraction = Extraction::default();
        for resource in resources {
            let (instances, dropped) = self.instances_for(resource);
            extraction.instances.extend(instances);
            extraction.dropped += dropped;
        }
        extraction
    }

    /// Extract and aggregate in parallel.
    ///
    /// Each rayon worker folds into its own aggregator; the partial
    /// aggregators are merged pairwise at the end.
    #[must_use]
    pub fn aggregate_parallel(&self, resources: &[Resource]) -> (RelationshipAggregator, usize) {
        let (aggregator, dropped) = resources
            .par_iter()
            .fold(
                || (RelationshipAggregator::new(), 0usize),
                |(mut aggregator, dropped), resource| {
                    let (instances, skipped) = self.instances_for(resource);
                    aggregator.extend(&instances);
                    (aggregator, dropped + skipped)
                },
            )
            .reduce(
                || (RelationshipAggregator::new(), 0usize),
                |(mut left, left_dropped), (right, right_dropped)| {
                    left.merge(right);
                    (left, left_dropped + right_dropped)
                },
            );

        if dropped > 0 {
            tracing::info!(dropped, "Relationships dropped for unresolved targets");
        }
        (aggregator, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::aggregator::aggregate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SUB: &str = "/subscriptions/0000/resourceGroups";

    fn nic(name: &str, subnet: &str, nsg: Option<&str>) -> Resource {
        let mut properties = json!({ "ipConfigurations": [{ "properties": { "subnet": { "id": subnet } } }] });
        if let Some(nsg) = nsg {
            properties["networkSecurityGroup"] = json!({ "id": nsg });
        }
        Resource::from_arm(json!({
            "id": format!("{SUB}/spoke-rg/providers/Microsoft.Network/networkInterfaces/{name}"),
            "type": "Microsoft.Network/networkInterfaces",
            "properties": properties
        }))
        .unwrap()
    }

    fn subnet(name: &str) -> String {
        format!("{SUB}/hub-rg/providers/Microsoft.Network/virtualNetworks/hub/subnets/{name}")
    }

    #[test]
    fn test_targets_typed_from_working_set() {
        let rules = RuleRegistry::builtin();
        let subnet_resource = Resource::from_arm(json!({ "id": subnet("a") })).unwrap();
        let working = vec![nic("n1", &subnet("a").to_uppercase(), None), subnet_resource];

        let extraction = RelationshipExtractor::new(&rules, &working, &[]).extract(&working);
        let uses_subnet: Vec<&RelationshipInstance> = extraction
            .instances
            .iter()
            .filter(|i| i.relation == "USES_SUBNET")
            .collect();
        assert_eq!(uses_subnet.len(), 1);
        assert_eq!(uses_subnet[0].source_type, "networkInterfaces");
        assert_eq!(uses_subnet[0].target_type, "subnets");
    }

    #[test]
    fn test_store_confirmed_targets_typed_from_id() {
        let rules = RuleRegistry::builtin();
        let working = vec![nic("n1", &subnet("a"), None)];
        let records = vec![MissingDependencyRecord {
            target_id: subnet("a"),
            referenced_by: vec![working[0].id.clone()],
            state: ResolutionState::FoundInStore,
            resource: None,
        }];

        let extractor = RelationshipExtractor::new(&rules, &working, &records);
        assert_eq!(extractor.target_type(&subnet("a")), Some("subnets"));
        let extraction = extractor.extract(&working);
        assert_eq!(extraction.instances.len(), 1);
        assert_eq!(extraction.dropped, 0);
    }

    #[test]
    fn test_unresolved_targets_are_dropped() {
        let rules = RuleRegistry::builtin();
        let nsg = format!("{SUB}/hub-rg/providers/Microsoft.Network/networkSecurityGroups/nsg");
        let working = vec![nic("n1", &subnet("gone"), Some(&nsg))];
        let records = vec![MissingDependencyRecord {
            target_id: subnet("gone"),
            referenced_by: vec![],
            state: ResolutionState::Unresolved { reason: "not found".to_string() },
            resource: None,
        }];

        let extraction = RelationshipExtractor::new(&rules, &working, &records).extract(&working);
        assert!(extraction.instances.is_empty());
        assert_eq!(extraction.dropped, 2);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let rules = RuleRegistry::builtin();
        let mut working: Vec<Resource> = (0..50)
            .map(|i| nic(&format!("n{i}"), &subnet(&format!("s{}", i % 4)), None))
            .collect();
        working.extend((0..4).map(|i| Resource::from_arm(json!({ "id": subnet(&format!("s{i}")) })).unwrap()));

        let extractor = RelationshipExtractor::new(&rules, &working, &[]);
        let sequential = extractor.extract(&working);
        let (parallel, dropped) = extractor.aggregate_parallel(&working);

        assert_eq!(parallel.finish(), aggregate(&sequential.instances));
        assert_eq!(dropped, sequential.dropped);
    }
}
