//! Relationship rules.
//!
//! A rule recognizes resources it knows about and reads the identifiers of
//! other resources out of their property bags. Rules never fail: a property
//! bag missing the fields a rule expects simply yields no references.
//!
//! # Capability Set
//!
//! | Method | Purpose |
//! |--------|---------|
//! | `applies` | Does this rule understand the resource? |
//! | `references` | `(relation, target id)` pairs found in the property bag |
//! | `extract_target_ids` | Target identifiers only (derived) |
//! | `emit` | Write the edges into the graph store (derived) |
//!
//! Rules are held in an ordered [`RuleRegistry`]. A resource may match zero,
//! one or several rules.
//!
//! # Example
//!
//! ```rust
//! use tenantgraph::rules::RuleRegistry;
//! use tenantgraph::types::Resource;
//! use serde_json::json;
//!
//! let registry = RuleRegistry::builtin();
//! let nic = Resource::from_arm(json!({
//!     "id": "/subscriptions/0/resourceGroups/rg/providers/Microsoft.Network/networkInterfaces/nic1",
//!     "type": "Microsoft.Network/networkInterfaces",
//!     "properties": { "ipConfigurations": [
//!         { "properties": { "subnet": { "id": "/subscriptions/0/resourceGroups/hub/providers/Microsoft.Network/virtualNetworks/v/subnets/s" } } }
//!     ] }
//! })).unwrap();
//!
//! let targets = registry.extract_target_ids(&nic);
//! assert_eq!(targets.len(), 1);
//! ```

mod compute;
mod governance;
mod network;

pub use compute::{AppServicePlanRule, ManagedDiskRule};
pub use governance::{DiagnosticsRule, ManagedIdentityRule};
pub use network::{
    NetworkInterfaceRule, NetworkSecurityGroupRule, PrivateEndpointRule, PublicIpRule,
    SubnetRule, VirtualNetworkRule,
};

use crate::error::Result;
use crate::store::GraphStoreWriter;
use crate::types::{id_key, Resource};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One outgoing reference found in a resource's property bag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    /// Relation label, upper snake case (`USES_SUBNET`)
    pub relation: String,
    /// Identifier of the referenced resource
    pub target_id: String,
}

impl Reference {
    #[must_use]
    pub fn new(relation: &str, target_id: impl Into<String>) -> Self {
        Self {
            relation: relation.to_string(),
            target_id: target_id.into(),
        }
    }
}

/// Pluggable relationship recognizer.
#[async_trait]
pub trait RelationshipRule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this rule understands the resource.
    fn applies(&self, resource: &Resource) -> bool;

    /// References this resource makes to other resources.
    ///
    /// Must not fail: absent or malformed fields yield an empty list.
    fn references(&self, resource: &Resource) -> Vec<Reference>;

    /// Identifiers referenced by this resource.
    fn extract_target_ids(&self, resource: &Resource) -> BTreeSet<String> {
        self.references(resource)
            .into_iter()
            .map(|r| r.target_id)
            .collect()
    }

    /// Write this resource's edges into the graph store.
    ///
    /// Returns the number of edges written.
    ///
    /// # Errors
    ///
    /// Propagates the first writer failure.
    async fn emit(&self, resource: &Resource, writer: &dyn GraphStoreWriter) -> Result<usize> {
        if !self.applies(resource) {
            return Ok(0);
        }
        let references = self.references(resource);
        for reference in &references {
            writer
                .write_edge(&resource.id, &reference.relation, &reference.target_id)
                .await?;
        }
        Ok(references.len())
    }
}

/// Ordered collection of rules.
#[derive(Clone, Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn RelationshipRule>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.rules.iter().map(|r| r.name())).finish()
    }
}

impl RuleRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in rules, in evaluation order.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new()
            .with(NetworkInterfaceRule)
            .with(SubnetRule)
            .with(VirtualNetworkRule)
            .with(NetworkSecurityGroupRule)
            .with(PublicIpRule)
            .with(PrivateEndpointRule)
            .with(ManagedDiskRule)
            .with(AppServicePlanRule)
            .with(ManagedIdentityRule)
            .with(DiagnosticsRule)
    }

    /// Append a rule.
    #[must_use]
    pub fn with<R: RelationshipRule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Append a shared rule.
    pub fn register(&mut self, rule: Arc<dyn RelationshipRule>) {
        self.rules.push(rule);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RelationshipRule>> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules that apply to the resource, in registry order.
    pub fn matching<'a>(&'a self, resource: &'a Resource) -> impl Iterator<Item = &'a Arc<dyn RelationshipRule>> + 'a {
        self.rules.iter().filter(move |rule| rule.applies(resource))
    }

    /// All references from every applicable rule, without duplicates.
    ///
    /// Targets compare case-insensitively; the first spelling seen is kept.
    #[must_use]
    pub fn references(&self, resource: &Resource) -> Vec<Reference> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for rule in self.matching(resource) {
            for reference in rule.references(resource) {
                if seen.insert((reference.relation.clone(), id_key(&reference.target_id))) {
                    out.push(reference);
                }
            }
        }
        out
    }

    /// Union of target identifiers over every applicable rule.
    #[must_use]
    pub fn extract_target_ids(&self, resource: &Resource) -> BTreeSet<String> {
        self.references(resource)
            .into_iter()
            .map(|r| r.target_id)
            .collect()
    }

    /// Write the resource's edges, one per distinct reference across all
    /// applicable rules.
    ///
    /// # Errors
    ///
    /// Propagates the first writer failure.
    pub async fn emit(&self, resource: &Resource, writer: &dyn GraphStoreWriter) -> Result<usize> {
        let references = self.references(resource);
        for reference in &references {
            writer
                .write_edge(&resource.id, &reference.relation, &reference.target_id)
                .await?;
        }
        Ok(references.len())
    }
}

// -----------------------------------------------------------------------------
// Property bag helpers
// -----------------------------------------------------------------------------

/// Case-insensitive provider type check.
pub(crate) fn is_type(resource: &Resource, provider_type: &str) -> bool {
    resource.resource_type.eq_ignore_ascii_case(provider_type)
}

/// Collect string values found at `path`.
///
/// A `*` segment fans out over array elements. Anything that is missing or
/// of the wrong shape contributes nothing.
pub(crate) fn strings_at(value: &Value, path: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    collect_strings(value, path, &mut out);
    out
}

fn collect_strings(value: &Value, path: &[&str], out: &mut Vec<String>) {
    match path.split_first() {
        None => {
            if let Some(s) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                out.push(s.to_string());
            }
        }
        Some((&"*", rest)) => {
            if let Some(items) = value.as_array() {
                for item in items {
                    collect_strings(item, rest, out);
                }
            }
        }
        Some((key, rest)) => {
            if let Some(child) = value.get(*key) {
                collect_strings(child, rest, out);
            }
        }
    }
}

/// References for every string at `path`, all with the same relation.
pub(crate) fn references_at(resource: &Resource, path: &[&str], relation: &str) -> Vec<Reference> {
    strings_at(&resource.properties, path)
        .into_iter()
        .map(|id| Reference::new(relation, id))
        .collect()
}
