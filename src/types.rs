//! Core data types used throughout TenantGraph.
//!
//! This module defines the fundamental data structures for representing:
//! - Discovered cloud resources and their identifiers
//! - Relationship instances and their aggregated form
//! - Missing dependency bookkeeping for filtered scans
//! - Pipeline results and output formats

use crate::graph::ArchitectureGraph;
use crate::normalizer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Display;

/// Label carried by every resource that came from cloud discovery.
pub const RESOURCE_LABEL: &str = "Resource";

fn default_labels() -> Vec<String> {
    vec![RESOURCE_LABEL.to_string()]
}

/// A discovered cloud resource.
///
/// The property bag is the raw document returned by the cloud API
/// (`properties`, `identity`, `sku`, `tags`, ...). Its shape varies per
/// resource type and is only ever read, never validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Full cloud resource path, globally unique
    pub id: String,

    /// Resource name (last path segment)
    #[serde(default)]
    pub name: String,

    /// Provider type string, e.g. `Microsoft.Compute/virtualMachines`
    #[serde(rename = "type", default)]
    pub resource_type: String,

    /// Resource group the resource lives in
    #[serde(default)]
    pub resource_group: Option<String>,

    /// Region
    #[serde(default)]
    pub location: Option<String>,

    /// Graph labels, `["Resource"]` for anything discovered
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    /// Opaque property bag
    #[serde(default)]
    pub properties: Value,
}

impl Resource {
    /// Build a resource from a raw cloud API document.
    ///
    /// Returns `None` when the document has no `id`; everything else is
    /// optional and defaults to empty.
    #[must_use]
    pub fn from_arm(document: Value) -> Option<Self> {
        let id = document.get("id")?.as_str()?.to_string();
        let parsed = ResourceId::parse(&id).ok();

        let resource_type = document
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| parsed.as_ref().and_then(|p| p.resource_type().map(str::to_string)))
            .unwrap_or_default();
        let name = document
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| parsed.as_ref().and_then(|p| p.name().map(str::to_string)))
            .unwrap_or_default();
        let location = document
            .get("location")
            .and_then(Value::as_str)
            .map(str::to_string);
        let resource_group = parsed
            .as_ref()
            .and_then(|p| p.resource_group().map(str::to_string));

        Some(Self {
            id,
            name,
            resource_type,
            resource_group,
            location,
            labels: default_labels(),
            properties: document,
        })
    }

    /// Canonical type name used as the aggregation key.
    #[must_use]
    pub fn canonical_type(&self) -> String {
        let provider_type = (!self.resource_type.is_empty()).then_some(self.resource_type.as_str());
        normalizer::normalize(&self.labels, provider_type)
    }

    /// Case-insensitive comparison key for the identifier.
    #[must_use]
    pub fn id_key(&self) -> String {
        id_key(&self.id)
    }

    /// Tag value, if the resource carries a `tags` object.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.properties.get("tags")?.get(key)?.as_str()
    }
}

/// Comparison key for cloud identifiers, which are case-insensitive.
#[must_use]
pub fn id_key(id: &str) -> String {
    id.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// A parsed cloud resource identifier.
///
/// ```text
/// /subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}[/{child}/{name}]...
/// ```
///
/// Subscription-scoped and provider-scoped paths (no resource group) are
/// accepted as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    raw: String,
    subscription_id: Option<String>,
    resource_group: Option<String>,
    namespace: Option<String>,
    full_type: Option<String>,
    types: Vec<String>,
    names: Vec<String>,
}

impl ResourceId {
    /// Parse an identifier.
    ///
    /// # Errors
    ///
    /// Returns `ResourceIdParse` if the path does not follow the
    /// `subscriptions/.../providers/...` layout.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        let fail = |message: &str| {
            crate::err!(ResourceIdParse {
                resource_id: raw.to_string(),
                message: message.to_string(),
            })
        };

        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.first() != Some(&"") || segments.len() < 3 {
            return Err(fail("identifier must be an absolute path"));
        }
        let mut rest = &segments[1..];

        let mut subscription_id = None;
        if rest[0].eq_ignore_ascii_case("subscriptions") {
            subscription_id = Some(rest[1].to_string());
            rest = &rest[2..];
        }

        let mut resource_group = None;
        if rest.len() >= 2 && rest[0].eq_ignore_ascii_case("resourceGroups") {
            resource_group = Some(rest[1].to_string());
            rest = &rest[2..];
        }

        let mut namespace = None;
        let mut types = Vec::new();
        let mut names = Vec::new();
        if !rest.is_empty() {
            if !rest[0].eq_ignore_ascii_case("providers") || rest.len() < 2 {
                return Err(fail("expected a 'providers' segment"));
            }
            namespace = Some(rest[1].to_string());
            let pairs = &rest[2..];
            if pairs.is_empty() || pairs.len() % 2 != 0 {
                return Err(fail("provider segments must come in type/name pairs"));
            }
            for pair in pairs.chunks(2) {
                if pair[0].is_empty() || pair[1].is_empty() {
                    return Err(fail("empty type or name segment"));
                }
                types.push(pair[0].to_string());
                names.push(pair[1].to_string());
            }
        }

        if subscription_id.is_none() && namespace.is_none() {
            return Err(fail("identifier has neither a subscription nor a provider"));
        }

        let full_type = namespace
            .as_ref()
            .map(|ns| format!("{ns}/{}", types.join("/")));

        Ok(Self {
            raw: trimmed.to_string(),
            subscription_id,
            resource_group,
            namespace,
            full_type,
            types,
            names,
        })
    }

    /// The identifier as given (without a trailing slash).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription_id.as_deref()
    }

    #[must_use]
    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    /// Provider namespace, e.g. `Microsoft.Network`.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Full provider type, e.g. `Microsoft.Network/virtualNetworks/subnets`.
    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.full_type.as_deref()
    }

    /// Resource name (last name segment).
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.names.last().map(String::as_str)
    }

    /// Identifier of the parent resource for child resources
    /// (`.../virtualNetworks/vnet/subnets/default` → `.../virtualNetworks/vnet`).
    #[must_use]
    pub fn parent(&self) -> Option<String> {
        if self.types.len() < 2 {
            return None;
        }
        let cut = self.raw.rfind('/')?;
        let without_name = &self.raw[..cut];
        let cut = without_name.rfind('/')?;
        Some(without_name[..cut].to_string())
    }

    /// Comparison key.
    #[must_use]
    pub fn key(&self) -> String {
        id_key(&self.raw)
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One observed relationship between two concrete resources.
///
/// Produced while applying rules and consumed immediately by the
/// aggregator; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipInstance {
    pub source_id: String,
    pub source_type: String,
    pub relation: String,
    pub target_id: String,
    pub target_type: String,
}

impl RelationshipInstance {
    /// Aggregation key of this instance.
    #[must_use]
    pub fn key(&self) -> RelationKey {
        RelationKey {
            source_type: self.source_type.clone(),
            relation: self.relation.clone(),
            target_type: self.target_type.clone(),
        }
    }
}

/// `(source-type, relation-type, target-type)` aggregation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationKey {
    pub source_type: String,
    pub relation: String,
    pub target_type: String,
}

impl Display for RelationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})-[{}]->({})", self.source_type, self.relation, self.target_type)
    }
}

/// A relationship triple with the number of instances collapsed into it.
///
/// `frequency` is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregatedRelationship {
    pub source_type: String,
    pub relation: String,
    pub target_type: String,
    pub frequency: u64,
}

impl AggregatedRelationship {
    #[must_use]
    pub fn new(key: RelationKey, frequency: u64) -> Self {
        Self {
            source_type: key.source_type,
            relation: key.relation,
            target_type: key.target_type,
            frequency,
        }
    }

    #[must_use]
    pub fn key(&self) -> RelationKey {
        RelationKey {
            source_type: self.source_type.clone(),
            relation: self.relation.clone(),
            target_type: self.target_type.clone(),
        }
    }
}

/// Where a referenced-but-absent identifier ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ResolutionState {
    /// Not resolved yet (left in this state when collection is cancelled)
    Pending,
    /// The graph store already holds the resource
    FoundInStore,
    /// Fetched from the cloud API during this collection
    FetchedFromSource,
    /// Abandoned: not found, permanent failure, or retries exhausted
    Unresolved { reason: String },
}

impl ResolutionState {
    /// Whether the target type of a reference to this identifier can be determined.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        matches!(self, Self::FoundInStore | Self::FetchedFromSource)
    }
}

/// Bookkeeping for one missing dependency within a collection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingDependencyRecord {
    /// The referenced identifier, in the spelling first seen
    pub target_id: String,
    /// Resources that referenced it
    pub referenced_by: Vec<String>,
    /// Final state
    pub state: ResolutionState,
    /// Payload, once fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
}

impl MissingDependencyRecord {
    #[must_use]
    pub fn pending(target_id: String, referenced_by: Vec<String>) -> Self {
        Self {
            target_id,
            referenced_by,
            state: ResolutionState::Pending,
            resource: None,
        }
    }
}

/// Description of the filter that produced a scan.
///
/// The dependency collector only logs it. The CLI also uses it to cut a
/// full snapshot down to a filtered working set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDescription {
    /// Resource group names (case-insensitive)
    #[serde(default)]
    pub resource_groups: Vec<String>,
    /// Provider types (case-insensitive)
    #[serde(default)]
    pub resource_types: Vec<String>,
    /// Tag predicates, all of which must match
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl FilterDescription {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resource_groups.is_empty() && self.resource_types.is_empty() && self.tags.is_empty()
    }

    /// Whether a resource passes every configured predicate.
    #[must_use]
    pub fn matches(&self, resource: &Resource) -> bool {
        let group_ok = self.resource_groups.is_empty()
            || resource.resource_group.as_deref().is_some_and(|rg| {
                self.resource_groups.iter().any(|g| g.eq_ignore_ascii_case(rg))
            });
        let type_ok = self.resource_types.is_empty()
            || self
                .resource_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&resource.resource_type));
        let tags_ok = self
            .tags
            .iter()
            .all(|(k, v)| resource.tag(k) == Some(v.as_str()));
        group_ok && type_ok && tags_ok
    }

    /// The resources that pass the filter, in input order.
    #[must_use]
    pub fn apply(&self, resources: &[Resource]) -> Vec<Resource> {
        resources.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

impl Display for FilterDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "unfiltered");
        }
        let mut parts = Vec::new();
        if !self.resource_groups.is_empty() {
            parts.push(format!("resource_groups=[{}]", self.resource_groups.join(",")));
        }
        if !self.resource_types.is_empty() {
            parts.push(format!("resource_types=[{}]", self.resource_types.join(",")));
        }
        if !self.tags.is_empty() {
            let tags: Vec<String> = self.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
            parts.push(format!("tags=[{}]", tags.join(",")));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum ReportFormat {
    /// JSON format
    #[default]
    Json,
    /// Plain text format
    Text,
}

/// Graph output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum GraphFormat {
    /// DOT format (Graphviz)
    #[default]
    Dot,
    /// JSON format
    Json,
    /// Mermaid diagram format
    Mermaid,
}

/// Result of running the full pipeline over a filtered scan.
#[derive(Debug, Clone, Serialize)]
pub struct GraphResult {
    /// The type-level multigraph
    #[serde(skip)]
    pub graph: ArchitectureGraph,

    /// Cumulative occurrence count per canonical type
    pub node_counts: BTreeMap<String, u64>,

    /// Cumulative frequency per ordered type pair
    #[serde(serialize_with = "serialize_pair_counts")]
    pub edge_counts: BTreeMap<(String, String), u64>,

    /// Aggregated relationships the graph was built from
    pub relationships: Vec<AggregatedRelationship>,

    /// Resources fetched to close the filter gap
    pub discovered: Vec<Resource>,

    /// Every missing dependency seen, with its final state
    pub records: Vec<MissingDependencyRecord>,

    /// Relationship instances dropped because their target type was unknown
    pub dropped_relationships: usize,

    /// Collection was cancelled or hit its deadline
    pub partial: bool,
}

impl GraphResult {
    /// Generate a report in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if report generation fails.
    pub fn generate_report(&self, format: ReportFormat) -> crate::Result<String> {
        let config = crate::Config::default();
        let reporter = crate::reporter::Reporter::new(&config);
        reporter.generate(self, format)
    }

    /// Identifiers that were referenced but could not be resolved.
    #[must_use]
    pub fn unresolved_ids(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| !r.state.is_resolved())
            .map(|r| r.target_id.as_str())
            .collect()
    }
}

fn serialize_pair_counts<S>(
    counts: &BTreeMap<(String, String), u64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;

    #[derive(Serialize)]
    struct PairCount<'a> {
        source: &'a str,
        target: &'a str,
        frequency: u64,
    }

    let mut seq = serializer.serialize_seq(Some(counts.len()))?;
    for ((source, target), frequency) in counts {
        seq.serialize_element(&PairCount { source, target, frequency: *frequency })?;
    }
    seq.end()
}
