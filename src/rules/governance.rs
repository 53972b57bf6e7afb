//! Identity and monitoring rules.

use super::{is_type, references_at, Reference, RelationshipRule};
use crate::types::Resource;

const DIAGNOSTIC_SETTINGS: &str = "Microsoft.Insights/diagnosticSettings";

/// Any resource to the user-assigned identities it runs as.
///
/// The identities are the keys of `identity.userAssignedIdentities`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagedIdentityRule;

impl RelationshipRule for ManagedIdentityRule {
    fn name(&self) -> &'static str {
        "managed_identity"
    }

    fn applies(&self, resource: &Resource) -> bool {
        resource
            .properties
            .get("identity")
            .and_then(|i| i.get("userAssignedIdentities"))
            .is_some_and(serde_json::Value::is_object)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        resource
            .properties
            .get("identity")
            .and_then(|i| i.get("userAssignedIdentities"))
            .and_then(serde_json::Value::as_object)
            .map(|identities| {
                identities
                    .keys()
                    .filter(|k| !k.trim().is_empty())
                    .map(|k| Reference::new("USES_IDENTITY", k.trim()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Diagnostic settings to their log destinations.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsRule;

impl RelationshipRule for DiagnosticsRule {
    fn name(&self) -> &'static str {
        "diagnostics"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, DIAGNOSTIC_SETTINGS)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        ["workspaceId", "storageAccountId"]
            .into_iter()
            .flat_map(|field| references_at(resource, &["properties", field], "SENDS_DIAGNOSTICS_TO"))
            .collect()
    }
}
