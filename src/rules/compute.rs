//! Compute and hosting rules.

use super::network::{VIRTUAL_MACHINE, WEB_SITE};
use super::{is_type, references_at, Reference, RelationshipRule};
use crate::types::Resource;

/// Virtual machines to their managed OS and data disks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagedDiskRule;

impl RelationshipRule for ManagedDiskRule {
    fn name(&self) -> &'static str {
        "managed_disk"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, VIRTUAL_MACHINE)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        let mut refs = references_at(
            resource,
            &["properties", "storageProfile", "osDisk", "managedDisk", "id"],
            "USES_DISK",
        );
        refs.extend(references_at(
            resource,
            &["properties", "storageProfile", "dataDisks", "*", "managedDisk", "id"],
            "USES_DISK",
        ));
        refs
    }
}

/// Web and function apps to the plan hosting them.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppServicePlanRule;

impl RelationshipRule for AppServicePlanRule {
    fn name(&self) -> &'static str {
        "app_service_plan"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, WEB_SITE)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        references_at(resource, &["properties", "serverFarmId"], "HOSTED_ON")
    }
}
