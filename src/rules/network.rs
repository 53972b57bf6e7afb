//! Networking rules.

use super::{is_type, references_at, Reference, RelationshipRule};
use crate::types::{Resource, ResourceId};

pub const VIRTUAL_MACHINE: &str = "Microsoft.Compute/virtualMachines";
pub const NETWORK_INTERFACE: &str = "Microsoft.Network/networkInterfaces";
pub const SUBNET: &str = "Microsoft.Network/virtualNetworks/subnets";
pub const VIRTUAL_NETWORK: &str = "Microsoft.Network/virtualNetworks";
pub const PRIVATE_ENDPOINT: &str = "Microsoft.Network/privateEndpoints";
pub const LOAD_BALANCER: &str = "Microsoft.Network/loadBalancers";
pub const WEB_SITE: &str = "Microsoft.Web/sites";

/// Virtual machine to the network interfaces it is attached to.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkInterfaceRule;

impl RelationshipRule for NetworkInterfaceRule {
    fn name(&self) -> &'static str {
        "network_interface"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, VIRTUAL_MACHINE)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        references_at(
            resource,
            &["properties", "networkProfile", "networkInterfaces", "*", "id"],
            "CONNECTED_TO",
        )
    }
}

/// Anything placed into a subnet.
///
/// Virtual machines carry their interfaces inline, so the subnet is read
/// straight from the embedded IP configurations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubnetRule;

impl RelationshipRule for SubnetRule {
    fn name(&self) -> &'static str {
        "subnet"
    }

    fn applies(&self, resource: &Resource) -> bool {
        [VIRTUAL_MACHINE, NETWORK_INTERFACE, PRIVATE_ENDPOINT, WEB_SITE]
            .iter()
            .any(|t| is_type(resource, t))
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        const RELATION: &str = "USES_SUBNET";
        if is_type(resource, VIRTUAL_MACHINE) {
            let mut refs = references_at(
                resource,
                &[
                    "properties", "networkProfile", "networkInterfaces", "*",
                    "properties", "ipConfigurations", "*", "properties", "subnet", "id",
                ],
                RELATION,
            );
            refs.extend(references_at(
                resource,
                &[
                    "properties", "networkProfile", "networkInterfaceConfigurations", "*",
                    "properties", "ipConfigurations", "*", "properties", "subnet", "id",
                ],
                RELATION,
            ));
            refs.sort();
            refs.dedup();
            refs
        } else if is_type(resource, NETWORK_INTERFACE) {
            references_at(
                resource,
                &["properties", "ipConfigurations", "*", "properties", "subnet", "id"],
                RELATION,
            )
        } else if is_type(resource, PRIVATE_ENDPOINT) {
            references_at(resource, &["properties", "subnet", "id"], RELATION)
        } else {
            references_at(resource, &["properties", "virtualNetworkSubnetId"], RELATION)
        }
    }
}

/// Subnets to their parent network, and networks to their subnets.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualNetworkRule;

impl RelationshipRule for VirtualNetworkRule {
    fn name(&self) -> &'static str {
        "virtual_network"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, SUBNET) || is_type(resource, VIRTUAL_NETWORK)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        if is_type(resource, VIRTUAL_NETWORK) {
            return references_at(resource, &["properties", "subnets", "*", "id"], "CONTAINS");
        }
        ResourceId::parse(&resource.id)
            .ok()
            .and_then(|id| id.parent())
            .map(|parent| vec![Reference::new("PART_OF", parent)])
            .unwrap_or_default()
    }
}

/// Subnets and interfaces to their network security group.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkSecurityGroupRule;

impl RelationshipRule for NetworkSecurityGroupRule {
    fn name(&self) -> &'static str {
        "network_security_group"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, SUBNET) || is_type(resource, NETWORK_INTERFACE)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        references_at(resource, &["properties", "networkSecurityGroup", "id"], "SECURED_BY")
    }
}

/// Interfaces and load balancers to public IP addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublicIpRule;

impl RelationshipRule for PublicIpRule {
    fn name(&self) -> &'static str {
        "public_ip"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, NETWORK_INTERFACE) || is_type(resource, LOAD_BALANCER)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        let configurations = if is_type(resource, LOAD_BALANCER) {
            "frontendIPConfigurations"
        } else {
            "ipConfigurations"
        };
        references_at(
            resource,
            &["properties", configurations, "*", "properties", "publicIPAddress", "id"],
            "USES_PUBLIC_IP",
        )
    }
}

/// Private endpoints to the service they expose.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrivateEndpointRule;

impl RelationshipRule for PrivateEndpointRule {
    fn name(&self) -> &'static str {
        "private_endpoint"
    }

    fn applies(&self, resource: &Resource) -> bool {
        is_type(resource, PRIVATE_ENDPOINT)
    }

    fn references(&self, resource: &Resource) -> Vec<Reference> {
        let mut refs = Vec::new();
        for connections in ["privateLinkServiceConnections", "manualPrivateLinkServiceConnections"] {
            refs.extend(references_at(
                resource,
                &["properties", connections, "*", "properties", "privateLinkServiceId"],
                "CONNECTS_TO",
            ));
        }
        refs
    }
}
