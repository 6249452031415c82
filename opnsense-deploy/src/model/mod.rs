//! Typed records for every resource kind the engine manages.
//!
//! Each kind comes as a record (what a backend returns), a `New*` input used for
//! creation, and a `*Patch` of optional fields used for partial updates. Fields a
//! backend returns that the engine does not interpret travel in `extra`.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::Serialize;

mod dhcp;
mod firewall;
mod interface;
mod vlan;
mod workload;

pub use dhcp::{
    DhcpConfig, DhcpConfigPatch, DhcpLease, NewDhcpConfig, NewStaticMapping, StaticMapping,
    StaticMappingPatch,
};
pub use firewall::{
    Endpoint, EndpointTarget, FirewallRule, FirewallRulePatch, IpProtocol, NewFirewallRule,
    NewPortForward, PortForward, PortForwardPatch, Protocol, RuleAction,
};
pub use interface::{Interface, InterfacePatch, NewInterface};
pub use vlan::{derived_vlan_interface, NewVlan, Vlan, VlanPatch};
pub use workload::{
    DeploymentLog, LogStatus, NetworkDescriptor, PortMapping, PortProtocol, WorkloadPatch,
    WorkloadRecord, WorkloadSpec,
};

/// Raw fields a backend reported that have no typed counterpart.
pub type RawFields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Interface,
    Vlan,
    FirewallRule,
    PortForward,
    DhcpConfig,
    StaticMapping,
    Workload,
}

impl ResourceKind {
    /// Stable slug used for derived identifiers and lock keys.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::Vlan => "vlan",
            Self::FirewallRule => "firewall_rule",
            Self::PortForward => "port_forward",
            Self::DhcpConfig => "dhcp_config",
            Self::StaticMapping => "static_mapping",
            Self::Workload => "workload",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Interface => "interface",
            Self::Vlan => "VLAN",
            Self::FirewallRule => "firewall rule",
            Self::PortForward => "port forward",
            Self::DhcpConfig => "DHCP config",
            Self::StaticMapping => "static mapping",
            Self::Workload => "workload",
        };
        f.write_str(label)
    }
}
