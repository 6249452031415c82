//! Backend contract shared by the document and remote implementations.
//!
//! Interfaces and VLANs are required of every backend. The remaining kinds have
//! default bodies returning [`ConfigError::NotImplementedOnBackend`] so a partial
//! backend can still serve deployments that treat those steps as best effort.

use serde::Serialize;

use crate::error::{ConfigError, Result};
use crate::model::{
    DhcpConfig, DhcpConfigPatch, DhcpLease, FirewallRule, FirewallRulePatch, Interface,
    InterfacePatch, NewDhcpConfig, NewFirewallRule, NewInterface, NewPortForward,
    NewStaticMapping, NewVlan, PortForward, PortForwardPatch, ResourceKind, StaticMapping,
    StaticMappingPatch, Vlan, VlanPatch,
};

pub mod document;
pub mod remote;

pub use document::DocumentBackend;
pub use remote::RemoteBackend;

/// Outcome of an apply call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyStatus {
    pub success: bool,
    pub message: String,
}

impl ApplyStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

pub trait ConfigBackend: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    fn list_interfaces(&self) -> Result<Vec<Interface>>;
    fn create_interface(&self, new: &NewInterface) -> Result<Interface>;
    fn update_interface(&self, name: &str, patch: &InterfacePatch) -> Result<Interface>;
    fn delete_interface(&self, name: &str) -> Result<()>;

    fn get_interface(&self, name: &str) -> Result<Interface> {
        self.list_interfaces()?
            .into_iter()
            .find(|i| i.name == name)
            .ok_or_else(|| ConfigError::not_found(ResourceKind::Interface, name))
    }

    fn list_vlans(&self) -> Result<Vec<Vlan>>;
    fn create_vlan(&self, new: &NewVlan) -> Result<Vlan>;
    fn update_vlan(&self, uuid: &str, patch: &VlanPatch) -> Result<Vlan>;
    fn delete_vlan(&self, uuid: &str) -> Result<()>;

    fn get_vlan(&self, uuid: &str) -> Result<Vlan> {
        self.list_vlans()?
            .into_iter()
            .find(|v| v.uuid == uuid)
            .ok_or_else(|| ConfigError::not_found(ResourceKind::Vlan, uuid))
    }

    fn list_firewall_rules(&self) -> Result<Vec<FirewallRule>> {
        Err(ConfigError::not_implemented(self.name(), "list_firewall_rules"))
    }

    fn create_firewall_rule(&self, _new: &NewFirewallRule) -> Result<FirewallRule> {
        Err(ConfigError::not_implemented(self.name(), "create_firewall_rule"))
    }

    fn update_firewall_rule(&self, _uuid: &str, _patch: &FirewallRulePatch) -> Result<FirewallRule> {
        Err(ConfigError::not_implemented(self.name(), "update_firewall_rule"))
    }

    fn delete_firewall_rule(&self, _uuid: &str) -> Result<()> {
        Err(ConfigError::not_implemented(self.name(), "delete_firewall_rule"))
    }

    fn get_firewall_rule(&self, uuid: &str) -> Result<FirewallRule> {
        self.list_firewall_rules()?
            .into_iter()
            .find(|r| r.uuid == uuid)
            .ok_or_else(|| ConfigError::not_found(ResourceKind::FirewallRule, uuid))
    }

    fn list_port_forwards(&self) -> Result<Vec<PortForward>> {
        Err(ConfigError::not_implemented(self.name(), "list_port_forwards"))
    }

    fn create_port_forward(&self, _new: &NewPortForward) -> Result<PortForward> {
        Err(ConfigError::not_implemented(self.name(), "create_port_forward"))
    }

    fn update_port_forward(&self, _uuid: &str, _patch: &PortForwardPatch) -> Result<PortForward> {
        Err(ConfigError::not_implemented(self.name(), "update_port_forward"))
    }

    fn delete_port_forward(&self, _uuid: &str) -> Result<()> {
        Err(ConfigError::not_implemented(self.name(), "delete_port_forward"))
    }

    fn get_port_forward(&self, uuid: &str) -> Result<PortForward> {
        self.list_port_forwards()?
            .into_iter()
            .find(|f| f.uuid == uuid)
            .ok_or_else(|| ConfigError::not_found(ResourceKind::PortForward, uuid))
    }

    fn list_dhcp_configs(&self) -> Result<Vec<DhcpConfig>> {
        Err(ConfigError::not_implemented(self.name(), "list_dhcp_configs"))
    }

    fn create_dhcp_config(&self, _new: &NewDhcpConfig) -> Result<DhcpConfig> {
        Err(ConfigError::not_implemented(self.name(), "create_dhcp_config"))
    }

    fn update_dhcp_config(&self, _interface: &str, _patch: &DhcpConfigPatch) -> Result<DhcpConfig> {
        Err(ConfigError::not_implemented(self.name(), "update_dhcp_config"))
    }

    fn delete_dhcp_config(&self, _interface: &str) -> Result<()> {
        Err(ConfigError::not_implemented(self.name(), "delete_dhcp_config"))
    }

    fn get_dhcp_config(&self, interface: &str) -> Result<DhcpConfig> {
        self.list_dhcp_configs()?
            .into_iter()
            .find(|c| c.interface == interface)
            .ok_or_else(|| ConfigError::not_found(ResourceKind::DhcpConfig, interface))
    }

    fn list_static_mappings(&self, _interface: &str) -> Result<Vec<StaticMapping>> {
        Err(ConfigError::not_implemented(self.name(), "list_static_mappings"))
    }

    fn create_static_mapping(
        &self,
        _interface: &str,
        _new: &NewStaticMapping,
    ) -> Result<StaticMapping> {
        Err(ConfigError::not_implemented(self.name(), "create_static_mapping"))
    }

    fn update_static_mapping(
        &self,
        _interface: &str,
        _uuid: &str,
        _patch: &StaticMappingPatch,
    ) -> Result<StaticMapping> {
        Err(ConfigError::not_implemented(self.name(), "update_static_mapping"))
    }

    fn delete_static_mapping(&self, _interface: &str, _uuid: &str) -> Result<()> {
        Err(ConfigError::not_implemented(self.name(), "delete_static_mapping"))
    }

    fn get_static_mapping(&self, interface: &str, uuid: &str) -> Result<StaticMapping> {
        self.list_static_mappings(interface)?
            .into_iter()
            .find(|m| m.uuid == uuid)
            .ok_or_else(|| ConfigError::not_found(ResourceKind::StaticMapping, uuid))
    }

    fn list_dhcp_leases(&self, _interface: &str) -> Result<Vec<DhcpLease>> {
        Err(ConfigError::not_implemented(self.name(), "list_dhcp_leases"))
    }

    fn apply_firewall_changes(&self) -> Result<ApplyStatus> {
        Err(ConfigError::not_implemented(self.name(), "apply_firewall_changes"))
    }

    fn apply_dhcp_changes(&self) -> Result<ApplyStatus> {
        Err(ConfigError::not_implemented(self.name(), "apply_dhcp_changes"))
    }
}
