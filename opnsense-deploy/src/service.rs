//! Configuration service: the single entry point for resource operations.
//!
//! The service owns exactly one backend, chosen once from settings, validates
//! every input before it reaches that backend, and reports `NotConfigured` for
//! every call when no backend was selected.

use tracing::{debug, info};

use crate::backend::{ApplyStatus, ConfigBackend, DocumentBackend, RemoteBackend};
use crate::error::{ConfigError, Result};
use crate::model::{
    DhcpConfig, DhcpConfigPatch, DhcpLease, FirewallRule, FirewallRulePatch, Interface,
    InterfacePatch, NewDhcpConfig, NewFirewallRule, NewInterface, NewPortForward,
    NewStaticMapping, NewVlan, PortForward, PortForwardPatch, StaticMapping, StaticMappingPatch,
    Vlan, VlanPatch,
};
use crate::settings::BackendChoice;
use crate::validate;

pub struct ConfigService {
    backend: Option<Box<dyn ConfigBackend>>,
}

impl ConfigService {
    pub fn new(backend: Box<dyn ConfigBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A service with no backend; every operation fails with `NotConfigured`.
    pub fn inert() -> Self {
        Self { backend: None }
    }

    pub fn from_choice(choice: &BackendChoice) -> Result<Self> {
        match choice {
            BackendChoice::Remote(remote) => {
                info!(url = %remote.url, "using remote API backend");
                Ok(Self::new(Box::new(RemoteBackend::new(remote)?)))
            }
            BackendChoice::Document { path, backup } => {
                info!(path = %path.display(), "using configuration document backend");
                let backend = DocumentBackend::new(path.clone());
                let backend = if *backup {
                    backend
                } else {
                    backend.without_backup()
                };
                Ok(Self::new(Box::new(backend)))
            }
            BackendChoice::None => {
                debug!("no configuration backend selected");
                Ok(Self::inert())
            }
        }
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend.as_deref().map(|b| b.name())
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> Result<&dyn ConfigBackend> {
        self.backend.as_deref().ok_or(ConfigError::NotConfigured)
    }

    // --- interfaces -------------------------------------------------------------

    pub fn list_interfaces(&self) -> Result<Vec<Interface>> {
        self.backend()?.list_interfaces()
    }

    pub fn get_interface(&self, name: &str) -> Result<Interface> {
        self.backend()?.get_interface(name)
    }

    pub fn create_interface(&self, new: NewInterface) -> Result<Interface> {
        let backend = self.backend()?;
        backend.create_interface(&new.validated()?)
    }

    pub fn update_interface(&self, name: &str, patch: InterfacePatch) -> Result<Interface> {
        let backend = self.backend()?;
        backend.update_interface(name, &patch.validated()?)
    }

    pub fn delete_interface(&self, name: &str) -> Result<()> {
        self.backend()?.delete_interface(name)
    }

    // --- vlans ------------------------------------------------------------------

    pub fn list_vlans(&self) -> Result<Vec<Vlan>> {
        self.backend()?.list_vlans()
    }

    pub fn get_vlan(&self, uuid: &str) -> Result<Vlan> {
        self.backend()?.get_vlan(uuid)
    }

    pub fn create_vlan(&self, new: NewVlan) -> Result<Vlan> {
        let backend = self.backend()?;
        backend.create_vlan(&new.validated()?)
    }

    pub fn update_vlan(&self, uuid: &str, patch: VlanPatch) -> Result<Vlan> {
        let backend = self.backend()?;
        backend.update_vlan(uuid, &patch.validated()?)
    }

    pub fn delete_vlan(&self, uuid: &str) -> Result<()> {
        self.backend()?.delete_vlan(uuid)
    }

    // --- firewall rules ---------------------------------------------------------

    pub fn list_firewall_rules(&self, interface: Option<&str>) -> Result<Vec<FirewallRule>> {
        let rules = self.backend()?.list_firewall_rules()?;
        Ok(match interface {
            Some(iface) => rules.into_iter().filter(|r| r.interface == iface).collect(),
            None => rules,
        })
    }

    pub fn get_firewall_rule(&self, uuid: &str) -> Result<FirewallRule> {
        self.backend()?.get_firewall_rule(uuid)
    }

    pub fn create_firewall_rule(&self, new: NewFirewallRule) -> Result<FirewallRule> {
        let backend = self.backend()?;
        backend.create_firewall_rule(&new.validated()?)
    }

    pub fn update_firewall_rule(
        &self,
        uuid: &str,
        patch: FirewallRulePatch,
    ) -> Result<FirewallRule> {
        let backend = self.backend()?;
        backend.update_firewall_rule(uuid, &patch.validated()?)
    }

    pub fn delete_firewall_rule(&self, uuid: &str) -> Result<()> {
        self.backend()?.delete_firewall_rule(uuid)
    }

    // --- port forwards ----------------------------------------------------------

    pub fn list_port_forwards(&self, interface: Option<&str>) -> Result<Vec<PortForward>> {
        let forwards = self.backend()?.list_port_forwards()?;
        Ok(match interface {
            Some(iface) => forwards
                .into_iter()
                .filter(|f| f.interface == iface)
                .collect(),
            None => forwards,
        })
    }

    pub fn get_port_forward(&self, uuid: &str) -> Result<PortForward> {
        self.backend()?.get_port_forward(uuid)
    }

    pub fn create_port_forward(&self, new: NewPortForward) -> Result<PortForward> {
        let backend = self.backend()?;
        backend.create_port_forward(&new.validated()?)
    }

    pub fn update_port_forward(&self, uuid: &str, patch: PortForwardPatch) -> Result<PortForward> {
        let backend = self.backend()?;
        backend.update_port_forward(uuid, &patch.validated()?)
    }

    pub fn delete_port_forward(&self, uuid: &str) -> Result<()> {
        self.backend()?.delete_port_forward(uuid)
    }

    // --- dhcp -------------------------------------------------------------------

    /// Backend for an operation keyed by a logical interface name.
    fn dhcp_backend(&self, interface: &str) -> Result<&dyn ConfigBackend> {
        let backend = self.backend()?;
        validate::element_name("interface", interface)?;
        Ok(backend)
    }

    pub fn list_dhcp_configs(&self) -> Result<Vec<DhcpConfig>> {
        self.backend()?.list_dhcp_configs()
    }

    pub fn get_dhcp_config(&self, interface: &str) -> Result<DhcpConfig> {
        self.dhcp_backend(interface)?.get_dhcp_config(interface)
    }

    pub fn create_dhcp_config(&self, new: NewDhcpConfig) -> Result<DhcpConfig> {
        let backend = self.backend()?;
        backend.create_dhcp_config(&new.validated()?)
    }

    pub fn update_dhcp_config(&self, interface: &str, patch: DhcpConfigPatch) -> Result<DhcpConfig> {
        let backend = self.dhcp_backend(interface)?;
        backend.update_dhcp_config(interface, &patch.validated()?)
    }

    pub fn delete_dhcp_config(&self, interface: &str) -> Result<()> {
        self.dhcp_backend(interface)?.delete_dhcp_config(interface)
    }

    pub fn list_static_mappings(&self, interface: &str) -> Result<Vec<StaticMapping>> {
        self.dhcp_backend(interface)?.list_static_mappings(interface)
    }

    pub fn get_static_mapping(&self, interface: &str, uuid: &str) -> Result<StaticMapping> {
        self.dhcp_backend(interface)?.get_static_mapping(interface, uuid)
    }

    pub fn create_static_mapping(
        &self,
        interface: &str,
        new: NewStaticMapping,
    ) -> Result<StaticMapping> {
        let backend = self.dhcp_backend(interface)?;
        backend.create_static_mapping(interface, &new.validated()?)
    }

    pub fn update_static_mapping(
        &self,
        interface: &str,
        uuid: &str,
        patch: StaticMappingPatch,
    ) -> Result<StaticMapping> {
        let backend = self.dhcp_backend(interface)?;
        backend.update_static_mapping(interface, uuid, &patch.validated()?)
    }

    pub fn delete_static_mapping(&self, interface: &str, uuid: &str) -> Result<()> {
        self.dhcp_backend(interface)?.delete_static_mapping(interface, uuid)
    }

    pub fn list_dhcp_leases(&self, interface: &str) -> Result<Vec<DhcpLease>> {
        self.dhcp_backend(interface)?.list_dhcp_leases(interface)
    }

    // --- apply ------------------------------------------------------------------

    pub fn apply_firewall_changes(&self) -> Result<ApplyStatus> {
        self.backend()?.apply_firewall_changes()
    }

    pub fn apply_dhcp_changes(&self) -> Result<ApplyStatus> {
        self.backend()?.apply_dhcp_changes()
    }

    /// Firewall then DHCP. Stops at the first failure.
    pub fn apply_pending_changes(&self) -> Result<ApplyStatus> {
        let firewall = self.apply_firewall_changes()?;
        let dhcp = self.apply_dhcp_changes()?;
        Ok(ApplyStatus {
            success: firewall.success && dhcp.success,
            message: format!("{}; {}", firewall.message, dhcp.message),
        })
    }
}
