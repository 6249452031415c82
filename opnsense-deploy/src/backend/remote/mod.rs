//! Backend over the appliance's remote management API.
//!
//! Calls are synchronous with a fixed per-request timeout. The service never
//! retries; a transport failure surfaces as `BackendUnavailable` on the first try.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use super::{ApplyStatus, ConfigBackend};
use crate::error::{ConfigError, Result};
use crate::model::{
    DhcpConfig, DhcpConfigPatch, DhcpLease, FirewallRule, FirewallRulePatch, Interface,
    InterfacePatch, NewDhcpConfig, NewFirewallRule, NewInterface, NewPortForward,
    NewStaticMapping, NewVlan, PortForward, PortForwardPatch, ResourceKind, StaticMapping,
    StaticMappingPatch, Vlan, VlanPatch,
};
use crate::settings::RemoteSettings;

mod client;
mod wire;

use client::{expect_result, ApiClient};

pub struct RemoteBackend {
    api: ApiClient,
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ConfigError::RemoteRejected {
        message: format!("unexpected {what} response: {e}"),
    })
}

/// Identifier the remote assigned on creation.
fn created_uuid(resp: &Value) -> Result<String> {
    expect_result(resp, "saved")?;
    resp.get("uuid")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::RemoteRejected {
            message: format!("create response carried no uuid: {resp}"),
        })
}

fn expect_status_ok(resp: &Value, what: &str) -> Result<ApplyStatus> {
    let status = resp.get("status").and_then(Value::as_str).unwrap_or_default();
    if status.eq_ignore_ascii_case("ok") {
        return Ok(ApplyStatus::ok(format!("{what} changes applied")));
    }
    Err(ConfigError::RemoteRejected {
        message: resp
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| resp.to_string()),
    })
}

impl RemoteBackend {
    pub fn new(settings: &RemoteSettings) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(settings)?,
        })
    }
}

impl ConfigBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    // --- interfaces -----------------------------------------------------------

    fn list_interfaces(&self) -> Result<Vec<Interface>> {
        let list: wire::InterfaceList =
            decode(self.api.get(&["interfaces"], None)?, "interfaces")?;
        Ok(list
            .interfaces
            .into_iter()
            .map(|(name, w)| w.into_record(name))
            .collect())
    }

    fn create_interface(&self, new: &NewInterface) -> Result<Interface> {
        let body = wire::interface_body(Some(new.name.as_str()), &InterfacePatch::from(new));
        expect_result(&self.api.post(&["interfaces"], &body)?, "saved")?;
        info!(name = %new.name, "created interface");
        self.get_interface(&new.name)
    }

    fn update_interface(&self, name: &str, patch: &InterfacePatch) -> Result<Interface> {
        let body = wire::interface_body(None, patch);
        let path = ["interfaces", name];
        let resp = self
            .api
            .put(&path, &body, Some((ResourceKind::Interface, name)))?;
        expect_result(&resp, "saved")?;
        self.get_interface(name)
    }

    fn delete_interface(&self, name: &str) -> Result<()> {
        let path = ["interfaces", name];
        let resp = self
            .api
            .delete(&path, Some((ResourceKind::Interface, name)))?;
        expect_result(&resp, "deleted")
    }

    // --- vlans ----------------------------------------------------------------

    fn list_vlans(&self) -> Result<Vec<Vlan>> {
        let list: wire::VlanList = decode(self.api.get(&["vlans"], None)?, "vlans")?;
        Ok(list.vlans.into_iter().map(Vlan::from).collect())
    }

    fn create_vlan(&self, new: &NewVlan) -> Result<Vlan> {
        let patch = VlanPatch {
            parent: Some(new.parent.clone()),
            tag: Some(new.tag),
            description: Some(new.description.clone()),
            pcp: Some(new.pcp),
        };
        let resp = self.api.post(&["vlans"], &wire::vlan_body(&patch, None))?;
        let vlan = Vlan::from_new(created_uuid(&resp)?, new);
        info!(uuid = %vlan.uuid, vlanif = %vlan.vlanif, "created VLAN");
        Ok(vlan)
    }

    fn update_vlan(&self, uuid: &str, patch: &VlanPatch) -> Result<Vlan> {
        let current = self.get_vlan(uuid)?;
        let path = ["vlans", uuid];
        let resp = self.api.put(
            &path,
            &wire::vlan_body(patch, Some(&current)),
            Some((ResourceKind::Vlan, uuid)),
        )?;
        expect_result(&resp, "saved")?;
        self.get_vlan(uuid)
    }

    fn delete_vlan(&self, uuid: &str) -> Result<()> {
        let path = ["vlans", uuid];
        let resp = self.api.delete(&path, Some((ResourceKind::Vlan, uuid)))?;
        expect_result(&resp, "deleted")
    }

    // --- firewall rules -------------------------------------------------------

    fn list_firewall_rules(&self) -> Result<Vec<FirewallRule>> {
        let list: wire::RuleList =
            decode(self.api.get(&["firewall", "rules"], None)?, "rules")?;
        Ok(list.rules.into_iter().map(FirewallRule::from).collect())
    }

    fn create_firewall_rule(&self, new: &NewFirewallRule) -> Result<FirewallRule> {
        let body = wire::rule_body(&FirewallRulePatch::from(new));
        let resp = self.api.post(&["firewall", "rules"], &body)?;
        Ok(FirewallRule::from_new(created_uuid(&resp)?, new))
    }

    fn update_firewall_rule(&self, uuid: &str, patch: &FirewallRulePatch) -> Result<FirewallRule> {
        let path = ["firewall", "rules", uuid];
        let resp = self.api.put(
            &path,
            &wire::rule_body(patch),
            Some((ResourceKind::FirewallRule, uuid)),
        )?;
        expect_result(&resp, "saved")?;
        self.get_firewall_rule(uuid)
    }

    fn delete_firewall_rule(&self, uuid: &str) -> Result<()> {
        let path = ["firewall", "rules", uuid];
        let resp = self
            .api
            .delete(&path, Some((ResourceKind::FirewallRule, uuid)))?;
        expect_result(&resp, "deleted")
    }

    // --- port forwards --------------------------------------------------------

    fn list_port_forwards(&self) -> Result<Vec<PortForward>> {
        let list: wire::ForwardList =
            decode(self.api.get(&["firewall", "forwards"], None)?, "forwards")?;
        Ok(list.forwards.into_iter().map(PortForward::from).collect())
    }

    fn create_port_forward(&self, new: &NewPortForward) -> Result<PortForward> {
        let body = wire::forward_body(&PortForwardPatch::from(new));
        let resp = self.api.post(&["firewall", "forwards"], &body)?;
        Ok(PortForward::from_new(created_uuid(&resp)?, new))
    }

    fn update_port_forward(&self, uuid: &str, patch: &PortForwardPatch) -> Result<PortForward> {
        let path = ["firewall", "forwards", uuid];
        let resp = self.api.put(
            &path,
            &wire::forward_body(patch),
            Some((ResourceKind::PortForward, uuid)),
        )?;
        expect_result(&resp, "saved")?;
        self.get_port_forward(uuid)
    }

    fn delete_port_forward(&self, uuid: &str) -> Result<()> {
        let path = ["firewall", "forwards", uuid];
        let resp = self
            .api
            .delete(&path, Some((ResourceKind::PortForward, uuid)))?;
        expect_result(&resp, "deleted")
    }

    // --- dhcp -----------------------------------------------------------------

    fn list_dhcp_configs(&self) -> Result<Vec<DhcpConfig>> {
        let list: wire::DhcpList = decode(self.api.get(&["dhcp"], None)?, "dhcp")?;
        Ok(list
            .dhcp
            .into_iter()
            .map(|(iface, w)| w.into_record(iface))
            .collect())
    }

    fn create_dhcp_config(&self, new: &NewDhcpConfig) -> Result<DhcpConfig> {
        let body = wire::dhcp_body(Some(new.interface.as_str()), &DhcpConfigPatch::from(new));
        expect_result(&self.api.post(&["dhcp"], &body)?, "saved")?;
        self.get_dhcp_config(&new.interface)
    }

    fn update_dhcp_config(&self, interface: &str, patch: &DhcpConfigPatch) -> Result<DhcpConfig> {
        let path = ["dhcp", interface];
        let resp = self.api.put(
            &path,
            &wire::dhcp_body(None, patch),
            Some((ResourceKind::DhcpConfig, interface)),
        )?;
        expect_result(&resp, "saved")?;
        self.get_dhcp_config(interface)
    }

    fn delete_dhcp_config(&self, interface: &str) -> Result<()> {
        let path = ["dhcp", interface];
        let resp = self
            .api
            .delete(&path, Some((ResourceKind::DhcpConfig, interface)))?;
        expect_result(&resp, "deleted")
    }

    fn list_static_mappings(&self, interface: &str) -> Result<Vec<StaticMapping>> {
        let path = ["dhcp", interface, "staticmaps"];
        let list: wire::StaticMapList = decode(
            self.api
                .get(&path, Some((ResourceKind::DhcpConfig, interface)))?,
            "staticmaps",
        )?;
        Ok(list
            .staticmaps
            .into_iter()
            .map(|m| m.into_record(interface))
            .collect())
    }

    fn create_static_mapping(
        &self,
        interface: &str,
        new: &NewStaticMapping,
    ) -> Result<StaticMapping> {
        let path = ["dhcp", interface, "staticmaps"];
        let body = wire::static_map_body(&StaticMappingPatch::from(new));
        let resp = self.api.post(&path, &body)?;
        Ok(StaticMapping::from_new(created_uuid(&resp)?, interface, new))
    }

    fn update_static_mapping(
        &self,
        interface: &str,
        uuid: &str,
        patch: &StaticMappingPatch,
    ) -> Result<StaticMapping> {
        let path = ["dhcp", interface, "staticmaps", uuid];
        let resp = self.api.put(
            &path,
            &wire::static_map_body(patch),
            Some((ResourceKind::StaticMapping, uuid)),
        )?;
        expect_result(&resp, "saved")?;
        self.get_static_mapping(interface, uuid)
    }

    fn delete_static_mapping(&self, interface: &str, uuid: &str) -> Result<()> {
        let path = ["dhcp", interface, "staticmaps", uuid];
        let resp = self
            .api
            .delete(&path, Some((ResourceKind::StaticMapping, uuid)))?;
        expect_result(&resp, "deleted")
    }

    fn list_dhcp_leases(&self, interface: &str) -> Result<Vec<DhcpLease>> {
        let path = ["dhcp", interface, "leases"];
        let list: wire::LeaseList = decode(
            self.api
                .get(&path, Some((ResourceKind::DhcpConfig, interface)))?,
            "leases",
        )?;
        Ok(list.leases)
    }

    // --- apply ----------------------------------------------------------------

    fn apply_firewall_changes(&self) -> Result<ApplyStatus> {
        let resp = self
            .api
            .post(&["firewall", "apply"], &Value::Object(Default::default()))?;
        expect_status_ok(&resp, "firewall")
    }

    fn apply_dhcp_changes(&self) -> Result<ApplyStatus> {
        let resp = self.api.post(&["dhcp", "apply"], &Value::Object(Default::default()))?;
        expect_status_ok(&resp, "DHCP")
    }
}
