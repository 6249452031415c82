//! Backend over an on-disk OPNsense `config.xml`.
//!
//! The document is re-read for every operation, so edits made by other tools are
//! always seen. Mutations run load, stamp identifiers, mutate, back up and save
//! under one lock, and the save is an atomic rename.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};
use xml_tree_core::{parse_file, write_file, XmlNode};

use super::{ApplyStatus, ConfigBackend};
use crate::error::{ConfigError, Result};
use crate::model::{
    DhcpConfig, DhcpConfigPatch, FirewallRule, FirewallRulePatch, Interface, InterfacePatch,
    NewDhcpConfig, NewFirewallRule, NewInterface, NewPortForward, NewStaticMapping, NewVlan,
    PortForward, PortForwardPatch, ResourceKind, StaticMapping, StaticMappingPatch, Vlan,
    VlanPatch,
};
use crate::validate;

mod codec;

use codec::{DHCPD, FILTER, INTERFACES, NAT, RULE, STATICMAP, VLAN, VLANS};

pub struct DocumentBackend {
    path: PathBuf,
    backup: bool,
    write_lock: Mutex<()>,
}

impl DocumentBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup: true,
            write_lock: Mutex::new(()),
        }
    }

    /// Skip the `.bak` copy taken before each save.
    pub fn without_backup(mut self) -> Self {
        self.backup = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".bak");
        PathBuf::from(name)
    }

    fn load(&self) -> Result<XmlNode> {
        parse_file(&self.path).map_err(|source| ConfigError::DocumentRead {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn save(&self, root: &XmlNode) -> Result<()> {
        if self.backup && self.path.exists() {
            let backup = self.backup_path();
            fs::copy(&self.path, &backup).map_err(|source| ConfigError::DocumentBackup {
                path: backup.display().to_string(),
                source,
            })?;
        }
        write_file(root, &self.path).map_err(|source| ConfigError::DocumentWrite {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!("saved {}", self.path.display());
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&XmlNode) -> T) -> Result<T> {
        let root = self.load()?;
        Ok(f(&root))
    }

    /// One load-mutate-save cycle. Nothing is written when `f` fails.
    fn mutate<T>(&self, f: impl FnOnce(&mut XmlNode) -> Result<T>) -> Result<T> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut root = self.load()?;
        codec::stamp_identifiers(&mut root);
        let out = f(&mut root)?;
        self.save(&root)?;
        Ok(out)
    }
}

/// Children of `section` with `tag`, paired with their index among same-tag siblings.
fn tagged<'a>(root: &'a XmlNode, section: &str, tag: &'a str) -> Vec<(usize, &'a XmlNode)> {
    root.get_child(section)
        .map(|s| s.children.iter().filter(|c| c.tag == tag).enumerate().collect())
        .unwrap_or_default()
}

/// Position (within all children of `section`) of the first `tag` child matching `pred`.
fn find_tagged<F>(root: &XmlNode, section: &str, tag: &str, pred: F) -> Option<usize>
where
    F: Fn(usize, &XmlNode) -> bool,
{
    let parent = root.get_child(section)?;
    let mut ordinal = 0;
    for (pos, child) in parent.children.iter().enumerate() {
        if child.tag != tag {
            continue;
        }
        if pred(ordinal, child) {
            return Some(pos);
        }
        ordinal += 1;
    }
    None
}

fn section_mut<'a>(root: &'a mut XmlNode, section: &str) -> &'a mut XmlNode {
    root.get_or_create_child(section)
}

fn same_mac(a: &str, b: &str) -> bool {
    match (
        validate::normalize_mac("mac", a),
        validate::normalize_mac("mac", b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.eq_ignore_ascii_case(b),
    }
}

impl ConfigBackend for DocumentBackend {
    fn name(&self) -> &'static str {
        "document"
    }

    // --- interfaces -----------------------------------------------------------

    fn list_interfaces(&self) -> Result<Vec<Interface>> {
        self.read(|root| {
            root.get_child(INTERFACES)
                .map(|s| s.children.iter().map(codec::decode_interface).collect())
                .unwrap_or_default()
        })
    }

    fn create_interface(&self, new: &NewInterface) -> Result<Interface> {
        let interface = self.mutate(|root| {
            let section = section_mut(root, INTERFACES);
            if section.get_child(&new.name).is_some() {
                return Err(ConfigError::already_exists(
                    ResourceKind::Interface,
                    &new.name,
                ));
            }
            let interface = Interface::from_new(codec::new_uuid(), new);
            section.children.push(codec::encode_interface(&interface));
            Ok(interface)
        })?;
        info!(name = %interface.name, "created interface");
        Ok(interface)
    }

    fn update_interface(&self, name: &str, patch: &InterfacePatch) -> Result<Interface> {
        self.mutate(|root| {
            let node = root
                .get_child_mut(INTERFACES)
                .and_then(|s| s.get_child_mut(name))
                .ok_or_else(|| ConfigError::not_found(ResourceKind::Interface, name))?;
            codec::patch_interface(node, patch);
            Ok(codec::decode_interface(node))
        })
    }

    fn delete_interface(&self, name: &str) -> Result<()> {
        self.mutate(|root| {
            let section = root
                .get_child_mut(INTERFACES)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::Interface, name))?;
            let pos = section
                .position(|c| c.tag == name)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::Interface, name))?;
            section.remove_child_at(pos);
            Ok(())
        })?;
        info!(name, "deleted interface");
        Ok(())
    }

    // --- vlans ----------------------------------------------------------------

    fn list_vlans(&self) -> Result<Vec<Vlan>> {
        self.read(|root| {
            tagged(root, VLANS, VLAN)
                .into_iter()
                .map(|(_, node)| codec::decode_vlan(node))
                .collect()
        })
    }

    fn create_vlan(&self, new: &NewVlan) -> Result<Vlan> {
        let vlan = self.mutate(|root| {
            let duplicate = tagged(root, VLANS, VLAN).into_iter().any(|(_, node)| {
                let existing = codec::decode_vlan(node);
                existing.parent == new.parent && existing.tag == new.tag
            });
            if duplicate {
                return Err(ConfigError::already_exists(
                    ResourceKind::Vlan,
                    format!("{}:{}", new.parent, new.tag),
                ));
            }
            let vlan = Vlan::from_new(codec::new_uuid(), new);
            section_mut(root, VLANS)
                .children
                .push(codec::encode_vlan(&vlan));
            Ok(vlan)
        })?;
        info!(uuid = %vlan.uuid, vlanif = %vlan.vlanif, "created VLAN");
        Ok(vlan)
    }

    fn update_vlan(&self, uuid: &str, patch: &VlanPatch) -> Result<Vlan> {
        self.mutate(|root| {
            let pos = find_tagged(root, VLANS, VLAN, |_, n| codec::vlan_uuid(n) == uuid)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::Vlan, uuid))?;
            let current = root
                .get_child(VLANS)
                .map(|s| codec::decode_vlan(&s.children[pos]))
                .ok_or_else(|| ConfigError::not_found(ResourceKind::Vlan, uuid))?;

            let parent = patch.parent.as_deref().unwrap_or(&current.parent);
            let tag = patch.tag.unwrap_or(current.tag);
            let collides = tagged(root, VLANS, VLAN).into_iter().any(|(_, node)| {
                let other = codec::decode_vlan(node);
                other.uuid != uuid && other.parent == parent && other.tag == tag
            });
            if collides {
                return Err(ConfigError::already_exists(
                    ResourceKind::Vlan,
                    format!("{parent}:{tag}"),
                ));
            }

            let node = &mut section_mut(root, VLANS).children[pos];
            codec::patch_vlan(node, patch);
            Ok(codec::decode_vlan(node))
        })
    }

    fn delete_vlan(&self, uuid: &str) -> Result<()> {
        self.mutate(|root| {
            let pos = find_tagged(root, VLANS, VLAN, |_, n| codec::vlan_uuid(n) == uuid)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::Vlan, uuid))?;
            section_mut(root, VLANS).remove_child_at(pos);
            Ok(())
        })?;
        info!(uuid, "deleted VLAN");
        Ok(())
    }

    // --- firewall rules -------------------------------------------------------

    fn list_firewall_rules(&self) -> Result<Vec<FirewallRule>> {
        self.read(|root| {
            tagged(root, FILTER, RULE)
                .into_iter()
                .map(|(idx, node)| codec::decode_rule(node, idx))
                .collect()
        })
    }

    fn create_firewall_rule(&self, new: &NewFirewallRule) -> Result<FirewallRule> {
        let rule = self.mutate(|root| {
            let rule = FirewallRule::from_new(codec::new_uuid(), new);
            section_mut(root, FILTER)
                .children
                .push(codec::encode_rule(&rule));
            Ok(rule)
        })?;
        info!(uuid = %rule.uuid, interface = %rule.interface, "created firewall rule");
        Ok(rule)
    }

    fn update_firewall_rule(&self, uuid: &str, patch: &FirewallRulePatch) -> Result<FirewallRule> {
        self.mutate(|root| {
            let pos = find_tagged(root, FILTER, RULE, |idx, n| codec::rule_uuid(n, idx) == uuid)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::FirewallRule, uuid))?;
            let node = &mut section_mut(root, FILTER).children[pos];
            codec::patch_rule(node, patch);
            Ok(codec::decode_rule(node, 0))
        })
    }

    fn delete_firewall_rule(&self, uuid: &str) -> Result<()> {
        self.mutate(|root| {
            let pos = find_tagged(root, FILTER, RULE, |idx, n| codec::rule_uuid(n, idx) == uuid)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::FirewallRule, uuid))?;
            section_mut(root, FILTER).remove_child_at(pos);
            Ok(())
        })?;
        info!(uuid, "deleted firewall rule");
        Ok(())
    }

    // --- port forwards --------------------------------------------------------

    fn list_port_forwards(&self) -> Result<Vec<PortForward>> {
        self.read(|root| {
            tagged(root, NAT, RULE)
                .into_iter()
                .map(|(idx, node)| codec::decode_forward(node, idx))
                .collect()
        })
    }

    fn create_port_forward(&self, new: &NewPortForward) -> Result<PortForward> {
        let forward = self.mutate(|root| {
            let forward = PortForward::from_new(codec::new_uuid(), new);
            section_mut(root, NAT)
                .children
                .push(codec::encode_forward(&forward));
            Ok(forward)
        })?;
        info!(
            uuid = %forward.uuid,
            "created port forward {}/{} -> {}:{}",
            forward.src_port, forward.protocol, forward.dst_ip, forward.dst_port
        );
        Ok(forward)
    }

    fn update_port_forward(&self, uuid: &str, patch: &PortForwardPatch) -> Result<PortForward> {
        self.mutate(|root| {
            let pos = find_tagged(root, NAT, RULE, |idx, n| codec::forward_uuid(n, idx) == uuid)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::PortForward, uuid))?;
            let node = &mut section_mut(root, NAT).children[pos];
            codec::patch_forward(node, patch);
            Ok(codec::decode_forward(node, 0))
        })
    }

    fn delete_port_forward(&self, uuid: &str) -> Result<()> {
        self.mutate(|root| {
            let pos = find_tagged(root, NAT, RULE, |idx, n| codec::forward_uuid(n, idx) == uuid)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::PortForward, uuid))?;
            section_mut(root, NAT).remove_child_at(pos);
            Ok(())
        })?;
        info!(uuid, "deleted port forward");
        Ok(())
    }

    // --- dhcp -----------------------------------------------------------------

    fn list_dhcp_configs(&self) -> Result<Vec<DhcpConfig>> {
        self.read(|root| {
            root.get_child(DHCPD)
                .map(|s| s.children.iter().map(codec::decode_dhcp).collect())
                .unwrap_or_default()
        })
    }

    fn create_dhcp_config(&self, new: &NewDhcpConfig) -> Result<DhcpConfig> {
        self.mutate(|root| {
            let section = section_mut(root, DHCPD);
            if section.get_child(&new.interface).is_some() {
                return Err(ConfigError::already_exists(
                    ResourceKind::DhcpConfig,
                    &new.interface,
                ));
            }
            let config = DhcpConfig::from_new(codec::new_uuid(), new);
            section.children.push(codec::encode_dhcp(&config));
            Ok(config)
        })
    }

    fn update_dhcp_config(&self, interface: &str, patch: &DhcpConfigPatch) -> Result<DhcpConfig> {
        self.mutate(|root| {
            let node = root
                .get_child_mut(DHCPD)
                .and_then(|s| s.get_child_mut(interface))
                .ok_or_else(|| ConfigError::not_found(ResourceKind::DhcpConfig, interface))?;
            codec::patch_dhcp(node, patch);
            Ok(codec::decode_dhcp(node))
        })
    }

    fn delete_dhcp_config(&self, interface: &str) -> Result<()> {
        self.mutate(|root| {
            let section = root
                .get_child_mut(DHCPD)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::DhcpConfig, interface))?;
            let pos = section
                .position(|c| c.tag == interface)
                .ok_or_else(|| ConfigError::not_found(ResourceKind::DhcpConfig, interface))?;
            section.remove_child_at(pos);
            Ok(())
        })
    }

    fn list_static_mappings(&self, interface: &str) -> Result<Vec<StaticMapping>> {
        self.read(|root| {
            root.get_child(DHCPD)
                .and_then(|s| s.get_child(interface))
                .map(|config| {
                    config
                        .get_children(STATICMAP)
                        .into_iter()
                        .map(|node| codec::decode_static_mapping(node, interface))
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    fn create_static_mapping(
        &self,
        interface: &str,
        new: &NewStaticMapping,
    ) -> Result<StaticMapping> {
        let mapping = self.mutate(|root| {
            let config = section_mut(root, DHCPD).get_or_create_child(interface);
            for node in config.get_children(STATICMAP) {
                let existing = codec::decode_static_mapping(node, interface);
                if same_mac(&existing.mac, &new.mac) {
                    return Err(ConfigError::already_exists(
                        ResourceKind::StaticMapping,
                        format!("{interface}:{}", new.mac),
                    ));
                }
                if validate::same_ipv4(&existing.ipaddr, &new.ipaddr) {
                    return Err(ConfigError::already_exists(
                        ResourceKind::StaticMapping,
                        format!("{interface}:{}", new.ipaddr),
                    ));
                }
            }
            let mapping = StaticMapping::from_new(codec::new_uuid(), interface, new);
            config.children.push(codec::encode_static_mapping(&mapping));
            Ok(mapping)
        })?;
        info!(
            interface,
            uuid = %mapping.uuid,
            "created static mapping {} -> {}", mapping.mac, mapping.ipaddr
        );
        Ok(mapping)
    }

    fn update_static_mapping(
        &self,
        interface: &str,
        uuid: &str,
        patch: &StaticMappingPatch,
    ) -> Result<StaticMapping> {
        self.mutate(|root| {
            let config = root
                .get_child_mut(DHCPD)
                .and_then(|s| s.get_child_mut(interface))
                .ok_or_else(|| ConfigError::not_found(ResourceKind::StaticMapping, uuid))?;
            let pos = config
                .position(|c| {
                    c.tag == STATICMAP && codec::static_mapping_uuid(c, interface) == uuid
                })
                .ok_or_else(|| ConfigError::not_found(ResourceKind::StaticMapping, uuid))?;

            for (idx, other) in config.children.iter().enumerate() {
                if idx == pos || other.tag != STATICMAP {
                    continue;
                }
                let other = codec::decode_static_mapping(other, interface);
                let mac_taken = patch.mac.as_deref().is_some_and(|m| same_mac(m, &other.mac));
                let ip_taken = patch
                    .ipaddr
                    .as_deref()
                    .is_some_and(|ip| validate::same_ipv4(ip, &other.ipaddr));
                if mac_taken || ip_taken {
                    return Err(ConfigError::already_exists(
                        ResourceKind::StaticMapping,
                        format!("{interface}:{}", other.uuid),
                    ));
                }
            }

            let node = &mut config.children[pos];
            codec::patch_static_mapping(node, patch);
            Ok(codec::decode_static_mapping(node, interface))
        })
    }

    fn delete_static_mapping(&self, interface: &str, uuid: &str) -> Result<()> {
        self.mutate(|root| {
            let config = root
                .get_child_mut(DHCPD)
                .and_then(|s| s.get_child_mut(interface))
                .ok_or_else(|| ConfigError::not_found(ResourceKind::StaticMapping, uuid))?;
            let pos = config
                .position(|c| {
                    c.tag == STATICMAP && codec::static_mapping_uuid(c, interface) == uuid
                })
                .ok_or_else(|| ConfigError::not_found(ResourceKind::StaticMapping, uuid))?;
            config.remove_child_at(pos);
            Ok(())
        })?;
        info!(interface, uuid, "deleted static mapping");
        Ok(())
    }

    // --- apply ----------------------------------------------------------------

    fn apply_firewall_changes(&self) -> Result<ApplyStatus> {
        Ok(ApplyStatus::ok(
            "firewall changes saved; the appliance applies them on reload",
        ))
    }

    fn apply_dhcp_changes(&self) -> Result<ApplyStatus> {
        Ok(ApplyStatus::ok(
            "DHCP changes saved; the appliance applies them on reload",
        ))
    }
}
