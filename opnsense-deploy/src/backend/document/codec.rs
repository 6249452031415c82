//! Node <-> record translation for each resource kind.
//!
//! Decoding is tolerant: a document the engine did not write may hold values it
//! cannot interpret, which fall back to defaults instead of failing the whole
//! listing. Patching only touches the children a patch names, so unknown children
//! and attributes survive in place.

use tracing::debug;
use uuid::Uuid;
use xml_tree_core::XmlNode;

use crate::model::{
    derived_vlan_interface, DhcpConfig, DhcpConfigPatch, Endpoint, EndpointTarget, FirewallRule,
    FirewallRulePatch, Interface, InterfacePatch, PortForward, PortForwardPatch, Protocol,
    RawFields, ResourceKind, StaticMapping, StaticMappingPatch, Vlan, VlanPatch,
};

pub(crate) const INTERFACES: &str = "interfaces";
pub(crate) const VLANS: &str = "vlans";
pub(crate) const FILTER: &str = "filter";
pub(crate) const NAT: &str = "nat";
pub(crate) const DHCPD: &str = "dhcpd";
pub(crate) const VLAN: &str = "vlan";
pub(crate) const RULE: &str = "rule";
pub(crate) const STATICMAP: &str = "staticmap";

const UUID: &str = "uuid";

const INTERFACE_FIELDS: &[&str] = &[
    UUID, "if", "descr", "ipaddr", "subnet", "enable", "gateway", "spoofmac", "mtu", "media",
    "mediaopt",
];
const VLAN_FIELDS: &[&str] = &["if", "tag", "pcp", "descr", "vlanif"];
const RULE_FIELDS: &[&str] = &[
    UUID,
    "type",
    "interface",
    "ipprotocol",
    "protocol",
    "source",
    "destination",
    "descr",
    "direction",
    "statetype",
    "gateway",
    "quick",
    "disabled",
];
const FORWARD_FIELDS: &[&str] = &[
    UUID,
    "interface",
    "protocol",
    "source",
    "destination",
    "target",
    "local-port",
    "descr",
    "disabled",
];
const DHCP_FIELDS: &[&str] = &[
    UUID, "enable", "range", "gateway", "dnsserver", "domain", STATICMAP,
];
const STATICMAP_FIELDS: &[&str] = &[
    UUID,
    "mac",
    "ipaddr",
    "hostname",
    "descr",
    "winsserver",
    "dnsserver",
    "ntpserver",
];

/// Stable identifier for a node that was written without one.
pub(crate) fn derived_uuid(kind: ResourceKind, key: &str) -> String {
    let name = format!("{}:{key}", kind.slug());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

pub(crate) fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

fn text(node: &XmlNode, tag: &str) -> String {
    node.child_text(tag).unwrap_or_default().to_string()
}

fn parse_or_default<T>(node: &XmlNode, tag: &str) -> T
where
    T: std::str::FromStr + Default,
{
    let Some(raw) = node.child_text(tag) else {
        return T::default();
    };
    raw.parse().unwrap_or_else(|_| {
        debug!("ignoring unparseable <{}>{}</{}> in <{}>", tag, raw, tag, node.tag);
        T::default()
    })
}

/// Boolean stored as `<tag>1</tag>`; any other value is false.
fn flag(node: &XmlNode, tag: &str) -> bool {
    node.child_text(tag) == Some("1")
}

/// Boolean stored as presence of `<tag>` (e.g. `quick`, `disabled`).
fn present(node: &XmlNode, tag: &str) -> bool {
    node.get_child(tag)
        .is_some_and(|c| c.text.as_deref().map(str::trim) != Some("0"))
}

fn set_flag(node: &mut XmlNode, tag: &str, value: bool) {
    node.set_child_text(tag, if value { "1" } else { "0" });
}

fn set_present(node: &mut XmlNode, tag: &str, value: bool) {
    if value {
        node.set_child_text(tag, "1");
    } else {
        node.remove_children(tag);
    }
}

fn set_opt(node: &mut XmlNode, tag: &str, value: Option<&String>) {
    if let Some(value) = value {
        node.set_child_text(tag, value.as_str());
    }
}

/// Leaf children the engine does not interpret.
fn raw_fields(node: &XmlNode, known: &[&str]) -> RawFields {
    let mut extra = RawFields::new();
    for child in &node.children {
        if known.contains(&child.tag.as_str()) || !child.children.is_empty() {
            continue;
        }
        extra
            .entry(child.tag.clone())
            .or_insert_with(|| child.text.clone().unwrap_or_default());
    }
    extra
}

fn write_raw_fields(node: &mut XmlNode, extra: &RawFields) {
    for (tag, value) in extra {
        node.set_child_text(tag, value.as_str());
    }
}

fn child_uuid(node: &XmlNode) -> Option<String> {
    node.child_text(UUID)
        .or_else(|| node.attributes.get(UUID).map(String::as_str))
        .map(str::to_string)
}

// --- interfaces ---------------------------------------------------------------

pub(crate) fn interface_uuid(node: &XmlNode) -> String {
    child_uuid(node).unwrap_or_else(|| derived_uuid(ResourceKind::Interface, &node.tag))
}

pub(crate) fn decode_interface(node: &XmlNode) -> Interface {
    Interface {
        uuid: interface_uuid(node),
        name: node.tag.clone(),
        physical: text(node, "if"),
        description: text(node, "descr"),
        ipaddr: text(node, "ipaddr"),
        subnet: node.child_text("subnet").and_then(|s| s.parse().ok()),
        enabled: flag(node, "enable"),
        gateway: text(node, "gateway"),
        spoofmac: text(node, "spoofmac"),
        mtu: node.child_text("mtu").and_then(|s| s.parse().ok()),
        media: text(node, "media"),
        mediaopt: text(node, "mediaopt"),
        extra: raw_fields(node, INTERFACE_FIELDS),
    }
}

pub(crate) fn patch_interface(node: &mut XmlNode, patch: &InterfacePatch) {
    set_opt(node, "if", patch.physical.as_ref());
    set_opt(node, "descr", patch.description.as_ref());
    set_opt(node, "ipaddr", patch.ipaddr.as_ref());
    if let Some(subnet) = patch.subnet {
        node.set_child_text("subnet", subnet.to_string());
    }
    if let Some(enabled) = patch.enabled {
        set_flag(node, "enable", enabled);
    }
    set_opt(node, "gateway", patch.gateway.as_ref());
    set_opt(node, "spoofmac", patch.spoofmac.as_ref());
    if let Some(mtu) = patch.mtu {
        node.set_child_text("mtu", mtu.to_string());
    }
    set_opt(node, "media", patch.media.as_ref());
    set_opt(node, "mediaopt", patch.mediaopt.as_ref());
}

pub(crate) fn encode_interface(record: &Interface) -> XmlNode {
    let mut node = XmlNode::new(record.name.as_str());
    node.set_child_text(UUID, record.uuid.as_str());
    patch_interface(&mut node, &InterfacePatch::from(record));
    write_raw_fields(&mut node, &record.extra);
    node
}

// --- vlans --------------------------------------------------------------------

pub(crate) fn vlan_uuid(node: &XmlNode) -> String {
    node.attributes.get(UUID).cloned().unwrap_or_else(|| {
        let key = format!("{}:{}", text(node, "if"), text(node, "tag"));
        derived_uuid(ResourceKind::Vlan, &key)
    })
}

pub(crate) fn decode_vlan(node: &XmlNode) -> Vlan {
    let parent = text(node, "if");
    let tag: u16 = parse_or_default(node, "tag");
    Vlan {
        uuid: vlan_uuid(node),
        vlanif: derived_vlan_interface(&parent, tag),
        parent,
        tag,
        description: text(node, "descr"),
        pcp: parse_or_default(node, "pcp"),
        extra: raw_fields(node, VLAN_FIELDS),
    }
}

/// Apply `patch` and recompute the derived device name.
pub(crate) fn patch_vlan(node: &mut XmlNode, patch: &VlanPatch) {
    set_opt(node, "if", patch.parent.as_ref());
    if let Some(tag) = patch.tag {
        node.set_child_text("tag", tag.to_string());
    }
    if let Some(pcp) = patch.pcp {
        node.set_child_text("pcp", pcp.to_string());
    }
    set_opt(node, "descr", patch.description.as_ref());
    let vlanif = derived_vlan_interface(&text(node, "if"), parse_or_default(node, "tag"));
    node.set_child_text("vlanif", vlanif);
}

pub(crate) fn encode_vlan(record: &Vlan) -> XmlNode {
    let mut node = XmlNode::new(VLAN);
    node.attributes.insert(UUID.to_string(), record.uuid.clone());
    let patch = VlanPatch {
        parent: Some(record.parent.clone()),
        tag: Some(record.tag),
        description: Some(record.description.clone()),
        pcp: Some(record.pcp),
    };
    patch_vlan(&mut node, &patch);
    write_raw_fields(&mut node, &record.extra);
    node
}

// --- endpoints ----------------------------------------------------------------

fn decode_endpoint(node: &XmlNode, tag: &str) -> Endpoint {
    let Some(ep) = node.get_child(tag) else {
        return Endpoint::any();
    };
    let target = if ep.get_child("any").is_some() {
        EndpointTarget::Any
    } else if let Some(network) = ep.child_text("network") {
        EndpointTarget::Network(network.to_string())
    } else if let Some(address) = ep.child_text("address") {
        EndpointTarget::Address(address.to_string())
    } else {
        EndpointTarget::Any
    };
    Endpoint {
        target,
        port: ep.child_text("port").map(str::to_string),
    }
}

/// Rewrite the target and port of an endpoint element, keeping other children (e.g. `not`).
fn patch_endpoint(node: &mut XmlNode, tag: &str, endpoint: &Endpoint) {
    let ep = node.get_or_create_child(tag);
    for form in ["any", "network", "address"] {
        ep.remove_children(form);
    }
    match &endpoint.target {
        EndpointTarget::Any => ep.set_child_text("any", "1"),
        EndpointTarget::Network(network) => ep.set_child_text("network", network.as_str()),
        EndpointTarget::Address(address) => ep.set_child_text("address", address.as_str()),
    }
    match &endpoint.port {
        Some(port) => ep.set_child_text("port", port.as_str()),
        None => {
            ep.remove_children("port");
        }
    }
}

// --- firewall rules -----------------------------------------------------------

pub(crate) fn rule_uuid(node: &XmlNode, index: usize) -> String {
    child_uuid(node).unwrap_or_else(|| {
        let key = format!("{index}:{}:{}", text(node, "interface"), text(node, "descr"));
        derived_uuid(ResourceKind::FirewallRule, &key)
    })
}

pub(crate) fn decode_rule(node: &XmlNode, index: usize) -> FirewallRule {
    FirewallRule {
        uuid: rule_uuid(node, index),
        action: parse_or_default(node, "type"),
        interface: text(node, "interface"),
        ipprotocol: parse_or_default(node, "ipprotocol"),
        protocol: parse_or_default(node, "protocol"),
        source: decode_endpoint(node, "source"),
        destination: decode_endpoint(node, "destination"),
        description: text(node, "descr"),
        direction: text(node, "direction"),
        statetype: text(node, "statetype"),
        gateway: text(node, "gateway"),
        quick: present(node, "quick"),
        enabled: !present(node, "disabled"),
        extra: raw_fields(node, RULE_FIELDS),
    }
}

pub(crate) fn patch_rule(node: &mut XmlNode, patch: &FirewallRulePatch) {
    if let Some(action) = patch.action {
        node.set_child_text("type", action.as_str());
    }
    set_opt(node, "interface", patch.interface.as_ref());
    if let Some(ipprotocol) = patch.ipprotocol {
        node.set_child_text("ipprotocol", ipprotocol.as_str());
    }
    if let Some(protocol) = patch.protocol {
        set_protocol(node, protocol);
    }
    if let Some(source) = &patch.source {
        patch_endpoint(node, "source", source);
    }
    if let Some(destination) = &patch.destination {
        patch_endpoint(node, "destination", destination);
    }
    set_opt(node, "descr", patch.description.as_ref());
    set_opt(node, "direction", patch.direction.as_ref());
    set_opt(node, "statetype", patch.statetype.as_ref());
    set_opt(node, "gateway", patch.gateway.as_ref());
    if let Some(quick) = patch.quick {
        set_present(node, "quick", quick);
    }
    if let Some(enabled) = patch.enabled {
        set_present(node, "disabled", !enabled);
    }
}

/// `any` is expressed by omitting the element.
fn set_protocol(node: &mut XmlNode, protocol: Protocol) {
    if protocol == Protocol::Any {
        node.remove_children("protocol");
    } else {
        node.set_child_text("protocol", protocol.as_str());
    }
}

pub(crate) fn encode_rule(record: &FirewallRule) -> XmlNode {
    let mut node = XmlNode::new(RULE);
    node.set_child_text(UUID, record.uuid.as_str());
    patch_rule(&mut node, &FirewallRulePatch::from(record));
    write_raw_fields(&mut node, &record.extra);
    node
}

// --- port forwards ------------------------------------------------------------

pub(crate) fn forward_uuid(node: &XmlNode, index: usize) -> String {
    child_uuid(node).unwrap_or_else(|| {
        let key = format!(
            "{index}:{}:{}",
            node.get_text(&["destination", "port"]).unwrap_or_default(),
            text(node, "target")
        );
        derived_uuid(ResourceKind::PortForward, &key)
    })
}

pub(crate) fn decode_forward(node: &XmlNode, index: usize) -> PortForward {
    let src_ip = node
        .get_child("source")
        .and_then(|s| s.child_text("address"))
        .map(str::to_string);
    PortForward {
        uuid: forward_uuid(node, index),
        interface: text(node, "interface"),
        protocol: parse_or_default(node, "protocol"),
        src_port: node
            .get_child("destination")
            .and_then(|d| d.child_text("port"))
            .unwrap_or_default()
            .to_string(),
        dst_ip: text(node, "target"),
        dst_port: text(node, "local-port"),
        src_ip,
        description: text(node, "descr"),
        enabled: !present(node, "disabled"),
        extra: raw_fields(node, FORWARD_FIELDS),
    }
}

pub(crate) fn patch_forward(node: &mut XmlNode, patch: &PortForwardPatch) {
    set_opt(node, "interface", patch.interface.as_ref());
    if let Some(protocol) = patch.protocol {
        set_protocol(node, protocol);
    }
    if let Some(port) = &patch.src_port {
        let destination = node.get_or_create_child("destination");
        let has_target = ["any", "network", "address"]
            .iter()
            .any(|form| destination.get_child(form).is_some());
        if !has_target {
            destination.set_child_text("network", "wanip");
        }
        destination.set_child_text("port", port.as_str());
    }
    set_opt(node, "target", patch.dst_ip.as_ref());
    set_opt(node, "local-port", patch.dst_port.as_ref());
    if let Some(src_ip) = &patch.src_ip {
        patch_endpoint(node, "source", &Endpoint::address(src_ip.as_str()));
    }
    set_opt(node, "descr", patch.description.as_ref());
    if let Some(enabled) = patch.enabled {
        set_present(node, "disabled", !enabled);
    }
}

pub(crate) fn encode_forward(record: &PortForward) -> XmlNode {
    let mut node = XmlNode::new(RULE);
    node.set_child_text(UUID, record.uuid.as_str());
    if record.src_ip.is_none() {
        patch_endpoint(&mut node, "source", &Endpoint::any());
    }
    patch_forward(&mut node, &PortForwardPatch::from(record));
    write_raw_fields(&mut node, &record.extra);
    node
}

// --- dhcp ---------------------------------------------------------------------

pub(crate) fn dhcp_uuid(node: &XmlNode) -> String {
    child_uuid(node).unwrap_or_else(|| derived_uuid(ResourceKind::DhcpConfig, &node.tag))
}

pub(crate) fn decode_dhcp(node: &XmlNode) -> DhcpConfig {
    let static_mappings = node
        .children
        .iter()
        .filter(|c| c.tag == STATICMAP)
        .map(|c| decode_static_mapping(c, &node.tag))
        .collect();
    DhcpConfig {
        uuid: dhcp_uuid(node),
        interface: node.tag.clone(),
        enabled: flag(node, "enable"),
        range_from: node.get_text(&["range", "from"]).unwrap_or_default().trim().to_string(),
        range_to: node.get_text(&["range", "to"]).unwrap_or_default().trim().to_string(),
        gateway: text(node, "gateway"),
        dns_server: text(node, "dnsserver"),
        domain: text(node, "domain"),
        static_mappings,
        extra: raw_fields(node, DHCP_FIELDS),
    }
}

pub(crate) fn patch_dhcp(node: &mut XmlNode, patch: &DhcpConfigPatch) {
    if let Some(enabled) = patch.enabled {
        set_flag(node, "enable", enabled);
    }
    if let Some(from) = &patch.range_from {
        node.get_or_create_child("range").set_child_text("from", from.as_str());
    }
    if let Some(to) = &patch.range_to {
        node.get_or_create_child("range").set_child_text("to", to.as_str());
    }
    set_opt(node, "gateway", patch.gateway.as_ref());
    set_opt(node, "dnsserver", patch.dns_server.as_ref());
    set_opt(node, "domain", patch.domain.as_ref());
}

pub(crate) fn encode_dhcp(record: &DhcpConfig) -> XmlNode {
    let mut node = XmlNode::new(record.interface.as_str());
    node.set_child_text(UUID, record.uuid.as_str());
    patch_dhcp(&mut node, &DhcpConfigPatch::from(record));
    write_raw_fields(&mut node, &record.extra);
    for mapping in &record.static_mappings {
        node.children.push(encode_static_mapping(mapping));
    }
    node
}

pub(crate) fn static_mapping_uuid(node: &XmlNode, interface: &str) -> String {
    child_uuid(node).unwrap_or_else(|| {
        let key = format!("{interface}:{}", text(node, "mac").to_ascii_lowercase());
        derived_uuid(ResourceKind::StaticMapping, &key)
    })
}

pub(crate) fn decode_static_mapping(node: &XmlNode, interface: &str) -> StaticMapping {
    StaticMapping {
        uuid: static_mapping_uuid(node, interface),
        interface: interface.to_string(),
        mac: text(node, "mac"),
        ipaddr: text(node, "ipaddr"),
        hostname: text(node, "hostname"),
        description: text(node, "descr"),
        winsserver: text(node, "winsserver"),
        dnsserver: text(node, "dnsserver"),
        ntpserver: text(node, "ntpserver"),
        extra: raw_fields(node, STATICMAP_FIELDS),
    }
}

pub(crate) fn patch_static_mapping(node: &mut XmlNode, patch: &StaticMappingPatch) {
    set_opt(node, "mac", patch.mac.as_ref());
    set_opt(node, "ipaddr", patch.ipaddr.as_ref());
    set_opt(node, "hostname", patch.hostname.as_ref());
    set_opt(node, "descr", patch.description.as_ref());
    set_opt(node, "winsserver", patch.winsserver.as_ref());
    set_opt(node, "dnsserver", patch.dnsserver.as_ref());
    set_opt(node, "ntpserver", patch.ntpserver.as_ref());
}

pub(crate) fn encode_static_mapping(record: &StaticMapping) -> XmlNode {
    let mut node = XmlNode::new(STATICMAP);
    node.set_child_text(UUID, record.uuid.as_str());
    patch_static_mapping(&mut node, &StaticMappingPatch::from(record));
    write_raw_fields(&mut node, &record.extra);
    node
}

// --- identifiers ----------------------------------------------------------------

/// Write the identifier every node would be listed under into nodes that lack one.
///
/// Runs on load, before a mutation, so identifiers derived from position match
/// what the caller was shown.
pub(crate) fn stamp_identifiers(root: &mut XmlNode) {
    if let Some(interfaces) = root.get_child_mut(INTERFACES) {
        for node in &mut interfaces.children {
            if child_uuid(node).is_none() {
                let id = interface_uuid(node);
                node.set_child_text(UUID, id);
            }
        }
    }

    if let Some(vlans) = root.get_child_mut(VLANS) {
        for node in vlans.children.iter_mut().filter(|c| c.tag == VLAN) {
            if !node.attributes.contains_key(UUID) {
                let id = vlan_uuid(node);
                node.attributes.insert(UUID.to_string(), id);
            }
        }
    }

    for (section, uuid_of) in [
        (FILTER, rule_uuid as fn(&XmlNode, usize) -> String),
        (NAT, forward_uuid as fn(&XmlNode, usize) -> String),
    ] {
        let Some(parent) = root.get_child_mut(section) else {
            continue;
        };
        for (index, node) in parent.children.iter_mut().filter(|c| c.tag == RULE).enumerate() {
            if child_uuid(node).is_none() {
                let id = uuid_of(node, index);
                node.set_child_text(UUID, id);
            }
        }
    }

    if let Some(dhcpd) = root.get_child_mut(DHCPD) {
        for config in &mut dhcpd.children {
            if child_uuid(config).is_none() {
                let id = dhcp_uuid(config);
                config.set_child_text(UUID, id);
            }
            let interface = config.tag.clone();
            for mapping in config.children.iter_mut().filter(|c| c.tag == STATICMAP) {
                if child_uuid(mapping).is_none() {
                    let id = static_mapping_uuid(mapping, &interface);
                    mapping.set_child_text(UUID, id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use xml_tree_core::parse_str;

    use super::*;
    use crate::model::{IpProtocol, NewFirewallRule, RuleAction};

    fn first<'a>(root: &'a XmlNode, section: &str, tag: &str) -> &'a XmlNode {
        root.get_child(section)
            .and_then(|s| s.get_child(tag))
            .expect("node present")
    }

    #[test]
    fn interface_round_trip_keeps_extra_fields() {
        let mut extra = RawFields::new();
        extra.insert("blockpriv".into(), "1".into());
        extra.insert("dhcp6-ia-pd-len".into(), String::new());
        let record = Interface {
            uuid: "11111111-2222-3333-4444-555555555555".into(),
            name: "opt150".into(),
            physical: "igc2_vlan150".into(),
            description: "web".into(),
            ipaddr: "10.0.150.1".into(),
            subnet: Some(24),
            enabled: true,
            gateway: String::new(),
            spoofmac: String::new(),
            mtu: Some(1500),
            media: String::new(),
            mediaopt: String::new(),
            extra,
        };
        assert_eq!(decode_interface(&encode_interface(&record)), record);
    }

    #[test]
    fn vlan_round_trip_recomputes_device_name() {
        let record = Vlan {
            uuid: "abc".into(),
            parent: "igc2".into(),
            tag: 150,
            description: "Container web1 VLAN".into(),
            pcp: 3,
            vlanif: "igc2_vlan150".into(),
            extra: RawFields::from([("proto".to_string(), String::new())]),
        };
        let node = encode_vlan(&record);
        assert_eq!(node.attributes.get("uuid").map(String::as_str), Some("abc"));
        assert_eq!(decode_vlan(&node), record);
    }

    #[test]
    fn rule_round_trip_with_ports_and_flags() {
        let record = FirewallRule {
            uuid: "r1".into(),
            action: RuleAction::Block,
            interface: "lan".into(),
            ipprotocol: IpProtocol::Inet46,
            protocol: Protocol::Tcp,
            source: Endpoint::network("lan"),
            destination: Endpoint::address("10.0.0.5").with_port("8000:8080"),
            description: "block web".into(),
            direction: "in".into(),
            statetype: "keep state".into(),
            gateway: String::new(),
            quick: false,
            enabled: false,
            extra: RawFields::from([("log".to_string(), "1".to_string())]),
        };
        let node = encode_rule(&record);
        assert!(node.get_child("protocol").is_some());
        assert!(node.get_child("quick").is_none());
        assert_eq!(node.child_text("disabled"), Some("1"));
        assert_eq!(decode_rule(&node, 0), record);
    }

    #[test]
    fn any_protocol_is_omitted() {
        let mut node = encode_rule(&FirewallRule::from_new(
            "r2",
            &NewFirewallRule::new(RuleAction::Pass, "opt150"),
        ));
        assert!(node.get_child("protocol").is_none());
        patch_rule(
            &mut node,
            &FirewallRulePatch {
                protocol: Some(Protocol::Udp),
                ..FirewallRulePatch::default()
            },
        );
        assert_eq!(node.child_text("protocol"), Some("udp"));
    }

    #[test]
    fn forward_round_trip_uses_nat_layout() {
        let record = PortForward {
            uuid: "f1".into(),
            interface: "wan".into(),
            protocol: Protocol::Tcp,
            src_port: "8080".into(),
            dst_ip: "10.0.150.10".into(),
            dst_port: "80".into(),
            src_ip: None,
            description: "Container web1 Port Forward".into(),
            enabled: true,
            extra: RawFields::new(),
        };
        let node = encode_forward(&record);
        assert_eq!(node.get_text(&["destination", "network"]), Some("wanip"));
        assert_eq!(node.get_text(&["destination", "port"]), Some("8080"));
        assert_eq!(node.child_text("local-port"), Some("80"));
        assert!(node.get_child("source").and_then(|s| s.get_child("any")).is_some());
        assert_eq!(decode_forward(&node, 0), record);
    }

    #[test]
    fn dhcp_round_trip_includes_static_mappings() {
        let mapping = StaticMapping {
            uuid: "m1".into(),
            interface: "opt150".into(),
            mac: "aa:bb:cc:dd:ee:ff".into(),
            ipaddr: "10.0.150.10".into(),
            hostname: "web1".into(),
            description: "Container web1".into(),
            winsserver: String::new(),
            dnsserver: String::new(),
            ntpserver: String::new(),
            extra: RawFields::new(),
        };
        let record = DhcpConfig {
            uuid: "d1".into(),
            interface: "opt150".into(),
            enabled: true,
            range_from: "10.0.150.100".into(),
            range_to: "10.0.150.200".into(),
            gateway: "10.0.150.1".into(),
            dns_server: String::new(),
            domain: "lab".into(),
            static_mappings: vec![mapping],
            extra: RawFields::from([("ddnsdomain".to_string(), String::new())]),
        };
        assert_eq!(decode_dhcp(&encode_dhcp(&record)), record);
    }

    #[test]
    fn patch_endpoint_keeps_inversion_flag() {
        let mut rule = parse_str(
            "<rule><source><not>1</not><network>lan</network></source></rule>",
        )
        .expect("parse");
        patch_endpoint(&mut rule, "source", &Endpoint::address("10.1.1.1"));
        let source = rule.get_child("source").expect("source");
        assert_eq!(source.child_text("not"), Some("1"));
        assert_eq!(source.child_text("address"), Some("10.1.1.1"));
        assert!(source.get_child("network").is_none());
    }

    #[test]
    fn stamping_matches_listed_identifiers() {
        let mut root = parse_str(
            r#"<opnsense>
                 <interfaces><wan><if>igc0</if></wan></interfaces>
                 <vlans><vlan><if>igc0</if><tag>5</tag></vlan></vlans>
                 <filter><rule><interface>lan</interface></rule></filter>
               </opnsense>"#,
        )
        .expect("parse");

        let wan_before = decode_interface(first(&root, "interfaces", "wan")).uuid;
        let vlan_before = decode_vlan(first(&root, "vlans", "vlan")).uuid;
        let rule_before = decode_rule(first(&root, "filter", "rule"), 0).uuid;

        stamp_identifiers(&mut root);

        let wan = first(&root, "interfaces", "wan");
        assert_eq!(wan.child_text("uuid"), Some(wan_before.as_str()));
        let vlan = first(&root, "vlans", "vlan");
        assert_eq!(vlan.attributes.get("uuid"), Some(&vlan_before));
        let rule = first(&root, "filter", "rule");
        assert_eq!(rule.child_text("uuid"), Some(rule_before.as_str()));
    }

    #[test]
    fn derived_identifiers_are_deterministic() {
        assert_eq!(
            derived_uuid(ResourceKind::Interface, "wan"),
            derived_uuid(ResourceKind::Interface, "wan")
        );
        assert_ne!(
            derived_uuid(ResourceKind::Interface, "wan"),
            derived_uuid(ResourceKind::DhcpConfig, "wan")
        );
    }
}
