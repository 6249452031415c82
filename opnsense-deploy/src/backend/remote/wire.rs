// Request/response shapes of the remote API and their translation to records.
//
// The appliance reports most values as strings ("1", "24"), some as numbers or
// booleans; `Scalar` absorbs all three. Unknown keys land in `extra`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::model::{
    derived_vlan_interface, DhcpConfig, DhcpConfigPatch, DhcpLease, Endpoint, EndpointTarget,
    FirewallRule, FirewallRulePatch, Interface, InterfacePatch, PortForward, PortForwardPatch,
    RawFields, StaticMapping, StaticMappingPatch, Vlan, VlanPatch,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Text(s) => s.trim().to_string(),
        }
    }

    fn flag(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Int(n) => *n == 1,
            Self::Text(s) => s.trim() == "1",
        }
    }

    fn parse<T: std::str::FromStr>(&self) -> Option<T> {
        self.text().parse().ok()
    }
}

type Extra = BTreeMap<String, Value>;

fn text(value: &Option<Scalar>) -> String {
    value.as_ref().map(Scalar::text).unwrap_or_default()
}

fn flag(value: &Option<Scalar>) -> bool {
    value.as_ref().is_some_and(Scalar::flag)
}

fn parsed<T: std::str::FromStr + Default>(value: &Option<Scalar>) -> T {
    value.as_ref().and_then(Scalar::parse).unwrap_or_default()
}

fn raw_fields(extra: Extra) -> RawFields {
    extra
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect()
}

fn flag_text(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn put(map: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        map.insert(key.to_string(), value);
    }
}

fn put_str(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    put(map, key, value.clone().map(Value::String));
}

// --- interfaces ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct InterfaceWire {
    #[serde(default)]
    uuid: Option<Scalar>,
    #[serde(default, rename = "if")]
    physical: Option<Scalar>,
    #[serde(default)]
    descr: Option<Scalar>,
    #[serde(default)]
    ipaddr: Option<Scalar>,
    #[serde(default)]
    subnet: Option<Scalar>,
    #[serde(default)]
    enable: Option<Scalar>,
    #[serde(default)]
    gateway: Option<Scalar>,
    #[serde(default)]
    spoofmac: Option<Scalar>,
    #[serde(default)]
    mtu: Option<Scalar>,
    #[serde(default)]
    media: Option<Scalar>,
    #[serde(default)]
    mediaopt: Option<Scalar>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InterfaceList {
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceWire>,
}

impl InterfaceWire {
    pub(crate) fn into_record(self, name: String) -> Interface {
        Interface {
            uuid: text(&self.uuid),
            name,
            physical: text(&self.physical),
            description: text(&self.descr),
            ipaddr: text(&self.ipaddr),
            subnet: self.subnet.as_ref().and_then(Scalar::parse),
            enabled: flag(&self.enable),
            gateway: text(&self.gateway),
            spoofmac: text(&self.spoofmac),
            mtu: self.mtu.as_ref().and_then(Scalar::parse),
            media: text(&self.media),
            mediaopt: text(&self.mediaopt),
            extra: raw_fields(self.extra),
        }
    }
}

pub(crate) fn interface_body(name: Option<&str>, patch: &InterfacePatch) -> Value {
    let mut map = Map::new();
    put(&mut map, "name", name.map(|n| json!(n)));
    put_str(&mut map, "if", &patch.physical);
    put_str(&mut map, "descr", &patch.description);
    put_str(&mut map, "ipaddr", &patch.ipaddr);
    put(&mut map, "subnet", patch.subnet.map(|s| json!(s.to_string())));
    put(&mut map, "enable", patch.enabled.map(|e| json!(flag_text(e))));
    put_str(&mut map, "gateway", &patch.gateway);
    put_str(&mut map, "spoofmac", &patch.spoofmac);
    put(&mut map, "mtu", patch.mtu.map(|m| json!(m.to_string())));
    put_str(&mut map, "media", &patch.media);
    put_str(&mut map, "mediaopt", &patch.mediaopt);
    json!({ "interface": map })
}

// --- vlans --------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct VlanWire {
    #[serde(default)]
    uuid: Option<Scalar>,
    #[serde(default, rename = "if")]
    parent: Option<Scalar>,
    #[serde(default)]
    tag: Option<Scalar>,
    #[serde(default)]
    pcp: Option<Scalar>,
    #[serde(default)]
    descr: Option<Scalar>,
    /// Read so it stays out of `extra`; the device name is always re-derived.
    #[serde(default, rename = "vlanif")]
    _vlanif: Option<Scalar>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VlanList {
    #[serde(default)]
    pub vlans: Vec<VlanWire>,
}

impl From<VlanWire> for Vlan {
    fn from(wire: VlanWire) -> Self {
        let parent = text(&wire.parent);
        let tag: u16 = parsed(&wire.tag);
        Vlan {
            uuid: text(&wire.uuid),
            vlanif: derived_vlan_interface(&parent, tag),
            parent,
            tag,
            description: text(&wire.descr),
            pcp: parsed(&wire.pcp),
            extra: raw_fields(wire.extra),
        }
    }
}

/// VLAN body; `vlanif` is sent only when both parent and tag are known.
pub(crate) fn vlan_body(patch: &VlanPatch, current: Option<&Vlan>) -> Value {
    let mut map = Map::new();
    put_str(&mut map, "if", &patch.parent);
    put(&mut map, "tag", patch.tag.map(|t| json!(t.to_string())));
    put(&mut map, "pcp", patch.pcp.map(|p| json!(p.to_string())));
    put_str(&mut map, "descr", &patch.description);
    let parent = patch
        .parent
        .as_deref()
        .or(current.map(|v| v.parent.as_str()));
    let tag = patch.tag.or(current.map(|v| v.tag));
    if let (Some(parent), Some(tag)) = (parent, tag) {
        map.insert(
            "vlanif".to_string(),
            json!(derived_vlan_interface(parent, tag)),
        );
    }
    json!({ "vlan": map })
}

// --- endpoints ----------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub(crate) struct EndpointWire {
    #[serde(default)]
    any: Option<Scalar>,
    #[serde(default)]
    network: Option<Scalar>,
    #[serde(default)]
    address: Option<Scalar>,
    #[serde(default)]
    port: Option<Scalar>,
}

impl From<EndpointWire> for Endpoint {
    fn from(wire: EndpointWire) -> Self {
        let network = text(&wire.network);
        let address = text(&wire.address);
        let target = if flag(&wire.any) {
            EndpointTarget::Any
        } else if !network.is_empty() {
            EndpointTarget::Network(network)
        } else if !address.is_empty() {
            EndpointTarget::Address(address)
        } else {
            EndpointTarget::Any
        };
        let port = Some(text(&wire.port)).filter(|p| !p.is_empty());
        Endpoint { target, port }
    }
}

fn endpoint_body(endpoint: &Endpoint) -> Value {
    let mut map = Map::new();
    match &endpoint.target {
        EndpointTarget::Any => map.insert("any".into(), json!("1")),
        EndpointTarget::Network(network) => map.insert("network".into(), json!(network)),
        EndpointTarget::Address(address) => map.insert("address".into(), json!(address)),
    };
    put_str(&mut map, "port", &endpoint.port);
    Value::Object(map)
}

// --- firewall rules -----------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct RuleWire {
    #[serde(default)]
    uuid: Option<Scalar>,
    #[serde(default, rename = "type")]
    action: Option<Scalar>,
    #[serde(default)]
    interface: Option<Scalar>,
    #[serde(default)]
    ipprotocol: Option<Scalar>,
    #[serde(default)]
    protocol: Option<Scalar>,
    #[serde(default)]
    source: Option<EndpointWire>,
    #[serde(default)]
    destination: Option<EndpointWire>,
    #[serde(default)]
    descr: Option<Scalar>,
    #[serde(default)]
    direction: Option<Scalar>,
    #[serde(default)]
    statetype: Option<Scalar>,
    #[serde(default)]
    gateway: Option<Scalar>,
    #[serde(default)]
    quick: Option<Scalar>,
    #[serde(default)]
    disabled: Option<Scalar>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RuleList {
    #[serde(default)]
    pub rules: Vec<RuleWire>,
}

impl From<RuleWire> for FirewallRule {
    fn from(wire: RuleWire) -> Self {
        FirewallRule {
            uuid: text(&wire.uuid),
            action: parsed(&wire.action),
            interface: text(&wire.interface),
            ipprotocol: parsed(&wire.ipprotocol),
            protocol: parsed(&wire.protocol),
            source: wire.source.unwrap_or_default().into(),
            destination: wire.destination.unwrap_or_default().into(),
            description: text(&wire.descr),
            direction: text(&wire.direction),
            statetype: text(&wire.statetype),
            gateway: text(&wire.gateway),
            quick: flag(&wire.quick),
            enabled: !flag(&wire.disabled),
            extra: raw_fields(wire.extra),
        }
    }
}

pub(crate) fn rule_body(patch: &FirewallRulePatch) -> Value {
    let mut map = Map::new();
    put(&mut map, "type", patch.action.map(|a| json!(a.as_str())));
    put_str(&mut map, "interface", &patch.interface);
    put(
        &mut map,
        "ipprotocol",
        patch.ipprotocol.map(|p| json!(p.as_str())),
    );
    put(&mut map, "protocol", patch.protocol.map(|p| json!(p.as_str())));
    put(&mut map, "source", patch.source.as_ref().map(endpoint_body));
    put(
        &mut map,
        "destination",
        patch.destination.as_ref().map(endpoint_body),
    );
    put_str(&mut map, "descr", &patch.description);
    put_str(&mut map, "direction", &patch.direction);
    put_str(&mut map, "statetype", &patch.statetype);
    put_str(&mut map, "gateway", &patch.gateway);
    put(&mut map, "quick", patch.quick.map(|q| json!(flag_text(q))));
    put(
        &mut map,
        "disabled",
        patch.enabled.map(|e| json!(flag_text(!e))),
    );
    json!({ "rule": map })
}

// --- port forwards ------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ForwardWire {
    #[serde(default)]
    uuid: Option<Scalar>,
    #[serde(default)]
    interface: Option<Scalar>,
    #[serde(default)]
    protocol: Option<Scalar>,
    #[serde(default)]
    src_port: Option<Scalar>,
    #[serde(default)]
    dst_ip: Option<Scalar>,
    #[serde(default)]
    dst_port: Option<Scalar>,
    #[serde(default)]
    src_ip: Option<Scalar>,
    #[serde(default)]
    descr: Option<Scalar>,
    #[serde(default)]
    disabled: Option<Scalar>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ForwardList {
    #[serde(default)]
    pub forwards: Vec<ForwardWire>,
}

impl From<ForwardWire> for PortForward {
    fn from(wire: ForwardWire) -> Self {
        PortForward {
            uuid: text(&wire.uuid),
            interface: text(&wire.interface),
            protocol: parsed(&wire.protocol),
            src_port: text(&wire.src_port),
            dst_ip: text(&wire.dst_ip),
            dst_port: text(&wire.dst_port),
            src_ip: Some(text(&wire.src_ip)).filter(|ip| !ip.is_empty()),
            description: text(&wire.descr),
            enabled: !flag(&wire.disabled),
            extra: raw_fields(wire.extra),
        }
    }
}

pub(crate) fn forward_body(patch: &PortForwardPatch) -> Value {
    let mut map = Map::new();
    put_str(&mut map, "interface", &patch.interface);
    put(&mut map, "protocol", patch.protocol.map(|p| json!(p.as_str())));
    put_str(&mut map, "src_port", &patch.src_port);
    put_str(&mut map, "dst_ip", &patch.dst_ip);
    put_str(&mut map, "dst_port", &patch.dst_port);
    put_str(&mut map, "src_ip", &patch.src_ip);
    put_str(&mut map, "descr", &patch.description);
    put(
        &mut map,
        "disabled",
        patch.enabled.map(|e| json!(flag_text(!e))),
    );
    json!({ "forward": map })
}

// --- dhcp ---------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RangeWire {
    #[serde(default)]
    from: Option<Scalar>,
    #[serde(default)]
    to: Option<Scalar>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StaticMapWire {
    #[serde(default)]
    uuid: Option<Scalar>,
    #[serde(default)]
    mac: Option<Scalar>,
    #[serde(default)]
    ipaddr: Option<Scalar>,
    #[serde(default)]
    hostname: Option<Scalar>,
    #[serde(default)]
    descr: Option<Scalar>,
    #[serde(default)]
    winsserver: Option<Scalar>,
    #[serde(default)]
    dnsserver: Option<Scalar>,
    #[serde(default)]
    ntpserver: Option<Scalar>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StaticMapList {
    #[serde(default)]
    pub staticmaps: Vec<StaticMapWire>,
}

impl StaticMapWire {
    pub(crate) fn into_record(self, interface: &str) -> StaticMapping {
        StaticMapping {
            uuid: text(&self.uuid),
            interface: interface.to_string(),
            mac: text(&self.mac),
            ipaddr: text(&self.ipaddr),
            hostname: text(&self.hostname),
            description: text(&self.descr),
            winsserver: text(&self.winsserver),
            dnsserver: text(&self.dnsserver),
            ntpserver: text(&self.ntpserver),
            extra: raw_fields(self.extra),
        }
    }
}

pub(crate) fn static_map_body(patch: &StaticMappingPatch) -> Value {
    let mut map = Map::new();
    put_str(&mut map, "mac", &patch.mac);
    put_str(&mut map, "ipaddr", &patch.ipaddr);
    put_str(&mut map, "hostname", &patch.hostname);
    put_str(&mut map, "descr", &patch.description);
    put_str(&mut map, "winsserver", &patch.winsserver);
    put_str(&mut map, "dnsserver", &patch.dnsserver);
    put_str(&mut map, "ntpserver", &patch.ntpserver);
    json!({ "staticmap": map })
}

#[derive(Debug, Deserialize)]
pub(crate) struct DhcpWire {
    #[serde(default)]
    uuid: Option<Scalar>,
    #[serde(default)]
    enable: Option<Scalar>,
    #[serde(default)]
    range: Option<RangeWire>,
    #[serde(default)]
    gateway: Option<Scalar>,
    #[serde(default)]
    dnsserver: Option<Scalar>,
    #[serde(default)]
    domain: Option<Scalar>,
    #[serde(default)]
    staticmaps: Vec<StaticMapWire>,
    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DhcpList {
    #[serde(default)]
    pub dhcp: BTreeMap<String, DhcpWire>,
}

impl DhcpWire {
    pub(crate) fn into_record(self, interface: String) -> DhcpConfig {
        let range = self.range.unwrap_or_default();
        let static_mappings = self
            .staticmaps
            .into_iter()
            .map(|m| m.into_record(&interface))
            .collect();
        DhcpConfig {
            uuid: text(&self.uuid),
            enabled: flag(&self.enable),
            range_from: text(&range.from),
            range_to: text(&range.to),
            gateway: text(&self.gateway),
            dns_server: text(&self.dnsserver),
            domain: text(&self.domain),
            static_mappings,
            extra: raw_fields(self.extra),
            interface,
        }
    }
}

pub(crate) fn dhcp_body(interface: Option<&str>, patch: &DhcpConfigPatch) -> Value {
    let mut map = Map::new();
    put(&mut map, "interface", interface.map(|i| json!(i)));
    put(&mut map, "enable", patch.enabled.map(|e| json!(flag_text(e))));
    if patch.range_from.is_some() || patch.range_to.is_some() {
        let mut range = Map::new();
        put_str(&mut range, "from", &patch.range_from);
        put_str(&mut range, "to", &patch.range_to);
        map.insert("range".into(), Value::Object(range));
    }
    put_str(&mut map, "gateway", &patch.gateway);
    put_str(&mut map, "dnsserver", &patch.dns_server);
    put_str(&mut map, "domain", &patch.domain);
    json!({ "dhcp": map })
}

#[derive(Debug, Deserialize)]
pub(crate) struct LeaseList {
    #[serde(default)]
    pub leases: Vec<DhcpLease>,
}
