use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::RawFields;
use crate::error::{ConfigError, Result};
use crate::validate;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    #[default]
    Pass,
    Block,
    Reject,
}

impl RuleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Block => "block",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for RuleAction {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(Self::Pass),
            "block" => Ok(Self::Block),
            "reject" => Ok(Self::Reject),
            other => Err(ConfigError::validation(
                "action",
                format!("'{other}' is not one of pass, block, reject"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpProtocol {
    #[default]
    Inet,
    Inet6,
    Inet46,
}

impl IpProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inet => "inet",
            Self::Inet6 => "inet6",
            Self::Inet46 => "inet46",
        }
    }
}

impl FromStr for IpProtocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inet" => Ok(Self::Inet),
            "inet6" => Ok(Self::Inet6),
            "inet46" => Ok(Self::Inet46),
            other => Err(ConfigError::validation(
                "ipprotocol",
                format!("'{other}' is not one of inet, inet6, inet46"),
            )),
        }
    }
}

/// Transport protocol matched by a rule or forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Any,
    Tcp,
    Udp,
    #[serde(rename = "tcp/udp")]
    TcpUdp,
    Icmp,
    Esp,
    Ah,
    Gre,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::TcpUdp => "tcp/udp",
            Self::Icmp => "icmp",
            Self::Esp => "esp",
            Self::Ah => "ah",
            Self::Gre => "gre",
        }
    }

    pub fn carries_tcp(self) -> bool {
        matches!(self, Self::Any | Self::Tcp | Self::TcpUdp)
    }

    pub fn carries_udp(self) -> bool {
        matches!(self, Self::Any | Self::Udp | Self::TcpUdp)
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "any" => Ok(Self::Any),
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "tcp/udp" => Ok(Self::TcpUdp),
            "icmp" => Ok(Self::Icmp),
            "esp" => Ok(Self::Esp),
            "ah" => Ok(Self::Ah),
            "gre" => Ok(Self::Gre),
            other => Err(ConfigError::validation(
                "protocol",
                format!("'{other}' is not a supported protocol"),
            )),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an endpoint matches. Exactly one form applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointTarget {
    #[default]
    Any,
    /// Interface network or alias, e.g. `lan` or `opt150`.
    Network(String),
    /// Single host or CIDR.
    Address(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub target: EndpointTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
}

impl Endpoint {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn network(network: impl Into<String>) -> Self {
        Self {
            target: EndpointTarget::Network(network.into()),
            port: None,
        }
    }

    pub fn address(address: impl Into<String>) -> Self {
        Self {
            target: EndpointTarget::Address(address.into()),
            port: None,
        }
    }

    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Build an endpoint from loose flags, requiring exactly one target form.
    pub fn from_parts(
        field: &str,
        any: bool,
        network: Option<String>,
        address: Option<String>,
        port: Option<String>,
    ) -> Result<Self> {
        let target = match (any, network, address) {
            (true, None, None) => EndpointTarget::Any,
            (false, Some(network), None) => EndpointTarget::Network(network),
            (false, None, Some(address)) => EndpointTarget::Address(address),
            (false, None, None) => {
                return Err(ConfigError::validation(
                    field,
                    "one of any, network or address is required",
                ))
            }
            _ => {
                return Err(ConfigError::validation(
                    field,
                    "only one of any, network or address may be given",
                ))
            }
        };
        Ok(Self { target, port })
    }

    fn validate(&self, field: &str) -> Result<()> {
        match &self.target {
            EndpointTarget::Network(value) | EndpointTarget::Address(value) => {
                validate::non_empty(field, value)?
            }
            EndpointTarget::Any => {}
        }
        if let Some(port) = &self.port {
            validate::port_range(&format!("{field}.port"), port)?;
        }
        Ok(())
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.target {
            EndpointTarget::Any => f.write_str("any")?,
            EndpointTarget::Network(net) => write!(f, "net:{net}")?,
            EndpointTarget::Address(addr) => f.write_str(addr)?,
        }
        if let Some(port) = &self.port {
            write!(f, ":{port}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub uuid: String,
    pub action: RuleAction,
    pub interface: String,
    pub ipprotocol: IpProtocol,
    pub protocol: Protocol,
    pub source: Endpoint,
    pub destination: Endpoint,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub direction: String,
    #[serde(default)]
    pub statetype: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default)]
    pub quick: bool,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "RawFields::is_empty")]
    pub extra: RawFields,
}

impl FirewallRule {
    pub fn from_new(uuid: impl Into<String>, new: &NewFirewallRule) -> Self {
        Self {
            uuid: uuid.into(),
            action: new.action,
            interface: new.interface.clone(),
            ipprotocol: new.ipprotocol,
            protocol: new.protocol,
            source: new.source.clone(),
            destination: new.destination.clone(),
            description: new.description.clone(),
            direction: new.direction.clone(),
            statetype: new.statetype.clone(),
            gateway: new.gateway.clone(),
            quick: new.quick,
            enabled: new.enabled,
            extra: RawFields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFirewallRule {
    #[serde(default)]
    pub action: RuleAction,
    pub interface: String,
    #[serde(default)]
    pub ipprotocol: IpProtocol,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub source: Endpoint,
    #[serde(default)]
    pub destination: Endpoint,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_statetype")]
    pub statetype: String,
    #[serde(default)]
    pub gateway: String,
    #[serde(default = "default_true")]
    pub quick: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_direction() -> String {
    "in".to_string()
}

fn default_statetype() -> String {
    "keep state".to_string()
}

fn default_true() -> bool {
    true
}

impl NewFirewallRule {
    pub fn new(action: RuleAction, interface: impl Into<String>) -> Self {
        Self {
            action,
            interface: interface.into(),
            ipprotocol: IpProtocol::Inet,
            protocol: Protocol::Any,
            source: Endpoint::any(),
            destination: Endpoint::any(),
            description: String::new(),
            direction: default_direction(),
            statetype: default_statetype(),
            gateway: String::new(),
            quick: true,
            enabled: true,
        }
    }

    pub fn validated(self) -> Result<Self> {
        validate::non_empty("interface", &self.interface)?;
        self.source.validate("source")?;
        self.destination.validate("destination")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRulePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<RuleAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipprotocol: Option<IpProtocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Endpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statetype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl FirewallRulePatch {
    pub fn validated(self) -> Result<Self> {
        if let Some(interface) = &self.interface {
            validate::non_empty("interface", interface)?;
        }
        if let Some(source) = &self.source {
            source.validate("source")?;
        }
        if let Some(destination) = &self.destination {
            destination.validate("destination")?;
        }
        Ok(self)
    }
}

impl From<&NewFirewallRule> for FirewallRulePatch {
    fn from(new: &NewFirewallRule) -> Self {
        Self {
            action: Some(new.action),
            interface: Some(new.interface.clone()),
            ipprotocol: Some(new.ipprotocol),
            protocol: Some(new.protocol),
            source: Some(new.source.clone()),
            destination: Some(new.destination.clone()),
            description: Some(new.description.clone()),
            direction: Some(new.direction.clone()),
            statetype: Some(new.statetype.clone()),
            gateway: Some(new.gateway.clone()),
            quick: Some(new.quick),
            enabled: Some(new.enabled),
        }
    }
}

impl From<&FirewallRule> for FirewallRulePatch {
    fn from(rule: &FirewallRule) -> Self {
        Self {
            action: Some(rule.action),
            interface: Some(rule.interface.clone()),
            ipprotocol: Some(rule.ipprotocol),
            protocol: Some(rule.protocol),
            source: Some(rule.source.clone()),
            destination: Some(rule.destination.clone()),
            description: Some(rule.description.clone()),
            direction: Some(rule.direction.clone()),
            statetype: Some(rule.statetype.clone()),
            gateway: Some(rule.gateway.clone()),
            quick: Some(rule.quick),
            enabled: Some(rule.enabled),
        }
    }
}

/// Destination NAT from an external port to an internal host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub uuid: String,
    pub interface: String,
    pub protocol: Protocol,
    /// External port or `start:end` range.
    pub src_port: String,
    pub dst_ip: String,
    pub dst_port: String,
    /// Optional restriction on the external source address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "RawFields::is_empty")]
    pub extra: RawFields,
}

impl PortForward {
    pub fn from_new(uuid: impl Into<String>, new: &NewPortForward) -> Self {
        Self {
            uuid: uuid.into(),
            interface: new.interface.clone(),
            protocol: new.protocol,
            src_port: new.src_port.clone(),
            dst_ip: new.dst_ip.clone(),
            dst_port: new.dst_port.clone(),
            src_ip: new.src_ip.clone(),
            description: new.description.clone(),
            enabled: new.enabled,
            extra: RawFields::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPortForward {
    #[serde(default = "default_wan")]
    pub interface: String,
    #[serde(default = "default_tcp")]
    pub protocol: Protocol,
    pub src_port: String,
    pub dst_ip: String,
    pub dst_port: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_wan() -> String {
    "wan".to_string()
}

fn default_tcp() -> Protocol {
    Protocol::Tcp
}

impl NewPortForward {
    pub fn validated(self) -> Result<Self> {
        validate::non_empty("interface", &self.interface)?;
        validate::port_range("src_port", &self.src_port)?;
        validate::ipv4("dst_ip", &self.dst_ip)?;
        validate::port_range("dst_port", &self.dst_port)?;
        if let Some(src_ip) = &self.src_ip {
            validate::non_empty("src_ip", src_ip)?;
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl PortForwardPatch {
    pub fn validated(self) -> Result<Self> {
        if let Some(interface) = &self.interface {
            validate::non_empty("interface", interface)?;
        }
        if let Some(port) = &self.src_port {
            validate::port_range("src_port", port)?;
        }
        if let Some(ip) = &self.dst_ip {
            validate::ipv4("dst_ip", ip)?;
        }
        if let Some(port) = &self.dst_port {
            validate::port_range("dst_port", port)?;
        }
        Ok(self)
    }
}

impl From<&NewPortForward> for PortForwardPatch {
    fn from(new: &NewPortForward) -> Self {
        Self {
            interface: Some(new.interface.clone()),
            protocol: Some(new.protocol),
            src_port: Some(new.src_port.clone()),
            dst_ip: Some(new.dst_ip.clone()),
            dst_port: Some(new.dst_port.clone()),
            src_ip: new.src_ip.clone(),
            description: Some(new.description.clone()),
            enabled: Some(new.enabled),
        }
    }
}

impl From<&PortForward> for PortForwardPatch {
    fn from(forward: &PortForward) -> Self {
        Self {
            interface: Some(forward.interface.clone()),
            protocol: Some(forward.protocol),
            src_port: Some(forward.src_port.clone()),
            dst_ip: Some(forward.dst_ip.clone()),
            dst_port: Some(forward.dst_port.clone()),
            src_ip: forward.src_ip.clone(),
            description: Some(forward.description.clone()),
            enabled: Some(forward.enabled),
        }
    }
}
