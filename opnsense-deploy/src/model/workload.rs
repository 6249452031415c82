use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Protocol;
use crate::error::{ConfigError, Result};
use crate::validate;

const RESTART_POLICIES: [&str; 4] = ["no", "always", "on-failure", "unless-stopped"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    #[default]
    Tcp,
    Udp,
    Both,
}

impl PortProtocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Both => "both",
        }
    }

    /// Protocol of the forward that exposes this mapping.
    pub fn forward_protocol(self) -> Protocol {
        match self {
            Self::Tcp => Protocol::Tcp,
            Self::Udp => Protocol::Udp,
            Self::Both => Protocol::TcpUdp,
        }
    }

    pub fn overlaps(self, other: PortProtocol) -> bool {
        self == Self::Both || other == Self::Both || self == other
    }

    /// True when a forward with `protocol` would capture this mapping's traffic.
    pub fn overlaps_forward(self, protocol: Protocol) -> bool {
        match self {
            Self::Tcp => protocol.carries_tcp(),
            Self::Udp => protocol.carries_udp(),
            Self::Both => protocol.carries_tcp() || protocol.carries_udp(),
        }
    }
}

impl Display for PortProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub host_port: u16,
    pub container_port: u16,
    #[serde(default)]
    pub protocol: PortProtocol,
}

/// Where a workload attaches to the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub vlan_id: u16,
    pub ip_address: String,
    pub mac_address: String,
    #[serde(default = "default_parent")]
    pub parent_interface: String,
    #[serde(default = "default_true")]
    pub allow_internet: bool,
}

fn default_parent() -> String {
    "igc2".to_string()
}

fn default_true() -> bool {
    true
}

fn default_restart_policy() -> String {
    "unless-stopped".to_string()
}

impl NetworkDescriptor {
    /// Logical interface name the appliance assigns to the workload VLAN.
    pub fn interface_name(&self) -> String {
        format!("opt{}", self.vlan_id)
    }
}

/// Desired state of one workload. Also the deployment request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub name: String,
    pub image: String,
    #[serde(alias = "network_config")]
    pub network: NetworkDescriptor,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: BTreeMap<String, String>,
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,
}

impl WorkloadSpec {
    pub fn new(name: impl Into<String>, image: impl Into<String>, network: NetworkDescriptor) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            network,
            ports: Vec::new(),
            environment: BTreeMap::new(),
            volumes: BTreeMap::new(),
            restart_policy: default_restart_policy(),
        }
    }

    /// Check shape and normalize the MAC address.
    pub fn validated(mut self) -> Result<Self> {
        validate::non_empty("name", &self.name)?;
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(ConfigError::validation(
                "name",
                format!("'{}' may only contain letters, digits, '-', '_' and '.'", self.name),
            ));
        }
        validate::non_empty("image", &self.image)?;
        validate::vlan_tag("network.vlan_id", self.network.vlan_id)?;
        validate::ipv4("network.ip_address", &self.network.ip_address)?;
        self.network.mac_address =
            validate::normalize_mac("network.mac_address", &self.network.mac_address)?;
        validate::non_empty("network.parent_interface", &self.network.parent_interface)?;
        for mapping in &self.ports {
            validate::port("ports.host_port", mapping.host_port)?;
            validate::port("ports.container_port", mapping.container_port)?;
        }
        if !RESTART_POLICIES.contains(&self.restart_policy.as_str()) {
            return Err(ConfigError::validation(
                "restart_policy",
                format!("must be one of: {}", RESTART_POLICIES.join(", ")),
            ));
        }
        Ok(self)
    }

    /// Description the orchestrator stamps on the VLAN it creates for this workload.
    pub fn vlan_marker(&self) -> String {
        vlan_marker(&self.name)
    }

    pub fn apply(&mut self, patch: WorkloadPatch) {
        if let Some(image) = patch.image {
            self.image = image;
        }
        if let Some(network) = patch.network {
            self.network = network;
        }
        if let Some(ports) = patch.ports {
            self.ports = ports;
        }
        if let Some(environment) = patch.environment {
            self.environment = environment;
        }
        if let Some(volumes) = patch.volumes {
            self.volumes = volumes;
        }
        if let Some(policy) = patch.restart_policy {
            self.restart_policy = policy;
        }
    }
}

pub(crate) fn vlan_marker(name: &str) -> String {
    format!("Container {name} VLAN")
}

/// Fields to change on an existing workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadPatch {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, alias = "network_config")]
    pub network: Option<NetworkDescriptor>,
    #[serde(default)]
    pub ports: Option<Vec<PortMapping>>,
    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub volumes: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub restart_policy: Option<String>,
}

/// A deployed workload as recorded in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRecord {
    /// Identifier assigned by the runtime.
    pub id: String,
    pub status: String,
    #[serde(flatten)]
    pub spec: WorkloadSpec,
    pub created_at: DateTime<Utc>,
}

impl WorkloadRecord {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Started,
    Success,
    Warning,
    Failed,
    Info,
}

impl LogStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Failed => "failed",
            Self::Info => "info",
        }
    }
}

/// Append-only audit entry written by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentLog {
    pub id: Uuid,
    pub workload: Option<String>,
    pub action: String,
    pub status: LogStatus,
    pub message: String,
    #[serde(default)]
    pub detail: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DeploymentLog {
    pub fn new(
        workload: Option<&str>,
        action: impl Into<String>,
        status: LogStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workload: workload.map(str::to_string),
            action: action.into(),
            status,
            message: message.into(),
            detail: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web1() -> WorkloadSpec {
        WorkloadSpec::new(
            "web1",
            "nginx:latest",
            NetworkDescriptor {
                vlan_id: 150,
                ip_address: "10.0.150.10".into(),
                mac_address: "AA:BB:CC:DD:EE:FF".into(),
                parent_interface: "igc2".into(),
                allow_internet: true,
            },
        )
    }

    #[test]
    fn request_accepts_legacy_network_key_and_defaults() {
        let spec: WorkloadSpec = serde_json::from_value(serde_json::json!({
            "name": "web1",
            "image": "nginx:latest",
            "network_config": {
                "vlan_id": 150,
                "ip_address": "10.0.150.10",
                "mac_address": "aa:bb:cc:dd:ee:ff"
            },
            "ports": [{ "host_port": 8080, "container_port": 80 }]
        }))
        .expect("request");
        assert_eq!(spec.network.parent_interface, "igc2");
        assert!(spec.network.allow_internet);
        assert_eq!(spec.ports[0].protocol, PortProtocol::Tcp);
        assert_eq!(spec.restart_policy, "unless-stopped");
    }

    #[test]
    fn validation_normalizes_mac_and_checks_policy() {
        let spec = web1().validated().expect("valid");
        assert_eq!(spec.network.mac_address, "aa:bb:cc:dd:ee:ff");

        let mut bad = web1();
        bad.restart_policy = "sometimes".into();
        assert!(bad.validated().is_err());

        let mut bad = web1();
        bad.network.vlan_id = 4095;
        assert!(bad.validated().is_err());

        let mut bad = web1();
        bad.ports.push(PortMapping {
            host_port: 0,
            container_port: 80,
            protocol: PortProtocol::Tcp,
        });
        assert!(bad.validated().is_err());
    }

    #[test]
    fn both_overlaps_everything_transport() {
        assert!(PortProtocol::Both.overlaps(PortProtocol::Udp));
        assert!(!PortProtocol::Tcp.overlaps(PortProtocol::Udp));
        assert!(PortProtocol::Tcp.overlaps_forward(Protocol::Any));
        assert!(PortProtocol::Udp.overlaps_forward(Protocol::TcpUdp));
        assert!(!PortProtocol::Udp.overlaps_forward(Protocol::Tcp));
        assert_eq!(PortProtocol::Both.forward_protocol(), Protocol::TcpUdp);
    }

    #[test]
    fn patch_replaces_only_given_fields() {
        let mut spec = web1();
        spec.apply(WorkloadPatch {
            image: Some("nginx:1.27".into()),
            ..WorkloadPatch::default()
        });
        assert_eq!(spec.image, "nginx:1.27");
        assert_eq!(spec.network.vlan_id, 150);
    }
}
