//! Pre-flight conflict detection for workload deployments.
//!
//! Detection reads the current backend and workload store and never mutates
//! either. An empty report means the deployment may proceed.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::deploy::forward_description;
use crate::error::Result;
use crate::model::{PortForward, PortMapping, WorkloadRecord, WorkloadSpec};
use crate::service::ConfigService;
use crate::store::WorkloadStore;
use crate::validate::{self, PortRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictCategory {
    Vlan,
    Ip,
    Mac,
    Port,
}

impl ConflictCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vlan => "vlan",
            Self::Ip => "ip",
            Self::Mac => "mac",
            Self::Port => "port",
        }
    }
}

/// Conflict messages keyed by category. Categories without conflicts are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictReport(BTreeMap<ConflictCategory, Vec<String>>);

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, category: ConflictCategory) -> &[String] {
        self.0.get(&category).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn push(&mut self, category: ConflictCategory, message: impl Into<String>) {
        self.0.entry(category).or_default().push(message.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (ConflictCategory, &[String])> {
        self.0.iter().map(|(c, m)| (*c, m.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl Display for ConflictReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (category, messages) in self.iter() {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {message}", category.as_str())?;
                first = false;
            }
        }
        Ok(())
    }
}

pub struct ConflictDetector<'a> {
    service: &'a ConfigService,
    store: &'a dyn WorkloadStore,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(service: &'a ConfigService, store: &'a dyn WorkloadStore) -> Self {
        Self { service, store }
    }

    /// Check `spec` against current state. The workload named by `spec` is
    /// never counted against itself.
    pub fn detect(&self, spec: &WorkloadSpec) -> Result<ConflictReport> {
        let mut report = ConflictReport::default();
        let others: Vec<WorkloadRecord> = self
            .store
            .list_workloads()?
            .into_iter()
            .filter(|w| w.name() != spec.name)
            .collect();

        self.check_vlan(spec, &mut report)?;
        self.check_ip(spec, &others, &mut report)?;
        check_mac(spec, &others, &mut report);
        let forwards = self.forwards()?;
        for mapping in &spec.ports {
            check_forwards(spec, mapping, &forwards, &mut report);
            check_workload_ports(mapping, &others, &mut report);
        }

        debug!(workload = %spec.name, conflicts = report.len(), "conflict detection finished");
        Ok(report)
    }

    fn check_vlan(&self, spec: &WorkloadSpec, report: &mut ConflictReport) -> Result<()> {
        let marker = spec.vlan_marker();
        for vlan in self.service.list_vlans()? {
            if vlan.tag == spec.network.vlan_id && vlan.description != marker {
                report.push(
                    ConflictCategory::Vlan,
                    format!(
                        "VLAN {} is already in use by '{}'",
                        spec.network.vlan_id, vlan.description
                    ),
                );
            }
        }
        Ok(())
    }

    fn check_ip(
        &self,
        spec: &WorkloadSpec,
        others: &[WorkloadRecord],
        report: &mut ConflictReport,
    ) -> Result<()> {
        let ip = &spec.network.ip_address;
        for iface in self.service.list_interfaces()? {
            if validate::same_ipv4(&iface.ipaddr, ip) {
                report.push(
                    ConflictCategory::Ip,
                    format!("IP address {ip} is already assigned to interface '{}'", iface.name),
                );
            }
        }
        for other in others {
            if validate::same_ipv4(&other.spec.network.ip_address, ip) {
                report.push(
                    ConflictCategory::Ip,
                    format!("IP address {ip} is already assigned to container '{}'", other.name()),
                );
            }
        }
        Ok(())
    }

    /// Port forwards, or none when the backend cannot list them.
    fn forwards(&self) -> Result<Vec<PortForward>> {
        match self.service.list_port_forwards(None) {
            Ok(forwards) => Ok(forwards),
            Err(err) if err.is_recoverable() => {
                warn!("port forward check skipped: {err}");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }
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

fn check_mac(spec: &WorkloadSpec, others: &[WorkloadRecord], report: &mut ConflictReport) {
    let mac = &spec.network.mac_address;
    for other in others {
        if same_mac(&other.spec.network.mac_address, mac) {
            report.push(
                ConflictCategory::Mac,
                format!("MAC address {mac} is already assigned to container '{}'", other.name()),
            );
        }
    }
}

/// A forward this workload created itself, or one already pointing where the mapping would.
fn forward_target_matches(forward: &PortForward, spec: &WorkloadSpec, mapping: &PortMapping) -> bool {
    if forward.description == forward_description(&spec.name) {
        return true;
    }
    validate::same_ipv4(&forward.dst_ip, &spec.network.ip_address)
        && validate::port_range("dst_port", &forward.dst_port)
            .is_ok_and(|r| r == PortRange::single(mapping.container_port))
}

fn check_forwards(
    spec: &WorkloadSpec,
    mapping: &PortMapping,
    forwards: &[PortForward],
    report: &mut ConflictReport,
) {
    for forward in forwards.iter().filter(|f| f.enabled) {
        let Ok(external) = validate::port_range("src_port", &forward.src_port) else {
            debug!(uuid = %forward.uuid, port = %forward.src_port, "ignoring forward with unreadable port");
            continue;
        };
        if !external.contains(mapping.host_port)
            || !mapping.protocol.overlaps_forward(forward.protocol)
            || forward_target_matches(forward, spec, mapping)
        {
            continue;
        }
        report.push(
            ConflictCategory::Port,
            format!(
                "Port {}/{} is already forwarded to {}:{}",
                mapping.host_port, mapping.protocol, forward.dst_ip, forward.dst_port
            ),
        );
    }
}

fn check_workload_ports(mapping: &PortMapping, others: &[WorkloadRecord], report: &mut ConflictReport) {
    for other in others {
        let clash = other
            .spec
            .ports
            .iter()
            .any(|p| p.host_port == mapping.host_port && p.protocol.overlaps(mapping.protocol));
        if clash {
            report.push(
                ConflictCategory::Port,
                format!(
                    "Port {}/{} is already used by container '{}'",
                    mapping.host_port,
                    mapping.protocol,
                    other.name()
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{ConflictCategory, ConflictDetector, ConflictReport};
    use crate::model::{NetworkDescriptor, PortMapping, PortProtocol, WorkloadRecord, WorkloadSpec};
    use crate::service::ConfigService;
    use crate::store::{MemoryStore, WorkloadStore};

    fn spec(name: &str, vlan: u16, ip: &str, mac: &str) -> WorkloadSpec {
        WorkloadSpec::new(
            name,
            "nginx:latest",
            NetworkDescriptor {
                vlan_id: vlan,
                ip_address: ip.into(),
                mac_address: mac.into(),
                parent_interface: "igc2".into(),
                allow_internet: true,
            },
        )
    }

    fn record(spec: WorkloadSpec) -> WorkloadRecord {
        WorkloadRecord {
            id: "c0ffee".into(),
            status: "running".into(),
            spec,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn report_serializes_as_category_map() {
        let mut report = ConflictReport::default();
        report.push(ConflictCategory::Port, "p");
        report.push(ConflictCategory::Vlan, "v");
        assert_eq!(
            serde_json::to_value(&report).expect("json"),
            json!({"vlan": ["v"], "port": ["p"]})
        );
        assert_eq!(report.to_string(), "vlan: v; port: p");
        assert!(report.get(ConflictCategory::Mac).is_empty());
    }

    #[test]
    fn other_workloads_collide_on_ip_mac_and_port() {
        let store = MemoryStore::new();
        let mut existing = spec("api", 160, "10.0.150.10", "AA:BB:CC:DD:EE:FF");
        existing.ports.push(PortMapping {
            host_port: 8080,
            container_port: 8080,
            protocol: PortProtocol::Both,
        });
        store.put_workload(&record(existing)).expect("put");

        // The document-less service has no VLANs or forwards to consult.
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");
        std::fs::write(&path, "<opnsense/>").expect("write");
        let service = ConfigService::new(Box::new(crate::backend::DocumentBackend::new(path)));

        let mut web1 = spec("web1", 150, "10.0.150.10", "aa:bb:cc:dd:ee:ff");
        web1.ports.push(PortMapping {
            host_port: 8080,
            container_port: 80,
            protocol: PortProtocol::Tcp,
        });
        let report = ConflictDetector::new(&service, &store)
            .detect(&web1)
            .expect("detect");
        assert_eq!(report.get(ConflictCategory::Ip).len(), 1);
        assert_eq!(
            report.get(ConflictCategory::Mac),
            ["MAC address aa:bb:cc:dd:ee:ff is already assigned to container 'api'"]
        );
        assert_eq!(
            report.get(ConflictCategory::Port),
            ["Port 8080/tcp is already used by container 'api'"]
        );

        // Redeploying the same name is not a conflict with itself.
        let api_again = spec("api", 160, "10.0.150.10", "aa:bb:cc:dd:ee:ff");
        let report = ConflictDetector::new(&service, &store)
            .detect(&api_again)
            .expect("detect");
        assert!(report.is_empty());
    }

    #[test]
    fn addresses_on_record_match_whatever_their_spelling() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.xml");
        std::fs::write(
            &path,
            "<opnsense><interfaces><opt9><if>igc9</if><ipaddr>010.0.151.001</ipaddr>\
             <subnet>24</subnet></opt9></interfaces></opnsense>",
        )
        .expect("write");
        let service = ConfigService::new(Box::new(crate::backend::DocumentBackend::new(path)));

        let store = MemoryStore::new();
        store
            .put_workload(&record(spec("legacy", 150, "010.0.150.010", "02:00:00:00:00:01")))
            .expect("put");

        let detector = ConflictDetector::new(&service, &store);
        let report = detector
            .detect(&spec("web1", 150, "10.0.150.10", "aa:bb:cc:dd:ee:ff"))
            .expect("detect");
        assert_eq!(
            report.get(ConflictCategory::Ip),
            ["IP address 10.0.150.10 is already assigned to container 'legacy'"]
        );

        let report = detector
            .detect(&spec("web2", 151, "10.0.151.1", "aa:bb:cc:dd:ee:01"))
            .expect("detect");
        assert_eq!(
            report.get(ConflictCategory::Ip),
            ["IP address 10.0.151.1 is already assigned to interface 'opt9'"]
        );
    }
}
