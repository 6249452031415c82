use std::fs;
use std::path::PathBuf;

use opnsense_deploy::backend::DocumentBackend;
use opnsense_deploy::conflict::ConflictCategory;
use opnsense_deploy::deploy::{
    egress_rule_description, forward_description, mapping_description, Orchestrator,
    VALIDATION_CONFLICT, VALIDATION_OK,
};
use opnsense_deploy::error::ErrorKind;
use opnsense_deploy::model::{
    LogStatus, NetworkDescriptor, PortMapping, PortProtocol, WorkloadPatch, WorkloadSpec,
};
use opnsense_deploy::runtime::MemoryRuntime;
use opnsense_deploy::service::ConfigService;
use opnsense_deploy::store::{MemoryStore, WorkloadStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

/// Service over a scratch copy of the base appliance document.
fn scratch_service() -> (TempDir, PathBuf, ConfigService) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.xml");
    fs::copy(fixture("fixtures/opnsense-base.xml"), &path).expect("copy fixture");
    let service = ConfigService::new(Box::new(DocumentBackend::new(path.clone())));
    (dir, path, service)
}

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

fn web1() -> WorkloadSpec {
    let mut spec = spec("web1", 150, "10.0.150.10", "AA:BB:CC:DD:EE:FF");
    spec.ports.push(PortMapping {
        host_port: 8081,
        container_port: 80,
        protocol: PortProtocol::Tcp,
    });
    spec
}

#[test]
fn deploy_creates_every_resource_and_records_the_workload() {
    let (_dir, path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let done = orchestrator.deploy(web1()).expect("deploy");
    assert_eq!(done.workload.name(), "web1");
    assert_eq!(done.workload.status, "running");
    assert!(done.warnings.is_empty(), "{:?}", done.warnings);
    assert_eq!(done.notes.len(), 1);
    assert!(done.notes[0].contains("load-balancer"));

    let vlan = service
        .list_vlans()
        .expect("vlans")
        .into_iter()
        .find(|v| v.tag == 150)
        .expect("vlan 150");
    assert_eq!(vlan.parent, "igc2");
    assert_eq!(vlan.vlanif, "igc2_vlan150");
    assert_eq!(vlan.description, "Container web1 VLAN");

    let mappings = service.list_static_mappings("opt150").expect("mappings");
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].ipaddr, "10.0.150.10");
    assert!(mappings[0].mac.eq_ignore_ascii_case("aa:bb:cc:dd:ee:ff"));
    assert_eq!(mappings[0].hostname, "web1");
    assert_eq!(mappings[0].description, mapping_description("web1"));

    let rules = service.list_firewall_rules(Some("opt150")).expect("rules");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].description, egress_rule_description("web1"));

    let forwards: Vec<_> = service
        .list_port_forwards(None)
        .expect("forwards")
        .into_iter()
        .filter(|f| f.description == forward_description("web1"))
        .collect();
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].interface, "wan");
    assert_eq!(forwards[0].src_port, "8081");
    assert_eq!(forwards[0].dst_ip, "10.0.150.10");
    assert_eq!(forwards[0].dst_port, "80");

    assert_eq!(runtime.names(), vec!["web1".to_string()]);
    assert!(store.get_workload("web1").expect("store").is_some());

    let written = fs::read_to_string(&path).expect("read back");
    assert!(written.contains("<vlanif>igc2_vlan150</vlanif>"));
    assert!(written.contains("<opt150>"));

    let statuses: Vec<LogStatus> = store
        .list_logs(Some("web1"))
        .expect("logs")
        .into_iter()
        .filter(|e| e.action == "deploy")
        .map(|e| e.status)
        .collect();
    assert_eq!(statuses, vec![LogStatus::Started, LogStatus::Success]);
}

#[test]
fn validate_accepts_a_free_request_and_changes_nothing() {
    let (_dir, path, service) = scratch_service();
    let before = fs::read_to_string(&path).expect("read");
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let outcome = orchestrator.validate(web1()).expect("validate");
    assert!(outcome.valid);
    assert_eq!(outcome.message, VALIDATION_OK);
    assert!(outcome.conflicts.is_empty());
    assert_eq!(fs::read_to_string(&path).expect("read"), before);
    assert!(runtime.names().is_empty());
}

#[test]
fn vlan_owned_by_another_workload_is_a_conflict() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let outcome = orchestrator
        .validate(spec("db", 100, "10.0.100.20", "02:00:00:00:00:20"))
        .expect("validate");
    assert!(!outcome.valid);
    assert_eq!(outcome.message, VALIDATION_CONFLICT);
    assert_eq!(
        outcome.conflicts.get(ConflictCategory::Vlan),
        ["VLAN 100 is already in use by 'Container other-app VLAN'".to_string()]
    );

    let err = orchestrator
        .deploy(spec("db", 100, "10.0.100.20", "02:00:00:00:00:20"))
        .expect_err("conflict");
    assert_eq!(err.kind(), ErrorKind::ConflictDetected);
    assert!(runtime.names().is_empty());
    assert_eq!(service.list_vlans().expect("vlans").len(), 1);
}

#[test]
fn interface_address_and_existing_forward_are_reported() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let mut request = spec("api", 160, "192.168.1.1", "02:00:00:00:00:30");
    request.ports.push(PortMapping {
        host_port: 8080,
        container_port: 3000,
        protocol: PortProtocol::Tcp,
    });
    let outcome = orchestrator.validate(request).expect("validate");
    assert_eq!(
        outcome.conflicts.get(ConflictCategory::Ip),
        ["IP address 192.168.1.1 is already assigned to interface 'lan'".to_string()]
    );
    assert_eq!(
        outcome.conflicts.get(ConflictCategory::Port),
        ["Port 8080/tcp is already forwarded to 10.0.0.5:80".to_string()]
    );
}

#[test]
fn second_workload_on_same_address_and_port_conflicts() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);
    orchestrator.deploy(web1()).expect("deploy web1");

    let mut clash = spec("web2", 150, "10.0.150.10", "aa:bb:cc:dd:ee:ff");
    clash.ports.push(PortMapping {
        host_port: 8081,
        container_port: 8080,
        protocol: PortProtocol::Both,
    });
    let outcome = orchestrator.validate(clash).expect("validate");
    assert_eq!(
        outcome.conflicts.get(ConflictCategory::Ip),
        ["IP address 10.0.150.10 is already assigned to container 'web1'".to_string()]
    );
    assert_eq!(
        outcome.conflicts.get(ConflictCategory::Mac),
        ["MAC address aa:bb:cc:dd:ee:ff is already assigned to container 'web1'".to_string()]
    );
    let ports = outcome.conflicts.get(ConflictCategory::Port);
    assert!(ports.contains(&"Port 8081/both is already used by container 'web1'".to_string()));
    assert!(ports
        .iter()
        .any(|m| m.starts_with("Port 8081/both is already forwarded to 10.0.150.10:80")));
    // VLAN 150 carries web1's marker.
    assert!(!outcome.conflicts.get(ConflictCategory::Vlan).is_empty());
}

#[test]
fn zero_padded_spelling_of_a_taken_address_is_refused() {
    let (_dir, path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);
    orchestrator.deploy(web1()).expect("deploy web1");
    let before = fs::read_to_string(&path).expect("read");

    let padded = spec("web2", 151, "010.0.150.010", "02:00:00:00:00:02");
    let err = orchestrator.validate(padded.clone()).expect_err("validate");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    let err = orchestrator.deploy(padded).expect_err("deploy");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    assert_eq!(runtime.names(), vec!["web1".to_string()]);
    assert_eq!(store.list_workloads().expect("workloads").len(), 1);
    assert_eq!(fs::read_to_string(&path).expect("read"), before);
}

#[test]
fn redeploying_the_same_name_is_already_exists() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);
    orchestrator.deploy(web1()).expect("deploy");

    let err = orchestrator.deploy(web1()).expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(runtime.names().len(), 1);
}

#[test]
fn runtime_failure_rolls_back_every_created_resource() {
    let (_dir, path, service) = scratch_service();
    let before = fs::read_to_string(&path).expect("read");
    let runtime = MemoryRuntime::failing("engine is down");
    let store = MemoryStore::new();
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let err = orchestrator.deploy(web1()).expect_err("runtime failure");
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
    assert!(err.to_string().contains("engine is down"));

    assert!(service.list_vlans().expect("vlans").iter().all(|v| v.tag != 150));
    assert!(service.list_static_mappings("opt150").expect("mappings").is_empty());
    assert!(service.list_firewall_rules(Some("opt150")).expect("rules").is_empty());
    assert_eq!(service.list_port_forwards(None).expect("forwards").len(), 1);
    assert!(store.get_workload("web1").expect("store").is_none());

    // Identifiers stamped on the first write stay; every created element is gone.
    let after = fs::read_to_string(&path).expect("read");
    assert!(!after.contains("igc2_vlan150"));
    assert!(!after.contains("Container web1"));
    assert!(before.contains("Legacy web forward") && after.contains("Legacy web forward"));

    let failed = store
        .list_logs(Some("web1"))
        .expect("logs")
        .into_iter()
        .find(|e| e.status == LogStatus::Failed)
        .expect("failure entry");
    assert_eq!(failed.detail["rolled_back"], serde_json::json!(4));
    assert_eq!(failed.detail["rollback_failures"], serde_json::json!([]));
}

#[test]
fn remove_deletes_what_deploy_created() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);
    orchestrator.deploy(web1()).expect("deploy");

    let removal = orchestrator.remove("web1").expect("remove");
    assert_eq!(removal.name, "web1");
    assert_eq!(removal.deleted.len(), 5, "{:?}", removal.deleted);
    assert!(runtime.names().is_empty());
    assert!(store.get_workload("web1").expect("store").is_none());
    assert!(service.list_vlans().expect("vlans").iter().all(|v| v.tag != 150));
    assert_eq!(service.list_port_forwards(None).expect("forwards").len(), 1);

    let err = orchestrator.remove("web1").expect_err("gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn update_moves_the_workload_to_its_new_address() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);
    orchestrator.deploy(web1()).expect("deploy");

    let mut network = web1().network;
    network.ip_address = "10.0.150.11".into();
    let done = orchestrator
        .update(
            "web1",
            WorkloadPatch {
                image: Some("nginx:1.27".into()),
                network: Some(network),
                ..WorkloadPatch::default()
            },
        )
        .expect("update");
    assert_eq!(done.workload.spec.image, "nginx:1.27");

    let mappings = service.list_static_mappings("opt150").expect("mappings");
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].ipaddr, "10.0.150.11");
    let forwards: Vec<_> = service
        .list_port_forwards(None)
        .expect("forwards")
        .into_iter()
        .filter(|f| f.description == forward_description("web1"))
        .collect();
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].dst_ip, "10.0.150.11");
}

#[test]
fn concurrent_deploys_of_distinct_workloads_both_land() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let first = spec("svc-a", 201, "10.0.201.10", "02:00:00:00:02:01");
    let second = spec("svc-b", 202, "10.0.202.10", "02:00:00:00:02:02");
    std::thread::scope(|scope| {
        let a = scope.spawn(|| orchestrator.deploy(first));
        let b = scope.spawn(|| orchestrator.deploy(second));
        a.join().expect("join a").expect("deploy a");
        b.join().expect("join b").expect("deploy b");
    });

    let tags: Vec<u16> = service.list_vlans().expect("vlans").iter().map(|v| v.tag).collect();
    assert!(tags.contains(&201) && tags.contains(&202));
    assert_eq!(runtime.names(), vec!["svc-a".to_string(), "svc-b".to_string()]);
}

#[test]
fn racing_deploys_of_the_same_address_admit_exactly_one() {
    let (_dir, _path, service) = scratch_service();
    let (runtime, store) = (MemoryRuntime::new(), MemoryStore::new());
    let orchestrator = Orchestrator::new(&service, &runtime, &store);

    let first = spec("race-a", 210, "10.0.210.10", "02:00:00:00:02:10");
    let second = spec("race-b", 211, "10.0.210.10", "02:00:00:00:02:11");
    let results = std::thread::scope(|scope| {
        let a = scope.spawn(|| orchestrator.deploy(first));
        let b = scope.spawn(|| orchestrator.deploy(second));
        [a.join().expect("join a"), b.join().expect("join b")]
    });

    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1);
    let failed = results.iter().find_map(|r| r.as_ref().err()).expect("one failure");
    assert_eq!(failed.kind(), ErrorKind::ConflictDetected);
    assert_eq!(runtime.names().len(), 1);
}
