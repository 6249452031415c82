use std::fs;
use std::path::PathBuf;

use opnsense_deploy::backend::DocumentBackend;
use opnsense_deploy::error::ErrorKind;
use opnsense_deploy::model::{
    Endpoint, EndpointTarget, InterfacePatch, NewDhcpConfig, NewFirewallRule, NewInterface,
    NewPortForward, NewStaticMapping, NewVlan, Protocol, RuleAction, VlanPatch,
};
use opnsense_deploy::service::ConfigService;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn scratch() -> (TempDir, PathBuf, ConfigService) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.xml");
    fs::copy(fixture("fixtures/opnsense-base.xml"), &path).expect("copy fixture");
    let service = ConfigService::new(Box::new(DocumentBackend::new(path.clone())));
    (dir, path, service)
}

#[test]
fn reads_every_section_of_the_base_document() {
    let (_dir, _path, service) = scratch();

    let interfaces = service.list_interfaces().expect("interfaces");
    let names: Vec<&str> = interfaces.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["wan", "lan"]);
    let lan = service.get_interface("lan").expect("lan");
    assert_eq!(lan.physical, "igc1");
    assert_eq!(lan.ipaddr, "192.168.1.1");
    assert_eq!(lan.subnet, Some(24));
    assert_eq!(lan.mtu, Some(1500));
    assert!(lan.enabled);
    assert_eq!(lan.uuid, "4b1a3c1e-64a4-4f5b-8d0c-0d2c4e9a1f01");

    let vlans = service.list_vlans().expect("vlans");
    assert_eq!(vlans.len(), 1);
    assert_eq!(vlans[0].uuid, "9f0e8d7c-6b5a-4493-8281-706f5e4d3c2b");
    assert_eq!(vlans[0].vlanif, "igc0_vlan100");

    let rules = service.list_firewall_rules(None).expect("rules");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].action, RuleAction::Pass);
    assert_eq!(rules[0].source.target, EndpointTarget::Network("lan".into()));
    assert_eq!(rules[0].destination.target, EndpointTarget::Any);

    let forwards = service.list_port_forwards(Some("wan")).expect("forwards");
    assert_eq!(forwards.len(), 1);
    assert_eq!(forwards[0].protocol, Protocol::Tcp);
    assert_eq!(forwards[0].src_port, "8080");
    assert_eq!(forwards[0].dst_ip, "10.0.0.5");
    assert_eq!(forwards[0].dst_port, "80");
    assert!(forwards[0].enabled);

    let dhcp = service.get_dhcp_config("lan").expect("dhcp");
    assert_eq!(dhcp.range_from, "192.168.1.100");
    assert_eq!(dhcp.range_to, "192.168.1.199");
    assert_eq!(dhcp.static_mappings.len(), 1);
    assert_eq!(dhcp.static_mappings[0].hostname, "nas");
}

#[test]
fn reads_do_not_touch_the_file() {
    let (_dir, path, service) = scratch();
    let before = fs::read_to_string(&path).expect("read");
    service.list_interfaces().expect("interfaces");
    service.list_vlans().expect("vlans");
    service.list_dhcp_configs().expect("dhcp");
    assert_eq!(fs::read_to_string(&path).expect("read"), before);
}

#[test]
fn identifiers_of_unkeyed_entries_are_stable_across_reads() {
    let (_dir, _path, service) = scratch();
    let first = service.get_interface("wan").expect("wan").uuid;
    let second = service.get_interface("wan").expect("wan").uuid;
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn interface_lifecycle_persists_and_backs_up() {
    let (_dir, path, service) = scratch();
    let backend = DocumentBackend::new(path.clone());

    let mut new = NewInterface::new("opt3", "igc3");
    new.ipaddr = "172.16.3.1".into();
    new.subnet = Some(24);
    new.description = "Lab".into();
    let created = service.create_interface(new.clone()).expect("create");
    assert_eq!(created.name, "opt3");
    assert!(backend.backup_path().exists());

    let err = service.create_interface(new).expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let updated = service
        .update_interface(
            "opt3",
            InterfacePatch {
                description: Some("Lab net".into()),
                ..InterfacePatch::default()
            },
        )
        .expect("update");
    assert_eq!(updated.description, "Lab net");
    assert_eq!(updated.ipaddr, "172.16.3.1");
    assert_eq!(updated.subnet, Some(24));

    let reopened = ConfigService::new(Box::new(DocumentBackend::new(path)));
    assert_eq!(reopened.get_interface("opt3").expect("reread").description, "Lab net");

    reopened.delete_interface("opt3").expect("delete");
    let err = reopened.get_interface("opt3").expect_err("gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn created_records_read_back_as_returned() {
    let (_dir, path, service) = scratch();

    let mut new = NewInterface::new("opt4", "igc3");
    new.ipaddr = "172.16.4.1".into();
    new.subnet = Some(24);
    new.spoofmac = "02-00-00-00-00-04".into();
    new.mtu = Some(9000);
    let interface = service.create_interface(new).expect("create interface");
    assert_eq!(interface.spoofmac, "02:00:00:00:00:04");

    let dhcp = service
        .create_dhcp_config(NewDhcpConfig {
            interface: "opt4".into(),
            enabled: true,
            range_from: "172.16.4.100".into(),
            range_to: "172.16.4.150".into(),
            gateway: "172.16.4.1".into(),
            dns_server: String::new(),
            domain: "lab4.internal".into(),
        })
        .expect("create dhcp");
    assert!(dhcp.static_mappings.is_empty());

    let reopened = ConfigService::new(Box::new(DocumentBackend::new(path)));
    assert_eq!(reopened.get_interface("opt4").expect("interface"), interface);
    assert_eq!(reopened.get_dhcp_config("opt4").expect("dhcp"), dhcp);
}

#[test]
fn invalid_input_never_reaches_the_document() {
    let (_dir, path, service) = scratch();
    let before = fs::read_to_string(&path).expect("read");

    let mut new = NewInterface::new("opt4", "igc4");
    new.ipaddr = "10.0.0.256".into();
    let err = service.create_interface(new).expect_err("bad address");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    let err = service
        .create_vlan(NewVlan::new("igc2", 4095, ""))
        .expect_err("bad tag");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    let err = service
        .create_static_mapping("lan", NewStaticMapping::new("00:11:22:33:44", "192.168.1.20"))
        .expect_err("bad mac");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    assert_eq!(fs::read_to_string(&path).expect("read"), before);
}

#[test]
fn names_that_cannot_be_element_names_are_refused() {
    let (_dir, path, service) = scratch();
    let before = fs::read_to_string(&path).expect("read");

    for name in ["my lan", "lan<x>", "9lan", ""] {
        let err = service
            .create_interface(NewInterface::new(name, "igc3"))
            .expect_err(name);
        assert_eq!(err.kind(), ErrorKind::ValidationFailed, "{name}");

        let err = service
            .create_static_mapping(name, NewStaticMapping::new("02:00:00:00:00:09", "10.9.0.9"))
            .expect_err(name);
        assert_eq!(err.kind(), ErrorKind::ValidationFailed, "{name}");
    }

    let err = service
        .create_dhcp_config(NewDhcpConfig {
            interface: "guest net".into(),
            enabled: true,
            range_from: String::new(),
            range_to: String::new(),
            gateway: String::new(),
            dns_server: String::new(),
            domain: String::new(),
        })
        .expect_err("spaced interface");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    let err = service.delete_dhcp_config("lan&wan").expect_err("ampersand");
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);

    assert_eq!(fs::read_to_string(&path).expect("read"), before);
    assert_eq!(service.list_interfaces().expect("still readable").len(), 2);
}

#[test]
fn vlan_create_update_and_duplicate_detection() {
    let (_dir, _path, service) = scratch();

    let created = service
        .create_vlan(NewVlan::new("igc2", 150, "Lab VLAN"))
        .expect("create");
    assert_eq!(created.vlanif, "igc2_vlan150");

    let err = service
        .create_vlan(NewVlan::new("igc2", 150, "again"))
        .expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    // Same tag on another parent is a different VLAN.
    service
        .create_vlan(NewVlan::new("igc3", 150, "other parent"))
        .expect("other parent");

    let moved = service
        .update_vlan(
            &created.uuid,
            VlanPatch {
                tag: Some(151),
                ..VlanPatch::default()
            },
        )
        .expect("update");
    assert_eq!(moved.vlanif, "igc2_vlan151");
    assert_eq!(moved.description, "Lab VLAN");

    service.delete_vlan(&created.uuid).expect("delete");
    let err = service.get_vlan(&created.uuid).expect_err("gone");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn rules_and_forwards_round_through_the_document() {
    let (_dir, _path, service) = scratch();

    let mut rule = NewFirewallRule::new(RuleAction::Block, "lan");
    rule.protocol = Protocol::Tcp;
    rule.source = Endpoint::address("192.168.1.50");
    rule.destination = Endpoint::any().with_port("22");
    rule.description = "No SSH from printer".into();
    let created = service.create_firewall_rule(rule).expect("rule");
    let fetched = service.get_firewall_rule(&created.uuid).expect("get rule");
    assert_eq!(fetched.action, RuleAction::Block);
    assert_eq!(fetched.source.target, EndpointTarget::Address("192.168.1.50".into()));
    assert_eq!(fetched.destination.port.as_deref(), Some("22"));
    assert_eq!(service.list_firewall_rules(Some("lan")).expect("rules").len(), 2);

    let forward = service
        .create_port_forward(NewPortForward {
            interface: "wan".into(),
            protocol: Protocol::Udp,
            src_port: "5000:5010".into(),
            dst_ip: "192.168.1.60".into(),
            dst_port: "5000:5010".into(),
            src_ip: None,
            description: "Game server".into(),
            enabled: true,
        })
        .expect("forward");
    let fetched = service.get_port_forward(&forward.uuid).expect("get forward");
    assert_eq!(fetched.protocol, Protocol::Udp);
    assert_eq!(fetched.src_port, "5000:5010");

    service.delete_port_forward(&forward.uuid).expect("delete forward");
    service.delete_firewall_rule(&created.uuid).expect("delete rule");
    assert_eq!(service.list_port_forwards(None).expect("forwards").len(), 1);
    assert_eq!(service.list_firewall_rules(None).expect("rules").len(), 1);
}

#[test]
fn static_mappings_reject_reused_mac_or_address() {
    let (_dir, _path, service) = scratch();

    let mut mapping = NewStaticMapping::new("02-00-00-00-00-01", "192.168.1.20");
    mapping.hostname = "printer".into();
    let created = service.create_static_mapping("lan", mapping).expect("create");
    assert_eq!(created.mac, "02:00:00:00:00:01");

    let err = service
        .create_static_mapping("lan", NewStaticMapping::new("02:00:00:00:00:01", "192.168.1.21"))
        .expect_err("same mac");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let err = service
        .create_static_mapping("lan", NewStaticMapping::new("02:00:00:00:00:02", "192.168.1.10"))
        .expect_err("same address as nas");
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    assert_eq!(service.list_static_mappings("lan").expect("list").len(), 2);
    service
        .delete_static_mapping("lan", &created.uuid)
        .expect("delete");
    assert_eq!(service.list_static_mappings("lan").expect("list").len(), 1);
}

#[test]
fn leases_are_not_available_from_the_document() {
    let (_dir, _path, service) = scratch();
    let err = service.list_dhcp_leases("lan").expect_err("unsupported");
    assert_eq!(err.kind(), ErrorKind::NotImplementedOnBackend);
}

#[test]
fn apply_reports_success_without_touching_the_appliance() {
    let (_dir, _path, service) = scratch();
    let status = service.apply_pending_changes().expect("apply");
    assert!(status.success);
}

#[test]
fn missing_document_is_backend_unavailable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = ConfigService::new(Box::new(DocumentBackend::new(dir.path().join("absent.xml"))));
    let err = service.list_interfaces().expect_err("missing file");
    assert_eq!(err.kind(), ErrorKind::BackendUnavailable);
}
