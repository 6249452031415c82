use std::path::PathBuf;

use xml_tree_core::parse_file;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn parses_sections_attributes_and_empty_elements() {
    let node = parse_file(&fixture("fixtures/opnsense-base.xml")).expect("parse should succeed");
    assert_eq!(node.tag, "opnsense");

    let vlans = node.get_child("vlans").expect("vlans should exist");
    assert_eq!(vlans.attributes.get("version"), Some(&"1.0.0".to_string()));
    let vlan = vlans.get_children("vlan");
    assert_eq!(vlan.len(), 1);
    assert!(vlan[0].attributes.contains_key("uuid"));
    assert!(vlan[0].get_child("proto").is_some());

    let lan = node
        .get_child("interfaces")
        .and_then(|i| i.get_child("lan"))
        .expect("lan should exist");
    assert_eq!(lan.child_text("ipaddr"), Some("192.168.1.1"));
    assert_eq!(lan.child_text("spoofmac"), None);
}

#[test]
fn nested_text_paths_resolve() {
    let node = parse_file(&fixture("fixtures/opnsense-base.xml")).expect("parse should succeed");
    assert_eq!(
        node.get_text(&["dhcpd", "lan", "range", "from"]),
        Some("192.168.1.100")
    );
    assert_eq!(
        node.get_text(&["nat", "rule", "destination", "port"]),
        Some("8080")
    );
}
