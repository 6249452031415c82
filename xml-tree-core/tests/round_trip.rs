use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use xml_tree_core::{parse, parse_file, write, write_file, XmlNode};

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

#[test]
fn parse_write_parse_round_trip_preserves_tree_shape() {
    let first = parse_file(&fixture("fixtures/opnsense-base.xml")).expect("initial parse");

    let written = write(&first).expect("write should succeed");
    let second = parse(&written).expect("re-parse should succeed");

    assert_eq!(first, second);
}

#[test]
fn write_file_replaces_existing_document() {
    let out_dir = tempfile::tempdir().expect("tempdir should be created");
    let out_path = out_dir.path().join("config.xml");
    fs::write(&out_path, "<opnsense><stale/></opnsense>").expect("seed file");

    let mut node = XmlNode::new("opnsense");
    node.get_or_create_child("vlans")
        .children
        .push(XmlNode::with_text("vlan", "x"));
    write_file(&node, &out_path).expect("write_file should succeed");

    let reparsed = parse_file(&out_path).expect("parse_file should succeed");
    assert_eq!(node, reparsed);
    let leftovers = fs::read_dir(out_dir.path()).expect("read_dir").count();
    assert_eq!(leftovers, 1);
}

#[test]
fn write_file_creates_missing_parent_directories() {
    let out_dir = tempfile::tempdir().expect("tempdir should be created");
    let out_path = out_dir.path().join("conf").join("config.xml");

    write_file(&XmlNode::new("opnsense"), &out_path).expect("write_file should succeed");
    assert!(out_path.exists());
}
