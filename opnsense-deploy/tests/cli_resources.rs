use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn fixture(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join(path)
}

fn scratch() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::copy(fixture("fixtures/opnsense-base.xml"), dir.path().join("config.xml"))
        .expect("copy fixture");
    dir
}

fn bare() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("opnsense-deploy"));
    cmd.env_clear().env("NO_COLOR", "1");
    cmd
}

fn cli(dir: &TempDir) -> Command {
    let mut cmd = bare();
    cmd.arg("--config-path")
        .arg(dir.path().join("config.xml"))
        .arg("--runtime")
        .arg("memory")
        .arg("--state-dir")
        .arg(dir.path().join("state"));
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn interfaces_list_prints_each_interface() {
    let dir = scratch();
    cli(&dir)
        .args(["interfaces", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wan"))
        .stdout(predicate::str::contains("addr=192.168.1.1/24"))
        .stdout(predicate::str::contains("if=igc1"));
}

#[test]
fn vlans_list_as_json() {
    let dir = scratch();
    let value = json_stdout(cli(&dir).args(["--format", "json", "vlans", "list"]));
    let vlans = value.as_array().expect("array");
    assert_eq!(vlans.len(), 1);
    assert_eq!(vlans[0]["tag"], 100);
    assert_eq!(vlans[0]["vlanif"], "igc0_vlan100");
}

#[test]
fn vlan_create_then_delete() {
    let dir = scratch();
    let created = json_stdout(cli(&dir).args([
        "--format",
        "json",
        "vlans",
        "create",
        "--parent",
        "igc2",
        "--tag",
        "150",
        "--description",
        "Lab",
    ]));
    assert_eq!(created["vlanif"], "igc2_vlan150");
    let uuid = created["uuid"].as_str().expect("uuid").to_string();

    cli(&dir)
        .args(["vlans", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vlanif=igc2_vlan150"));

    cli(&dir)
        .args(["vlans", "delete", &uuid])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("deleted VLAN {uuid}")));

    cli(&dir)
        .args(["vlans", "show", &uuid])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_found"));
}

#[test]
fn out_of_range_tag_is_a_validation_failure() {
    let dir = scratch();
    let before = fs::read_to_string(dir.path().join("config.xml")).expect("read");
    cli(&dir)
        .args(["vlans", "create", "--parent", "igc2", "--tag", "5000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation_failed"));
    assert_eq!(
        fs::read_to_string(dir.path().join("config.xml")).expect("read"),
        before
    );
}

#[test]
fn rule_create_filters_by_interface() {
    let dir = scratch();
    cli(&dir)
        .args([
            "rules",
            "create",
            "--interface",
            "lan",
            "--action",
            "block",
            "--protocol",
            "tcp",
            "--source-address",
            "192.168.1.50",
            "--destination-port",
            "22",
            "--description",
            "No SSH from printer",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("block"));

    cli(&dir)
        .args(["rules", "list", "--interface", "lan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No SSH from printer"))
        .stdout(predicate::str::contains("Default allow LAN"));

    cli(&dir)
        .args(["rules", "list", "--interface", "wan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no firewall rules"));
}

#[test]
fn forward_create_rejects_bad_port() {
    let dir = scratch();
    cli(&dir)
        .args([
            "forwards", "create", "--src-port", "70000", "--dst-ip", "10.0.0.9", "--dst-port", "80",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("validation_failed"));
}

#[test]
fn static_mapping_add_and_list() {
    let dir = scratch();
    cli(&dir)
        .args([
            "dhcp",
            "add-mapping",
            "lan",
            "--mac",
            "02:00:00:00:00:01",
            "--ip",
            "192.168.1.20",
            "--hostname",
            "printer",
        ])
        .assert()
        .success();

    cli(&dir)
        .args(["dhcp", "mappings", "lan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nas"))
        .stdout(predicate::str::contains("printer"));
}

#[test]
fn leases_report_missing_capability() {
    let dir = scratch();
    cli(&dir)
        .args(["dhcp", "leases", "lan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_implemented_on_backend"));
}

#[test]
fn apply_only_firewall() {
    let dir = scratch();
    cli(&dir)
        .args(["apply", "--only", "firewall"])
        .assert()
        .success()
        .stdout(predicate::str::contains("APPLIED firewall changes saved"));
}

#[test]
fn no_backend_is_not_configured() {
    bare()
        .args(["interfaces", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not_configured"));
}

#[test]
fn settings_file_selects_the_document() {
    let dir = scratch();
    let settings = dir.path().join("settings.toml");
    fs::write(
        &settings,
        format!(
            "[document]\npath = {:?}\nbackup = false\n\n[runtime]\nengine = \"memory\"\n",
            dir.path().join("config.xml").display().to_string()
        ),
    )
    .expect("write settings");

    bare()
        .arg("--settings")
        .arg(&settings)
        .args(["interfaces", "show", "lan"])
        .assert()
        .success()
        .stdout(predicate::str::contains("LAN"));
}

#[test]
fn unknown_settings_key_is_rejected() {
    let dir = scratch();
    let settings = dir.path().join("settings.toml");
    fs::write(&settings, "[document]\nfile = \"config.xml\"\n").expect("write settings");

    bare()
        .arg("--settings")
        .arg(&settings)
        .args(["interfaces", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown field"));
}
