//! Deployment orchestrator.
//!
//! A deployment turns one [`WorkloadSpec`] into a VLAN, a DHCP reservation, an
//! egress rule, port forwards and a running workload. Steps run strictly in
//! order. A missing backend capability in the reservation, egress, forward or
//! apply steps is downgraded to a warning; any other failure stops the
//! deployment and deletes what it created so far, newest first.

use std::collections::BTreeSet;

use serde_json::json;
use tracing::{error, info, warn};

use crate::conflict::ConflictDetector;
use crate::error::{ConfigError, ErrorKind, Result};
use crate::model::{
    DeploymentLog, Endpoint, LogStatus, NewFirewallRule, NewPortForward, NewStaticMapping,
    NewVlan, ResourceKind, RuleAction, WorkloadPatch, WorkloadRecord, WorkloadSpec,
};
use crate::runtime::{RuntimeError, WorkloadRuntime};
use crate::service::ConfigService;
use crate::store::WorkloadStore;
use crate::validate;

mod compensation;
mod locks;
mod response;

use compensation::{Compensation, Created};
pub use locks::{deployment_keys, KeyGuard, KeyLocks};
pub use response::{
    Deployment, DeploymentResponse, Removal, ValidationOutcome, VALIDATION_CONFLICT,
    VALIDATION_OK,
};

/// Container ports that sit behind the HTTP load balancer.
const HTTP_PORTS: [u16; 2] = [80, 443];

pub fn mapping_description(name: &str) -> String {
    format!("Container {name}")
}

pub fn egress_rule_description(name: &str) -> String {
    format!("Allow {name} Internet Access")
}

pub fn forward_description(name: &str) -> String {
    format!("Container {name} Port Forward")
}

pub struct Orchestrator<'a> {
    service: &'a ConfigService,
    runtime: &'a dyn WorkloadRuntime,
    store: &'a dyn WorkloadStore,
    locks: KeyLocks,
    wan_interface: String,
}

/// Per-run bookkeeping threaded through the steps.
#[derive(Default)]
struct Run {
    created: Compensation,
    warnings: Vec<String>,
    notes: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        service: &'a ConfigService,
        runtime: &'a dyn WorkloadRuntime,
        store: &'a dyn WorkloadStore,
    ) -> Self {
        Self {
            service,
            runtime,
            store,
            locks: KeyLocks::new(),
            wan_interface: "wan".to_string(),
        }
    }

    pub fn with_wan_interface(mut self, wan: impl Into<String>) -> Self {
        self.wan_interface = wan.into();
        self
    }

    pub fn locks(&self) -> &KeyLocks {
        &self.locks
    }

    fn detector(&self) -> ConflictDetector<'_> {
        ConflictDetector::new(self.service, self.store)
    }

    /// Append an audit entry. The audit trail never fails a deployment.
    fn log(&self, entry: DeploymentLog) {
        if let Err(err) = self.store.append_log(&entry) {
            warn!(action = %entry.action, "failed to write deployment log: {err}");
        }
    }

    // --- validate ---------------------------------------------------------------

    /// Dry run: shape checks then conflict detection. Mutates nothing.
    pub fn validate(&self, spec: WorkloadSpec) -> Result<ValidationOutcome> {
        let spec = spec.validated()?;
        let report = self.detector().detect(&spec)?;
        Ok(ValidationOutcome::from_report(report))
    }

    // --- deploy -----------------------------------------------------------------

    pub fn deploy(&self, spec: WorkloadSpec) -> Result<Deployment> {
        let spec = spec.validated()?;
        let _guard = self.locks.acquire(deployment_keys(&spec));
        self.deploy_locked(&spec)
    }

    fn deploy_locked(&self, spec: &WorkloadSpec) -> Result<Deployment> {
        let name = spec.name.as_str();
        self.log(
            DeploymentLog::new(Some(name), "deploy", LogStatus::Started, format!("Deploying {name}"))
                .with_detail(json!({ "image": spec.image, "vlan_id": spec.network.vlan_id })),
        );

        let mut run = Run::default();
        match self.run_steps(spec, &mut run) {
            Ok(workload) => {
                info!(workload = name, warnings = run.warnings.len(), "deployment finished");
                self.log(
                    DeploymentLog::new(
                        Some(name),
                        "deploy",
                        LogStatus::Success,
                        format!("Deployed {name}"),
                    )
                    .with_detail(json!({ "id": workload.id, "warnings": run.warnings })),
                );
                Ok(Deployment {
                    workload,
                    warnings: run.warnings,
                    notes: run.notes,
                })
            }
            Err(err) => {
                error!(workload = name, kind = %err.kind(), "deployment failed: {err}");
                let created = run.created.len();
                let rollback_failures = run.created.unwind(self.service, self.runtime, self.store);
                let mut detail = json!({
                    "error": err.kind(),
                    "rolled_back": created,
                    "rollback_failures": rollback_failures,
                });
                if let Some(report) = err.conflicts() {
                    detail["conflicts"] = json!(report);
                }
                self.log(
                    DeploymentLog::new(Some(name), "deploy", LogStatus::Failed, err.to_string())
                        .with_detail(detail),
                );
                Err(err)
            }
        }
    }

    fn run_steps(&self, spec: &WorkloadSpec, run: &mut Run) -> Result<WorkloadRecord> {
        let name = spec.name.as_str();
        let net = &spec.network;
        let iface = net.interface_name();

        // 1. validate
        if self.store.get_workload(name)?.is_some() {
            return Err(ConfigError::already_exists(ResourceKind::Workload, name));
        }
        let report = self.detector().detect(spec)?;
        if !report.is_empty() {
            return Err(ConfigError::ConflictDetected(report));
        }

        // 2. VLAN
        self.ensure_vlan(spec, run)?;

        // 3. address reservation
        let mut mapping = NewStaticMapping::new(net.mac_address.clone(), net.ip_address.clone());
        mapping.hostname = name.to_string();
        mapping.description = mapping_description(name);
        if let Some(created) = self.recoverable(
            run,
            name,
            "static mapping",
            self.service.create_static_mapping(&iface, mapping),
        )? {
            run.created.push(Created::StaticMapping {
                interface: iface.clone(),
                uuid: created.uuid,
            });
        }

        // 4. internet egress
        if net.allow_internet {
            let mut rule = NewFirewallRule::new(RuleAction::Pass, iface.clone());
            rule.source = Endpoint::network(iface.clone());
            rule.destination = Endpoint::any();
            rule.description = egress_rule_description(name);
            if let Some(created) = self.recoverable(
                run,
                name,
                "egress rule",
                self.service.create_firewall_rule(rule),
            )? {
                run.created.push(Created::FirewallRule { uuid: created.uuid });
            }
        }

        // 5. port exposure
        for port in &spec.ports {
            let forward = NewPortForward {
                interface: self.wan_interface.clone(),
                protocol: port.protocol.forward_protocol(),
                src_port: port.host_port.to_string(),
                dst_ip: net.ip_address.clone(),
                dst_port: port.container_port.to_string(),
                src_ip: None,
                description: forward_description(name),
                enabled: true,
            };
            match self.recoverable(
                run,
                name,
                "port forward",
                self.service.create_port_forward(forward),
            )? {
                Some(created) => run.created.push(Created::PortForward { uuid: created.uuid }),
                // The backend has no forwards at all; the remaining ports would say the same.
                None => break,
            }
        }

        // 6. HTTP ingress
        for port in spec.ports.iter().filter(|p| HTTP_PORTS.contains(&p.container_port)) {
            let note = format!(
                "Port {} on {name} is HTTP(S); load-balancer configuration required",
                port.container_port
            );
            info!(workload = name, port = port.container_port, "load-balancer configuration required");
            self.log(DeploymentLog::new(Some(name), "ingress", LogStatus::Info, note.clone()));
            run.notes.push(note);
        }

        // 7. workload
        let record = self.runtime.create(spec)?;
        run.created.push(Created::Workload {
            name: name.to_string(),
        });
        self.store.put_workload(&record)?;

        // 8. apply
        self.apply(run, name)?;
        Ok(record)
    }

    fn ensure_vlan(&self, spec: &WorkloadSpec, run: &mut Run) -> Result<()> {
        let net = &spec.network;
        let existing = self
            .service
            .list_vlans()?
            .into_iter()
            .find(|v| v.parent == net.parent_interface && v.tag == net.vlan_id);
        if let Some(vlan) = existing {
            info!(uuid = %vlan.uuid, vlanif = %vlan.vlanif, "reusing VLAN");
            return Ok(());
        }
        let vlan = self.service.create_vlan(NewVlan::new(
            net.parent_interface.clone(),
            net.vlan_id,
            spec.vlan_marker(),
        ))?;
        info!(uuid = %vlan.uuid, vlanif = %vlan.vlanif, "created VLAN");
        run.created.push(Created::Vlan { uuid: vlan.uuid });
        Ok(())
    }

    fn apply(&self, run: &mut Run, name: &str) -> Result<()> {
        self.recoverable(
            run,
            name,
            "firewall apply",
            self.service.apply_firewall_changes(),
        )?;
        self.recoverable(run, name, "DHCP apply", self.service.apply_dhcp_changes())?;
        Ok(())
    }

    /// Downgrade a missing backend capability to a warning; pass anything else through.
    fn recoverable<T>(
        &self,
        run: &mut Run,
        name: &str,
        step: &str,
        result: Result<T>,
    ) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_recoverable() => {
                warn!(workload = name, step, "skipped: {err}");
                let message = format!("{step} skipped: {err}");
                self.log(DeploymentLog::new(
                    Some(name),
                    "deploy",
                    LogStatus::Warning,
                    message.clone(),
                ));
                run.warnings.push(message);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // --- remove -----------------------------------------------------------------

    /// Delete the workload and every sub-resource a deployment created for it.
    pub fn remove(&self, name: &str) -> Result<Removal> {
        let record = self.require_workload(name)?;
        let _guard = self.locks.acquire(deployment_keys(&record.spec));
        self.remove_locked(&record)
    }

    fn require_workload(&self, name: &str) -> Result<WorkloadRecord> {
        self.store
            .get_workload(name)?
            .ok_or_else(|| ConfigError::not_found(ResourceKind::Workload, name))
    }

    fn remove_locked(&self, record: &WorkloadRecord) -> Result<Removal> {
        let spec = &record.spec;
        let name = spec.name.as_str();
        let iface = spec.network.interface_name();
        let mut run = Run::default();
        let mut deleted = Vec::new();

        match self.runtime.delete(name) {
            Ok(true) => deleted.push(format!("workload {name}")),
            Ok(false) => warn!(workload = name, "workload was not present in the runtime"),
            Err(RuntimeError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let forward_marker = forward_description(name);
        if let Some(forwards) =
            self.recoverable(&mut run, name, "port forward cleanup", self.service.list_port_forwards(None))?
        {
            for forward in forwards.iter().filter(|f| f.description == forward_marker) {
                self.service.delete_port_forward(&forward.uuid)?;
                deleted.push(format!("port forward {}", forward.uuid));
            }
        }

        let rule_marker = egress_rule_description(name);
        if let Some(rules) = self.recoverable(
            &mut run,
            name,
            "egress rule cleanup",
            self.service.list_firewall_rules(Some(&iface)),
        )? {
            for rule in rules.iter().filter(|r| r.description == rule_marker) {
                self.service.delete_firewall_rule(&rule.uuid)?;
                deleted.push(format!("firewall rule {}", rule.uuid));
            }
        }

        let mappings = match self.service.list_static_mappings(&iface) {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            other => other,
        };
        if let Some(mappings) =
            self.recoverable(&mut run, name, "static mapping cleanup", mappings)?
        {
            let mac = validate::normalize_mac("mac", &spec.network.mac_address)?;
            for mapping in mappings
                .iter()
                .filter(|m| {
                    m.mac.eq_ignore_ascii_case(&mac)
                        && validate::same_ipv4(&m.ipaddr, &spec.network.ip_address)
                })
            {
                self.service.delete_static_mapping(&iface, &mapping.uuid)?;
                deleted.push(format!("static mapping {}", mapping.uuid));
            }
        }

        let marker = spec.vlan_marker();
        for vlan in self.service.list_vlans()?.iter().filter(|v| {
            v.parent == spec.network.parent_interface
                && v.tag == spec.network.vlan_id
                && v.description == marker
        }) {
            self.service.delete_vlan(&vlan.uuid)?;
            deleted.push(format!("VLAN {}", vlan.uuid));
        }

        self.apply(&mut run, name)?;
        self.store.remove_workload(name)?;
        info!(workload = name, deleted = deleted.len(), "workload removed");
        self.log(
            DeploymentLog::new(Some(name), "remove", LogStatus::Success, format!("Removed {name}"))
                .with_detail(json!({ "deleted": deleted, "warnings": run.warnings })),
        );
        Ok(Removal {
            name: name.to_string(),
            deleted,
            warnings: run.warnings,
        })
    }

    // --- update -----------------------------------------------------------------

    /// Stop and recreate `name` with `patch` merged over its recorded spec.
    pub fn update(&self, name: &str, patch: WorkloadPatch) -> Result<Deployment> {
        let current = self.require_workload(name)?;
        let mut merged = current.spec.clone();
        merged.apply(patch);
        let merged = merged.validated()?;

        let mut keys: BTreeSet<String> = deployment_keys(&current.spec);
        keys.extend(deployment_keys(&merged));
        let _guard = self.locks.acquire(keys);

        let report = self.detector().detect(&merged)?;
        if !report.is_empty() {
            self.log(
                DeploymentLog::new(Some(name), "update", LogStatus::Failed, VALIDATION_CONFLICT)
                    .with_detail(json!({ "conflicts": report })),
            );
            return Err(ConfigError::ConflictDetected(report));
        }

        self.log(DeploymentLog::new(
            Some(name),
            "update",
            LogStatus::Started,
            format!("Recreating {name}"),
        ));
        self.remove_locked(&current)?;
        self.deploy_locked(&merged)
    }

    // --- lifecycle pass-throughs ------------------------------------------------

    pub fn start(&self, name: &str) -> Result<()> {
        self.lifecycle(name, "start", "running", |r, n| r.start(n))
    }

    pub fn stop(&self, name: &str) -> Result<()> {
        self.lifecycle(name, "stop", "exited", |r, n| r.stop(n))
    }

    pub fn restart(&self, name: &str) -> Result<()> {
        self.lifecycle(name, "restart", "running", |r, n| r.restart(n))
    }

    fn lifecycle(
        &self,
        name: &str,
        action: &str,
        status: &str,
        call: impl FnOnce(&dyn WorkloadRuntime, &str) -> std::result::Result<(), RuntimeError>,
    ) -> Result<()> {
        let mut record = self.require_workload(name)?;
        call(self.runtime, name)?;
        record.status = status.to_string();
        self.store.put_workload(&record)?;
        self.log(DeploymentLog::new(
            Some(name),
            action,
            LogStatus::Success,
            format!("{name}: {action}"),
        ));
        Ok(())
    }
}
