use colored::Colorize;

use crate::backend::ApplyStatus;
use crate::conflict::ConflictReport;
use crate::deploy::{DeploymentResponse, Removal, ValidationOutcome};
use crate::model::{
    DeploymentLog, DhcpConfig, DhcpLease, FirewallRule, Interface, LogStatus, PortForward,
    RuleAction, StaticMapping, Vlan, WorkloadRecord,
};

fn enabled_mark(enabled: bool) -> String {
    if enabled {
        "on".green().to_string()
    } else {
        "off".red().to_string()
    }
}

fn empty_line(kind: &str) -> String {
    format!("no {kind}").dimmed().to_string()
}

pub fn render_interfaces(rows: &[Interface]) -> String {
    if rows.is_empty() {
        return empty_line("interfaces");
    }
    let mut out = Vec::new();
    for row in rows {
        let addr = match row.subnet {
            Some(prefix) if row.ipaddr != "dhcp" => format!("{}/{prefix}", row.ipaddr),
            _ => row.ipaddr.clone(),
        };
        out.push(format!(
            "{:<10} if={:<14} addr={:<18} {} {}",
            row.name.bold(),
            row.physical,
            addr,
            enabled_mark(row.enabled),
            row.description.dimmed()
        ));
    }
    out.join("\n")
}

pub fn render_vlans(rows: &[Vlan]) -> String {
    if rows.is_empty() {
        return empty_line("VLANs");
    }
    let mut out = Vec::new();
    for row in rows {
        out.push(format!(
            "{} tag={:<5} parent={:<8} vlanif={:<16} pcp={} {}",
            row.uuid.dimmed(),
            row.tag.to_string().bold(),
            row.parent,
            row.vlanif,
            row.pcp,
            row.description
        ));
    }
    out.join("\n")
}

pub fn render_rules(rows: &[FirewallRule]) -> String {
    if rows.is_empty() {
        return empty_line("firewall rules");
    }
    let mut out = Vec::new();
    for row in rows {
        let action = match row.action {
            RuleAction::Pass => "pass".green(),
            RuleAction::Block => "block".red(),
            RuleAction::Reject => "reject".yellow(),
        };
        out.push(format!(
            "{} {:<6} on={:<8} proto={:<7} {} -> {} {} {}",
            row.uuid.dimmed(),
            action,
            row.interface,
            row.protocol,
            row.source,
            row.destination,
            enabled_mark(row.enabled),
            row.description
        ));
    }
    out.join("\n")
}

pub fn render_forwards(rows: &[PortForward]) -> String {
    if rows.is_empty() {
        return empty_line("port forwards");
    }
    let mut out = Vec::new();
    for row in rows {
        let source = row
            .src_ip
            .as_deref()
            .map(|ip| format!(" from={ip}"))
            .unwrap_or_default();
        out.push(format!(
            "{} {}:{}/{} -> {}:{}{} {} {}",
            row.uuid.dimmed(),
            row.interface,
            row.src_port.bold(),
            row.protocol,
            row.dst_ip,
            row.dst_port,
            source,
            enabled_mark(row.enabled),
            row.description
        ));
    }
    out.join("\n")
}

pub fn render_dhcp_configs(rows: &[DhcpConfig]) -> String {
    if rows.is_empty() {
        return empty_line("DHCP configs");
    }
    let mut out = Vec::new();
    for row in rows {
        let range = if row.range_from.is_empty() {
            "-".to_string()
        } else {
            format!("{}-{}", row.range_from, row.range_to)
        };
        out.push(format!(
            "{:<10} range={:<30} mappings={} {}",
            row.interface.bold(),
            range,
            row.static_mappings.len(),
            enabled_mark(row.enabled)
        ));
    }
    out.join("\n")
}

pub fn render_static_mappings(rows: &[StaticMapping]) -> String {
    if rows.is_empty() {
        return empty_line("static mappings");
    }
    let mut out = Vec::new();
    for row in rows {
        out.push(format!(
            "{} {} -> {:<15} {} {}",
            row.uuid.dimmed(),
            row.mac,
            row.ipaddr.bold(),
            row.hostname,
            row.description.dimmed()
        ));
    }
    out.join("\n")
}

pub fn render_leases(rows: &[DhcpLease]) -> String {
    if rows.is_empty() {
        return empty_line("leases");
    }
    let mut out = Vec::new();
    for row in rows {
        out.push(format!(
            "{:<15} {} {} {}",
            row.address.bold(),
            row.mac,
            row.hostname,
            row.state.dimmed()
        ));
    }
    out.join("\n")
}

pub fn render_apply(status: &ApplyStatus) -> String {
    if status.success {
        format!("{} {}", "APPLIED".green().bold(), status.message)
    } else {
        format!("{} {}", "FAILED".red().bold(), status.message)
    }
}

pub fn render_conflicts(report: &ConflictReport) -> String {
    let mut out = Vec::new();
    for (category, messages) in report.iter() {
        for message in messages {
            out.push(format!("  {} {message}", format!("[{}]", category.as_str()).red()));
        }
    }
    out.join("\n")
}

pub fn render_validation(outcome: &ValidationOutcome) -> String {
    let head = if outcome.valid {
        format!("{} {}", "VALID".green().bold(), outcome.message)
    } else {
        format!("{} {}", "INVALID".red().bold(), outcome.message)
    };
    if outcome.conflicts.is_empty() {
        head
    } else {
        format!("{head}\n{}", render_conflicts(&outcome.conflicts))
    }
}

pub fn render_deployment(response: &DeploymentResponse) -> String {
    let mut out = Vec::new();
    if response.success {
        out.push(format!("{} {}", "DEPLOYED".green().bold(), response.message));
    } else {
        out.push(format!("{} {}", "FAILED".red().bold(), response.message));
    }
    if let Some(workload) = &response.workload {
        let net = &workload.spec.network;
        out.push(format!(
            "  workload={} id={} vlan={} ip={} mac={}",
            workload.name().bold(),
            workload.id,
            net.vlan_id,
            net.ip_address,
            net.mac_address
        ));
    }
    if let Some(conflicts) = &response.conflicts {
        out.push(render_conflicts(conflicts));
    }
    for warning in &response.warnings {
        out.push(format!("  {} {warning}", "warning:".yellow()));
    }
    for note in &response.notes {
        out.push(format!("  {} {note}", "note:".cyan()));
    }
    out.join("\n")
}

pub fn render_removal(removal: &Removal) -> String {
    let mut out = vec![format!("{} {}", "REMOVED".green().bold(), removal.name)];
    for item in &removal.deleted {
        out.push(format!("  - {item}"));
    }
    for warning in &removal.warnings {
        out.push(format!("  {} {warning}", "warning:".yellow()));
    }
    out.join("\n")
}

pub fn render_workloads(rows: &[WorkloadRecord]) -> String {
    if rows.is_empty() {
        return empty_line("workloads");
    }
    let mut out = Vec::new();
    for row in rows {
        let net = &row.spec.network;
        out.push(format!(
            "{:<12} {:<8} vlan={:<5} ip={:<15} mac={} image={}",
            row.name().bold(),
            row.status,
            net.vlan_id,
            net.ip_address,
            net.mac_address,
            row.spec.image.dimmed()
        ));
    }
    out.join("\n")
}

pub fn render_logs(entries: &[DeploymentLog]) -> String {
    if entries.is_empty() {
        return empty_line("deployment log entries");
    }
    let mut out = Vec::new();
    for entry in entries {
        let status = match entry.status {
            LogStatus::Success => entry.status.as_str().green(),
            LogStatus::Failed => entry.status.as_str().red(),
            LogStatus::Warning => entry.status.as_str().yellow(),
            LogStatus::Started | LogStatus::Info => entry.status.as_str().cyan(),
        };
        out.push(format!(
            "{} {:<8} {:<8} {:<10} {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            status,
            entry.action,
            entry.workload.as_deref().unwrap_or("-"),
            entry.message
        ));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{render_apply, render_validation};
    use crate::backend::ApplyStatus;
    use crate::conflict::{ConflictCategory, ConflictReport};
    use crate::deploy::ValidationOutcome;

    #[test]
    fn validation_lists_each_conflict() {
        colored::control::set_override(false);
        let mut conflicts = ConflictReport::default();
        conflicts.push(ConflictCategory::Vlan, "VLAN 100 is already in use by 'x'");
        conflicts.push(ConflictCategory::Port, "Port 8080/tcp is already forwarded to 10.0.0.5:80");
        let text = render_validation(&ValidationOutcome {
            valid: false,
            message: "Deployment would conflict with existing configuration".into(),
            conflicts,
        });
        assert!(text.starts_with("INVALID"));
        assert!(text.contains("[vlan] VLAN 100"));
        assert!(text.contains("[port] Port 8080/tcp"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn apply_status_is_labelled() {
        colored::control::set_override(false);
        assert_eq!(render_apply(&ApplyStatus::ok("done")), "APPLIED done");
    }
}
