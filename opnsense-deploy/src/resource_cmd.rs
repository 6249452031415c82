use anyhow::{anyhow, bail, Result};
use opnsense_deploy::error::ConfigError;
use opnsense_deploy::model::{
    Endpoint, InterfacePatch, NewFirewallRule, NewInterface, NewPortForward, NewStaticMapping,
    NewVlan, VlanPatch,
};
use opnsense_deploy::report::{
    render_apply, render_dhcp_configs, render_forwards, render_interfaces, render_leases,
    render_rules, render_static_mappings, render_vlans,
};
use serde::Serialize;

use crate::cli::{
    ApplyArgs, ApplyScope, DhcpCommand, ForwardCommand, InterfaceCommand, RuleCommand,
    VlanCommand,
};
use crate::AppContext;

/// Carry the machine-readable kind into the process error message.
pub fn kinded(err: ConfigError) -> anyhow::Error {
    anyhow!("{}: {err}", err.kind())
}

#[derive(Serialize)]
struct Deleted<'a> {
    deleted: &'a str,
}

fn print_deleted(ctx: &AppContext, what: &str, key: &str) -> Result<()> {
    ctx.emit(&Deleted { deleted: key }, |d| format!("deleted {what} {}", d.deleted))
}

pub fn run_interfaces(ctx: &AppContext, cmd: InterfaceCommand) -> Result<()> {
    let service = &ctx.service;
    match cmd {
        InterfaceCommand::List => {
            let rows = service.list_interfaces().map_err(kinded)?;
            ctx.emit(&rows, |r| render_interfaces(r))
        }
        InterfaceCommand::Show(arg) => {
            let row = service.get_interface(&arg.name).map_err(kinded)?;
            ctx.emit(&row, |r| render_interfaces(std::slice::from_ref(r)))
        }
        InterfaceCommand::Create(args) => {
            let mut new = NewInterface::new(args.name, args.physical);
            new.ipaddr = args.ipaddr;
            new.subnet = args.subnet;
            new.description = args.description;
            new.gateway = args.gateway;
            new.mtu = args.mtu;
            new.enabled = !args.disabled;
            let row = service.create_interface(new).map_err(kinded)?;
            ctx.emit(&row, |r| render_interfaces(std::slice::from_ref(r)))
        }
        InterfaceCommand::Update(args) => {
            let enabled = match (args.enable, args.disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let patch = InterfacePatch {
                physical: args.physical,
                description: args.description,
                ipaddr: args.ipaddr,
                subnet: args.subnet,
                enabled,
                gateway: args.gateway,
                mtu: args.mtu,
                ..InterfacePatch::default()
            };
            if patch == InterfacePatch::default() {
                bail!("nothing to update: pass at least one field flag");
            }
            let row = service.update_interface(&args.name, patch).map_err(kinded)?;
            ctx.emit(&row, |r| render_interfaces(std::slice::from_ref(r)))
        }
        InterfaceCommand::Delete(arg) => {
            service.delete_interface(&arg.name).map_err(kinded)?;
            print_deleted(ctx, "interface", &arg.name)
        }
    }
}

pub fn run_vlans(ctx: &AppContext, cmd: VlanCommand) -> Result<()> {
    let service = &ctx.service;
    match cmd {
        VlanCommand::List => {
            let rows = service.list_vlans().map_err(kinded)?;
            ctx.emit(&rows, |r| render_vlans(r))
        }
        VlanCommand::Show(arg) => {
            let row = service.get_vlan(&arg.uuid).map_err(kinded)?;
            ctx.emit(&row, |r| render_vlans(std::slice::from_ref(r)))
        }
        VlanCommand::Create(args) => {
            let mut new = NewVlan::new(args.parent, args.tag, args.description);
            new.pcp = args.pcp;
            let row = service.create_vlan(new).map_err(kinded)?;
            ctx.emit(&row, |r| render_vlans(std::slice::from_ref(r)))
        }
        VlanCommand::Update(args) => {
            let patch = VlanPatch {
                parent: args.parent,
                tag: args.tag,
                description: args.description,
                pcp: args.pcp,
            };
            if patch == VlanPatch::default() {
                bail!("nothing to update: pass at least one field flag");
            }
            let row = service.update_vlan(&args.uuid, patch).map_err(kinded)?;
            ctx.emit(&row, |r| render_vlans(std::slice::from_ref(r)))
        }
        VlanCommand::Delete(arg) => {
            service.delete_vlan(&arg.uuid).map_err(kinded)?;
            print_deleted(ctx, "VLAN", &arg.uuid)
        }
    }
}

pub fn run_rules(ctx: &AppContext, cmd: RuleCommand) -> Result<()> {
    let service = &ctx.service;
    match cmd {
        RuleCommand::List(filter) => {
            let rows = service
                .list_firewall_rules(filter.interface.as_deref())
                .map_err(kinded)?;
            ctx.emit(&rows, |r| render_rules(r))
        }
        RuleCommand::Show(arg) => {
            let row = service.get_firewall_rule(&arg.uuid).map_err(kinded)?;
            ctx.emit(&row, |r| render_rules(std::slice::from_ref(r)))
        }
        RuleCommand::Create(args) => {
            let source_any = args.source_net.is_none() && args.source_address.is_none();
            let destination_any =
                args.destination_net.is_none() && args.destination_address.is_none();
            let mut new = NewFirewallRule::new(args.action, args.interface);
            new.protocol = args.protocol;
            new.ipprotocol = args.ipprotocol;
            new.source = Endpoint::from_parts(
                "source",
                source_any,
                args.source_net,
                args.source_address,
                args.source_port,
            )
            .map_err(kinded)?;
            new.destination = Endpoint::from_parts(
                "destination",
                destination_any,
                args.destination_net,
                args.destination_address,
                args.destination_port,
            )
            .map_err(kinded)?;
            new.description = args.description;
            new.enabled = !args.disabled;
            let row = service.create_firewall_rule(new).map_err(kinded)?;
            ctx.emit(&row, |r| render_rules(std::slice::from_ref(r)))
        }
        RuleCommand::Delete(arg) => {
            service.delete_firewall_rule(&arg.uuid).map_err(kinded)?;
            print_deleted(ctx, "firewall rule", &arg.uuid)
        }
    }
}

pub fn run_forwards(ctx: &AppContext, cmd: ForwardCommand) -> Result<()> {
    let service = &ctx.service;
    match cmd {
        ForwardCommand::List(filter) => {
            let rows = service
                .list_port_forwards(filter.interface.as_deref())
                .map_err(kinded)?;
            ctx.emit(&rows, |r| render_forwards(r))
        }
        ForwardCommand::Show(arg) => {
            let row = service.get_port_forward(&arg.uuid).map_err(kinded)?;
            ctx.emit(&row, |r| render_forwards(std::slice::from_ref(r)))
        }
        ForwardCommand::Create(args) => {
            let new = NewPortForward {
                interface: args.interface,
                protocol: args.protocol,
                src_port: args.src_port,
                dst_ip: args.dst_ip,
                dst_port: args.dst_port,
                src_ip: args.src_ip,
                description: args.description,
                enabled: !args.disabled,
            };
            let row = service.create_port_forward(new).map_err(kinded)?;
            ctx.emit(&row, |r| render_forwards(std::slice::from_ref(r)))
        }
        ForwardCommand::Delete(arg) => {
            service.delete_port_forward(&arg.uuid).map_err(kinded)?;
            print_deleted(ctx, "port forward", &arg.uuid)
        }
    }
}

pub fn run_dhcp(ctx: &AppContext, cmd: DhcpCommand) -> Result<()> {
    let service = &ctx.service;
    match cmd {
        DhcpCommand::List => {
            let rows = service.list_dhcp_configs().map_err(kinded)?;
            ctx.emit(&rows, |r| render_dhcp_configs(r))
        }
        DhcpCommand::Show(arg) => {
            let row = service.get_dhcp_config(&arg.interface).map_err(kinded)?;
            ctx.emit(&row, |r| {
                format!(
                    "{}\n{}",
                    render_dhcp_configs(std::slice::from_ref(r)),
                    render_static_mappings(&r.static_mappings)
                )
            })
        }
        DhcpCommand::Mappings(arg) => {
            let rows = service
                .list_static_mappings(&arg.interface)
                .map_err(kinded)?;
            ctx.emit(&rows, |r| render_static_mappings(r))
        }
        DhcpCommand::AddMapping(args) => {
            let mut new = NewStaticMapping::new(args.mac, args.ip);
            new.hostname = args.hostname;
            new.description = args.description;
            let row = service
                .create_static_mapping(&args.interface, new)
                .map_err(kinded)?;
            ctx.emit(&row, |r| render_static_mappings(std::slice::from_ref(r)))
        }
        DhcpCommand::RemoveMapping(args) => {
            service
                .delete_static_mapping(&args.interface, &args.uuid)
                .map_err(kinded)?;
            print_deleted(ctx, "static mapping", &args.uuid)
        }
        DhcpCommand::Leases(arg) => {
            let rows = service.list_dhcp_leases(&arg.interface).map_err(kinded)?;
            ctx.emit(&rows, |r| render_leases(r))
        }
    }
}

pub fn run_apply(ctx: &AppContext, args: ApplyArgs) -> Result<()> {
    let service = &ctx.service;
    let status = match args.only {
        Some(ApplyScope::Firewall) => service.apply_firewall_changes(),
        Some(ApplyScope::Dhcp) => service.apply_dhcp_changes(),
        None => service.apply_pending_changes(),
    }
    .map_err(kinded)?;
    ctx.emit(&status, render_apply)?;
    if !status.success {
        bail!("apply failed: {}", status.message);
    }
    Ok(())
}
