use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand, ValueEnum};
use opnsense_deploy::model::{IpProtocol, Protocol, RuleAction};

#[derive(Parser, Debug)]
#[command(name = "opnsense-deploy", version)]
#[command(about = "Manage OPNsense network resources and deploy VLAN-attached workloads")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// TOML settings file.
    #[arg(long, global = true, env = "OPNSENSE_DEPLOY_SETTINGS")]
    pub settings: Option<PathBuf>,
    /// Path to the appliance configuration document (config.xml).
    #[arg(long, global = true, env = "OPNSENSE_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,
    /// Remote management API base URL.
    #[arg(long, global = true, env = "OPNSENSE_API_URL")]
    pub api_url: Option<String>,
    #[arg(long, global = true, env = "OPNSENSE_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    #[arg(long, global = true, env = "OPNSENSE_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,
    /// Verify the API server certificate.
    #[arg(long, global = true, env = "OPNSENSE_API_VERIFY_SSL", value_parser = BoolishValueParser::new())]
    pub verify_ssl: Option<bool>,
    /// Workload runtime deployments drive.
    #[arg(long, global = true, value_enum, env = "OPNSENSE_DEPLOY_RUNTIME")]
    pub runtime: Option<RuntimeArg>,
    /// Docker Engine API URL.
    #[arg(long, global = true, env = "DOCKER_API_URL")]
    pub docker_url: Option<String>,
    /// Directory holding workload records and the deployment log.
    #[arg(long, global = true, env = "OPNSENSE_DEPLOY_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Raise log verbosity (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Logical interfaces.
    #[command(subcommand)]
    Interfaces(InterfaceCommand),
    /// 802.1Q VLANs.
    #[command(subcommand)]
    Vlans(VlanCommand),
    /// Firewall filter rules.
    #[command(subcommand)]
    Rules(RuleCommand),
    /// Destination NAT port forwards.
    #[command(subcommand)]
    Forwards(ForwardCommand),
    /// DHCP server configs, static mappings and leases.
    #[command(subcommand)]
    Dhcp(DhcpCommand),
    /// Apply pending firewall and DHCP changes.
    Apply(ApplyArgs),
    /// Check a deployment request for conflicts without changing anything.
    Validate(RequestArgs),
    /// Deploy a workload from a JSON request.
    Deploy(RequestArgs),
    /// Remove a deployed workload and everything created for it.
    Remove(NameArg),
    /// Deployed workloads.
    #[command(subcommand)]
    Workloads(WorkloadCommand),
    /// Show the deployment audit log.
    Logs(LogsArgs),
}

#[derive(Args, Debug)]
pub struct NameArg {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct UuidArg {
    pub uuid: String,
}

#[derive(Subcommand, Debug)]
pub enum InterfaceCommand {
    List,
    Show(NameArg),
    Create(InterfaceCreateArgs),
    Update(InterfaceUpdateArgs),
    Delete(NameArg),
}

#[derive(Args, Debug)]
pub struct InterfaceCreateArgs {
    /// Logical name, for example `opt3`.
    pub name: String,
    /// Physical device.
    #[arg(long = "if")]
    pub physical: String,
    /// `dhcp` or a static IPv4 address.
    #[arg(long, default_value = "dhcp")]
    pub ipaddr: String,
    #[arg(long)]
    pub subnet: Option<u8>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value = "")]
    pub gateway: String,
    #[arg(long)]
    pub mtu: Option<u32>,
    /// Create the interface disabled.
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Args, Debug)]
pub struct InterfaceUpdateArgs {
    pub name: String,
    #[arg(long = "if")]
    pub physical: Option<String>,
    #[arg(long)]
    pub ipaddr: Option<String>,
    #[arg(long)]
    pub subnet: Option<u8>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub gateway: Option<String>,
    #[arg(long)]
    pub mtu: Option<u32>,
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,
    #[arg(long)]
    pub disable: bool,
}

#[derive(Subcommand, Debug)]
pub enum VlanCommand {
    List,
    Show(UuidArg),
    Create(VlanCreateArgs),
    Update(VlanUpdateArgs),
    Delete(UuidArg),
}

#[derive(Args, Debug)]
pub struct VlanCreateArgs {
    /// Parent physical interface.
    #[arg(long)]
    pub parent: String,
    #[arg(long)]
    pub tag: u16,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long, default_value_t = 0)]
    pub pcp: u8,
}

#[derive(Args, Debug)]
pub struct VlanUpdateArgs {
    pub uuid: String,
    #[arg(long)]
    pub parent: Option<String>,
    #[arg(long)]
    pub tag: Option<u16>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub pcp: Option<u8>,
}

#[derive(Args, Debug)]
pub struct InterfaceFilter {
    /// Only entries on this interface.
    #[arg(long)]
    pub interface: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum RuleCommand {
    List(InterfaceFilter),
    Show(UuidArg),
    Create(RuleCreateArgs),
    Delete(UuidArg),
}

#[derive(Args, Debug)]
pub struct RuleCreateArgs {
    #[arg(long)]
    pub interface: String,
    #[arg(long, default_value = "pass")]
    pub action: RuleAction,
    #[arg(long, default_value = "any")]
    pub protocol: Protocol,
    #[arg(long, default_value = "inet")]
    pub ipprotocol: IpProtocol,
    #[arg(long, conflicts_with = "source_address")]
    pub source_net: Option<String>,
    #[arg(long)]
    pub source_address: Option<String>,
    #[arg(long)]
    pub source_port: Option<String>,
    #[arg(long, conflicts_with = "destination_address")]
    pub destination_net: Option<String>,
    #[arg(long)]
    pub destination_address: Option<String>,
    #[arg(long)]
    pub destination_port: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Subcommand, Debug)]
pub enum ForwardCommand {
    List(InterfaceFilter),
    Show(UuidArg),
    Create(ForwardCreateArgs),
    Delete(UuidArg),
}

#[derive(Args, Debug)]
pub struct ForwardCreateArgs {
    #[arg(long, default_value = "wan")]
    pub interface: String,
    #[arg(long, default_value = "tcp")]
    pub protocol: Protocol,
    /// External port or `start:end`.
    #[arg(long)]
    pub src_port: String,
    #[arg(long)]
    pub dst_ip: String,
    #[arg(long)]
    pub dst_port: String,
    /// Restrict to this external source address.
    #[arg(long)]
    pub src_ip: Option<String>,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long)]
    pub disabled: bool,
}

#[derive(Subcommand, Debug)]
pub enum DhcpCommand {
    List,
    Show(IfaceArg),
    /// Static mappings of one interface.
    Mappings(IfaceArg),
    AddMapping(MappingCreateArgs),
    RemoveMapping(MappingRemoveArgs),
    /// Runtime leases of one interface.
    Leases(IfaceArg),
}

#[derive(Args, Debug)]
pub struct IfaceArg {
    pub interface: String,
}

#[derive(Args, Debug)]
pub struct MappingCreateArgs {
    pub interface: String,
    #[arg(long)]
    pub mac: String,
    #[arg(long)]
    pub ip: String,
    #[arg(long, default_value = "")]
    pub hostname: String,
    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Args, Debug)]
pub struct MappingRemoveArgs {
    pub interface: String,
    pub uuid: String,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Apply only this subsystem.
    #[arg(long, value_enum)]
    pub only: Option<ApplyScope>,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum ApplyScope {
    Firewall,
    Dhcp,
}

#[derive(Args, Debug)]
pub struct RequestArgs {
    /// JSON deployment request.
    pub request: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum WorkloadCommand {
    List,
    Show(NameArg),
    /// Stop and recreate with the fields in a JSON patch.
    Update(WorkloadUpdateArgs),
    Start(NameArg),
    Stop(NameArg),
    Restart(NameArg),
}

#[derive(Args, Debug)]
pub struct WorkloadUpdateArgs {
    pub name: String,
    /// JSON object with the fields to change.
    pub patch: PathBuf,
}

#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Only entries for this workload.
    #[arg(long)]
    pub workload: Option<String>,
    /// Show at most this many of the newest entries.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum RuntimeArg {
    Docker,
    Memory,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::Cli;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
