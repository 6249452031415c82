use anyhow::{Context, Result};
use clap::Parser;
use opnsense_deploy::runtime::{DockerRuntime, MemoryRuntime, WorkloadRuntime};
use opnsense_deploy::service::ConfigService;
use opnsense_deploy::settings::{Overrides, RuntimeEngine, Settings};
use opnsense_deploy::store::JsonFileStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod cli;
mod deploy_cmd;
mod resource_cmd;

use cli::{Cli, Command, GlobalArgs, OutputFormat, RuntimeArg};

/// Everything a subcommand needs, built once from settings and flags.
pub struct AppContext {
    pub settings: Settings,
    pub service: ConfigService,
    pub format: OutputFormat,
}

impl AppContext {
    pub fn runtime(&self) -> Result<Box<dyn WorkloadRuntime>> {
        Ok(match self.settings.runtime.engine {
            RuntimeEngine::Docker => Box::new(
                DockerRuntime::new(self.settings.runtime.docker_url.as_deref())
                    .context("failed to set up the Docker runtime")?,
            ),
            RuntimeEngine::Memory => Box::new(MemoryRuntime::new()),
        })
    }

    pub fn store(&self) -> Result<JsonFileStore> {
        let dir = self.settings.store.dir_or_default();
        JsonFileStore::open(&dir)
            .with_context(|| format!("failed to open state directory {}", dir.display()))
    }

    /// Print `value` as JSON or through `render` as text.
    pub fn emit<T: Serialize>(&self, value: &T, render: impl FnOnce(&T) -> String) -> Result<()> {
        match self.format {
            OutputFormat::Text => println!("{}", render(value)),
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);
    let ctx = build_context(cli.global)?;

    match cli.command {
        Command::Interfaces(cmd) => resource_cmd::run_interfaces(&ctx, cmd),
        Command::Vlans(cmd) => resource_cmd::run_vlans(&ctx, cmd),
        Command::Rules(cmd) => resource_cmd::run_rules(&ctx, cmd),
        Command::Forwards(cmd) => resource_cmd::run_forwards(&ctx, cmd),
        Command::Dhcp(cmd) => resource_cmd::run_dhcp(&ctx, cmd),
        Command::Apply(args) => resource_cmd::run_apply(&ctx, args),
        Command::Validate(args) => deploy_cmd::run_validate(&ctx, args),
        Command::Deploy(args) => deploy_cmd::run_deploy(&ctx, args),
        Command::Remove(args) => deploy_cmd::run_remove(&ctx, args),
        Command::Workloads(cmd) => deploy_cmd::run_workloads(&ctx, cmd),
        Command::Logs(args) => deploy_cmd::run_logs(&ctx, args),
    }
}

/// `RUST_LOG` wins; otherwise `warn`, raised by each `-v`. Logs go to stderr.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_context(global: GlobalArgs) -> Result<AppContext> {
    let mut settings = match &global.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply(Overrides {
        config_path: global.config_path,
        api_url: global.api_url,
        api_key: global.api_key,
        api_secret: global.api_secret,
        verify_ssl: global.verify_ssl,
        runtime: global.runtime.map(|r| match r {
            RuntimeArg::Docker => RuntimeEngine::Docker,
            RuntimeArg::Memory => RuntimeEngine::Memory,
        }),
        docker_url: global.docker_url,
        state_dir: global.state_dir,
    });
    let service = ConfigService::from_choice(&settings.backend_choice())
        .context("failed to set up the configuration backend")?;
    Ok(AppContext {
        settings,
        service,
        format: global.format,
    })
}
