use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use opnsense_deploy::deploy::{Deployment, DeploymentResponse, Orchestrator};
use opnsense_deploy::error::ConfigError;
use opnsense_deploy::model::{ResourceKind, WorkloadPatch, WorkloadSpec};
use opnsense_deploy::report::{
    render_deployment, render_logs, render_removal, render_validation, render_workloads,
};
use opnsense_deploy::runtime::WorkloadRuntime;
use opnsense_deploy::store::{JsonFileStore, WorkloadStore};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cli::{LogsArgs, NameArg, RequestArgs, WorkloadCommand};
use crate::resource_cmd::kinded;
use crate::AppContext;

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {what} {}", path.display()))
}

/// Runtime and store live for the whole command; the orchestrator borrows them.
struct Engine {
    runtime: Box<dyn WorkloadRuntime>,
    store: JsonFileStore,
}

impl Engine {
    fn open(ctx: &AppContext) -> Result<Self> {
        Ok(Self {
            runtime: ctx.runtime()?,
            store: ctx.store()?,
        })
    }

    fn orchestrator<'a>(&'a self, ctx: &'a AppContext) -> Orchestrator<'a> {
        Orchestrator::new(&ctx.service, self.runtime.as_ref(), &self.store)
            .with_wan_interface(ctx.settings.deploy.wan_interface.clone())
    }
}

pub fn run_validate(ctx: &AppContext, args: RequestArgs) -> Result<()> {
    let spec: WorkloadSpec = read_json(&args.request, "deployment request")?;
    let engine = Engine::open(ctx)?;
    let outcome = engine.orchestrator(ctx).validate(spec).map_err(kinded)?;
    ctx.emit(&outcome, render_validation)?;
    if !outcome.valid {
        bail!("{}", outcome.message);
    }
    Ok(())
}

pub fn run_deploy(ctx: &AppContext, args: RequestArgs) -> Result<()> {
    let spec: WorkloadSpec = read_json(&args.request, "deployment request")?;
    let engine = Engine::open(ctx)?;
    let result = engine.orchestrator(ctx).deploy(spec);
    finish_deployment(ctx, result)
}

fn finish_deployment(
    ctx: &AppContext,
    result: std::result::Result<Deployment, ConfigError>,
) -> Result<()> {
    let response = DeploymentResponse::from_result(&result);
    ctx.emit(&response, render_deployment)?;
    match result {
        Ok(_) => Ok(()),
        Err(err) => Err(kinded(err)),
    }
}

pub fn run_remove(ctx: &AppContext, args: NameArg) -> Result<()> {
    let engine = Engine::open(ctx)?;
    let removal = engine.orchestrator(ctx).remove(&args.name).map_err(kinded)?;
    ctx.emit(&removal, render_removal)
}

pub fn run_workloads(ctx: &AppContext, cmd: WorkloadCommand) -> Result<()> {
    let engine = Engine::open(ctx)?;
    match cmd {
        WorkloadCommand::List => {
            let records = engine.store.list_workloads()?;
            ctx.emit(&records, |r| render_workloads(r))
        }
        WorkloadCommand::Show(arg) => {
            let record = engine.store.get_workload(&arg.name)?.ok_or_else(|| {
                kinded(ConfigError::not_found(ResourceKind::Workload, arg.name.as_str()))
            })?;
            ctx.emit(&record, |r| render_workloads(std::slice::from_ref(r)))
        }
        WorkloadCommand::Update(args) => {
            let patch: WorkloadPatch = read_json(&args.patch, "workload patch")?;
            let result = engine.orchestrator(ctx).update(&args.name, patch);
            finish_deployment(ctx, result)
        }
        WorkloadCommand::Start(arg) => {
            lifecycle(ctx, &engine, &arg.name, "started", |o, n| o.start(n))
        }
        WorkloadCommand::Stop(arg) => {
            lifecycle(ctx, &engine, &arg.name, "stopped", |o, n| o.stop(n))
        }
        WorkloadCommand::Restart(arg) => {
            lifecycle(ctx, &engine, &arg.name, "restarted", |o, n| o.restart(n))
        }
    }
}

#[derive(Serialize)]
struct LifecycleDone<'a> {
    workload: &'a str,
    action: &'a str,
}

fn lifecycle(
    ctx: &AppContext,
    engine: &Engine,
    name: &str,
    verb: &str,
    call: impl FnOnce(&Orchestrator<'_>, &str) -> opnsense_deploy::error::Result<()>,
) -> Result<()> {
    call(&engine.orchestrator(ctx), name).map_err(kinded)?;
    ctx.emit(&LifecycleDone { workload: name, action: verb }, |d| {
        format!("{} {}", d.workload, d.action)
    })
}

pub fn run_logs(ctx: &AppContext, args: LogsArgs) -> Result<()> {
    let store = ctx.store()?;
    let mut entries = store
        .list_logs(args.workload.as_deref())
        .context("failed to read the deployment log")?;
    if let Some(limit) = args.limit {
        let skip = entries.len().saturating_sub(limit);
        entries.drain(..skip);
    }
    ctx.emit(&entries, |e| render_logs(e))
}
