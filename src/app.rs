// dungeon/src/app.rs

use anyhow::{Context, Result};
use std::ffi::OsString;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{self, ParsedCli};
use crate::host::HostContext;
use crate::layered_config;
use crate::persist::{self, PersistMode};
use crate::podman::{self, CommandSpec, RunRequest};
use crate::resolve::GroupPlan;
use crate::settings::Sources;

/// `DUNGEON_LOG`, else `RUST_LOG`, else warnings only. Logs go to stderr so
/// `--debug` output stays clean.
pub fn init_tracing() {
    let filter = ["DUNGEON_LOG", "RUST_LOG"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .and_then(|spec| EnvFilter::try_new(spec).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Entry point of the binary; returns the exit code to report.
pub fn run() -> Result<i32> {
    init_tracing();
    let host = HostContext::capture().context("inspect host environment")?;
    run_with(std::env::args_os(), &host)
}

/// Load every configuration layer and parse `args` against the resulting
/// groups. Nothing is executed.
pub fn prepare<I, T>(args: I, host: &HostContext) -> Result<(Sources, GroupPlan, ParsedCli)>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut sources = layered_config::load_sources(host).context("load configuration")?;
    let plan = GroupPlan::prepare(&sources.defaults, &sources.file, &sources.env)?;
    let parsed = cli::parse_args(args, &plan)?;
    sources.cli = parsed.settings.clone();
    Ok((sources, plan, parsed))
}

/// Resolve effective settings and synthesize the `podman run` command.
pub fn synthesize(
    sources: &Sources,
    plan: &GroupPlan,
    parsed: &ParsedCli,
    host: &HostContext,
    container_name: Option<String>,
) -> Result<CommandSpec> {
    let resolution = plan.resolve(sources, &parsed.toggles)?;
    info!(groups = ?resolution.group_order, "resolved configuration");
    let request = RunRequest {
        paths: parsed.paths.clone(),
        skip_cwd: parsed.skip_cwd,
        keep_container: container_name.is_some(),
        container_name,
    };
    Ok(podman::build_podman_command(&resolution.settings, &request, host)?)
}

/// What `--debug` prints: the cache reset (when requested) followed by the
/// run command. Nothing is executed.
pub fn debug_commands(
    sources: &Sources,
    plan: &GroupPlan,
    parsed: &ParsedCli,
    host: &HostContext,
) -> Result<Vec<CommandSpec>> {
    let mut commands = Vec::new();
    if parsed.reset_cache {
        commands.push(podman::reset_cache_command());
    }
    commands.push(synthesize(sources, plan, parsed, host, None)?);
    Ok(commands)
}

pub fn run_with<I, T>(args: I, host: &HostContext) -> Result<i32>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let (sources, plan, parsed) = prepare(args, host)?;

    if parsed.debug {
        for command in debug_commands(&sources, &plan, &parsed, host)? {
            println!("{}", command.display());
        }
        return Ok(0);
    }

    if parsed.reset_cache {
        let code = podman::reset_cache_volume()?;
        if code != 0 {
            return Ok(code);
        }
    }

    match parsed.persist_mode {
        PersistMode::Discard => {
            let name = persist::persisted_container_name(&host.cwd, &[]);
            Ok(persist::discard_container(&name)?)
        }
        PersistMode::Reuse => {
            let name = persist::persisted_container_name(&host.cwd, &[]);
            Ok(persist::ensure_container_session(&name)?)
        }
        PersistMode::Create => {
            let name = persist::persisted_container_name(&host.cwd, &parsed.paths);
            let spec = synthesize(&sources, &plan, &parsed, host, Some(name.clone()))?;
            info!(container = %name, "creating persisted container");
            Ok(persist::run_persisted_session(&name, &spec)?)
        }
        PersistMode::None => {
            let spec = synthesize(&sources, &plan, &parsed, host, None)?;
            Ok(spec.run()?)
        }
    }
}
