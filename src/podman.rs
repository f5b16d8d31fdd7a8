// dungeon/src/podman.rs

use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, warn};

use crate::error::{DungeonError, Result};
use crate::host::HostContext;
use crate::mounts::{
    absolutize, build_env_args, clean_path, container_path, parse_cache_mount_spec,
    parse_host_mount_spec, resolve_host_path, CONTAINER_HOME,
};
use crate::settings::Settings;

pub const PODMAN: &str = "podman";
pub const CACHE_VOLUME: &str = "dungeon-cache";
pub const DEFAULT_IMAGE: &str = "localhost/dungeon";

/// Cache targets every container gets, before any configured ones.
const BUILTIN_CACHE_TARGETS: &[&str] = &[".cache", ".npm"];
const PROJECT_DIR: &str = "project";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn podman<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program: PODMAN.to_string(), args: args.into_iter().map(Into::into).collect() }
    }

    /// Shell-quoted form, suitable for copy and paste.
    pub fn display(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(OsStr::new));
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> DungeonError {
        DungeonError::Spawn { program: self.program.clone(), source }
    }

    /// Run attached to the terminal and return the exit code. A child
    /// killed by a signal reports 1.
    pub fn run(&self) -> Result<i32> {
        debug!(command = %self.display(), "running");
        let status = self
            .command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.spawn_error(e))?;
        let code = status.code().unwrap_or(1);
        if code != 0 {
            warn!(command = %self.program, code, "exited with non-zero status");
        }
        Ok(code)
    }

    pub fn succeeds(&self) -> Result<bool> {
        let status = self
            .command()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| self.spawn_error(e))?;
        Ok(status.success())
    }

    pub fn capture(&self) -> Result<String> {
        let output = self
            .command()
            .stderr(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// What the caller decided outside of configuration.
#[derive(Clone, Debug, Default)]
pub struct RunRequest {
    /// Explicit path arguments; empty means "mount the working directory".
    pub paths: Vec<String>,
    /// Mount nothing for the working directory and start in the container home.
    pub skip_cwd: bool,
    pub keep_container: bool,
    pub container_name: Option<String>,
}

pub fn reset_cache_command() -> CommandSpec {
    CommandSpec::podman(["volume", "rm", "-f", CACHE_VOLUME])
}

pub fn reset_cache_volume() -> Result<i32> {
    reset_cache_command().run()
}

/// Synthesize `podman run ...` from effective settings.
pub fn build_podman_command(
    settings: &Settings,
    request: &RunRequest,
    host: &HostContext,
) -> Result<CommandSpec> {
    let (workdir, workdir_mounts) = if request.skip_cwd {
        (CONTAINER_HOME.to_string(), Vec::new())
    } else {
        plan_workdir(&request.paths, host)?
    };

    let mut volumes: Vec<String> = BUILTIN_CACHE_TARGETS
        .iter()
        .map(|target| format!("{CACHE_VOLUME}:{}", container_path(target)))
        .collect();
    for spec in list(&settings.cache) {
        let cache = parse_cache_mount_spec(spec)?;
        volumes.push(format!("{CACHE_VOLUME}:{}{}", cache.target, cache.mode.suffix()));
    }
    for spec in list(&settings.mounts) {
        let mount = parse_host_mount_spec(spec)?;
        let source = resolve_host_path(&host.home, &mount.source)?;
        if !source.exists() {
            return Err(DungeonError::MissingMountSource { path: source });
        }
        let target = container_path(&mount.target);
        volumes.push(format!("{}:{target}{}", source.display(), mount.mode.suffix()));
    }
    volumes.extend(workdir_mounts);

    let mut args: Vec<String> = vec![
        "run".into(),
        "-it".into(),
        "--userns=keep-id".into(),
        "-w".into(),
        workdir,
    ];
    if !request.keep_container {
        args.push("--rm".into());
    }
    let name = request.container_name.as_deref().map(str::trim);
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        args.extend(["--name".to_string(), name.to_string()]);
    }
    if let Some(network) = scalar(&settings.network) {
        args.extend(["--network".to_string(), network.to_string()]);
    }

    let forward = |name: &str| host.var(name).map(str::to_string);
    for (name, value) in build_env_args(list(&settings.env_vars), forward)? {
        args.extend(["--env".to_string(), format!("{name}={value}")]);
    }
    for spec in list(&settings.env_files) {
        let path = resolve_host_path(&host.home, spec)?;
        if !path.is_file() {
            return Err(DungeonError::MissingEnvFile { path });
        }
        args.extend(["--env-file".to_string(), path.display().to_string()]);
    }

    for port in list(&settings.ports).iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        args.extend(["-p".to_string(), port.to_string()]);
    }
    args.extend(list(&settings.podman_args).iter().cloned());

    for volume in volumes {
        args.extend(["-v".to_string(), volume]);
    }

    args.push(scalar(&settings.image).unwrap_or(DEFAULT_IMAGE).to_string());
    args.push("bash".into());
    if let Some(run) = scalar(&settings.run_command) {
        args.extend(["-ic".to_string(), run.to_string()]);
    }

    let spec = CommandSpec { program: PODMAN.to_string(), args };
    debug!(command = %spec.display(), "synthesized podman command");
    Ok(spec)
}

/// Container workdir plus the `-v` values that populate it.
fn plan_workdir(paths: &[String], host: &HostContext) -> Result<(String, Vec<String>)> {
    if paths.is_empty() {
        if same_dir(&host.cwd, &host.home) {
            return Err(DungeonError::UnsafeWorkdir { home: host.home.clone() });
        }
        let workdir = format!("{CONTAINER_HOME}/{}", base_name(&host.cwd));
        let mount = format!("{}:{workdir}", host.cwd.display());
        return Ok((workdir, vec![mount]));
    }

    let workdir = format!("{CONTAINER_HOME}/{PROJECT_DIR}");
    let mut mounts = Vec::with_capacity(paths.len());
    for path in paths {
        let resolved = absolutize(&host.cwd, Path::new(path));
        if !resolved.exists() {
            return Err(DungeonError::MissingPath { path: path.clone() });
        }
        let resolved = resolved.canonicalize()?;
        mounts.push(format!("{}:{workdir}/{}", resolved.display(), base_name(&resolved)));
    }
    Ok((workdir, mounts))
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PROJECT_DIR.to_string())
}

fn same_dir(a: &Path, b: &Path) -> bool {
    canonical(a) == canonical(b)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| clean_path(path))
}

fn list(field: &Option<Vec<String>>) -> &[String] {
    field.as_deref().unwrap_or_default()
}

fn scalar(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
