// dungeon/src/persist.rs

use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::info;

use crate::error::{DungeonError, Result};
use crate::mounts::absolutize;
use crate::podman::CommandSpec;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PersistMode {
    #[default]
    None,
    /// `--persist`: run a named container that survives the session.
    Create,
    /// `--persisted`: reconnect to that container.
    Reuse,
    /// `--discard`: remove it.
    Discard,
}

impl PersistMode {
    pub fn from_flags(persist: bool, persisted: bool, discard: bool) -> Result<Self> {
        match (persist, persisted, discard) {
            (false, false, false) => Ok(PersistMode::None),
            (true, false, false) => Ok(PersistMode::Create),
            (false, true, false) => Ok(PersistMode::Reuse),
            (false, false, true) => Ok(PersistMode::Discard),
            _ => Err(DungeonError::ConflictingPersistFlags),
        }
    }

    /// Modes that only address an existing container and take no run options.
    pub fn is_lookup(self) -> bool {
        matches!(self, PersistMode::Reuse | PersistMode::Discard)
    }
}

const HASH_LEN: usize = 8;

/// `dungeon-<base>-<hash>` where the hash covers the absolute working
/// directory followed by every explicit path (relative ones taken from `cwd`).
pub fn persisted_container_name(cwd: &Path, paths: &[String]) -> String {
    let cwd = absolutize(Path::new("/"), cwd);
    let inputs: Vec<String> = std::iter::once(cwd.clone())
        .chain(paths.iter().map(|p| absolutize(&cwd, Path::new(p))))
        .map(|p| p.to_string_lossy().into_owned())
        .collect();

    let digest = Sha256::digest(inputs.join("\n").as_bytes());
    let hash = hex::encode(digest);
    let base = cwd.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    format!("dungeon-{}-{}", sanitize_container_base(&base), &hash[..HASH_LEN])
}

/// Podman accepts `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; map everything else to `-`.
pub fn sanitize_container_base(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '-' })
        .collect();
    match cleaned.trim_matches('-') {
        "" => "project".to_string(),
        trimmed => trimmed.to_string(),
    }
}

pub fn container_exists(name: &str) -> Result<bool> {
    CommandSpec::podman(["container", "exists", name]).succeeds()
}

pub fn container_running(name: &str) -> Result<bool> {
    let stdout = CommandSpec::podman(["inspect", "-f", "{{.State.Running}}", name]).capture()?;
    Ok(stdout.trim() == "true")
}

pub fn start_command(name: &str) -> CommandSpec {
    CommandSpec::podman(["start", name])
}

pub fn exec_command(name: &str) -> CommandSpec {
    CommandSpec::podman(["exec", "-it", name, "bash"])
}

pub fn discard_command(name: &str) -> CommandSpec {
    CommandSpec::podman(["rm", "-f", name])
}

/// Attach a shell to a persisted container, starting it first if needed.
/// Returns the exit code of the last podman invocation.
pub fn ensure_container_session(name: &str) -> Result<i32> {
    if !container_exists(name)? {
        return Err(DungeonError::ContainerNotFound { name: name.to_string() });
    }
    if !container_running(name)? {
        info!(container = name, "starting stopped container");
        let code = start_command(name).run()?;
        if code != 0 {
            return Ok(code);
        }
    }
    exec_command(name).run()
}

pub fn discard_container(name: &str) -> Result<i32> {
    discard_command(name).run()
}

/// Run the synthesized command for a new persisted container.
pub fn run_persisted_session(name: &str, spec: &CommandSpec) -> Result<i32> {
    if container_exists(name)? {
        return Err(DungeonError::ContainerExists { name: name.to_string() });
    }
    spec.run()
}
