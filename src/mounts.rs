// dungeon/src/mounts.rs

use std::path::{Component, Path, PathBuf};

use crate::error::{DungeonError, Result};

/// Home directory of the unprivileged user inside the image.
pub const CONTAINER_HOME: &str = "/home/dungeon";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    /// Suffix appended to a `-v` value; read-write is podman's default.
    pub fn suffix(self) -> &'static str {
        match self {
            AccessMode::ReadWrite => "",
            AccessMode::ReadOnly => ":ro",
        }
    }
}

/// `source:target[:ro|rw]`, as written by the user (nothing resolved yet).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostMount {
    pub source: String,
    pub target: String,
    pub mode: AccessMode,
}

/// `target[:ro|rw]` inside the shared cache volume; `target` is already a
/// container path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheMount {
    pub target: String,
    pub mode: AccessMode,
}

pub fn parse_host_mount_spec(spec: &str) -> Result<HostMount> {
    let parts: Vec<&str> = spec.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(DungeonError::InvalidMountSpec {
            spec: spec.to_string(),
            reason: "expected source:target[:ro|rw]",
        });
    }
    let (source, target) = (parts[0].trim(), parts[1].trim());
    if source.is_empty() || target.is_empty() {
        return Err(DungeonError::InvalidMountSpec {
            spec: spec.to_string(),
            reason: "source and target required",
        });
    }
    let mode = parts.get(2).map_or(Ok(AccessMode::ReadWrite), |m| parse_mode(m))?;
    Ok(HostMount { source: source.to_string(), target: target.to_string(), mode })
}

pub fn parse_cache_mount_spec(spec: &str) -> Result<CacheMount> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() > 2 {
        return Err(DungeonError::InvalidCacheMountSpec {
            spec: spec.to_string(),
            reason: "expected target[:ro|rw]",
        });
    }
    let target = parts[0].trim();
    if target.is_empty() {
        return Err(DungeonError::InvalidCacheMountSpec {
            spec: spec.to_string(),
            reason: "target required",
        });
    }
    let mode = parts.get(1).map_or(Ok(AccessMode::ReadWrite), |m| parse_mode(m))?;
    Ok(CacheMount { target: container_path(target), mode })
}

fn parse_mode(raw: &str) -> Result<AccessMode> {
    match raw.trim().to_lowercase().as_str() {
        "" | "rw" => Ok(AccessMode::ReadWrite),
        "ro" => Ok(AccessMode::ReadOnly),
        _ => Err(DungeonError::InvalidMountMode { mode: raw.to_string() }),
    }
}

/// Host-side path of a mount source. Relative paths hang off `home`, not the
/// working directory, so a config file means the same thing everywhere.
pub fn resolve_host_path(home: &Path, path: &str) -> Result<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(DungeonError::InvalidMountSpec {
            spec: path.to_string(),
            reason: "source required",
        });
    }
    if trimmed == "~" {
        return Ok(home.to_path_buf());
    }
    match trimmed.strip_prefix("~/") {
        Some(rest) => Ok(clean_path(&home.join(rest))),
        None => Ok(absolutize(home, Path::new(trimmed))),
    }
}

/// Container-side path; relative targets live under the container home.
pub fn container_path(path: &str) -> String {
    absolutize(Path::new(CONTAINER_HOME), Path::new(path.trim()))
        .to_string_lossy()
        .into_owned()
}

pub fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean_path(path)
    } else {
        clean_path(&base.join(path))
    }
}

/// Lexical normalisation: drops `.` and folds `..` without touching the disk.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other),
        }
    }
    cleaned
}

/// Turn `NAME=value` and bare `NAME` specs into `(name, value)` pairs, in
/// input order. Bare names are forwarded from the host through `lookup`.
pub fn build_env_args<F>(specs: &[String], lookup: F) -> Result<Vec<(String, String)>>
where
    F: Fn(&str) -> Option<String>,
{
    let mut pairs = Vec::with_capacity(specs.len());
    for spec in specs {
        let trimmed = spec.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once('=') {
            Some((name, value)) => {
                let name = name.trim();
                if name.is_empty() {
                    return Err(DungeonError::InvalidEnvSpec { spec: trimmed.to_string() });
                }
                pairs.push((name.to_string(), value.to_string()));
            }
            None => {
                let value = lookup(trimmed)
                    .ok_or_else(|| DungeonError::MissingHostEnvVar { name: trimmed.to_string() })?;
                pairs.push((trimmed.to_string(), value));
            }
        }
    }
    Ok(pairs)
}
