// dungeon/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DungeonError>;

#[derive(Debug, Error)]
pub enum DungeonError {
    #[error("group name cannot be empty (registry key {key:?})")]
    InvalidGroupName { key: String },

    #[error("group name cannot be empty")]
    EmptyGroupName,

    #[error("group name '{name}' conflicts with a built-in flag")]
    ReservedGroupName { name: String },

    #[error("group name '{name}' cannot be used as a flag ({reason})")]
    UnusableGroupName { name: String, reason: &'static str },

    #[error("unknown group \"{name}\"")]
    UnknownGroup { name: String },

    #[error("invalid mount spec \"{spec}\" ({reason})")]
    InvalidMountSpec { spec: String, reason: &'static str },

    #[error("invalid mount mode '{mode}' (use 'ro' or 'rw')")]
    InvalidMountMode { mode: String },

    #[error("invalid cache mount spec \"{spec}\" ({reason})")]
    InvalidCacheMountSpec { spec: String, reason: &'static str },

    #[error("invalid env spec \"{spec}\"")]
    InvalidEnvSpec { spec: String },

    #[error("env \"{name}\" is not set on host")]
    MissingHostEnvVar { name: String },

    #[error("mount source '{}' does not exist", path.display())]
    MissingMountSource { path: PathBuf },

    #[error("env file '{}' does not exist", path.display())]
    MissingEnvFile { path: PathBuf },

    #[error("'{path}' does not exist")]
    MissingPath { path: String },

    #[error("refusing to run from home directory '{}'", home.display())]
    UnsafeWorkdir { home: PathBuf },

    #[error("read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse config {}: {source}", path.display())]
    ConfigSyntax {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("group \"{group}\": {source}")]
    GroupSyntax {
        group: String,
        source: toml::de::Error,
    },

    #[error("{key} {expected}")]
    InvalidConfigValue { key: String, expected: &'static str },

    #[error("--persist, --persisted, and --discard are mutually exclusive")]
    ConflictingPersistFlags,

    #[error("--persisted and --discard do not accept config, group, or path arguments")]
    PersistArguments,

    #[error("--skip-cwd cannot be used with explicit paths")]
    SkipCwdWithPaths,

    #[error("--debug cannot be combined with persistence flags")]
    DebugWithPersistence,

    #[error("container \"{name}\" already exists, use --persisted to connect")]
    ContainerExists { name: String },

    #[error("container \"{name}\" does not exist")]
    ContainerNotFound { name: String },

    #[error("unable to resolve home directory")]
    HomeUnavailable,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Usage(#[from] clap::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
