pub mod app;
pub mod cli;
pub mod error;
pub mod groups;
pub mod host;
pub mod layered_config;
pub mod mounts;
pub mod persist;
pub mod podman;
pub mod resolve;
pub mod settings;

pub use error::{DungeonError, Result};
pub use groups::{GroupRegistry, GroupSelection, GroupToggle};
pub use host::HostContext;
pub use persist::{persisted_container_name, PersistMode};
pub use podman::{build_podman_command, CommandSpec, RunRequest};
pub use resolve::{resolve_settings, GroupPlan, Resolution};
pub use settings::{Config, GroupConfig, Settings, Sources};
