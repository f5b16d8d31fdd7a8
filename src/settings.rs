// dungeon/src/settings.rs

use std::collections::BTreeMap;

/// The overridable values of a run. `None` means "not provided by this
/// layer"; `Some(vec![])` is an explicit override to nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    pub run_command: Option<String>,
    pub image: Option<String>,
    pub network: Option<String>,
    pub ports: Option<Vec<String>>,
    pub cache: Option<Vec<String>>,
    pub mounts: Option<Vec<String>>,
    pub env_vars: Option<Vec<String>>,
    pub env_files: Option<Vec<String>>,
    pub podman_args: Option<Vec<String>>,
}

/// A named overlay. `disabled` only matters while group definitions are
/// merged: it removes the group from the registry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupConfig {
    pub settings: Settings,
    pub disabled: bool,
}

/// One configuration layer (built-in defaults, user file or environment).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub settings: Settings,
    pub always_on_groups: Option<Vec<String>>,
    pub groups: BTreeMap<String, GroupConfig>,
}

/// Everything the precedence merge consumes. CLI flags select groups but
/// never define them, so that layer is bare settings.
#[derive(Clone, Debug, Default)]
pub struct Sources {
    pub defaults: Config,
    pub file: Config,
    pub env: Config,
    pub cli: Settings,
}

impl Settings {
    /// Replacement merge: `top` wins field by field. Scalars win only when
    /// non-empty, lists win whenever present (even when empty).
    pub fn overlay(self, top: Settings) -> Settings {
        Settings {
            run_command: pick_scalar(self.run_command, top.run_command),
            image: pick_scalar(self.image, top.image),
            network: pick_scalar(self.network, top.network),
            ports: top.ports.or(self.ports),
            cache: top.cache.or(self.cache),
            mounts: top.mounts.or(self.mounts),
            env_vars: top.env_vars.or(self.env_vars),
            env_files: top.env_files.or(self.env_files),
            podman_args: top.podman_args.or(self.podman_args),
        }
    }

    /// Accumulating merge: scalars follow the `overlay` rule, present lists
    /// are appended after the ones already collected.
    pub fn accumulate(self, next: Settings) -> Settings {
        Settings {
            run_command: pick_scalar(self.run_command, next.run_command),
            image: pick_scalar(self.image, next.image),
            network: pick_scalar(self.network, next.network),
            ports: append_list(self.ports, next.ports),
            cache: append_list(self.cache, next.cache),
            mounts: append_list(self.mounts, next.mounts),
            env_vars: append_list(self.env_vars, next.env_vars),
            env_files: append_list(self.env_files, next.env_files),
            podman_args: append_list(self.podman_args, next.podman_args),
        }
    }

    /// True when no field was provided at all.
    pub fn is_empty(&self) -> bool {
        *self == Settings::default()
    }
}

fn pick_scalar(base: Option<String>, top: Option<String>) -> Option<String> {
    match top {
        Some(value) if !value.is_empty() => Some(value),
        _ => base,
    }
}

fn append_list(base: Option<Vec<String>>, extra: Option<Vec<String>>) -> Option<Vec<String>> {
    match (base, extra) {
        (base, None) => base,
        (None, Some(extra)) => Some(extra),
        (Some(mut base), Some(extra)) => {
            base.extend(extra);
            Some(base)
        }
    }
}
