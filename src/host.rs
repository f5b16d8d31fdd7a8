// dungeon/src/host.rs

use directories::BaseDirs;
use std::{collections::BTreeMap, path::PathBuf};

use crate::error::{DungeonError, Result};

/// The slice of the invoking process that configuration resolution and
/// command synthesis depend on. Captured once in `app` and passed down.
#[derive(Clone, Debug, Default)]
pub struct HostContext {
    pub cwd: PathBuf,
    pub home: PathBuf,
    pub vars: BTreeMap<String, String>,
}

impl HostContext {
    pub fn capture() -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let home = BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .ok_or(DungeonError::HomeUnavailable)?;
        // Non UTF-8 variables cannot be forwarded as `--env` values anyway.
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Ok(Self { cwd, home, vars })
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }
}
