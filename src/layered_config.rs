// dungeon/src/layered_config.rs

use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::{Path, PathBuf}};
use tracing::debug;

use crate::error::{DungeonError, Result};
use crate::host::HostContext;
use crate::settings::{Config, GroupConfig, Settings, Sources};

pub const ENV_PREFIX: &str = "DUNGEON_";
const DEFAULTS_TOML: &str = include_str!("defaults.toml");
const DEFAULTS_ORIGIN: &str = "<built-in defaults>";

// Keys that configure the run itself; anything else at the top level is a group.
const SETTINGS_KEYS: &[&str] = &[
    "run", "image", "network", "ports", "cache", "caches", "mounts",
    "envvar", "envs", "env_files", "podman_args",
];
const ALWAYS_ON_KEYS: &[&str] = &["always_on_groups", "default_groups"];

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSettings {
    run: Option<String>,
    image: Option<String>,
    network: Option<String>,
    ports: Option<Vec<String>>,
    #[serde(alias = "caches")]
    cache: Option<Vec<String>>,
    mounts: Option<Vec<String>>,
    #[serde(alias = "envs")]
    envvar: Option<Vec<String>>,
    env_files: Option<Vec<String>>,
    podman_args: Option<Vec<String>>,
}

impl From<RawSettings> for Settings {
    fn from(raw: RawSettings) -> Self {
        Settings {
            run_command: raw.run,
            image: raw.image,
            network: raw.network,
            ports: raw.ports,
            cache: raw.cache,
            mounts: raw.mounts,
            env_vars: raw.envvar,
            env_files: raw.env_files,
            podman_args: raw.podman_args,
        }
    }
}

/// Load defaults, the user file and the `DUNGEON_*` environment. The CLI
/// layer is left empty for the caller to fill in once flags are parsed.
pub fn load_sources(host: &HostContext) -> Result<Sources> {
    Ok(Sources {
        defaults: load_defaults()?,
        file: load_from_file(host)?,
        env: load_from_env(&host.vars),
        cli: Settings::default(),
    })
}

pub fn load_defaults() -> Result<Config> {
    if DEFAULTS_TOML.trim().is_empty() {
        return Ok(Config::default());
    }
    parse_config(DEFAULTS_TOML, Path::new(DEFAULTS_ORIGIN))
}

/// `$DUNGEON_CONFIG` when set, else `$XDG_CONFIG_HOME/dungeon/config.toml`,
/// else `~/.config/dungeon/config.toml`. The flag tells whether the file
/// was asked for explicitly.
pub fn config_path(host: &HostContext) -> (PathBuf, bool) {
    if let Some(explicit) = host.var("DUNGEON_CONFIG").filter(|v| !v.trim().is_empty()) {
        return (PathBuf::from(explicit.trim()), true);
    }
    let base = match host.var("XDG_CONFIG_HOME").filter(|v| !v.trim().is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None => host.home.join(".config"),
    };
    (base.join("dungeon").join("config.toml"), false)
}

pub fn load_from_file(host: &HostContext) -> Result<Config> {
    let (path, explicit) = config_path(host);
    read_file(&path, explicit)
}

/// A missing file is an empty layer unless it was requested explicitly.
pub fn read_file(path: &Path, required: bool) -> Result<Config> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound && !required => {
            debug!(path = %path.display(), "no config file");
            return Ok(Config::default());
        }
        Err(source) => return Err(DungeonError::ConfigRead { path: path.to_path_buf(), source }),
    };
    debug!(path = %path.display(), "loading config file");
    parse_config(&text, path)
}

pub fn parse_config(text: &str, origin: &Path) -> Result<Config> {
    let syntax = |source| DungeonError::ConfigSyntax { path: origin.to_path_buf(), source };
    let table: toml::Table = toml::from_str(text).map_err(syntax)?;

    let mut cfg = Config::default();
    let mut settings = toml::Table::new();
    for (key, value) in table {
        if SETTINGS_KEYS.contains(&key.as_str()) {
            settings.insert(key, value);
        } else if ALWAYS_ON_KEYS.contains(&key.as_str()) {
            if cfg.always_on_groups.is_some() {
                return Err(DungeonError::InvalidConfigValue {
                    key,
                    expected: "cannot be combined with another always-on key",
                });
            }
            let names = value.try_into::<Vec<String>>().map_err(|_| {
                DungeonError::InvalidConfigValue {
                    key: key.clone(),
                    expected: "must be a list of strings",
                }
            })?;
            cfg.always_on_groups = Some(names);
        } else {
            let group = parse_group(&key, value)?;
            cfg.groups.insert(key, group);
        }
    }
    cfg.settings = toml::Value::Table(settings).try_into::<RawSettings>().map_err(syntax)?.into();
    Ok(cfg)
}

fn parse_group(name: &str, value: toml::Value) -> Result<GroupConfig> {
    let toml::Value::Table(table) = value else {
        return Err(DungeonError::InvalidConfigValue {
            key: name.to_string(),
            expected: "must be a table (unknown top-level key?)",
        });
    };
    if table.is_empty() {
        return Ok(GroupConfig { disabled: true, ..GroupConfig::default() });
    }
    let raw = toml::Value::Table(table)
        .try_into::<RawSettings>()
        .map_err(|source| DungeonError::GroupSyntax { group: name.to_string(), source })?;
    Ok(GroupConfig { settings: raw.into(), disabled: false })
}

/// Build the environment layer from a snapshot of host variables.
pub fn load_from_env(vars: &BTreeMap<String, String>) -> Config {
    let lookup = |names: &[&str]| {
        names.iter().find_map(|name| vars.get(&format!("{ENV_PREFIX}{name}"))).map(String::as_str)
    };
    let scalar = |names: &[&str]| lookup(names).map(|v| v.trim().to_string());
    let list = |names: &[&str]| lookup(names).map(split_env_list);

    Config {
        settings: Settings {
            run_command: scalar(&["RUN"]),
            image: scalar(&["IMAGE"]),
            network: scalar(&["NETWORK"]),
            ports: list(&["PORTS"]),
            cache: list(&["CACHE", "CACHES"]),
            mounts: list(&["MOUNTS"]),
            env_vars: list(&["ENV", "ENVS", "ENVVAR"]),
            env_files: list(&["ENV_FILES"]),
            podman_args: list(&["PODMAN_ARGS"]),
        },
        always_on_groups: list(&["ALWAYS_ON_GROUPS", "DEFAULT_GROUPS"]),
        groups: BTreeMap::new(),
    }
}

fn split_env_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Config> {
        parse_config(text, Path::new("test.toml"))
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_declare_image_only() {
        let defaults = load_defaults().unwrap();
        assert_eq!(defaults.settings.image.as_deref(), Some("localhost/dungeon"));
        assert_eq!(defaults.settings.ports, None);
        assert!(defaults.always_on_groups.is_none());
        assert!(defaults.groups.is_empty());
    }

    #[test]
    fn parses_settings_groups_and_always_on() {
        let cfg = parse(r#"
run = "codex"
ports = ["8080:8080"]
caches = [".cargo"]
envs = ["TERM"]
always_on_groups = ["web"]

[web]
ports = ["3000:3000"]
mounts = ["~/.npmrc:.npmrc:ro"]

[obsidian]
"#).unwrap();

        assert_eq!(cfg.settings.run_command.as_deref(), Some("codex"));
        assert_eq!(cfg.settings.cache, Some(vec![".cargo".to_string()]));
        assert_eq!(cfg.settings.env_vars, Some(vec!["TERM".to_string()]));
        assert_eq!(cfg.always_on_groups, Some(vec!["web".to_string()]));
        let web = &cfg.groups["web"];
        assert!(!web.disabled);
        assert_eq!(web.settings.ports, Some(vec!["3000:3000".to_string()]));
        assert!(cfg.groups["obsidian"].disabled);
    }

    #[test]
    fn default_groups_is_an_alias() {
        let cfg = parse(r#"default_groups = ["a", "b"]"#).unwrap();
        assert_eq!(cfg.always_on_groups, Some(vec!["a".to_string(), "b".to_string()]));

        let err = parse("default_groups = [\"a\"]\nalways_on_groups = [\"b\"]").unwrap_err();
        assert!(matches!(err, DungeonError::InvalidConfigValue { .. }));
    }

    #[test]
    fn explicit_empty_list_is_kept_apart_from_absent() {
        let cfg = parse("ports = []").unwrap();
        assert_eq!(cfg.settings.ports, Some(Vec::new()));
        assert_eq!(cfg.settings.mounts, None);
    }

    #[test]
    fn unknown_key_inside_group_is_rejected() {
        let err = parse("[web]\nport = [\"1:1\"]").unwrap_err();
        assert!(matches!(err, DungeonError::GroupSyntax { ref group, .. } if group == "web"));
    }

    #[test]
    fn non_table_unknown_key_is_rejected() {
        let err = parse("imgae = \"typo\"").unwrap_err();
        assert!(matches!(err, DungeonError::InvalidConfigValue { ref key, .. } if key == "imgae"));
    }

    #[test]
    fn wrong_value_type_is_a_syntax_error() {
        assert!(matches!(parse("ports = \"8080\""), Err(DungeonError::ConfigSyntax { .. })));
        assert!(matches!(parse("run = ["), Err(DungeonError::ConfigSyntax { .. })));
    }

    #[test]
    fn env_layer_splits_and_trims() {
        let cfg = load_from_env(&vars(&[
            ("DUNGEON_RUN", "  claude "),
            ("DUNGEON_PORTS", "8080:8080, ,9090:9090"),
            ("DUNGEON_CACHES", ".cargo"),
            ("DUNGEON_DEFAULT_GROUPS", "web,codex"),
            ("UNRELATED", "x"),
        ]));
        assert_eq!(cfg.settings.run_command.as_deref(), Some("claude"));
        assert_eq!(
            cfg.settings.ports,
            Some(vec!["8080:8080".to_string(), "9090:9090".to_string()])
        );
        assert_eq!(cfg.settings.cache, Some(vec![".cargo".to_string()]));
        assert_eq!(cfg.always_on_groups, Some(vec!["web".to_string(), "codex".to_string()]));
        assert_eq!(cfg.settings.image, None);
    }

    #[test]
    fn env_alias_listed_first_wins() {
        let cfg = load_from_env(&vars(&[("DUNGEON_ENV", "A=1"), ("DUNGEON_ENVVAR", "B=2")]));
        assert_eq!(cfg.settings.env_vars, Some(vec!["A=1".to_string()]));
    }

    #[test]
    fn config_path_prefers_explicit_then_xdg_then_home() {
        let mut host = HostContext { home: PathBuf::from("/home/me"), ..HostContext::default() };
        let home_default = PathBuf::from("/home/me/.config/dungeon/config.toml");
        assert_eq!(config_path(&host), (home_default, false));

        host.vars.insert("XDG_CONFIG_HOME".into(), "/xdg".into());
        assert_eq!(config_path(&host), (PathBuf::from("/xdg/dungeon/config.toml"), false));

        host.vars.insert("DUNGEON_CONFIG".into(), "/etc/dungeon.toml".into());
        assert_eq!(config_path(&host), (PathBuf::from("/etc/dungeon.toml"), true));
    }

    #[test]
    fn missing_file_is_empty_unless_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(read_file(&path, false).unwrap(), Config::default());
        assert!(matches!(read_file(&path, true), Err(DungeonError::ConfigRead { .. })));

        fs::write(&path, "image = \"localhost/other\"").unwrap();
        let cfg = read_file(&path, true).unwrap();
        assert_eq!(cfg.settings.image.as_deref(), Some("localhost/other"));
    }
}
