// dungeon/src/resolve.rs

use tracing::debug;

use crate::error::{DungeonError, Result};
use crate::groups::{
    build_group_selection, merge_group_definitions, normalize_group_order, resolve_group_order,
    GroupRegistry, GroupSelection, GroupToggle,
};
use crate::settings::{Config, Settings, Sources};

/// Concatenate always-on names: defaults, then file, then env. Duplicates
/// are left for `normalize_group_order`.
pub fn resolve_always_on_groups(defaults: &Config, file: &Config, env: &Config) -> Vec<String> {
    [defaults, file, env]
        .into_iter()
        .filter_map(|cfg| cfg.always_on_groups.as_deref())
        .flatten()
        .cloned()
        .collect()
}

/// Precedence merge: defaults <- groups <- file <- env <- cli.
///
/// Groups in `order` are first folded with each other by *accumulation*
/// (lists concatenate in order). The resulting group layer and every later
/// tier are then applied by *replacement*.
pub fn resolve_settings(
    sources: &Sources,
    registry: &GroupRegistry,
    order: &[String],
) -> Result<Settings> {
    let mut groups = Settings::default();
    for name in order {
        let group = registry
            .get(name)
            .ok_or_else(|| DungeonError::UnknownGroup { name: name.clone() })?;
        groups = groups.accumulate(group.settings.clone());
    }

    Ok(sources
        .defaults
        .settings
        .clone()
        .overlay(groups)
        .overlay(sources.file.settings.clone())
        .overlay(sources.env.settings.clone())
        .overlay(sources.cli.clone()))
}

/// Group state known before the command line is parsed: needed to build
/// the per-group flags and their help text.
#[derive(Clone, Debug, Default)]
pub struct GroupPlan {
    pub registry: GroupRegistry,
    pub base_order: Vec<String>,
    pub selection: GroupSelection,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub settings: Settings,
    pub group_order: Vec<String>,
}

impl GroupPlan {
    pub fn prepare(defaults: &Config, file: &Config, env: &Config) -> Result<Self> {
        let registry = merge_group_definitions(&defaults.groups, &file.groups)?;
        let base_order = normalize_group_order(&resolve_always_on_groups(defaults, file, env))?;
        let selection = build_group_selection(&registry, &base_order)?;
        debug!(
            count = registry.len(),
            groups = ?registry.names(),
            always_on = ?base_order,
            "group plan prepared"
        );
        Ok(Self { registry, base_order, selection })
    }

    pub fn is_default_on(&self, name: &str) -> bool {
        self.selection.get(name).copied().unwrap_or(false)
    }

    pub fn resolve(&self, sources: &Sources, toggles: &[GroupToggle]) -> Result<Resolution> {
        let group_order = resolve_group_order(&self.base_order, toggles);
        debug!(order = ?group_order, "active groups");
        let settings = resolve_settings(sources, &self.registry, &group_order)?;
        Ok(Resolution { settings, group_order })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GroupConfig;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn defaults() -> Config {
        Config {
            settings: Settings { image: Some("localhost/dungeon".into()), ..Settings::default() },
            ..Config::default()
        }
    }

    fn web_file() -> Config {
        let web = GroupConfig {
            settings: Settings { ports: Some(strings(&["8080:8080"])), ..Settings::default() },
            disabled: false,
        };
        Config {
            always_on_groups: Some(strings(&["web"])),
            groups: BTreeMap::from([("web".to_string(), web)]),
            ..Config::default()
        }
    }

    fn sources(file: Config, cli: Settings) -> Sources {
        Sources { defaults: defaults(), file, env: Config::default(), cli }
    }

    #[test]
    fn always_on_concatenates_in_layer_order() {
        let d = Config { always_on_groups: Some(strings(&["a"])), ..Config::default() };
        let f = Config { always_on_groups: Some(strings(&["b", "a"])), ..Config::default() };
        let e = Config { always_on_groups: Some(strings(&["c"])), ..Config::default() };
        assert_eq!(resolve_always_on_groups(&d, &f, &e), strings(&["a", "b", "a", "c"]));
        let empty = Config::default();
        assert!(resolve_always_on_groups(&empty, &empty, &empty).is_empty());
    }

    #[test]
    fn always_on_group_applies_without_flags() {
        let src = sources(web_file(), Settings::default());
        let plan = GroupPlan::prepare(&src.defaults, &src.file, &src.env).unwrap();
        assert!(plan.is_default_on("web"));

        let resolved = plan.resolve(&src, &[]).unwrap();
        assert_eq!(resolved.group_order, strings(&["web"]));
        assert_eq!(resolved.settings.ports, Some(strings(&["8080:8080"])));
        assert_eq!(resolved.settings.image.as_deref(), Some("localhost/dungeon"));
    }

    #[test]
    fn toggling_group_off_drops_its_settings() {
        let src = sources(web_file(), Settings::default());
        let plan = GroupPlan::prepare(&src.defaults, &src.file, &src.env).unwrap();
        let resolved = plan.resolve(&src, &[GroupToggle::new("web", false)]).unwrap();
        assert!(resolved.group_order.is_empty());
        assert!(resolved.settings.ports.unwrap_or_default().is_empty());
    }

    #[test]
    fn cli_list_replaces_file_list() {
        let file = Config {
            settings: Settings { ports: Some(strings(&["8080:8080"])), ..Settings::default() },
            ..Config::default()
        };
        let cli = Settings { ports: Some(strings(&["9090:9090"])), ..Settings::default() };
        let src = sources(file, cli);
        let plan = GroupPlan::prepare(&src.defaults, &src.file, &src.env).unwrap();
        assert_eq!(plan.resolve(&src, &[]).unwrap().settings.ports, Some(strings(&["9090:9090"])));
    }

    #[test]
    fn active_groups_accumulate_lists_in_order() {
        let group = |mount: &str, image: &str| GroupConfig {
            settings: Settings {
                mounts: Some(strings(&[mount])),
                image: Some(image.into()),
                ..Settings::default()
            },
            disabled: false,
        };
        let file = Config {
            groups: BTreeMap::from([
                ("git".to_string(), group("~/.gitconfig:.gitconfig:ro", "img-git")),
                ("ssh".to_string(), group("~/.ssh:.ssh:ro", "img-ssh")),
            ]),
            ..Config::default()
        };
        let src = sources(file, Settings::default());
        let plan = GroupPlan::prepare(&src.defaults, &src.file, &src.env).unwrap();
        let toggles = [GroupToggle::new("ssh", true), GroupToggle::new("git", true)];
        let resolved = plan.resolve(&src, &toggles).unwrap();
        assert_eq!(
            resolved.settings.mounts,
            Some(strings(&["~/.ssh:.ssh:ro", "~/.gitconfig:.gitconfig:ro"]))
        );
        assert_eq!(resolved.settings.image.as_deref(), Some("img-git"));
    }

    #[test]
    fn file_and_env_beat_groups() {
        let mut file = web_file();
        file.settings.ports = Some(strings(&["1:1"]));
        let mut src = sources(file, Settings::default());
        src.env.settings.image = Some("env-image".into());
        let plan = GroupPlan::prepare(&src.defaults, &src.file, &src.env).unwrap();
        let resolved = plan.resolve(&src, &[]).unwrap();
        assert_eq!(resolved.settings.ports, Some(strings(&["1:1"])));
        assert_eq!(resolved.settings.image.as_deref(), Some("env-image"));
    }

    #[test]
    fn always_on_name_must_be_registered() {
        let env = Config { always_on_groups: Some(strings(&["ghost"])), ..Config::default() };
        let err = GroupPlan::prepare(&defaults(), &Config::default(), &env).unwrap_err();
        assert!(matches!(err, DungeonError::UnknownGroup { name } if name == "ghost"));
    }

    #[test]
    fn duplicate_always_on_names_apply_once() {
        let mut file = web_file();
        file.always_on_groups = Some(strings(&["web", " web"]));
        let src = sources(file, Settings::default());
        let plan = GroupPlan::prepare(&src.defaults, &src.file, &src.env).unwrap();
        assert_eq!(plan.base_order, strings(&["web"]));
        assert_eq!(plan.resolve(&src, &[]).unwrap().settings.ports, Some(strings(&["8080:8080"])));
    }

    fn registry_of(names: &[String]) -> GroupRegistry {
        let groups = names.iter().map(|n| (n.clone(), GroupConfig::default())).collect();
        merge_group_definitions(&groups, &BTreeMap::new()).unwrap()
    }

    proptest! {
        #[test]
        fn known_names_never_fail(
            names in proptest::collection::btree_set("[a-z]{1,6}", 1..6),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 0..8),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let registry = registry_of(&names);
            let order: Vec<String> = picks.iter().map(|i| i.get(&names).clone()).collect();
            prop_assert!(resolve_settings(&Sources::default(), &registry, &order).is_ok());
        }

        #[test]
        fn one_unknown_name_always_fails(
            names in proptest::collection::btree_set("[a-z]{1,6}", 0..6),
            at in any::<prop::sample::Index>(),
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let registry = registry_of(&names);
            let mut order = names.clone();
            order.insert(at.index(order.len() + 1), "UNKNOWN".to_string());
            let is_unknown = matches!(
                resolve_settings(&Sources::default(), &registry, &order),
                Err(DungeonError::UnknownGroup { .. })
            );
            prop_assert!(is_unknown);
        }
    }
}
