// dungeon/src/groups.rs

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{DungeonError, Result};
use crate::settings::GroupConfig;

/// Which groups are on before CLI toggles: every registered name, `true`
/// for the always-on ones.
pub type GroupSelection = BTreeMap<String, bool>;

/// Resolved group definitions keyed by trimmed name. Enumeration is always
/// sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupRegistry {
    groups: BTreeMap<String, GroupConfig>,
}

/// One `--<group>[=bool]` occurrence, kept in command-line order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupToggle {
    pub name: String,
    pub enabled: bool,
}

impl GroupToggle {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self { name: name.into(), enabled }
    }
}

impl GroupRegistry {
    pub fn get(&self, name: &str) -> Option<&GroupConfig> { self.groups.get(name) }
    pub fn contains(&self, name: &str) -> bool { self.groups.contains_key(name) }
    pub fn len(&self) -> usize { self.groups.len() }
    pub fn is_empty(&self) -> bool { self.groups.is_empty() }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GroupConfig)> {
        self.groups.iter().map(|(name, group)| (name.as_str(), group))
    }
}

/// Merge group definitions of a later layer over an earlier one. A disabled
/// override removes the group; any other override replaces it outright and
/// clears an inherited `disabled` marker.
pub fn merge_group_definitions(
    base: &BTreeMap<String, GroupConfig>,
    overrides: &BTreeMap<String, GroupConfig>,
) -> Result<GroupRegistry> {
    let mut groups = BTreeMap::new();
    for (key, group) in base {
        groups.insert(registry_key(key)?, group.clone());
    }
    for (key, group) in overrides {
        let name = registry_key(key)?;
        if group.disabled {
            if groups.remove(&name).is_some() {
                debug!(group = %name, "group disabled by later layer");
            }
            continue;
        }
        let mut adjusted = group.clone();
        adjusted.disabled = false;
        groups.insert(name, adjusted);
    }
    // A base entry can itself carry `disabled` when it was never overridden.
    groups.retain(|_, group| !group.disabled);
    Ok(GroupRegistry { groups })
}

/// Trim every name; duplicates keep their first position only.
pub fn normalize_group_order(names: &[String]) -> Result<Vec<String>> {
    let mut seen = BTreeSet::new();
    let mut order = Vec::with_capacity(names.len());
    for name in names {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DungeonError::EmptyGroupName);
        }
        if seen.insert(trimmed.to_string()) {
            order.push(trimmed.to_string());
        }
    }
    Ok(order)
}

pub fn build_group_selection(
    registry: &GroupRegistry,
    always_on: &[String],
) -> Result<GroupSelection> {
    let mut selection: GroupSelection = registry
        .names()
        .into_iter()
        .map(|name| (name.to_string(), false))
        .collect();
    for name in always_on {
        if !registry.contains(name) {
            return Err(DungeonError::UnknownGroup { name: name.clone() });
        }
        selection.insert(name.clone(), true);
    }
    Ok(selection)
}

/// Apply CLI toggles to the always-on order.
///
/// Without toggles the base order is returned untouched. Otherwise the names
/// nobody toggled keep their relative base order, and the names toggled on
/// follow in the order their (last) toggle appeared on the command line.
/// Names toggled off disappear.
pub fn resolve_group_order(base: &[String], toggles: &[GroupToggle]) -> Vec<String> {
    if toggles.is_empty() {
        return base.to_vec();
    }

    // name -> (enabled, position of the deciding occurrence)
    let mut decided: BTreeMap<&str, (bool, usize)> = BTreeMap::new();
    for (position, toggle) in toggles.iter().enumerate() {
        decided.insert(toggle.name.as_str(), (toggle.enabled, position));
    }

    let mut enabled: Vec<(&str, usize)> = decided
        .iter()
        .filter(|(_, (on, _))| *on)
        .map(|(name, (_, position))| (*name, *position))
        .collect();
    enabled.sort_by_key(|(_, position)| *position);

    let mut order: Vec<String> = base
        .iter()
        .filter(|name| !decided.contains_key(name.as_str()))
        .cloned()
        .collect();
    order.extend(enabled.into_iter().map(|(name, _)| name.to_string()));
    order
}

fn registry_key(key: &str) -> Result<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(DungeonError::InvalidGroupName { key: key.to_string() });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn group(image: &str) -> GroupConfig {
        GroupConfig {
            settings: Settings { image: Some(image.into()), ..Settings::default() },
            disabled: false,
        }
    }

    fn disabled() -> GroupConfig {
        GroupConfig { disabled: true, ..GroupConfig::default() }
    }

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn later_definition_replaces_earlier() {
        let base = BTreeMap::from([("codex".to_string(), group("a"))]);
        let overrides = BTreeMap::from([("codex".to_string(), group("b"))]);
        let registry = merge_group_definitions(&base, &overrides).unwrap();
        assert_eq!(registry.get("codex").unwrap().settings.image.as_deref(), Some("b"));
    }

    #[test]
    fn disabled_override_removes_group() {
        let base = BTreeMap::from([
            ("codex".to_string(), group("a")),
            ("web".to_string(), group("w")),
        ]);
        let overrides = BTreeMap::from([("codex".to_string(), disabled())]);
        let registry = merge_group_definitions(&base, &overrides).unwrap();
        assert_eq!(registry.names(), vec!["web"]);
    }

    #[test]
    fn disabling_unknown_group_is_harmless() {
        let overrides = BTreeMap::from([("ghost".to_string(), disabled())]);
        let registry = merge_group_definitions(&BTreeMap::new(), &overrides).unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn later_redefinition_reenables_disabled_group() {
        let base = BTreeMap::from([("codex".to_string(), disabled())]);
        let overrides = BTreeMap::from([("codex".to_string(), group("b"))]);
        let registry = merge_group_definitions(&base, &overrides).unwrap();
        let codex = registry.get("codex").unwrap();
        assert!(!codex.disabled);
        assert_eq!(codex.settings.image.as_deref(), Some("b"));
        assert_eq!(registry.names(), vec!["codex"]);
    }

    #[test]
    fn disabled_base_without_override_is_dropped() {
        let base = BTreeMap::from([
            ("codex".to_string(), disabled()),
            ("web".to_string(), group("w")),
        ]);
        let registry = merge_group_definitions(&base, &BTreeMap::new()).unwrap();
        assert_eq!(registry.names(), vec!["web"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn keys_are_trimmed_and_blank_keys_rejected() {
        let base = BTreeMap::from([(" web ".to_string(), group("w"))]);
        let registry = merge_group_definitions(&base, &BTreeMap::new()).unwrap();
        assert!(registry.contains("web"));

        let bad = BTreeMap::from([("  ".to_string(), group("x"))]);
        let err = merge_group_definitions(&BTreeMap::new(), &bad).unwrap_err();
        assert!(matches!(err, DungeonError::InvalidGroupName { .. }));
    }

    #[test]
    fn names_are_sorted() {
        let base = BTreeMap::from([
            ("zeta".to_string(), group("z")),
            ("alpha".to_string(), group("a")),
            ("mid".to_string(), group("m")),
        ]);
        let registry = merge_group_definitions(&base, &BTreeMap::new()).unwrap();
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn normalize_trims_dedups_and_rejects_empty() {
        let order = normalize_group_order(&names(&[" web", "codex ", "web"])).unwrap();
        assert_eq!(order, names(&["web", "codex"]));
        let err = normalize_group_order(&names(&["web", " "])).unwrap_err();
        assert!(matches!(err, DungeonError::EmptyGroupName));
    }

    #[test]
    fn selection_marks_always_on_groups() {
        let base = BTreeMap::from([
            ("web".to_string(), group("w")),
            ("codex".to_string(), group("c")),
        ]);
        let registry = merge_group_definitions(&base, &BTreeMap::new()).unwrap();
        let selection = build_group_selection(&registry, &names(&["web"])).unwrap();
        assert_eq!(selection.get("web"), Some(&true));
        assert_eq!(selection.get("codex"), Some(&false));

        let err = build_group_selection(&registry, &names(&["ghost"])).unwrap_err();
        assert!(matches!(err, DungeonError::UnknownGroup { name } if name == "ghost"));
    }

    #[test]
    fn no_toggles_keeps_base_order() {
        let base = names(&["b", "a"]);
        assert_eq!(resolve_group_order(&base, &[]), base);
    }

    #[test]
    fn toggled_groups_move_to_the_end_in_flag_order() {
        let base = names(&["a", "b", "c"]);
        let toggles = vec![GroupToggle::new("d", true), GroupToggle::new("a", true)];
        assert_eq!(resolve_group_order(&base, &toggles), names(&["b", "c", "d", "a"]));
    }

    #[test]
    fn toggled_off_groups_are_dropped() {
        let base = names(&["web", "codex"]);
        let toggles = vec![GroupToggle::new("web", false), GroupToggle::new("ghost", false)];
        assert_eq!(resolve_group_order(&base, &toggles), names(&["codex"]));
    }

    #[test]
    fn last_occurrence_decides_value_and_position() {
        let base = names(&["a"]);
        let toggles = vec![
            GroupToggle::new("x", true),
            GroupToggle::new("y", true),
            GroupToggle::new("x", false),
            GroupToggle::new("x", true),
        ];
        assert_eq!(resolve_group_order(&base, &toggles), names(&["a", "y", "x"]));
    }
}
