// dungeon/src/cli.rs

use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use std::ffi::OsString;

use crate::error::{DungeonError, Result};
use crate::groups::{GroupRegistry, GroupToggle};
use crate::persist::PersistMode;
use crate::resolve::GroupPlan;
use crate::settings::Settings;

const FLAG_RUN: &str = "run";
const FLAG_IMAGE: &str = "image";
const FLAG_NETWORK: &str = "network";
const FLAG_PORT: &str = "port";
const FLAG_CACHE: &str = "cache";
const FLAG_MOUNT: &str = "mount";
const FLAG_ENV: &str = "env";
const FLAG_ENV_FILE: &str = "env-file";
const FLAG_PODMAN_ARG: &str = "podman-arg";
const FLAG_PERSIST: &str = "persist";
const FLAG_PERSISTED: &str = "persisted";
const FLAG_DISCARD: &str = "discard";
const FLAG_RESET_CACHE: &str = "reset-cache";
const FLAG_DEBUG: &str = "debug";
const FLAG_SKIP_CWD: &str = "skip-cwd";
const ARG_PATHS: &str = "paths";

/// Long names a group may not take because a built-in flag already has them.
pub const RESERVED_GROUP_NAMES: &[&str] = &[
    "help", "version", FLAG_RUN, FLAG_IMAGE, FLAG_NETWORK, FLAG_PORT, FLAG_CACHE, FLAG_MOUNT,
    FLAG_ENV, FLAG_ENV_FILE, FLAG_PODMAN_ARG, FLAG_PERSIST, FLAG_PERSISTED, FLAG_DISCARD,
    FLAG_RESET_CACHE, FLAG_DEBUG, FLAG_SKIP_CWD, ARG_PATHS,
];

const HEADING_OPTIONS: &str = "Options";
const HEADING_CONFIG: &str = "Configuration";
const HEADING_GROUPS: &str = "Groups";

#[derive(Clone, Debug, Default)]
pub struct ParsedCli {
    /// The CLI precedence layer.
    pub settings: Settings,
    pub paths: Vec<String>,
    pub skip_cwd: bool,
    pub toggles: Vec<GroupToggle>,
    pub persist_mode: PersistMode,
    pub reset_cache: bool,
    pub debug: bool,
}

/// Every group becomes `--<name>[=BOOL]`, so its name must be a usable
/// long flag that no built-in option already claims.
pub fn validate_group_names(registry: &GroupRegistry) -> Result<()> {
    for name in registry.names() {
        if RESERVED_GROUP_NAMES.contains(&name) {
            return Err(DungeonError::ReservedGroupName { name: name.to_string() });
        }
        let reason = if name.starts_with('-') {
            Some("must not start with '-'")
        } else if name.contains('=') {
            Some("must not contain '='")
        } else if name.chars().any(char::is_whitespace) {
            Some("must not contain whitespace")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(DungeonError::UnusableGroupName { name: name.to_string(), reason });
        }
    }
    Ok(())
}

pub fn build_command(plan: &GroupPlan) -> Result<Command> {
    validate_group_names(&plan.registry)?;

    let mut cmd = Command::new("dungeon")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Run a podman development container for the current directory")
        .arg(flag(FLAG_PERSIST, "Create a persisted container (fails if it already exists)"))
        .arg(flag(FLAG_PERSISTED, "Connect to the existing persisted container"))
        .arg(flag(FLAG_DISCARD, "Remove the persisted container"))
        .arg(flag(FLAG_RESET_CACHE, "Delete the dungeon-cache volume before running"))
        .arg(flag(FLAG_DEBUG, "Print the podman command instead of running it"))
        .arg(single(FLAG_RUN, "Command to run inside the container").allow_hyphen_values(true))
        .arg(single(FLAG_IMAGE, "Container image"))
        .arg(single(FLAG_NETWORK, "Container network"))
        .arg(repeated(FLAG_PORT, "Publish a container port (repeatable)"))
        .arg(repeated(FLAG_CACHE, "Mount a cache volume target (repeatable)"))
        .arg(repeated(FLAG_MOUNT, "Bind-mount a host path, source:target[:ro|rw] (repeatable)"))
        .arg(repeated(FLAG_ENV, "Set NAME=value or forward NAME from the host (repeatable)"))
        .arg(repeated(FLAG_ENV_FILE, "Read container environment from a file (repeatable)"))
        .arg(
            repeated(FLAG_PODMAN_ARG, "Extra argument for podman run (repeatable)")
                .allow_hyphen_values(true),
        )
        .arg(
            Arg::new(FLAG_SKIP_CWD)
                .long(FLAG_SKIP_CWD)
                .help("Do not mount the current directory; start in /home/dungeon")
                .help_heading(HEADING_CONFIG)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_PATHS)
                .help("Paths to mount under /home/dungeon/project (default: current directory)")
                .num_args(0..)
                .action(ArgAction::Append),
        );

    for (name, _) in plan.registry.iter() {
        let state = if plan.is_default_on(name) { "on" } else { "off" };
        cmd = cmd.arg(
            Arg::new(name.to_string())
                .long(name.to_string())
                .value_name("BOOL")
                .help(format!("Toggle the {name} group (default: {state})"))
                .help_heading(HEADING_GROUPS)
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("true")
                .value_parser(BoolishValueParser::new())
                .action(ArgAction::Append),
        );
    }
    Ok(cmd)
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .help_heading(HEADING_OPTIONS)
        .action(ArgAction::SetTrue)
}

fn single(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .help_heading(HEADING_CONFIG)
        .num_args(1)
        .action(ArgAction::Set)
}

fn repeated(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .help_heading(HEADING_CONFIG)
        .num_args(1)
        .action(ArgAction::Append)
}

/// Parse argv (including the program name) against the groups in `plan`.
pub fn parse_args<I, T>(args: I, plan: &GroupPlan) -> Result<ParsedCli>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command(plan)?.try_get_matches_from(args)?;

    let persist_mode = PersistMode::from_flags(
        matches.get_flag(FLAG_PERSIST),
        matches.get_flag(FLAG_PERSISTED),
        matches.get_flag(FLAG_DISCARD),
    )?;
    let debug = matches.get_flag(FLAG_DEBUG);
    if debug && persist_mode != PersistMode::None {
        return Err(DungeonError::DebugWithPersistence);
    }

    let settings = settings_from_matches(&matches);
    let toggles = collect_toggles(&matches, &plan.registry);
    let paths: Vec<String> = matches
        .get_many::<String>(ARG_PATHS)
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    let skip_cwd = matches.get_flag(FLAG_SKIP_CWD);

    let has_run_options = !settings.is_empty() || !toggles.is_empty() || skip_cwd;
    if persist_mode.is_lookup() && (has_run_options || !paths.is_empty()) {
        return Err(DungeonError::PersistArguments);
    }
    if skip_cwd && !paths.is_empty() {
        return Err(DungeonError::SkipCwdWithPaths);
    }

    Ok(ParsedCli {
        settings,
        paths,
        skip_cwd,
        toggles,
        persist_mode,
        reset_cache: matches.get_flag(FLAG_RESET_CACHE),
        debug,
    })
}

fn settings_from_matches(matches: &ArgMatches) -> Settings {
    let one = |id: &str| matches.get_one::<String>(id).cloned();
    let many = |id: &str| {
        matches
            .get_many::<String>(id)
            .map(|values| values.cloned().collect())
    };
    Settings {
        run_command: one(FLAG_RUN),
        image: one(FLAG_IMAGE),
        network: one(FLAG_NETWORK),
        ports: many(FLAG_PORT),
        cache: many(FLAG_CACHE),
        mounts: many(FLAG_MOUNT),
        env_vars: many(FLAG_ENV),
        env_files: many(FLAG_ENV_FILE),
        podman_args: many(FLAG_PODMAN_ARG),
    }
}

/// Every group flag occurrence, sorted by its position on the command line.
fn collect_toggles(matches: &ArgMatches, registry: &GroupRegistry) -> Vec<GroupToggle> {
    let mut events: Vec<(usize, GroupToggle)> = Vec::new();
    for name in registry.names() {
        let values = matches.get_many::<bool>(name);
        let indices = matches.indices_of(name);
        let (Some(values), Some(indices)) = (values, indices) else {
            continue;
        };
        let toggles = indices
            .zip(values)
            .map(|(index, enabled)| (index, GroupToggle::new(name, *enabled)));
        events.extend(toggles);
    }
    events.sort_by_key(|(index, _)| *index);
    events.into_iter().map(|(_, toggle)| toggle).collect()
}
