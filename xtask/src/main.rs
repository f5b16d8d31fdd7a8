use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dungeon::{cli, groups, layered_config, resolve, Config, Settings};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "xtask", about = "dungeon workspace tasks")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Parse a dungeon config.toml and print the groups and settings it yields
    CheckConfig { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Cmd::CheckConfig { file } => check_config(&file),
    }
}

fn check_config(path: &Path) -> Result<()> {
    let defaults = layered_config::load_defaults().context("parse built-in defaults")?;
    let file = layered_config::read_file(path, true)?;
    let registry = groups::merge_group_definitions(&defaults.groups, &file.groups)
        .with_context(|| format!("groups in {}", path.display()))?;
    cli::validate_group_names(&registry)?;
    let always_on = groups::normalize_group_order(&resolve::resolve_always_on_groups(
        &defaults,
        &file,
        &Config::default(),
    ))?;
    groups::build_group_selection(&registry, &always_on)?;

    println!("OK: {}", path.display());
    println!("always-on: {}", always_on.join(", "));
    print_settings("settings", &defaults.settings.clone().overlay(file.settings));
    for (name, group) in registry.iter() {
        print_settings(&format!("[{name}]"), &group.settings);
    }
    Ok(())
}

fn print_settings(title: &str, settings: &Settings) {
    println!("{title}");
    let scalars = [
        ("run", &settings.run_command),
        ("image", &settings.image),
        ("network", &settings.network),
    ];
    for (key, value) in scalars {
        if let Some(value) = value {
            println!("  {key} = {value:?}");
        }
    }
    let lists = [
        ("ports", &settings.ports),
        ("cache", &settings.cache),
        ("mounts", &settings.mounts),
        ("envvar", &settings.env_vars),
        ("env_files", &settings.env_files),
        ("podman_args", &settings.podman_args),
    ];
    for (key, value) in lists {
        if let Some(values) = value {
            println!("  {key} = {values:?}");
        }
    }
}
