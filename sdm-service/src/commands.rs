// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Subcommand, ValueEnum};
use sdm_contracts::ExpendableMatch;
use sdm_types::{LocalPath, PkgId, ShellMode, ShellOpsCmd};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::registry::CoreRegistry;
use crate::settings::{ExpendablesSettings, SettingsStore};

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List discovered storage areas
    Areas {
        /// Run discovery again instead of using the first result
        #[arg(long)]
        reload: bool,
    },
    /// Show the area and owners of paths
    Identify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Run a command through one of the shared shells
    Exec {
        #[arg(long, value_enum, default_value_t = ModeArg::Normal)]
        mode: ModeArg,
        #[arg(required = true, trailing_var_arg = true)]
        cmd: Vec<String>,
    },
    /// List clutter markers of a package
    Markers { pkg: String },
    /// Classify paths with the enabled expendables filters
    Expendable {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Delete matches whose owners allow unattended deletion
        #[arg(long)]
        delete: bool,
    },
    /// Inspect the settings file
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    Show,
    Path,
    /// Enable an expendables filter
    Enable { filter: String },
    /// Disable an expendables filter
    Disable { filter: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Normal,
    Root,
    Adb,
}

impl From<ModeArg> for ShellMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Normal => ShellMode::Normal,
            ModeArg::Root => ShellMode::Root,
            ModeArg::Adb => ShellMode::Adb,
        }
    }
}

fn print<T: Serialize>(value: &T, json: bool, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        human(value);
    }
    Ok(())
}

pub async fn run_settings(
    store: &SettingsStore,
    action: &SettingsAction,
    json: bool,
) -> Result<()> {
    match action {
        SettingsAction::Path => println!("{}", store.path().display()),
        SettingsAction::Show => {
            let settings = store.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(settings.as_ref())?);
            } else {
                print!(
                    "{}",
                    toml::to_string_pretty(settings.as_ref()).context("Failed to render settings")?
                );
            }
        }
        SettingsAction::Enable { filter } => set_filter(store, filter, true)?,
        SettingsAction::Disable { filter } => set_filter(store, filter, false)?,
    }
    Ok(())
}

fn set_filter(store: &SettingsStore, filter: &str, enabled: bool) -> Result<()> {
    let apply: fn(&mut ExpendablesSettings, bool) = match filter {
        "hidden_caches" => |flags, enabled| flags.hidden_caches = enabled,
        "advertisements" => |flags, enabled| flags.advertisements = enabled,
        "whatsapp_sent" => |flags, enabled| flags.whatsapp_sent = enabled,
        _ => bail!("Unknown filter: {filter}"),
    };
    let settings = store.update(|settings| apply(&mut settings.expendables, enabled))?;
    info!("Enabled filters: {:?}", settings.expendables.enabled());
    Ok(())
}

pub async fn run(core: &CoreRegistry, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Areas { reload } => areas(core, reload, json).await,
        Command::Identify { paths } => identify(core, paths, json).await,
        Command::Exec { mode, cmd } => exec(core, mode.into(), cmd, json).await,
        Command::Markers { pkg } => markers(core, PkgId::new(pkg), json).await,
        Command::Expendable { paths, delete } => expendable(core, paths, delete, json).await,
        Command::Settings { .. } => bail!("Settings commands do not need the core"),
    }
}

async fn areas(core: &CoreRegistry, reload: bool, json: bool) -> Result<()> {
    let snapshot = if reload {
        core.areas().reload().await
    } else {
        core.areas().snapshot().await
    };
    print(snapshot.as_ref(), json, |snapshot| {
        for area in &snapshot.areas {
            let flags: Vec<String> = area.flags.iter().map(|flag| format!("{flag:?}")).collect();
            println!(
                "{:<16} user={:<4} {} {}",
                area.area_type.to_string(),
                area.user_handle,
                area.path,
                flags.join(",")
            );
        }
        for failure in &snapshot.failures {
            println!(
                "! {} ({:?} pass): {}",
                failure.module, failure.pass, failure.error
            );
        }
    })
}

async fn identify(core: &CoreRegistry, paths: Vec<PathBuf>, json: bool) -> Result<()> {
    let mut infos = Vec::with_capacity(paths.len());
    for path in paths {
        let target = LocalPath::from(path.as_path());
        infos.push(core.forensics().find_owners_for(&target).await?);
    }
    print(&infos, json, |infos| {
        for info in infos {
            let Some(area_info) = &info.area_info else {
                println!("{}: unknown area", info.target);
                continue;
            };
            println!(
                "{}: {} at {} (corpse={}, unattended={})",
                info.target,
                area_info.area_type(),
                area_info.prefix,
                info.is_corpse(),
                info.is_eligible_for_unattended_deletion()
            );
            for state in &info.owners {
                let installed = match state.installed {
                    Some(true) => "installed",
                    Some(false) => "uninstalled",
                    None => "unconfirmed",
                };
                println!("  {} ({installed})", state.owner.pkg_id);
            }
            if info.has_known_unknown_owner {
                println!("  <known unknown owner>");
            }
        }
    })
}

async fn exec(core: &CoreRegistry, mode: ShellMode, cmd: Vec<String>, json: bool) -> Result<()> {
    let line = cmd.join(" ");
    debug!("exec ({}): {}", mode, line);
    let result = core
        .shell_ops()
        .execute(ShellOpsCmd::single(line), mode)
        .await?;
    print(&result, json, |result| {
        for line in &result.output {
            println!("{line}");
        }
        for line in &result.errors {
            eprintln!("{line}");
        }
    })?;
    if !result.is_success() {
        bail!("Command exited with {}", result.exit_code);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct MarkerRow {
    area_type: String,
    location: String,
    flags: Vec<String>,
    direct: bool,
}

async fn markers(core: &CoreRegistry, pkg: PkgId, json: bool) -> Result<()> {
    let rows: Vec<MarkerRow> = core
        .clutter()
        .markers_for_pkg(&pkg)
        .await?
        .iter()
        .map(|marker| MarkerRow {
            area_type: marker.area_type().to_string(),
            location: marker.segments().join("/"),
            flags: marker.flags().iter().map(|flag| format!("{flag:?}")).collect(),
            direct: marker.is_direct_match(),
        })
        .collect();
    print(&rows, json, |rows| {
        for row in rows {
            println!(
                "{:<16} {} {}",
                row.area_type,
                if row.location.is_empty() {
                    "<pattern>"
                } else {
                    row.location.as_str()
                },
                row.flags.join(",")
            );
        }
    })
}

#[derive(Debug, Default, Serialize)]
struct ExpendableReport {
    matches: Vec<ExpendableMatch>,
    /// Matches kept because no owner allows unattended deletion
    held: Vec<ExpendableMatch>,
    deleted: Vec<ExpendableMatch>,
    failed: Vec<(ExpendableMatch, String)>,
}

async fn expendable(
    core: &CoreRegistry,
    paths: Vec<PathBuf>,
    delete: bool,
    json: bool,
) -> Result<()> {
    let mut report = ExpendableReport::default();
    let mut deletable: BTreeMap<String, Vec<ExpendableMatch>> = BTreeMap::new();

    for path in paths {
        let target = LocalPath::from(path.as_path());
        let info = core.forensics().find_owners_for(&target).await?;
        let Some(area_info) = &info.area_info else {
            warn!("{} is not inside a known storage area", target);
            continue;
        };
        let segments = area_info.prefix_free_segments();

        let mut identifiers = Vec::new();
        for state in &info.owners {
            for identifier in core
                .filters()
                .classify(&state.owner.pkg_id, &target, area_info.area_type(), &segments)
                .await?
            {
                if !identifiers.contains(&identifier) {
                    identifiers.push(identifier);
                }
            }
        }

        for identifier in identifiers {
            let found = ExpendableMatch::new(identifier, target.clone());
            report.matches.push(found.clone());
            if info.is_eligible_for_unattended_deletion() {
                deletable
                    .entry(identifier.to_string())
                    .or_default()
                    .push(found);
            } else {
                report.held.push(found);
            }
        }
    }

    if delete {
        for (identifier, targets) in &deletable {
            let result = core
                .filters()
                .process(identifier, targets, &report.matches)
                .await?;
            info!(
                "{}: {} deleted, {} failed",
                identifier,
                result.success.len(),
                result.failed.len()
            );
            report.deleted.extend(result.success);
            report
                .failed
                .extend(result.failed.into_iter().map(|(found, e)| (found, e.to_string())));
        }
    }

    print(&report, json, |report| {
        for found in &report.matches {
            println!("{} {}", found.identifier, found.path);
        }
        for found in &report.held {
            println!("held {}", found.path);
        }
        for found in &report.deleted {
            println!("deleted {}", found.path);
        }
        for (found, error) in &report.failed {
            println!("failed {}: {}", found.path, error);
        }
    })
}
