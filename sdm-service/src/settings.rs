// SPDX-License-Identifier: GPL-3.0-only

//! Versioned settings file
//!
//! Settings live in one toml file. Readers get an immutable snapshot or
//! subscribe to changes; core crates only ever see values derived from it.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use sdm_shell::ShellConfig;
use sdm_sys::PlatformConfig;
use sdm_types::{LocalPath, UserHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const SETTINGS_VERSION: i64 = 2;

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LoggingLevel {
    pub fn as_directive(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    pub use_root: bool,
    pub use_adb: bool,
    pub adb_serial: Option<String>,
    pub su_binary: String,
    pub sh_binary: String,
    pub command_timeout_secs: Option<u64>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        let defaults = ShellConfig::default();
        Self {
            use_root: defaults.use_root,
            use_adb: defaults.use_adb,
            adb_serial: defaults.adb_serial,
            su_binary: defaults.su_binary,
            sh_binary: defaults.sh_binary,
            command_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaSettings {
    /// Root of the device tree; `/` on a device, a pulled image on a workstation
    pub storage_root: PathBuf,
    /// Users to scan; empty means the current user
    pub users: Vec<i32>,
    pub api_level: Option<u32>,
    /// Saved `pm list packages -f` output used instead of asking `pm`
    pub packages_file: Option<PathBuf>,
}

impl Default for AreaSettings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("/"),
            users: Vec::new(),
            api_level: None,
            packages_file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutterSettings {
    pub extra_marker_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpendablesSettings {
    pub hidden_caches: bool,
    pub advertisements: bool,
    pub whatsapp_sent: bool,
}

impl Default for ExpendablesSettings {
    fn default() -> Self {
        Self {
            hidden_caches: true,
            advertisements: true,
            whatsapp_sent: false,
        }
    }
}

impl ExpendablesSettings {
    /// Identifiers of the enabled filters
    pub fn enabled(&self) -> BTreeSet<String> {
        [
            ("hidden_caches", self.hidden_caches),
            ("advertisements", self.advertisements),
            ("whatsapp_sent", self.whatsapp_sent),
        ]
        .into_iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(id, _)| id.to_string())
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LoggingLevel,
    pub log_to_disk: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LoggingLevel::Info,
            log_to_disk: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    pub shell: ShellSettings,
    pub areas: AreaSettings,
    pub clutter: ClutterSettings,
    pub expendables: ExpendablesSettings,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            saved_at: None,
            shell: ShellSettings::default(),
            areas: AreaSettings::default(),
            clutter: ClutterSettings::default(),
            expendables: ExpendablesSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Settings {
    /// Parses a settings file of any known version
    ///
    /// Version 1 kept the privilege switches at the top level
    /// (`root_enabled`, `adb_enabled`).
    pub fn from_toml(raw: &str) -> Result<Self> {
        let mut table: toml::Table = raw.parse().context("Settings are not valid toml")?;
        let version = table
            .get("version")
            .and_then(toml::Value::as_integer)
            .unwrap_or(1);
        if version > SETTINGS_VERSION {
            bail!("Settings version {version} is newer than supported ({SETTINGS_VERSION})");
        }
        if version < 2 {
            info!("Migrating settings from version {}", version);
            let root = table.remove("root_enabled");
            let adb = table.remove("adb_enabled");
            let shell = table
                .entry("shell")
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            if let toml::Value::Table(shell) = shell {
                if let Some(root) = root {
                    shell.insert("use_root".to_string(), root);
                }
                if let Some(adb) = adb {
                    shell.insert("use_adb".to_string(), adb);
                }
            }
            table.insert("version".to_string(), toml::Value::Integer(SETTINGS_VERSION));
        }
        toml::Value::Table(table)
            .try_into()
            .context("Settings do not match the expected layout")
    }

    pub fn shell_config(&self) -> ShellConfig {
        ShellConfig {
            use_root: self.shell.use_root,
            use_adb: self.shell.use_adb,
            adb_serial: self.shell.adb_serial.clone(),
            su_binary: self.shell.su_binary.clone(),
            sh_binary: self.shell.sh_binary.clone(),
            command_timeout: self.shell.command_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn platform_config(&self) -> PlatformConfig {
        PlatformConfig {
            storage_root: LocalPath::from(self.areas.storage_root.as_path()),
            users: self.areas.users.iter().copied().map(UserHandle).collect(),
            api_level: self.areas.api_level,
        }
    }
}

/// `$SDM_CONFIG`, else `settings.toml` in the XDG config directory
pub fn default_settings_path() -> PathBuf {
    if let Some(file) = std::env::var_os("SDM_CONFIG") {
        return PathBuf::from(file);
    }
    if let Some(xdg_config) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config).join("sdm").join(SETTINGS_FILE);
    }
    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("sdm")
            .join(SETTINGS_FILE);
    }
    PathBuf::from("/data/local/tmp/sdm").join(SETTINGS_FILE)
}

/// Owner of the settings file and its change channel
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<Arc<Settings>>,
}

impl SettingsStore {
    /// Reads `path`, falling back to defaults when the file does not exist
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = match fs::read_to_string(&path) {
            Ok(raw) => Settings::from_toml(&raw)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        let (tx, _) = watch::channel(Arc::new(settings));
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Settings> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Settings>> {
        self.tx.subscribe()
    }

    /// Applies `change`, notifies subscribers and persists the result
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Arc<Settings>> {
        let mut next = self.snapshot().as_ref().clone();
        change(&mut next);
        next.version = SETTINGS_VERSION;
        self.tx.send_replace(Arc::new(next));
        self.save()?;
        Ok(self.snapshot())
    }

    /// Writes the current settings next to the target, then renames over it
    pub fn save(&self) -> Result<()> {
        let mut settings = self.snapshot().as_ref().clone();
        settings.saved_at = Some(Utc::now());
        let raw = toml::to_string_pretty(&settings).context("Failed to serialize settings")?;

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, raw).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        // Stamp only; subscribers are not woken for it
        self.tx.send_if_modified(|current| {
            *current = Arc::new(settings);
            false
        });
        info!("Saved settings to {}", self.path.display());
        Ok(())
    }
}

/// Receiver of a value derived from the settings, updated while `scope` lives
///
/// Subscribers only wake when the derived value actually changes.
pub fn derive_watch<T, F>(
    mut settings: watch::Receiver<Arc<Settings>>,
    scope: CancellationToken,
    map: F,
) -> watch::Receiver<T>
where
    T: PartialEq + Send + Sync + 'static,
    F: Fn(&Settings) -> T + Send + 'static,
{
    let (tx, rx) = watch::channel(map(&settings.borrow_and_update()));
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = scope.cancelled() => break,
                changed = settings.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = map(&settings.borrow_and_update());
                    tx.send_if_modified(|current| {
                        if *current == value {
                            return false;
                        }
                        *current = value;
                        true
                    });
                }
            }
        }
    });
    rx
}
