// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, SystemTime};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::settings::{LoggingLevel, LoggingSettings};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(3);
static LOG_TO_DISK: AtomicBool = AtomicBool::new(false);

const DEFAULT_LOG_PREFIX: &str = "sdm-service.log";
const KEEP_DAYS: u64 = 7;

const OWN_CRATES: [&str; 5] = [
    "sdm_service",
    "sdm_forensics",
    "sdm_sys",
    "sdm_shell",
    "sdm_contracts",
];

fn default_directives(level: LoggingLevel) -> String {
    let mut directives: Vec<String> = OWN_CRATES
        .iter()
        .map(|krate| format!("{krate}={}", level.as_directive()))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Installs the global subscriber: stderr always, a daily file when enabled
///
/// `RUST_LOG` replaces the directives derived from settings.
pub(crate) fn init(settings: &LoggingSettings) {
    set_log_level(settings.level);
    let to_disk = settings.log_to_disk
        || std::env::var_os("SDM_LOG_DIR").is_some()
        || std::env::var_os("SDM_LOG_FILE").is_some();
    set_log_to_disk(to_disk);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(settings.level)));

    // Commands print their results on stdout
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
            log_level_allows(*metadata.level())
        }));

    if !to_disk {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return;
    }

    match file_writer() {
        Ok((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_timer(tracing_subscriber::fmt::time::SystemTime)
                .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                    LOG_TO_DISK.load(Ordering::Relaxed) && log_level_allows(*metadata.level())
                }));

            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();

            let _ = LOG_GUARD.set(guard);
        }
        Err(e) => {
            eprintln!("sdm-service: failed to initialize file logging: {e:#}");
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
    }
}

pub(crate) fn set_log_level(level: LoggingLevel) {
    LOG_LEVEL.store(level_to_int(level), Ordering::Relaxed);
}

pub(crate) fn set_log_to_disk(enabled: bool) {
    LOG_TO_DISK.store(enabled, Ordering::Relaxed);
}

fn level_to_int(level: LoggingLevel) -> u8 {
    match level {
        LoggingLevel::Error => 1,
        LoggingLevel::Warn => 2,
        LoggingLevel::Info => 3,
        LoggingLevel::Debug => 4,
        LoggingLevel::Trace => 5,
    }
}

fn severity(level: Level) -> u8 {
    match level {
        Level::ERROR => 1,
        Level::WARN => 2,
        Level::INFO => 3,
        Level::DEBUG => 4,
        Level::TRACE => 5,
    }
}

fn log_level_allows(level: Level) -> bool {
    severity(level) <= LOG_LEVEL.load(Ordering::Relaxed)
}

fn file_writer() -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let (dir, prefix) = resolve_log_location();

    if let Err(e) = fs::create_dir_all(&dir) {
        return Err(anyhow::anyhow!(
            "create log directory failed: {} ({})",
            dir.display(),
            e
        ));
    }

    cleanup_old_logs(&dir, &prefix, KEEP_DAYS);

    let appender = tracing_appender::rolling::daily(&dir, &prefix);
    Ok(tracing_appender::non_blocking(appender))
}

fn resolve_log_location() -> (PathBuf, OsString) {
    if let Some(file) = std::env::var_os("SDM_LOG_FILE") {
        let path = PathBuf::from(file);
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(default_log_dir);
        let prefix = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(DEFAULT_LOG_PREFIX));
        return (dir, prefix);
    }

    if let Some(dir) = std::env::var_os("SDM_LOG_DIR") {
        return (PathBuf::from(dir), OsString::from(DEFAULT_LOG_PREFIX));
    }

    (default_log_dir(), OsString::from(DEFAULT_LOG_PREFIX))
}

fn default_log_dir() -> PathBuf {
    if let Some(xdg_state) = std::env::var_os("XDG_STATE_HOME") {
        return PathBuf::from(xdg_state).join("sdm").join("logs");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("sdm")
            .join("logs");
    }

    PathBuf::from("/tmp").join("sdm").join("logs")
}

fn cleanup_old_logs(dir: &Path, prefix: &OsString, keep_days: u64) {
    let cutoff = SystemTime::now().checked_sub(Duration::from_secs(keep_days * 24 * 60 * 60));
    let Some(cutoff) = cutoff else { return };

    let prefix = prefix.to_string_lossy();

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }

        // Only files written by the rolling appender
        if !entry
            .file_name()
            .to_string_lossy()
            .starts_with(prefix.as_ref())
        {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|metadata| metadata.modified()) else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        let _ = fs::remove_file(entry.path());
    }
}
