// SPDX-License-Identifier: GPL-3.0-only

//! Local filesystem access in all gateway modes
//!
//! `NORMAL` uses plain I/O with the privileges of this process. `ROOT` and
//! `ADB` run POSIX tools (`test`, `ls`, `stat`, `touch`, `rm`) through the
//! shell of that mode. `AUTO` starts with plain I/O and escalates to root,
//! then ADB, when plain I/O is denied or reports nothing.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sdm_contracts::{
    LocalGateway, PrivilegeProbe, ShellExecutor, StorageError, StorageErrorKind,
};
use sdm_types::{
    FileType, GatewayMode, LocalPath, LookupInfo, ShellMode, ShellOpsCmd, ShellOpsResult,
};
use tracing::{debug, trace};

use crate::error::SysError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Local,
    Shell(ShellMode),
}

pub struct ShellGateway {
    shell: Arc<dyn ShellExecutor>,
    probe: Arc<dyn PrivilegeProbe>,
}

impl ShellGateway {
    pub fn new(shell: Arc<dyn ShellExecutor>, probe: Arc<dyn PrivilegeProbe>) -> Self {
        Self { shell, probe }
    }

    async fn routes(&self, mode: GatewayMode) -> Vec<Route> {
        match mode {
            GatewayMode::Normal => vec![Route::Local],
            GatewayMode::Root => vec![Route::Shell(ShellMode::Root)],
            GatewayMode::Adb => vec![Route::Shell(ShellMode::Adb)],
            GatewayMode::Auto => {
                let mut routes = vec![Route::Local];
                if self.probe.can_use_root_now().await {
                    routes.push(Route::Shell(ShellMode::Root));
                }
                if self.probe.can_use_adb_now().await {
                    routes.push(Route::Shell(ShellMode::Adb));
                }
                routes
            }
        }
    }

    /// Runs `op` on each route until one gives an accepted answer
    ///
    /// The last route's answer is returned as is.
    async fn escalate<T, F, Fut>(
        &self,
        mode: GatewayMode,
        accept: impl Fn(&T) -> bool,
        op: F,
    ) -> Result<T, StorageError>
    where
        F: Fn(Route) -> Fut,
        Fut: Future<Output = Result<T, StorageError>>,
    {
        let routes = self.routes(mode).await;
        let last = routes.len().saturating_sub(1);
        let mut outcome = Err(StorageError::unsupported(format!("no route for {mode:?}")));
        for (index, route) in routes.into_iter().enumerate() {
            let result = op(route).await;
            let settled = match &result {
                Ok(value) => accept(value),
                Err(e) => !escalates(e),
            };
            if settled || index == last {
                return result;
            }
            trace!("Escalating past {:?}", route);
            outcome = result;
        }
        outcome
    }

    async fn run(&self, mode: ShellMode, line: String) -> Result<ShellOpsResult, StorageError> {
        trace!("{} gateway: {}", mode, line);
        self.shell.execute(ShellOpsCmd::single(line), mode).await
    }

    async fn shell_test(
        &self,
        mode: ShellMode,
        flag: &str,
        path: &LocalPath,
    ) -> Result<bool, StorageError> {
        let result = self
            .run(mode, format!("test {flag} {}", shell_quote(path.as_str())))
            .await?;
        match result.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(failure(&result, path)),
        }
    }

    async fn shell_list(
        &self,
        mode: ShellMode,
        path: &LocalPath,
    ) -> Result<Vec<LocalPath>, StorageError> {
        let result = self
            .run(mode, format!("ls -A1 {}", shell_quote(path.as_str())))
            .await?;
        if !result.is_success() {
            return Err(failure(&result, path));
        }
        let mut children: Vec<LocalPath> = result
            .output
            .iter()
            .filter(|name| !name.is_empty())
            .map(|name| path.child(name))
            .collect();
        children.sort();
        Ok(children)
    }

    async fn shell_lookup(
        &self,
        mode: ShellMode,
        path: &LocalPath,
    ) -> Result<LookupInfo, StorageError> {
        let command = format!("stat -c '%F|%s|%Y' {}", shell_quote(path.as_str()));
        let result = self.run(mode, command.clone()).await?;
        if !result.is_success() {
            return Err(failure(&result, path));
        }
        let line = result.output.first().cloned().unwrap_or_default();
        parse_stat_line(path, &line).ok_or_else(|| {
            SysError::UnexpectedOutput {
                command,
                output: line,
            }
            .into()
        })
    }

    async fn shell_create(&self, mode: ShellMode, path: &LocalPath) -> Result<(), StorageError> {
        let quoted = shell_quote(path.as_str());
        let result = self
            .run(mode, format!("test ! -e {quoted} && touch {quoted}"))
            .await?;
        match result.exit_code {
            0 => Ok(()),
            1 if result.errors.is_empty() => Err(StorageError::new(
                StorageErrorKind::Conflict,
                format!("{path} already exists"),
            )),
            _ => Err(failure(&result, path)),
        }
    }

    async fn shell_delete(
        &self,
        mode: ShellMode,
        path: &LocalPath,
        recursive: bool,
    ) -> Result<(), StorageError> {
        let quoted = shell_quote(path.as_str());
        let line = if recursive {
            format!("rm -rf {quoted}")
        } else {
            format!("if [ -d {quoted} ] && [ ! -L {quoted} ]; then rmdir {quoted}; else rm -f {quoted}; fi")
        };
        let result = self.run(mode, line).await?;
        if !result.is_success() {
            return Err(failure(&result, path));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalGateway for ShellGateway {
    async fn exists(&self, path: &LocalPath, mode: GatewayMode) -> Result<bool, StorageError> {
        self.escalate(mode, |exists: &bool| *exists, |route| async move {
            match route {
                Route::Local => Ok(tokio::fs::symlink_metadata(path).await.is_ok()),
                Route::Shell(mode) => {
                    Ok(self.shell_test(mode, "-e", path).await?
                        || self.shell_test(mode, "-L", path).await?)
                }
            }
        })
        .await
    }

    async fn can_read(&self, path: &LocalPath, mode: GatewayMode) -> Result<bool, StorageError> {
        self.escalate(mode, |readable: &bool| *readable, |route| async move {
            match route {
                Route::Local => Ok(local_can_read(path).await),
                Route::Shell(mode) => self.shell_test(mode, "-r", path).await,
            }
        })
        .await
    }

    async fn list_files(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
    ) -> Result<Vec<LocalPath>, StorageError> {
        self.escalate(mode, |_| true, |route| async move {
            match route {
                Route::Local => local_list(path).await,
                Route::Shell(mode) => self.shell_list(mode, path).await,
            }
        })
        .await
    }

    async fn lookup(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
    ) -> Result<LookupInfo, StorageError> {
        self.escalate(mode, |_| true, |route| async move {
            match route {
                Route::Local => local_lookup(path).await,
                Route::Shell(mode) => self.shell_lookup(mode, path).await,
            }
        })
        .await
    }

    async fn create_file(&self, path: &LocalPath, mode: GatewayMode) -> Result<(), StorageError> {
        self.escalate(mode, |_| true, |route| async move {
            match route {
                Route::Local => {
                    tokio::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(path)
                        .await?;
                    Ok(())
                }
                Route::Shell(mode) => self.shell_create(mode, path).await,
            }
        })
        .await
    }

    async fn delete(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
        recursive: bool,
    ) -> Result<(), StorageError> {
        debug!("Deleting {} ({:?}, recursive={})", path, mode, recursive);
        self.escalate(mode, |_| true, |route| async move {
            match route {
                Route::Local => local_delete(path, recursive).await,
                Route::Shell(mode) => self.shell_delete(mode, path, recursive).await,
            }
        })
        .await
    }

    async fn has_root(&self) -> bool {
        self.probe.can_use_root_now().await
    }

    async fn has_adb(&self) -> bool {
        self.probe.can_use_adb_now().await
    }
}

/// Quotes `value` as a single POSIX shell word
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn escalates(error: &StorageError) -> bool {
    matches!(
        error.kind,
        StorageErrorKind::PermissionDenied | StorageErrorKind::NotFound
    )
}

fn failure(result: &ShellOpsResult, path: &LocalPath) -> StorageError {
    let message = if result.errors.is_empty() {
        format!("{path}: exit code {}", result.exit_code)
    } else {
        format!("{path}: {}", result.errors.join("; "))
    };
    let lowered = message.to_lowercase();
    if lowered.contains("permission denied") || lowered.contains("operation not permitted") {
        SysError::PermissionDenied(message).into()
    } else if lowered.contains("no such file") {
        SysError::NotFound(message).into()
    } else {
        SysError::OperationFailed(message).into()
    }
}

fn parse_stat_line(path: &LocalPath, line: &str) -> Option<LookupInfo> {
    let mut fields = line.trim().split('|');
    let kind = fields.next()?;
    let size = fields.next()?.parse().ok()?;
    let modified = fields.next()?.parse::<i64>().ok()?;
    let file_type = match kind {
        "directory" => FileType::Directory,
        "symbolic link" => FileType::Symlink,
        "regular file" | "regular empty file" => FileType::File,
        _ => FileType::Unknown,
    };
    Some(LookupInfo {
        path: path.clone(),
        file_type,
        size,
        modified_at: DateTime::<Utc>::from_timestamp(modified, 0),
    })
}

async fn local_can_read(path: &LocalPath) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => tokio::fs::read_dir(path).await.is_ok(),
        Ok(_) => tokio::fs::File::open(path).await.is_ok(),
        Err(_) => false,
    }
}

async fn local_list(path: &LocalPath) -> Result<Vec<LocalPath>, StorageError> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut children = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        children.push(path.child(entry.file_name().to_string_lossy()));
    }
    children.sort();
    Ok(children)
}

async fn local_lookup(path: &LocalPath) -> Result<LookupInfo, StorageError> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    let file_type = if metadata.is_symlink() {
        FileType::Symlink
    } else if metadata.is_dir() {
        FileType::Directory
    } else if metadata.is_file() {
        FileType::File
    } else {
        FileType::Unknown
    };
    Ok(LookupInfo {
        path: path.clone(),
        file_type,
        size: metadata.len(),
        modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
    })
}

async fn local_delete(path: &LocalPath, recursive: bool) -> Result<(), StorageError> {
    let metadata = tokio::fs::symlink_metadata(path).await?;
    if metadata.is_dir() {
        if recursive {
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_dir(path).await?;
        }
    } else {
        tokio::fs::remove_file(path).await?;
    }
    Ok(())
}
