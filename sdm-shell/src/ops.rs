// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use sdm_contracts::{PrivilegeProbe, ShellExecutor, StorageError};
use sdm_types::{ShellMode, ShellOpsCmd, ShellOpsResult};
use tokio::process::Command;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ShellError};
use crate::launcher::ShellLauncher;
use crate::shared::SharedShell;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shell settings as seen by [`ShellOps`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub use_root: bool,
    pub use_adb: bool,
    pub adb_serial: Option<String>,
    pub su_binary: String,
    pub sh_binary: String,
    pub command_timeout: Option<Duration>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            use_root: false,
            use_adb: false,
            adb_serial: None,
            su_binary: "su".to_string(),
            sh_binary: "sh".to_string(),
            command_timeout: None,
        }
    }
}

/// Routes command batches to the shared shell of a privilege mode
///
/// Modes never fall back to each other: a batch for `ROOT` fails when root is
/// unavailable instead of running unprivileged. Backends are rebuilt when the
/// configuration changes.
pub struct ShellOps {
    scope: CancellationToken,
    config_rx: watch::Receiver<ShellConfig>,
    backends: Mutex<Backends>,
}

struct Backends {
    config: ShellConfig,
    normal: Option<SharedShell>,
    root: Option<SharedShell>,
    adb: Option<SharedShell>,
    root_probe: Option<bool>,
    adb_probe: Option<bool>,
}

impl Backends {
    fn new(config: ShellConfig) -> Self {
        Self {
            config,
            normal: None,
            root: None,
            adb: None,
            root_probe: None,
            adb_probe: None,
        }
    }

    fn shells(&mut self) -> impl Iterator<Item = SharedShell> {
        [self.normal.take(), self.root.take(), self.adb.take()]
            .into_iter()
            .flatten()
    }
}

impl ShellOps {
    pub fn new(config_rx: watch::Receiver<ShellConfig>, scope: CancellationToken) -> Self {
        let config = config_rx.borrow().clone();
        Self {
            scope,
            config_rx,
            backends: Mutex::new(Backends::new(config)),
        }
    }

    /// Ops with a fixed configuration
    pub fn with_config(config: ShellConfig, scope: CancellationToken) -> Self {
        let (_tx, rx) = watch::channel(config);
        Self::new(rx, scope)
    }

    fn lock(&self) -> MutexGuard<'_, Backends> {
        let mut backends = self
            .backends
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let latest = self.config_rx.borrow().clone();
        if latest != backends.config {
            info!("Shell configuration changed, resetting backends");
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                for shell in backends.shells() {
                    handle.spawn(async move { shell.close().await });
                }
            }
            *backends = Backends::new(latest);
        }
        backends
    }

    pub fn config(&self) -> ShellConfig {
        self.lock().config.clone()
    }

    fn shell_for(&self, mode: ShellMode) -> Result<SharedShell> {
        let mut backends = self.lock();
        let config = backends.config.clone();
        let (slot, disabled) = match mode {
            ShellMode::Normal => (&mut backends.normal, false),
            ShellMode::Root => (&mut backends.root, !config.use_root),
            ShellMode::Adb => (&mut backends.adb, !config.use_adb),
        };
        if disabled {
            return Err(ShellError::unavailable(mode, "disabled in settings"));
        }
        if let Some(shell) = slot {
            return Ok(shell.clone());
        }

        let launcher = match mode {
            ShellMode::Normal => ShellLauncher::plain(&config.sh_binary)?,
            ShellMode::Root => ShellLauncher::root(&config.su_binary)?,
            ShellMode::Adb => ShellLauncher::adb(config.adb_serial.as_deref())?,
        };
        let shell = SharedShell::new(format!("{mode}-shell"), launcher, self.scope.child_token());
        *slot = Some(shell.clone());
        Ok(shell)
    }

    /// Executes `cmd` in the shell of `mode`, capturing output, errors and exit code
    pub async fn execute(&self, cmd: ShellOpsCmd, mode: ShellMode) -> Result<ShellOpsResult> {
        let available = match mode {
            ShellMode::Normal => true,
            ShellMode::Root => self.can_use_root_now().await,
            ShellMode::Adb => self.can_use_adb_now().await,
        };
        if !available {
            return Err(ShellError::unavailable(mode, "not available right now"));
        }

        let shell = self.shell_for(mode)?;
        let timeout = self.config().command_timeout;
        let result = run_with_timeout(&shell, cmd, timeout).await;
        result.map_err(|e| match e {
            ShellError::Cancelled | ShellError::Timeout(_) | ShellError::Unavailable { .. } => e,
            other => ShellError::Backend {
                mode,
                source: Box::new(other),
            },
        })
    }

    /// Whether root is enabled and the root shell reports uid 0
    pub async fn can_use_root_now(&self) -> bool {
        {
            let backends = self.lock();
            if !backends.config.use_root {
                return false;
            }
            if let Some(cached) = backends.root_probe {
                return cached;
            }
        }

        let probe = match self.shell_for(ShellMode::Root) {
            Ok(shell) => {
                run_with_timeout(&shell, ShellOpsCmd::single("id -u"), Some(PROBE_TIMEOUT)).await
            }
            Err(e) => Err(e),
        };
        let usable = match probe {
            Ok(result) => {
                result.is_success() && result.output.first().map(|line| line.trim()) == Some("0")
            }
            Err(e) => {
                debug!("Root probe failed: {}", e);
                false
            }
        };
        info!("Root access available: {}", usable);

        self.lock().root_probe = Some(usable);
        usable
    }

    /// Whether ADB is enabled and a device is attached
    pub async fn can_use_adb_now(&self) -> bool {
        let config = {
            let backends = self.lock();
            if !backends.config.use_adb {
                return false;
            }
            if let Some(cached) = backends.adb_probe {
                return cached;
            }
            backends.config.clone()
        };

        let usable = match probe_adb_state(config.adb_serial.as_deref()).await {
            Ok(state) => state == "device",
            Err(e) => {
                debug!("ADB probe failed: {}", e);
                false
            }
        };
        info!("ADB access available: {}", usable);

        self.lock().adb_probe = Some(usable);
        usable
    }
}

async fn run_with_timeout(
    shell: &SharedShell,
    cmd: ShellOpsCmd,
    timeout: Option<Duration>,
) -> Result<ShellOpsResult> {
    let run = shell.use_res(move |session| async move { session.execute(&cmd).await });
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{}: command timed out after {:?}", shell.tag(), limit);
                Err(ShellError::Timeout(limit))
            }
        },
        None => run.await,
    }
}

async fn probe_adb_state(serial: Option<&str>) -> Result<String> {
    let launcher = ShellLauncher::adb(serial)?;
    let mut command = Command::new(&launcher.program);
    if let Some(serial) = serial {
        command.arg("-s").arg(serial);
    }
    command.arg("get-state").kill_on_drop(true);

    let output = tokio::time::timeout(PROBE_TIMEOUT, command.output())
        .await
        .map_err(|_| ShellError::Timeout(PROBE_TIMEOUT))?
        .map_err(ShellError::transport)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[async_trait]
impl ShellExecutor for ShellOps {
    async fn execute(
        &self,
        cmd: ShellOpsCmd,
        mode: ShellMode,
    ) -> std::result::Result<ShellOpsResult, StorageError> {
        ShellOps::execute(self, cmd, mode).await.map_err(Into::into)
    }
}

#[async_trait]
impl PrivilegeProbe for ShellOps {
    async fn can_use_root_now(&self) -> bool {
        ShellOps::can_use_root_now(self).await
    }

    async fn can_use_adb_now(&self) -> bool {
        ShellOps::can_use_adb_now(self).await
    }
}

#[cfg(test)]
mod tests {
    use sdm_contracts::StorageErrorKind;

    use super::*;

    fn ops(config: ShellConfig) -> ShellOps {
        ShellOps::with_config(config, CancellationToken::new())
    }

    #[tokio::test]
    async fn normal_mode_executes_through_sh() {
        let ops = ops(ShellConfig::default());

        let result = ops
            .execute(ShellOpsCmd::new(["echo hello", "echo oops >&2"]), ShellMode::Normal)
            .await
            .expect("execute");
        assert_eq!(result.output, vec!["hello".to_string()]);
        assert_eq!(result.errors, vec!["oops".to_string()]);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn disabled_modes_do_not_fall_back() {
        let ops = ops(ShellConfig::default());

        assert!(!ops.can_use_root_now().await);
        assert!(!ops.can_use_adb_now().await);

        let error = ops
            .execute(ShellOpsCmd::single("id -u"), ShellMode::Root)
            .await
            .expect_err("root disabled");
        assert!(matches!(
            error,
            ShellError::Unavailable {
                mode: ShellMode::Root,
                ..
            }
        ));

        let storage: StorageError = error.into();
        assert_eq!(storage.kind, StorageErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn missing_su_binary_means_no_root() {
        let ops = ops(ShellConfig {
            use_root: true,
            su_binary: "definitely-not-a-su-binary".to_string(),
            ..ShellConfig::default()
        });

        assert!(!ops.can_use_root_now().await);
    }

    #[tokio::test]
    async fn timeout_does_not_poison_next_command() {
        let ops = ops(ShellConfig {
            command_timeout: Some(Duration::from_millis(200)),
            ..ShellConfig::default()
        });

        let error = ops
            .execute(ShellOpsCmd::single("sleep 5"), ShellMode::Normal)
            .await
            .expect_err("timeout");
        assert!(matches!(error, ShellError::Timeout(_)));

        let result = ops
            .execute(ShellOpsCmd::single("echo ok"), ShellMode::Normal)
            .await
            .expect("next command");
        assert_eq!(result.output, vec!["ok".to_string()]);
    }

    #[tokio::test]
    async fn failing_backend_is_wrapped_with_its_mode() {
        let ops = ops(ShellConfig::default());

        let error = ops
            .execute(ShellOpsCmd::single("exit 4"), ShellMode::Normal)
            .await
            .expect_err("shell exited");
        match error {
            ShellError::Backend { mode, source } => {
                assert_eq!(mode, ShellMode::Normal);
                assert!(matches!(*source, ShellError::Closed));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn config_changes_rebuild_backends() {
        let (tx, rx) = watch::channel(ShellConfig::default());
        let ops = ShellOps::new(rx, CancellationToken::new());
        assert!(!ops.can_use_root_now().await);

        tx.send_modify(|config| {
            config.use_root = true;
            config.su_binary = "definitely-not-a-su-binary".to_string();
        });
        assert!(ops.config().use_root);
        assert!(!ops.can_use_root_now().await);
    }
}
