// SPDX-License-Identifier: GPL-3.0-only

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, ShellError};
use crate::launcher::ShellLauncher;

/// Standard streams of a freshly spawned [`ShellProcess`]
pub struct ShellPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// A running shell process with an exit monitor
///
/// The child runs in its own process group so [`ShellProcess::kill`] also
/// reaches commands the shell forked. Dropping the handle kills the process.
pub struct ShellProcess {
    pid: Option<u32>,
    exit_rx: watch::Receiver<Option<i32>>,
    kill: CancellationToken,
}

impl ShellProcess {
    pub fn spawn(launcher: &ShellLauncher) -> Result<(Self, ShellPipes)> {
        let mut child = Command::new(&launcher.program)
            .args(&launcher.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ShellError::Spawn {
                program: launcher.to_string(),
                message: e.to_string(),
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ShellError::Transport(format!(
                "{launcher}: standard streams not captured"
            )));
        };

        let pid = child.id();
        debug!("Spawned {} (pid {:?})", launcher, pid);

        let (exit_tx, exit_rx) = watch::channel(None);
        let kill = CancellationToken::new();
        let monitor_kill = kill.clone();
        tokio::spawn(async move {
            let waited = tokio::select! {
                status = child.wait() => Some(status),
                _ = monitor_kill.cancelled() => None,
            };
            let status = match waited {
                Some(status) => status,
                None => {
                    if let Some(pid) = pid {
                        // The group may contain processes we are not allowed to signal.
                        let _ = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL);
                    }
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let code = status.map(exit_code).unwrap_or(-1);
            trace!("Shell process {:?} exited with {}", pid, code);
            let _ = exit_tx.send(Some(code));
        });

        Ok((Self { pid, exit_rx, kill }, ShellPipes { stdin, stdout, stderr }))
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    pub fn is_alive(&self) -> bool {
        self.exit_code().is_none()
    }

    pub fn kill(&self) {
        self.kill.cancel();
    }

    /// Waits for the process to exit and returns its exit code
    pub async fn wait(&self) -> i32 {
        let mut exit_rx = self.exit_rx.clone();
        match exit_rx.wait_for(Option::is_some).await {
            Ok(code) => (*code).unwrap_or(-1),
            // Monitor gone without publishing: the runtime is shutting down.
            Err(_) => self.exit_code().unwrap_or(-1),
        }
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        self.kill.cancel();
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn exit_monitor_publishes_exit_code() {
        let launcher = ShellLauncher::plain("sh").expect("sh on PATH");
        let (process, mut pipes) = ShellProcess::spawn(&launcher).expect("spawn sh");
        assert!(process.is_alive());

        pipes.stdin.write_all(b"exit 7\n").await.expect("write exit");
        assert_eq!(process.wait().await, 7);
        assert!(!process.is_alive());
    }

    #[tokio::test]
    async fn kill_terminates_with_signal_code() {
        let launcher = ShellLauncher::plain("sh").expect("sh on PATH");
        let (process, _pipes) = ShellProcess::spawn(&launcher).expect("spawn sh");

        process.kill();
        assert_eq!(process.wait().await, 128 + Signal::SIGKILL as i32);
    }
}
