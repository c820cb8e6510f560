// SPDX-License-Identifier: GPL-3.0-only

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use sdm_types::{ShellOpsCmd, ShellOpsResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::{Result, ShellError};
use crate::launcher::ShellLauncher;
use crate::process::{ShellPipes, ShellProcess};

const CLOSE_GRACE: Duration = Duration::from_secs(3);

/// One interactive shell process executing command batches in order
///
/// Every batch is followed by an end marker echoed on stdout (carrying `$?`)
/// and on stderr. A batch whose caller went away before its marker arrived
/// leaves output behind; the next batch discards everything up to that
/// stale marker.
pub struct ShellSession {
    id: String,
    launcher: ShellLauncher,
    process: ShellProcess,
    io: Mutex<SessionIo>,
    seq: AtomicU64,
    counter: AtomicU64,
    closed: CancellationToken,
}

struct SessionIo {
    stdin: ChildStdin,
    stdout: LineReader<ChildStdout>,
    stderr: LineReader<ChildStderr>,
}

impl ShellSession {
    /// Spawns the shell and waits until it answers a no-op batch
    pub async fn open(launcher: ShellLauncher) -> Result<Self> {
        let (process, ShellPipes { stdin, stdout, stderr }) = ShellProcess::spawn(&launcher)?;
        let session = Self {
            id: Uuid::new_v4().simple().to_string(),
            launcher,
            process,
            io: Mutex::new(SessionIo {
                stdin,
                stdout: LineReader::new(stdout),
                stderr: LineReader::new(stderr),
            }),
            seq: AtomicU64::new(0),
            counter: AtomicU64::new(0),
            closed: CancellationToken::new(),
        };

        match session.run(&ShellOpsCmd::single("true")).await {
            Ok(_) => {
                debug!("Opened shell session {} ({})", session.id, session.launcher);
                Ok(session)
            }
            Err(e) => {
                session.cancel();
                Err(ShellError::Spawn {
                    program: session.launcher.to_string(),
                    message: format!("shell did not become ready: {e}"),
                })
            }
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn launcher(&self) -> &ShellLauncher {
        &self.launcher
    }

    /// Number of batches completed on this session
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        !self.closed.is_cancelled() && self.process.is_alive()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.process.exit_code()
    }

    #[cfg(test)]
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Runs all lines of `cmd` and captures both streams up to the end marker
    pub async fn execute(&self, cmd: &ShellOpsCmd) -> Result<ShellOpsResult> {
        let result = self.run(cmd).await?;
        self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn run(&self, cmd: &ShellOpsCmd) -> Result<ShellOpsResult> {
        if !self.is_alive() {
            return Err(ShellError::Closed);
        }

        let mut io = tokio::select! {
            io = self.io.lock() => io,
            _ = self.closed.cancelled() => return Err(ShellError::Closed),
        };

        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let marker = format!("{}{seq}__", self.marker_prefix());
        let mut script = String::new();
        for line in &cmd.cmds {
            script.push_str(line);
            script.push('\n');
        }
        script.push_str(&format!("echo \"{marker} $?\"\necho \"{marker}\" >&2\n"));
        trace!("Session {} batch {}: {:?}", self.id, seq, cmd.cmds);

        let SessionIo {
            stdin,
            stdout,
            stderr,
        } = &mut *io;
        let prefix = self.marker_prefix();
        let exchange = async {
            stdin
                .write_all(script.as_bytes())
                .await
                .map_err(ShellError::transport)?;
            stdin.flush().await.map_err(ShellError::transport)?;
            tokio::try_join!(
                stdout.read_batch(&prefix, seq),
                stderr.read_batch(&prefix, seq)
            )
        };

        let ((exit_code, output), (_, errors)) = tokio::select! {
            result = exchange => result?,
            _ = self.closed.cancelled() => return Err(ShellError::Closed),
            _ = self.process.wait() => return Err(ShellError::Closed),
        };

        let exit_code = exit_code.ok_or_else(|| {
            ShellError::Transport(format!("end marker of batch {seq} carried no exit code"))
        })?;
        Ok(ShellOpsResult {
            exit_code,
            output,
            errors,
        })
    }

    fn marker_prefix(&self) -> String {
        format!("__sdm_{}_", self.id)
    }

    /// Asks the shell to exit, killing it if it does not within a grace period
    ///
    /// An in-flight batch fails with [`ShellError::Closed`].
    pub async fn close(&self) {
        if !self.process.is_alive() {
            self.closed.cancel();
            return;
        }
        self.closed.cancel();

        {
            let mut io = self.io.lock().await;
            let _ = io.stdin.write_all(b"exit\n").await;
            let _ = io.stdin.flush().await;
        }

        if tokio::time::timeout(CLOSE_GRACE, self.process.wait())
            .await
            .is_err()
        {
            warn!(
                "Shell session {} did not exit within {:?}, killing it",
                self.id, CLOSE_GRACE
            );
            self.process.kill();
            self.process.wait().await;
        }
        debug!("Closed shell session {}", self.id);
    }

    /// Kills the shell immediately
    pub fn cancel(&self) {
        self.closed.cancel();
        self.process.kill();
    }
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("id", &self.id)
            .field("launcher", &self.launcher.to_string())
            .field("counter", &self.counter())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Line reader whose partial line survives a dropped read
struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        let read = self
            .reader
            .read_until(b'\n', &mut self.pending)
            .await
            .map_err(ShellError::transport)?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let mut bytes = std::mem::take(&mut self.pending);
        if bytes.last() == Some(&b'\n') {
            bytes.pop();
        }
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Collects lines until the marker of batch `seq`
    async fn read_batch(&mut self, prefix: &str, seq: u64) -> Result<(Option<i32>, Vec<String>)> {
        let mut lines = Vec::new();
        loop {
            let Some(line) = self.next_line().await? else {
                return Err(ShellError::Closed);
            };
            let Some(found) = find_marker(&line, prefix) else {
                lines.push(line);
                continue;
            };

            if found.seq == seq {
                if found.offset > 0 {
                    lines.push(line[..found.offset].to_string());
                }
                return Ok((found.exit_code, lines));
            }
            // Leftovers of an abandoned batch.
            lines.clear();
        }
    }
}

struct MarkerHit {
    offset: usize,
    seq: u64,
    exit_code: Option<i32>,
}

fn find_marker(line: &str, prefix: &str) -> Option<MarkerHit> {
    let offset = line.find(prefix)?;
    let rest = &line[offset + prefix.len()..];
    let (seq, tail) = rest.split_once("__")?;
    let seq = seq.parse().ok()?;
    Some(MarkerHit {
        offset,
        seq,
        exit_code: tail.trim().parse().ok(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn open_sh() -> ShellSession {
        let launcher = ShellLauncher::plain("sh").expect("sh on PATH");
        ShellSession::open(launcher).await.expect("open sh session")
    }

    #[test]
    fn marker_is_found_after_unterminated_output() {
        let hit = find_marker("abc__sdm_x_12__ 3", "__sdm_x_").expect("marker");
        assert_eq!(hit.offset, 3);
        assert_eq!(hit.seq, 12);
        assert_eq!(hit.exit_code, Some(3));

        let stderr_hit = find_marker("__sdm_x_4__", "__sdm_x_").expect("marker");
        assert_eq!(stderr_hit.exit_code, None);
        assert!(find_marker("__sdm_y_4__", "__sdm_x_").is_none());
    }

    #[tokio::test]
    async fn execute_captures_both_streams_and_exit_code() {
        let session = open_sh().await;

        let result = session
            .execute(&ShellOpsCmd::new(["echo out", "echo err >&2", "false"]))
            .await
            .expect("execute");
        assert_eq!(result.output, vec!["out".to_string()]);
        assert_eq!(result.errors, vec!["err".to_string()]);
        assert_eq!(result.exit_code, 1);

        let result = session
            .execute(&ShellOpsCmd::single("printf tail"))
            .await
            .expect("execute");
        assert_eq!(result.output, vec!["tail".to_string()]);
        assert!(result.is_success());
        assert_eq!(session.counter(), 2);

        session.close().await;
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn queued_commands_run_in_order() {
        let session = open_sh().await;

        for i in 0..1000 {
            let result = session
                .execute(&ShellOpsCmd::single(format!("echo {i}")))
                .await
                .expect("execute");
            assert_eq!(result.output, vec![i.to_string()]);
        }
        assert_eq!(session.counter(), 1000);
        session.close().await;
    }

    #[tokio::test]
    async fn racing_commands_are_linearised() {
        let session = Arc::new(open_sh().await);

        let tasks: Vec<_> = (0..1000)
            .map(|i| {
                let session = session.clone();
                tokio::spawn(async move {
                    let result = session
                        .execute(&ShellOpsCmd::single(format!("echo race-{i}")))
                        .await
                        .expect("execute");
                    assert_eq!(result.output, vec![format!("race-{i}")]);
                })
            })
            .collect();
        for task in tasks {
            task.await.expect("task");
        }

        assert_eq!(session.counter(), 1000);
        session.close().await;
    }

    #[tokio::test]
    async fn close_aborts_running_command() {
        let session = Arc::new(open_sh().await);
        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.execute(&ShellOpsCmd::single("sleep 30")).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        session.cancel();
        let result = running.await.expect("task");
        assert!(matches!(result, Err(ShellError::Closed)));
        assert!(matches!(
            session.execute(&ShellOpsCmd::single("echo late")).await,
            Err(ShellError::Closed)
        ));
    }

    #[tokio::test]
    async fn abandoned_command_output_is_discarded() {
        let session = open_sh().await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(100),
            session.execute(&ShellOpsCmd::new(["sleep 1", "echo stale"])),
        )
        .await;
        assert!(abandoned.is_err());

        let result = session
            .execute(&ShellOpsCmd::single("echo fresh"))
            .await
            .expect("execute after timeout");
        assert_eq!(result.output, vec!["fresh".to_string()]);
        assert_eq!(session.counter(), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn exit_inside_a_batch_closes_the_session() {
        let session = open_sh().await;

        let result = session.execute(&ShellOpsCmd::single("exit 3")).await;
        assert!(matches!(result, Err(ShellError::Closed)));
        assert_eq!(session.process.wait().await, 3);
        assert!(!session.is_alive());
    }
}
