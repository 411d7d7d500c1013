//! Test process execution.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::env::EnvContext;
use crate::error::{RunnerError, RunnerResult};
use crate::settings::FileSpec;

/// How long to keep reading output after the process is gone.
///
/// Background children that inherited the pipes can keep them open
/// indefinitely.
pub const DEFAULT_CAPTURE_GRACE: Duration = Duration::from_secs(5);

/// Everything the runner needs to execute one file.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub file: &'a FileSpec,

    /// Working directory of the child (the owning test directory).
    pub working_dir: &'a Path,

    /// Overlay on the inherited environment.
    pub env: &'a EnvContext,
}

/// Raw result of executing a file, before protocol decoding.
#[derive(Debug, Clone, Default)]
pub struct RawRun {
    /// Captured stdout with one trailing newline removed.
    pub stdout: String,

    /// Captured stderr with one trailing newline removed.
    pub stderr: String,

    /// The process exited on its own (possibly via a signal).
    pub completed: bool,

    /// The process was killed for exceeding its timeout.
    pub timed_out: bool,

    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,

    /// Process id while it was running.
    pub pid: Option<u32>,

    /// Wall-clock time from spawn until the output was collected.
    pub run_time: Duration,
}

/// Executes a single test file.
#[async_trait]
pub trait FileRunner: Send + Sync {
    async fn run(&self, invocation: Invocation<'_>) -> RunnerResult<RawRun>;
}

/// Runs test files as child processes.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    capture_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            capture_grace: DEFAULT_CAPTURE_GRACE,
        }
    }
}

/// How the wait loop ended.
enum ProcessExit {
    Completed(ExitStatus),
    TimedOut,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override how long output capture may continue after exit.
    pub fn with_capture_grace(mut self, grace: Duration) -> Self {
        self.capture_grace = grace;
        self
    }
}

#[async_trait]
impl FileRunner for ProcessRunner {
    async fn run(&self, invocation: Invocation<'_>) -> RunnerResult<RawRun> {
        let file = invocation.file;
        let start = Instant::now();

        let mut cmd = Command::new(&file.path);
        cmd.current_dir(invocation.working_dir)
            .envs(invocation.env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            path: file.path.clone(),
            source,
        })?;
        let pid = child.id();
        debug!(
            file = %file.name,
            pid = ?pid,
            timeout_secs = file.timeout_secs,
            "spawned test process"
        );

        let mut stdout_buf = Vec::new();
        let mut stderr_buf = Vec::new();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let limit = (file.timeout_secs > 0).then(|| Duration::from_secs(file.timeout_secs));

        let exit = {
            let capture = async {
                tokio::join!(drain(stdout, &mut stdout_buf), drain(stderr, &mut stderr_buf))
            };
            tokio::pin!(capture);
            let mut captured = false;

            let deadline = async {
                match limit {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::pin!(deadline);

            let exit = loop {
                tokio::select! {
                    (out, err) = &mut capture, if !captured => {
                        captured = true;
                        log_capture_error("stdout", out);
                        log_capture_error("stderr", err);
                    }
                    status = child.wait() => {
                        let status = status.map_err(|source| RunnerError::Wait {
                            path: file.path.clone(),
                            source,
                        })?;
                        break ProcessExit::Completed(status);
                    }
                    () = &mut deadline => {
                        break ProcessExit::TimedOut;
                    }
                }
            };

            if let ProcessExit::TimedOut = exit {
                warn!(
                    file = %file.name,
                    timeout_secs = file.timeout_secs,
                    "test timed out; killing"
                );
                kill(&mut child, pid).await;
            }

            if !captured {
                match tokio::time::timeout(self.capture_grace, &mut capture).await {
                    Ok((out, err)) => {
                        log_capture_error("stdout", out);
                        log_capture_error("stderr", err);
                    }
                    Err(_) => {
                        warn!(
                            file = %file.name,
                            "output still open after exit; keeping partial capture"
                        );
                    }
                }
            }
            exit
        };

        let run_time = start.elapsed();
        let (completed, timed_out, exit_code) = match exit {
            ProcessExit::Completed(status) => (true, false, status.code()),
            ProcessExit::TimedOut => (false, true, None),
        };

        Ok(RawRun {
            stdout: chomp(String::from_utf8_lossy(&stdout_buf).into_owned()),
            stderr: chomp(String::from_utf8_lossy(&stderr_buf).into_owned()),
            completed,
            timed_out,
            exit_code,
            pid,
            run_time,
        })
    }
}

/// Read `reader` to the end, appending to `buf` chunk by chunk so partial
/// output survives cancellation.
async fn drain<R>(reader: Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn log_capture_error(stream: &str, result: std::io::Result<()>) {
    if let Err(err) = result {
        warn!(stream, error = %err, "output capture failed");
    }
}

/// Kill the child's process group (so its own children go too), then the
/// child itself, and reap it.
async fn kill(child: &mut tokio::process::Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        if !kill_process_group(pid).await {
            debug!(pid, "process group kill failed; killing child only");
        }
    }

    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill timed-out process");
    }
}

#[cfg(unix)]
async fn kill_process_group(pgid: u32) -> bool {
    let group = format!("-{pgid}");
    Command::new("kill")
        .args(["-s", "KILL", "--", &group])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
async fn kill_process_group(_pgid: u32) -> bool {
    false
}

/// Remove one trailing line ending.
fn chomp(mut text: String) -> String {
    if text.ends_with("\r\n") {
        text.truncate(text.len() - 2);
    } else if text.ends_with('\n') || text.ends_with('\r') {
        text.truncate(text.len() - 1);
    }
    text
}
