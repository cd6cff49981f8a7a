//! Sandboxed code execution collaborator used by `python_exec`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::tools::truncate_utf8_owned;

/// Per-stream output cap.
pub const MAX_OUTPUT: usize = 256 * 1024;

/// How long pipe readers may lag behind the child's exit.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Result of one sandboxed run.  A non-zero exit is data, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Runs a script file with optional stdin.
///
/// `script` is an absolute path already validated against the run root.
/// Errors mean the runner itself failed (spawn, I/O), not the script.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, script: &Path, stdin: Option<String>) -> anyhow::Result<ExecOutcome>;
}

/// Runs scripts with a local Python interpreter in isolated mode.
///
/// The child gets a cleared environment, `cwd` set to the run root and
/// is killed when the timeout fires.
pub struct PythonProcessRunner {
    interpreter: String,
    workdir: PathBuf,
    timeout: Duration,
}

impl PythonProcessRunner {
    pub fn new(interpreter: impl Into<String>, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            interpreter: interpreter.into(),
            workdir: workdir.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CodeRunner for PythonProcessRunner {
    async fn run(&self, script: &Path, stdin: Option<String>) -> anyhow::Result<ExecOutcome> {
        let mut child = tokio::process::Command::new(&self.interpreter)
            .arg("-I")
            .arg(script)
            .current_dir(&self.workdir)
            .env_clear()
            .env("PATH", "/usr/local/bin:/usr/bin:/bin")
            .env("HOME", self.workdir.to_string_lossy().to_string())
            .env("PYTHONIOENCODING", "utf-8")
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.interpreter))?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // Fed from a separate task so a chatty script can't fill
                // its stdout pipe while we are still writing.
                tokio::spawn(async move {
                    if let Err(e) = pipe.write_all(input.as_bytes()).await {
                        debug!(error = %e, "stdin pipe closed early");
                    }
                });
            }
        }

        // Pipes are drained concurrently with the wait so a timed-out
        // child still reports what it printed.
        let stdout_reader = spawn_capture(child.stdout.take());
        let stderr_reader = spawn_capture(child.stderr.take());

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => Some(result.context("failed to wait for child")?),
            Err(_elapsed) => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "kill after timeout failed");
                }
                None
            }
        };

        let stdout = collect_capture(stdout_reader).await;
        let mut stderr = collect_capture(stderr_reader).await;

        let Some(status) = status else {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "timed out after {}s (child killed)",
                self.timeout.as_secs()
            ));
            return Ok(ExecOutcome {
                success: false,
                stdout: truncate_utf8_owned(stdout, MAX_OUTPUT),
                stderr: truncate_utf8_owned(stderr, MAX_OUTPUT),
                exit_code: None,
                timed_out: true,
            });
        };

        Ok(ExecOutcome {
            success: status.success(),
            stdout: truncate_utf8_owned(stdout, MAX_OUTPUT),
            stderr: truncate_utf8_owned(stderr, MAX_OUTPUT),
            exit_code: status.code(),
            timed_out: false,
        })
    }
}

/// Read a child pipe to EOF, keeping at most [`MAX_OUTPUT`] bytes.
fn spawn_capture<R>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut pipe = pipe?;
    Some(tokio::spawn(async move {
        let mut kept = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            match pipe.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let room = MAX_OUTPUT.saturating_sub(kept.len());
                    kept.extend_from_slice(&buf[..n.min(room)]);
                }
                Err(e) => {
                    debug!(error = %e, "child pipe read failed");
                    break;
                }
            }
        }
        kept
    }))
}

async fn collect_capture(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    let Some(reader) = reader else {
        return String::new();
    };
    // A grandchild that inherited the pipe can keep it open past the
    // child's exit.
    let mut reader = reader;
    match tokio::time::timeout(PIPE_GRACE, &mut reader).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            debug!(error = %e, "pipe reader task failed");
            String::new()
        }
        Err(_elapsed) => {
            reader.abort();
            debug!("child pipe still open after exit; output dropped");
            String::new()
        }
    }
}
