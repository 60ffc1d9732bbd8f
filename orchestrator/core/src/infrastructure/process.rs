// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Child process handle for one agent CLI run.
//!
//! The child is placed in its own process group (Unix) so termination reaches
//! every descendant the CLI spawned (shells, test runners, language servers).
//! Stdout and stderr are copied line by line into the agent's [`AgentLog`] by
//! two capture tasks.

use crate::domain::runtime::{ProcessSpec, RuntimeError};
use crate::infrastructure::agent_log::AgentLog;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long capture tasks get to drain after the child is gone.
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct AgentProcess {
    child: Child,
    pid: Option<u32>,
    exit_code: Option<Option<i32>>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentProcess {
    /// Spawn `spec`, feeding `spec.stdin` and capturing output into `log`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(spec: &ProcessSpec, log: Arc<AgentLog>) -> Result<Self, RuntimeError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| RuntimeError::SpawnFailed(format!("{}: {}", spec.program, e)))?;
        let pid = child.id();
        debug!(pid = ?pid, command = %spec.display(), "Spawned agent process");

        let mut tasks = Vec::with_capacity(3);
        if let (Some(mut stdin), Some(input)) = (child.stdin.take(), spec.stdin.clone()) {
            tasks.push(tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!(error = %e, "Failed to write prompt to stdin");
                }
                // dropping stdin closes the pipe
                let _ = stdin.shutdown().await;
            }));
        }
        if let Some(stdout) = child.stdout.take() {
            tasks.push(tokio::spawn(capture(stdout, log.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            tasks.push(tokio::spawn(capture(stderr, log)));
        }

        Ok(Self {
            child,
            pid,
            exit_code: None,
            tasks,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Non-blocking exit check. `Some(code)` once the process has exited;
    /// the inner `None` means it was killed by a signal.
    pub fn try_exit(&mut self) -> Option<Option<i32>> {
        if self.exit_code.is_none() {
            match self.child.try_wait() {
                Ok(Some(status)) => self.exit_code = Some(status.code()),
                Ok(None) => {}
                Err(e) => {
                    warn!(pid = ?self.pid, error = %e, "Failed to poll agent process");
                    self.exit_code = Some(None);
                }
            }
        }
        self.exit_code
    }

    /// Kill the process group, wait up to `grace` for the child to be reaped,
    /// then stop the capture tasks. Never blocks longer than `grace` plus the
    /// capture drain timeout.
    pub async fn terminate(&mut self, grace: Duration) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SAFETY: killpg only sends a signal; the group id is the child's pid
            // because it was spawned with process_group(0).
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }

        if self.exit_code.is_none() {
            if let Err(e) = self.child.start_kill() {
                debug!(pid = ?self.pid, error = %e, "start_kill failed (process may be gone)");
            }
            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => self.exit_code = Some(status.code()),
                Ok(Err(e)) => {
                    warn!(pid = ?self.pid, error = %e, "Error waiting for agent process");
                    self.exit_code = Some(None);
                }
                Err(_) => {
                    warn!(pid = ?self.pid, "Timeout waiting for agent process to exit");
                }
            }
        }

        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(CAPTURE_DRAIN_TIMEOUT, &mut task).await.is_err() {
                task.abort();
            }
        }
    }
}

async fn capture<R>(stream: R, log: Arc<AgentLog>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                if let Err(e) = log.append_line(&line) {
                    warn!(
                        path = %log.path().display(),
                        error = %e,
                        "Failed to append to agent log"
                    );
                }
            }
            Err(e) => {
                debug!(error = %e, "Agent output stream closed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, dir: &std::path::Path) -> ProcessSpec {
        ProcessSpec::new("sh", dir).args(["-c", script])
    }

    #[tokio::test]
    async fn test_output_and_exit_code_are_captured() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AgentLog::open(dir.path().join("a.log")).unwrap());
        let spec = sh("echo out; echo err 1>&2; exit 3", dir.path());
        let mut process = AgentProcess::spawn(&spec, log.clone()).unwrap();

        let mut code = None;
        for _ in 0..100 {
            if let Some(c) = process.try_exit() {
                code = Some(c);
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        process.terminate(Duration::from_secs(1)).await;

        assert_eq!(code, Some(Some(3)));
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("out\n"));
        assert!(content.contains("err\n"));
    }

    #[tokio::test]
    async fn test_stdin_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AgentLog::open(dir.path().join("b.log")).unwrap());
        let spec = sh("cat", dir.path()).stdin("hello from stdin");
        let mut process = AgentProcess::spawn(&spec, log.clone()).unwrap();
        for _ in 0..100 {
            if process.try_exit().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        process.terminate(Duration::from_secs(1)).await;
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains("hello from stdin"));
    }

    #[tokio::test]
    async fn test_terminate_kills_child_tree() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AgentLog::open(dir.path().join("c.log")).unwrap());
        let spec = sh("sleep 30 & sleep 30; echo unreachable", dir.path());
        let mut process = AgentProcess::spawn(&spec, log.clone()).unwrap();
        assert!(process.try_exit().is_none());

        let started = std::time::Instant::now();
        process.terminate(Duration::from_secs(2)).await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(process.try_exit().is_some());
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(AgentLog::open(dir.path().join("d.log")).unwrap());
        let spec = ProcessSpec::new("definitely-not-a-real-binary-xyz", dir.path());
        let err = AgentProcess::spawn(&spec, log).err().unwrap();
        assert!(matches!(err, RuntimeError::SpawnFailed(_)));
    }
}
