// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Domain Model
//!
//! Identity, role policy and lifecycle status for a supervised agent process.
//!
//! Role specialization is a policy table on [`AgentRole`] rather than two
//! agent types:
//!
//! | Policy | Worker | Supervisor |
//! |--------|--------|------------|
//! | restart on exit code 0 | no (task done) | yes (must keep monitoring) |
//! | restart on non-zero exit | yes | yes |
//! | retained message kinds | all | `Say` only |
//! | default heartbeat | 180 s | 60 s |
//!
//! Once the orchestrator puts an agent into its final phase, a clean exit
//! means "finished" for both roles.

use crate::domain::adapter::AgentProfile;
use crate::domain::message::MessageKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// Appended to a worker's log when the orchestrator forcibly ends its phase.
pub const STOP_SENTINEL: &str = "<<worker has been stopped>>";

/// Appended to a worker's log when its process had already exited by itself
/// at the end of the phase.
pub const FINISHED_SENTINEL: &str = "<<worker has finished>>";

/// Consecutive failed spawns after which an agent is retired.
pub const MAX_SPAWN_FAILURES: u32 = 5;

/// Upper bound for the delay between spawn retries.
pub const MAX_SPAWN_BACKOFF: Duration = Duration::from_secs(60);

/// Marker written to the log before a restarted process produces output.
pub fn restart_marker(at: DateTime<Utc>) -> String {
    format!("<<agent restarted at {}>>", at.to_rfc3339())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Worker,
    Supervisor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Worker => "worker",
            AgentRole::Supervisor => "supervisor",
        }
    }

    /// Whether an exited process should be restarted.
    ///
    /// `code` is `None` when the process was killed by a signal.
    pub fn restarts_on_exit(&self, code: Option<i32>, final_phase: bool) -> bool {
        let clean = code == Some(0);
        if clean {
            return match self {
                AgentRole::Worker => false,
                AgentRole::Supervisor => !final_phase,
            };
        }
        true
    }

    /// Whether a message of `kind` is kept in the display buffer.
    pub fn retains(&self, kind: MessageKind) -> bool {
        match self {
            AgentRole::Worker => true,
            AgentRole::Supervisor => kind == MessageKind::Say,
        }
    }

    pub fn default_heartbeat(&self) -> Duration {
        match self {
            AgentRole::Worker => Duration::from_secs(180),
            AgentRole::Supervisor => Duration::from_secs(60),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    NotStarted,
    Running,
    Crashed,
    IdleTimeout,
    Restarting,
    /// Exited and not restarted: the work is done.
    Completed,
    /// Terminated by the orchestrator.
    Stopped,
    /// Exceeded the restart cap or kept failing to spawn.
    Retired,
}

impl AgentStatus {
    /// No further process will be spawned for this agent.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentStatus::Completed | AgentStatus::Stopped | AgentStatus::Retired
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    Crashed { exit_code: Option<i32> },
    /// A clean exit from a role that must keep running.
    Exited,
    IdleTimeout { idle_secs: u64 },
    /// Explicit restart by a caller (resume, operator).
    Requested,
    /// The previous attempt could not launch the process.
    SpawnFailed,
}

impl RestartReason {
    pub fn label(&self) -> &'static str {
        match self {
            RestartReason::Crashed { .. } => "crashed",
            RestartReason::Exited => "exited",
            RestartReason::IdleTimeout { .. } => "idle_timeout",
            RestartReason::Requested => "requested",
            RestartReason::SpawnFailed => "spawn_failed",
        }
    }
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartReason::Crashed {
                exit_code: Some(code),
            } => write!(f, "crashed with exit code {}", code),
            RestartReason::Crashed { exit_code: None } => write!(f, "killed by signal"),
            RestartReason::Exited => write!(f, "exited"),
            RestartReason::IdleTimeout { idle_secs } => {
                write!(f, "no output for {}s", idle_secs)
            }
            RestartReason::Requested => write!(f, "restart requested"),
            RestartReason::SpawnFailed => write!(f, "process failed to spawn"),
        }
    }
}

/// Result of one liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running; nothing to check.
    Idle,
    Alive,
    Restarted(RestartReason),
    Completed { exit_code: Option<i32> },
    Retired,
}

/// Static configuration for one agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub name: String,
    pub role: AgentRole,
    pub profile: AgentProfile,
    pub working_dir: PathBuf,
    pub log_path: PathBuf,
    /// Extra directory the CLI may read (shared notes, main checkout).
    pub extra_dir: Option<PathBuf>,
    pub heartbeat_timeout: Duration,
    /// `None` restarts without bound.
    pub max_restarts: Option<u32>,
    /// First delay after a failed spawn; doubles per consecutive failure.
    pub spawn_backoff: Duration,
}

impl AgentSettings {
    pub fn new(
        name: impl Into<String>,
        role: AgentRole,
        profile: AgentProfile,
        working_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            profile,
            working_dir: working_dir.into(),
            log_path: log_path.into(),
            extra_dir: None,
            heartbeat_timeout: role.default_heartbeat(),
            max_restarts: None,
            spawn_backoff: Duration::from_secs(1),
        }
    }

    pub fn with_extra_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dir = Some(dir.into());
        self
    }

    pub fn with_heartbeat(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn with_max_restarts(mut self, max: Option<u32>) -> Self {
        self.max_restarts = max;
        self
    }

    pub fn with_spawn_backoff(mut self, backoff: Duration) -> Self {
        self.spawn_backoff = backoff;
        self
    }

    /// Delay before retrying after the `failures`-th consecutive failed spawn.
    pub fn spawn_retry_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.spawn_backoff
            .saturating_mul(1 << exponent)
            .min(MAX_SPAWN_BACKOFF)
    }
}

/// Builds the prompt handed to the CLI on every (re)start.
pub trait PromptSource: Send + Sync {
    fn render(&self, restart_count: u32) -> anyhow::Result<String>;
}

/// A prompt that ignores the restart counter.
#[derive(Debug, Clone)]
pub struct FixedPrompt(pub String);

impl PromptSource for FixedPrompt {
    fn render(&self, _restart_count: u32) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_clean_exit_does_not_restart() {
        assert!(!AgentRole::Worker.restarts_on_exit(Some(0), false));
        assert!(AgentRole::Worker.restarts_on_exit(Some(1), false));
        assert!(AgentRole::Worker.restarts_on_exit(None, false));
    }

    #[test]
    fn test_supervisor_restarts_on_any_exit_until_final_phase() {
        assert!(AgentRole::Supervisor.restarts_on_exit(Some(0), false));
        assert!(!AgentRole::Supervisor.restarts_on_exit(Some(0), true));
        assert!(AgentRole::Supervisor.restarts_on_exit(Some(2), true));
    }

    #[test]
    fn test_retention_policy() {
        assert!(AgentRole::Worker.retains(MessageKind::See));
        assert!(AgentRole::Supervisor.retains(MessageKind::Say));
        assert!(!AgentRole::Supervisor.retains(MessageKind::Do));
    }

    #[test]
    fn test_restart_marker_format() {
        let at = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            restart_marker(at),
            "<<agent restarted at 2026-01-02T03:04:05+00:00>>"
        );
    }

    #[test]
    fn test_spawn_retry_delay_doubles_up_to_cap() {
        let settings = AgentSettings::new(
            "w",
            AgentRole::Worker,
            AgentProfile::new(crate::domain::adapter::Vendor::Claude),
            "/tmp",
            "/tmp/w.log",
        )
        .with_spawn_backoff(Duration::from_millis(500));
        assert_eq!(settings.spawn_retry_delay(1), Duration::from_millis(500));
        assert_eq!(settings.spawn_retry_delay(3), Duration::from_secs(2));
        assert_eq!(settings.spawn_retry_delay(40), MAX_SPAWN_BACKOFF);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(AgentStatus::Completed.is_terminal());
        assert!(AgentStatus::Retired.is_terminal());
        assert!(!AgentStatus::Restarting.is_terminal());
    }
}
