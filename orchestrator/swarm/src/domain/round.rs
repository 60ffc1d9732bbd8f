// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Round configuration, progress state and on-disk layout.
//!
//! ```text
//! <state_dir>/
//! ├── round.json                      # snapshot of the round in flight
//! ├── shared/NOTES.md                 # append-only channel between workers
//! ├── worktrees/round-<n>/<worker>/   # one git worktree per worker
//! └── logs/round-<n>/<agent>.log      # raw CLI output per agent
//! ```

use anyhow::Context;
use arena_core::domain::adapter::AgentProfile;
use arena_core::domain::agent::AgentId;
use arena_core::domain::config::ArenaConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use arena_core::domain::config::RoundMode;

pub const SUPERVISOR_NAME: &str = "supervisor";
pub const NOTES_FILE: &str = "NOTES.md";
pub const SNAPSHOT_FILE: &str = "round.json";

/// Everything the orchestrator needs, flattened out of [`ArenaConfig`].
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub mode: RoundMode,
    pub max_rounds: u32,
    pub repository: PathBuf,
    pub task_file: String,
    pub state_dir: PathBuf,
    pub worker_count: usize,
    pub worker_profile: AgentProfile,
    pub supervisor_profile: AgentProfile,
    pub phase_duration: Duration,
    pub supervisor_timeout: Duration,
    pub poll_interval: Duration,
    pub closing_summary_wait: Duration,
    /// Autopilot only; `None` lets workers run until they exit.
    pub autopilot_time_box: Option<Duration>,
    pub worker_heartbeat: Duration,
    pub supervisor_heartbeat: Duration,
    pub max_restarts: Option<u32>,
}

impl RoundSettings {
    pub fn from_config(config: &ArenaConfig) -> Self {
        let spec = &config.spec;
        Self {
            mode: spec.mode,
            max_rounds: spec.max_rounds,
            repository: spec.repository.clone(),
            task_file: spec.task_file.clone(),
            state_dir: config.state_dir(),
            worker_count: spec.workers.count,
            worker_profile: spec.workers.profile.clone(),
            supervisor_profile: spec.supervisor.profile.clone(),
            phase_duration: spec.timing.phase_duration,
            supervisor_timeout: spec.timing.supervisor_timeout,
            poll_interval: spec.timing.poll_interval,
            closing_summary_wait: spec.timing.closing_summary_wait,
            autopilot_time_box: spec.timing.autopilot_time_box,
            worker_heartbeat: spec.liveness.worker_heartbeat,
            supervisor_heartbeat: spec.liveness.supervisor_heartbeat,
            max_restarts: spec.liveness.max_restarts,
        }
    }

    /// `worker-1` .. `worker-N`.
    pub fn worker_names(&self) -> Vec<String> {
        (1..=self.worker_count).map(|i| format!("worker-{}", i)).collect()
    }

    /// Rounds this mode runs at most. Autopilot is a single phase.
    pub fn round_limit(&self) -> u32 {
        match self.mode {
            RoundMode::Arena => self.max_rounds,
            RoundMode::Autopilot => 1,
        }
    }

    pub fn worktrees_dir(&self, round: u32) -> PathBuf {
        self.state_dir.join("worktrees").join(format!("round-{}", round))
    }

    pub fn worktree_path(&self, round: u32, worker: &str) -> PathBuf {
        self.worktrees_dir(round).join(worker)
    }

    pub fn log_path(&self, round: u32, agent: &str) -> PathBuf {
        self.state_dir
            .join("logs")
            .join(format!("round-{}", round))
            .join(format!("{}.log", agent))
    }

    pub fn shared_dir(&self) -> PathBuf {
        self.state_dir.join("shared")
    }

    pub fn notes_path(&self) -> PathBuf {
        self.shared_dir().join(NOTES_FILE)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join(SNAPSHOT_FILE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundAgent {
    pub id: AgentId,
    pub name: String,
    pub working_dir: PathBuf,
    pub log_path: PathBuf,
    /// Exited for good (completed, retired or stopped).
    pub finished: bool,
}

/// Progress of the round in flight. Persisted so an interrupted run can be
/// resumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundState {
    pub round: u32,
    pub max_rounds: u32,
    pub mode: RoundMode,
    pub started_at: DateTime<Utc>,
    pub workers: Vec<RoundAgent>,
    pub supervisor: Option<RoundAgent>,
    /// Worktrees this round provisioned; all of them are deleted on cleanup.
    pub worktrees: Vec<PathBuf>,
}

impl RoundState {
    pub fn new(round: u32, max_rounds: u32, mode: RoundMode) -> Self {
        Self {
            round,
            max_rounds,
            mode,
            started_at: Utc::now(),
            workers: Vec::new(),
            supervisor: None,
            worktrees: Vec::new(),
        }
    }

    pub fn all_workers_finished(&self) -> bool {
        self.workers.iter().all(|w| w.finished)
    }

    pub fn worker_mut(&mut self, id: AgentId) -> Option<&mut RoundAgent> {
        self.workers.iter_mut().find(|w| w.id == id)
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.workers
            .iter()
            .chain(self.supervisor.iter())
            .map(|a| a.id)
            .collect()
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write round snapshot {:?}", path))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read round snapshot {:?}", path))?;
        serde_json::from_str(&json).context("Failed to parse round snapshot")
    }
}

/// Where to pick up an interrupted run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumeState {
    pub round: u32,
    /// Names of workers that already finished; they are not started again.
    pub completed_workers: Vec<String>,
}

impl ResumeState {
    pub fn new(round: u32, completed_workers: Vec<String>) -> Self {
        Self {
            round,
            completed_workers,
        }
    }

    pub fn is_completed(&self, worker: &str) -> bool {
        self.completed_workers.iter().any(|w| w == worker)
    }
}

impl From<&RoundState> for ResumeState {
    fn from(state: &RoundState) -> Self {
        Self {
            round: state.round,
            completed_workers: state
                .workers
                .iter()
                .filter(|w| w.finished)
                .map(|w| w.name.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed { rounds: u32 },
    /// The gate reported no open items before `rounds` + 1 could start.
    NoRemainingWork { rounds: u32 },
    Cancelled,
}
