// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::agent::{AgentId, AgentRole, RestartReason};
use crate::domain::config::RoundMode;
use crate::domain::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    Started {
        agent_id: AgentId,
        name: String,
        role: AgentRole,
        pid: Option<u32>,
        restart_count: u32,
        started_at: DateTime<Utc>,
    },
    /// Every parsed message, regardless of role filtering.
    MessageReceived {
        agent_id: AgentId,
        message: Message,
        received_at: DateTime<Utc>,
    },
    /// The subset kept for display.
    MessageRetained {
        agent_id: AgentId,
        message: Message,
    },
    Restarted {
        agent_id: AgentId,
        reason: RestartReason,
        restart_count: u32,
        restarted_at: DateTime<Utc>,
    },
    Exited {
        agent_id: AgentId,
        exit_code: Option<i32>,
        exited_at: DateTime<Utc>,
    },
    Stopped {
        agent_id: AgentId,
        stopped_at: DateTime<Utc>,
    },
    Retired {
        agent_id: AgentId,
        restart_count: u32,
        retired_at: DateTime<Utc>,
    },
}

impl AgentEvent {
    pub fn agent_id(&self) -> AgentId {
        match self {
            AgentEvent::Started { agent_id, .. }
            | AgentEvent::MessageReceived { agent_id, .. }
            | AgentEvent::MessageRetained { agent_id, .. }
            | AgentEvent::Restarted { agent_id, .. }
            | AgentEvent::Exited { agent_id, .. }
            | AgentEvent::Stopped { agent_id, .. }
            | AgentEvent::Retired { agent_id, .. } => *agent_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
    Added {
        agent_id: AgentId,
        name: String,
        role: AgentRole,
    },
    Removed {
        agent_id: AgentId,
        name: String,
    },
    Stopped {
        agent_id: AgentId,
        name: String,
    },
}

/// Status events from the round orchestrator. Every forced restart and
/// timeout action surfaces here or as an [`AgentEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RoundEvent {
    RoundStarted {
        round: u32,
        max_rounds: u32,
        mode: RoundMode,
        started_at: DateTime<Utc>,
    },
    NoRemainingWork {
        round: u32,
    },
    PhaseStarted {
        round: u32,
        phase: String,
        duration_secs: Option<u64>,
    },
    WorkerCompleted {
        round: u32,
        agent_id: AgentId,
        name: String,
        exit_code: Option<i32>,
    },
    WorkersStopped {
        round: u32,
        count: usize,
    },
    SupervisorFinished {
        round: u32,
        agent_id: AgentId,
    },
    SupervisorTimedOut {
        round: u32,
        agent_id: AgentId,
        waited_secs: u64,
    },
    RoundCompleted {
        round: u32,
        removed_worktrees: Vec<PathBuf>,
        completed_at: DateTime<Utc>,
    },
    RoundAborted {
        round: u32,
        error: String,
    },
    Cancelled {
        round: u32,
    },
}
