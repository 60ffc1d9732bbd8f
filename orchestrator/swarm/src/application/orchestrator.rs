// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Round Orchestrator
//!
//! ```text
//! gate ──no work──▶ done
//!   │
//!   ▼
//! provision worktrees ─▶ start workers + supervisor ─▶ work phase
//!                                                        │ (arena: timed, autopilot: until workers exit)
//!                                                        ▼
//!                      cleanup ◀─ supervisor phase ◀─ stop workers + sentinel
//! ```
//!
//! The orchestrator keeps only [`AgentId`]s and goes through the
//! [`AgentRegistry`] for every poll. Whatever happens inside a round
//! (completion, error or cancellation), its agents are removed and its
//! worktrees deleted before [`RoundOrchestrator::run`] returns.

use crate::domain::round::{
    ResumeState, RoundAgent, RoundMode, RoundSettings, RoundState, RunOutcome, SUPERVISOR_NAME,
};
use crate::domain::workspace::{WorkGate, WorktreeProvisioner};
use crate::infrastructure::prompts::{
    PromptTemplates, SupervisorContext, SupervisorPrompt, WorkerContext, WorkerPrompt, WorkerRef,
};
use arena_core::application::agent::Agent;
use arena_core::application::registry::AgentRegistry;
use arena_core::domain::agent::{
    AgentId, AgentRole, AgentSettings, TickOutcome, FINISHED_SENTINEL, STOP_SENTINEL,
};
use arena_core::domain::events::RoundEvent;
use arena_core::domain::runtime::RuntimeError;
use arena_core::infrastructure::event_bus::EventBus;
use chrono::Utc;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Worktree provisioning failed: {0}")]
    Provision(String),

    #[error("Work gate failed: {0}")]
    Gate(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error(transparent)]
    Agent(#[from] RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoundEnd {
    Finished,
    Cancelled,
}

pub struct RoundOrchestrator {
    settings: RoundSettings,
    registry: Arc<AgentRegistry>,
    provisioner: Arc<dyn WorktreeProvisioner>,
    gate: Arc<dyn WorkGate>,
    prompts: Arc<PromptTemplates>,
    resume: Option<ResumeState>,
    cancel: CancellationToken,
}

impl RoundOrchestrator {
    pub fn new(
        settings: RoundSettings,
        registry: Arc<AgentRegistry>,
        provisioner: Arc<dyn WorktreeProvisioner>,
        gate: Arc<dyn WorkGate>,
    ) -> Result<Self, OrchestratorError> {
        let prompts =
            PromptTemplates::new().map_err(|e| OrchestratorError::Template(format!("{:#}", e)))?;
        Ok(Self {
            settings,
            registry,
            provisioner,
            gate,
            prompts: Arc::new(prompts),
            resume: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    pub fn with_resume(mut self, resume: ResumeState) -> Self {
        self.resume = Some(resume);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn settings(&self) -> &RoundSettings {
        &self.settings
    }

    fn bus(&self) -> &EventBus {
        self.registry.event_bus()
    }

    /// Run rounds until the gate reports no work, the round limit is
    /// reached, or the cancellation token fires.
    pub async fn run(&self) -> Result<RunOutcome, OrchestratorError> {
        self.prepare_shared_notes().await?;

        let first = self.resume.as_ref().map_or(1, |r| r.round.max(1));
        let last = match self.settings.mode {
            RoundMode::Arena => self.settings.max_rounds,
            RoundMode::Autopilot => first,
        };
        info!(
            mode = %self.settings.mode,
            first_round = first,
            last_round = last,
            workers = self.settings.worker_count,
            "Orchestrator starting"
        );

        let mut completed = 0;
        for round in first..=last {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(round));
            }

            let has_work = self
                .gate
                .has_remaining_items(&self.settings.repository, &self.settings.task_file)
                .await
                .map_err(|e| OrchestratorError::Gate(format!("{:#}", e)))?;
            if !has_work {
                info!(round, task_file = %self.settings.task_file, "No remaining work");
                self.bus()
                    .publish_round_event(RoundEvent::NoRemainingWork { round });
                self.clear_snapshot().await;
                return Ok(RunOutcome::NoRemainingWork { rounds: completed });
            }

            let resume = self.resume.as_ref().filter(|r| r.round == round);
            match self.run_round(round, resume).await {
                Ok(RoundEnd::Finished) => {
                    completed += 1;
                    metrics::counter!(
                        "arena_rounds_total",
                        "mode" => self.settings.mode.to_string()
                    )
                    .increment(1);
                }
                Ok(RoundEnd::Cancelled) => return Ok(self.cancelled(round)),
                Err(e) => {
                    error!(round, error = %e, "Round aborted");
                    self.bus().publish_round_event(RoundEvent::RoundAborted {
                        round,
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        self.clear_snapshot().await;
        info!(rounds = completed, "All rounds completed");
        Ok(RunOutcome::Completed { rounds: completed })
    }

    fn cancelled(&self, round: u32) -> RunOutcome {
        info!(round, "Run cancelled");
        self.bus().publish_round_event(RoundEvent::Cancelled { round });
        RunOutcome::Cancelled
    }

    async fn run_round(
        &self,
        round: u32,
        resume: Option<&ResumeState>,
    ) -> Result<RoundEnd, OrchestratorError> {
        let mut state = RoundState::new(round, self.settings.round_limit(), self.settings.mode);
        info!(round, max_rounds = state.max_rounds, resumed = resume.is_some(), "Round starting");
        self.bus().publish_round_event(RoundEvent::RoundStarted {
            round,
            max_rounds: state.max_rounds,
            mode: state.mode,
            started_at: state.started_at,
        });

        let result = self.execute_round(&mut state, resume).await;
        let cleanup = self.cleanup(&state).await;

        match (result, cleanup) {
            (Ok(end), Ok(removed_worktrees)) => {
                if end == RoundEnd::Finished {
                    info!(round, "Round completed");
                    self.bus().publish_round_event(RoundEvent::RoundCompleted {
                        round,
                        removed_worktrees,
                        completed_at: Utc::now(),
                    });
                }
                Ok(end)
            }
            (Ok(_), Err(e)) => Err(e),
            (Err(e), cleanup) => {
                if let Err(cleanup_error) = cleanup {
                    warn!(round, error = %cleanup_error, "Cleanup after failed round also failed");
                }
                Err(e)
            }
        }
    }

    async fn execute_round(
        &self,
        state: &mut RoundState,
        resume: Option<&ResumeState>,
    ) -> Result<RoundEnd, OrchestratorError> {
        self.provision(state, resume).await?;
        self.spawn_agents(state, resume).await?;
        self.save_snapshot(state).await;

        let end = match self.settings.mode {
            RoundMode::Arena => self.arena_phase(state).await?,
            RoundMode::Autopilot => self.autopilot_phase(state).await?,
        };
        if end == RoundEnd::Cancelled {
            return Ok(end);
        }

        self.stop_workers(state).await?;
        self.save_snapshot(state).await;
        self.supervisor_phase(state).await
    }

    async fn provision(
        &self,
        state: &mut RoundState,
        resume: Option<&ResumeState>,
    ) -> Result<(), OrchestratorError> {
        let mut to_create = Vec::new();
        for name in self.settings.worker_names() {
            let path = self.settings.worktree_path(state.round, &name);
            // recorded before creation so a partial failure is still cleaned up
            state.worktrees.push(path.clone());
            if resume.is_some() && path.exists() {
                info!(worker = %name, path = ?path, "Reusing worktree from interrupted round");
            } else {
                to_create.push(path);
            }
        }
        if to_create.is_empty() {
            return Ok(());
        }
        self.provisioner
            .create(&self.settings.repository, &to_create)
            .await
            .map_err(|e| OrchestratorError::Provision(format!("{:#}", e)))?;
        Ok(())
    }

    async fn spawn_agents(
        &self,
        state: &mut RoundState,
        resume: Option<&ResumeState>,
    ) -> Result<(), OrchestratorError> {
        let s = &self.settings;
        let round = state.round;
        let autopilot = s.mode == RoundMode::Autopilot;
        let restart_count = u32::from(resume.is_some());

        for name in s.worker_names() {
            let working_dir = s.worktree_path(round, &name);
            let log_path = s.log_path(round, &name);
            let context = WorkerContext {
                name: name.clone(),
                worker_count: s.worker_count,
                round,
                max_rounds: state.max_rounds,
                autopilot,
                phase_minutes: s.phase_duration.as_secs() / 60,
                task_file: s.task_file.clone(),
                working_dir: working_dir.clone(),
                log_path: log_path.clone(),
                notes_path: s.notes_path(),
            };
            let settings = AgentSettings::new(
                &name,
                AgentRole::Worker,
                s.worker_profile.clone(),
                &working_dir,
                &log_path,
            )
            .with_extra_dir(s.shared_dir())
            .with_heartbeat(s.worker_heartbeat)
            .with_max_restarts(s.max_restarts);
            let prompt = Arc::new(WorkerPrompt::new(self.prompts.clone(), context));
            let finished = resume.is_some_and(|r| r.is_completed(&name));

            let agent = Agent::new(settings, prompt, self.bus().clone())?
                .with_restart_count(if finished { 0 } else { restart_count });
            let agent = self.registry.add(agent);
            if finished {
                agent.mark_completed();
                info!(worker = %name, "Worker already completed; not restarting");
            }
            state.workers.push(RoundAgent {
                id: agent.id(),
                name,
                working_dir,
                log_path,
                finished,
            });
        }

        let log_path = s.log_path(round, SUPERVISOR_NAME);
        let context = SupervisorContext {
            worker_count: s.worker_count,
            round,
            max_rounds: state.max_rounds,
            autopilot,
            repository: s.repository.clone(),
            task_file: s.task_file.clone(),
            log_path: log_path.clone(),
            notes_path: s.notes_path(),
            workers: state
                .workers
                .iter()
                .map(|w| WorkerRef {
                    name: w.name.clone(),
                    worktree: w.working_dir.clone(),
                    log: w.log_path.clone(),
                })
                .collect(),
        };
        let settings = AgentSettings::new(
            SUPERVISOR_NAME,
            AgentRole::Supervisor,
            s.supervisor_profile.clone(),
            &s.repository,
            &log_path,
        )
        .with_extra_dir(s.worktrees_dir(round))
        .with_heartbeat(s.supervisor_heartbeat)
        .with_max_restarts(s.max_restarts);
        let prompt = Arc::new(SupervisorPrompt::new(self.prompts.clone(), context));
        let agent =
            Agent::new(settings, prompt, self.bus().clone())?.with_restart_count(restart_count);
        let supervisor = self.registry.add(agent);
        state.supervisor = Some(RoundAgent {
            id: supervisor.id(),
            name: SUPERVISOR_NAME.to_string(),
            working_dir: s.repository.clone(),
            log_path,
            finished: false,
        });

        for worker in state.workers.iter().filter(|w| !w.finished) {
            self.agent(worker.id)?.start().await?;
        }
        supervisor.start().await?;
        Ok(())
    }

    /// Fixed-length phase; ends early once every worker has finished.
    async fn arena_phase(&self, state: &mut RoundState) -> Result<RoundEnd, OrchestratorError> {
        let phase = self.settings.phase_duration;
        info!(round = state.round, duration = ?phase, "Work phase started");
        self.bus().publish_round_event(RoundEvent::PhaseStarted {
            round: state.round,
            phase: "work".to_string(),
            duration_secs: Some(phase.as_secs()),
        });

        let deadline = Instant::now() + phase;
        loop {
            self.poll(state).await;
            if state.all_workers_finished() {
                info!(round = state.round, "All workers finished before the phase ended");
                return Ok(RoundEnd::Finished);
            }
            if Instant::now() >= deadline {
                info!(round = state.round, "Work phase elapsed");
                return Ok(RoundEnd::Finished);
            }
            if !self.pause(Some(deadline)).await {
                return Ok(RoundEnd::Cancelled);
            }
        }
    }

    /// Workers run until they exit on their own (or the optional time box
    /// elapses).
    async fn autopilot_phase(&self, state: &mut RoundState) -> Result<RoundEnd, OrchestratorError> {
        let time_box = self.settings.autopilot_time_box;
        info!(round = state.round, time_box = ?time_box, "Autopilot phase started");
        self.bus().publish_round_event(RoundEvent::PhaseStarted {
            round: state.round,
            phase: "autopilot".to_string(),
            duration_secs: time_box.map(|d| d.as_secs()),
        });

        let deadline = time_box.map(|d| Instant::now() + d);
        loop {
            self.poll(state).await;
            if state.all_workers_finished() {
                info!(round = state.round, "All workers finished");
                return Ok(RoundEnd::Finished);
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    round = state.round,
                    "Autopilot time box elapsed; stopping remaining workers"
                );
                return Ok(RoundEnd::Finished);
            }
            if !self.pause(deadline).await {
                return Ok(RoundEnd::Cancelled);
            }
        }
    }

    /// One liveness pass over every agent, then record which workers are done.
    async fn poll(&self, state: &mut RoundState) {
        let round = state.round;
        let mut changed = false;
        for (id, outcome) in self.registry.tick_all().await {
            match outcome {
                Ok(TickOutcome::Completed { exit_code }) => {
                    if let Some(worker) = state.worker_mut(id) {
                        worker.finished = true;
                        changed = true;
                        info!(
                            round,
                            worker = %worker.name,
                            exit_code = ?exit_code,
                            "Worker completed"
                        );
                        self.bus().publish_round_event(RoundEvent::WorkerCompleted {
                            round,
                            agent_id: id,
                            name: worker.name.clone(),
                            exit_code,
                        });
                    }
                }
                Ok(TickOutcome::Restarted(reason)) => {
                    debug!(agent = %id, reason = %reason, "Agent restarted during poll");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(agent = %id, error = %e, "Liveness check failed; retrying next poll")
                }
            }
        }

        // retired or externally stopped workers count as finished too
        for worker in state.workers.iter_mut().filter(|w| !w.finished) {
            let done = self
                .registry
                .get(worker.id)
                .map_or(true, |agent| agent.status().is_terminal());
            if done {
                worker.finished = true;
                changed = true;
            }
        }
        if changed {
            self.save_snapshot(state).await;
        }
    }

    /// Stop every worker still running and close every worker log with a
    /// sentinel so the supervisor sees the phase is over: the stop sentinel
    /// for workers cut off here, the finished sentinel for those that had
    /// already exited.
    async fn stop_workers(&self, state: &mut RoundState) -> Result<(), OrchestratorError> {
        let mut stopped = 0;
        for worker in state.workers.iter_mut() {
            let agent = self.agent(worker.id)?;
            let marker = if agent.status().is_terminal() {
                FINISHED_SENTINEL
            } else {
                self.registry.stop(worker.id).await?;
                stopped += 1;
                STOP_SENTINEL
            };
            agent.append_log_marker(marker)?;
            worker.finished = true;
        }
        info!(round = state.round, stopped, "Workers stopped");
        self.bus().publish_round_event(RoundEvent::WorkersStopped {
            round: state.round,
            count: stopped,
        });
        Ok(())
    }

    /// Give the supervisor a bounded window to finish: evaluation and merge
    /// in arena mode, a closing summary in autopilot.
    async fn supervisor_phase(
        &self,
        state: &mut RoundState,
    ) -> Result<RoundEnd, OrchestratorError> {
        let Some(supervisor) = state.supervisor.as_mut() else {
            return Ok(RoundEnd::Finished);
        };
        let round = state.round;
        let agent = self.agent(supervisor.id)?;
        agent.enter_final_phase();

        let (phase, timeout) = match self.settings.mode {
            RoundMode::Arena => ("evaluate", self.settings.supervisor_timeout),
            RoundMode::Autopilot => ("closing", self.settings.closing_summary_wait),
        };
        info!(round, phase, timeout = ?timeout, "Supervisor phase started");
        self.bus().publish_round_event(RoundEvent::PhaseStarted {
            round,
            phase: phase.to_string(),
            duration_secs: Some(timeout.as_secs()),
        });

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            match agent.tick().await {
                Ok(TickOutcome::Completed { .. }) => {
                    supervisor.finished = true;
                    info!(round, "Supervisor finished");
                    self.bus().publish_round_event(RoundEvent::SupervisorFinished {
                        round,
                        agent_id: supervisor.id,
                    });
                    return Ok(RoundEnd::Finished);
                }
                Ok(_) => {}
                Err(e) => warn!(round, error = %e, "Supervisor liveness check failed"),
            }
            if agent.status().is_terminal() {
                supervisor.finished = true;
                return Ok(RoundEnd::Finished);
            }
            if Instant::now() >= deadline {
                let waited = started.elapsed();
                warn!(round, waited = ?waited, "Supervisor did not finish in time; stopping it");
                self.registry.stop(supervisor.id).await?;
                supervisor.finished = true;
                self.bus().publish_round_event(RoundEvent::SupervisorTimedOut {
                    round,
                    agent_id: supervisor.id,
                    waited_secs: waited.as_secs(),
                });
                return Ok(RoundEnd::Finished);
            }
            if !self.pause(Some(deadline)).await {
                return Ok(RoundEnd::Cancelled);
            }
        }
    }

    /// Remove every agent of the round and delete its worktrees.
    async fn cleanup(&self, state: &RoundState) -> Result<Vec<PathBuf>, OrchestratorError> {
        let ids = state.agent_ids();
        join_all(ids.iter().map(|id| self.registry.remove(*id))).await;
        debug!(round = state.round, agents = ids.len(), "Round agents removed");

        if state.worktrees.is_empty() {
            return Ok(Vec::new());
        }
        self.provisioner
            .delete(&self.settings.repository, &state.worktrees)
            .await
            .map_err(|e| OrchestratorError::Provision(format!("{:#}", e)))?;
        info!(round = state.round, count = state.worktrees.len(), "Worktrees deleted");
        Ok(state.worktrees.clone())
    }

    /// Sleep one poll interval (capped by `deadline`). `false` when cancelled.
    async fn pause(&self, deadline: Option<Instant>) -> bool {
        let mut wait = self.settings.poll_interval;
        if let Some(deadline) = deadline {
            wait = wait.min(deadline.saturating_duration_since(Instant::now()));
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(wait.max(Duration::from_millis(1))) => true,
        }
    }

    fn agent(&self, id: AgentId) -> Result<Arc<Agent>, OrchestratorError> {
        self.registry
            .get(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()).into())
    }

    /// The shared notes file is created once and only ever appended to.
    async fn prepare_shared_notes(&self) -> Result<(), OrchestratorError> {
        let path = self.settings.notes_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if file.metadata().await?.len() == 0 {
            file.write_all(b"# Shared notes\n\nAppend only. Never rewrite earlier entries.\n\n")
                .await?;
        }
        Ok(())
    }

    async fn save_snapshot(&self, state: &RoundState) {
        let path = self.settings.snapshot_path();
        let state = state.clone();
        let result = tokio::task::spawn_blocking(move || state.save(&path)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to save round snapshot"),
            Err(e) => warn!(error = %e, "Round snapshot task failed"),
        }
    }

    async fn clear_snapshot(&self) {
        let path = self.settings.snapshot_path();
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = ?path, error = %e, "Failed to remove round snapshot");
            }
        }
    }
}
