// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Lifecycle
//!
//! An [`Agent`] exclusively owns one CLI process, the [`LineStreamReader`]
//! following its log, and the [`ProtocolAdapter`] translating that log.
//!
//! ```text
//! NotStarted ──start──▶ Running ──exit / stall──▶ Crashed | IdleTimeout ──▶ Restarting ──▶ Running
//!                          │                                    │
//!                          ├──clean exit (no restart)──▶ Completed
//!                          ├──stop──▶ Stopped                   └──cap exceeded──▶ Retired
//! ```
//!
//! A failed spawn leaves the agent `Crashed` without a process. Later ticks
//! retry with exponential backoff; after [`MAX_SPAWN_FAILURES`] consecutive
//! failures the agent is retired.
//!
//! Liveness is checked by [`Agent::tick`], which the orchestrator calls on
//! each poll. The reader task runs for the agent's whole life; it is only
//! stopped by [`Agent::shutdown`], so callers can keep reading output after
//! [`Agent::stop`].

use crate::domain::adapter::ProtocolAdapter;
use crate::domain::agent::{
    restart_marker, AgentId, AgentRole, AgentSettings, AgentStatus, PromptSource, RestartReason,
    TickOutcome, MAX_SPAWN_FAILURES,
};
use crate::domain::events::AgentEvent;
use crate::domain::message::Message;
use crate::domain::runtime::{ProcessSpec, RuntimeError};
use crate::infrastructure::adapters::create_adapter;
use crate::infrastructure::agent_log::AgentLog;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::line_reader::LineStreamReader;
use crate::infrastructure::process::AgentProcess;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Bounded display buffer size.
pub const RETAINED_CAPACITY: usize = 1000;

/// How long a killed process gets to be reaped.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// State shared with the reader task.
struct OutputState {
    adapter: Box<dyn ProtocolAdapter>,
    last_activity: Instant,
    last_activity_at: DateTime<Utc>,
    retained: VecDeque<Message>,
}

impl OutputState {
    fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.last_activity_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy)]
struct Lifecycle {
    status: AgentStatus,
    restart_count: u32,
    final_phase: bool,
    exit_code: Option<i32>,
    spawn_failures: u32,
    retry_at: Option<Instant>,
}

#[derive(Default)]
struct Handles {
    process: Option<AgentProcess>,
    reader: Option<LineStreamReader>,
}

pub struct Agent {
    id: AgentId,
    settings: AgentSettings,
    prompt: Arc<dyn PromptSource>,
    bus: EventBus,
    log: Arc<AgentLog>,
    output: Arc<Mutex<OutputState>>,
    lifecycle: Mutex<Lifecycle>,
    // held across awaits: spawning and terminating are serialized per agent
    handles: tokio::sync::Mutex<Handles>,
}

impl Agent {
    pub fn new(
        settings: AgentSettings,
        prompt: Arc<dyn PromptSource>,
        bus: EventBus,
    ) -> Result<Self, RuntimeError> {
        let adapter = create_adapter(&settings.profile)?;
        let log = Arc::new(AgentLog::open(&settings.log_path)?);
        Ok(Self {
            id: AgentId::new(),
            settings,
            prompt,
            bus,
            log,
            output: Arc::new(Mutex::new(OutputState {
                adapter,
                last_activity: Instant::now(),
                last_activity_at: Utc::now(),
                retained: VecDeque::new(),
            })),
            lifecycle: Mutex::new(Lifecycle {
                status: AgentStatus::NotStarted,
                restart_count: 0,
                final_phase: false,
                exit_code: None,
                spawn_failures: 0,
                retry_at: None,
            }),
            handles: tokio::sync::Mutex::new(Handles::default()),
        })
    }

    /// Start with a non-zero restart count, e.g. when resuming a round.
    pub fn with_restart_count(self, restart_count: u32) -> Self {
        self.lifecycle.lock().restart_count = restart_count;
        self
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn role(&self) -> AgentRole {
        self.settings.role
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    pub fn status(&self) -> AgentStatus {
        self.lifecycle.lock().status
    }

    pub fn restart_count(&self) -> u32 {
        self.lifecycle.lock().restart_count
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.lifecycle.lock().exit_code
    }

    pub fn is_running(&self) -> bool {
        self.status() == AgentStatus::Running
    }

    /// Time of the most recent parsed message (or of the latest start).
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.output.lock().last_activity_at
    }

    /// Snapshot of the display buffer, oldest first.
    pub fn retained_messages(&self) -> Vec<Message> {
        self.output.lock().retained.iter().cloned().collect()
    }

    /// Spawn the process and begin following its log.
    pub async fn start(&self) -> Result<(), RuntimeError> {
        let mut handles = self.handles.lock().await;
        if let Some(process) = handles.process.as_mut() {
            if process.try_exit().is_none() {
                return Err(RuntimeError::AlreadyRunning(self.settings.name.clone()));
            }
        }
        self.spawn_locked(&mut handles)
    }

    /// Liveness check: restart on crash or stall, complete on a clean exit the
    /// role does not restart from.
    pub async fn tick(&self) -> Result<TickOutcome, RuntimeError> {
        let mut handles = self.handles.lock().await;
        let (status, final_phase, retry_at) = {
            let lc = self.lifecycle.lock();
            (lc.status, lc.final_phase, lc.retry_at)
        };

        match status {
            AgentStatus::Running => {}
            // a previous spawn failed
            AgentStatus::Crashed | AgentStatus::IdleTimeout if handles.process.is_none() => {
                if retry_at.is_some_and(|at| Instant::now() < at) {
                    return Ok(TickOutcome::Idle);
                }
                return self
                    .restart_locked(&mut handles, RestartReason::SpawnFailed)
                    .await;
            }
            _ => return Ok(TickOutcome::Idle),
        }

        let Some(process) = handles.process.as_mut() else {
            return Ok(TickOutcome::Idle);
        };

        if let Some(exit_code) = process.try_exit() {
            self.bus.publish_agent_event(AgentEvent::Exited {
                agent_id: self.id,
                exit_code,
                exited_at: Utc::now(),
            });
            self.lifecycle.lock().exit_code = exit_code;

            if !self.settings.role.restarts_on_exit(exit_code, final_phase) {
                if let Some(mut process) = handles.process.take() {
                    process.terminate(TERMINATE_GRACE).await;
                }
                self.lifecycle.lock().status = AgentStatus::Completed;
                info!(agent = %self.settings.name, exit_code = ?exit_code, "Agent finished");
                return Ok(TickOutcome::Completed { exit_code });
            }

            let reason = if exit_code == Some(0) {
                RestartReason::Exited
            } else {
                RestartReason::Crashed { exit_code }
            };
            self.lifecycle.lock().status = AgentStatus::Crashed;
            return self.restart_locked(&mut handles, reason).await;
        }

        let idle = self.output.lock().last_activity.elapsed();
        if idle > self.settings.heartbeat_timeout {
            self.lifecycle.lock().status = AgentStatus::IdleTimeout;
            let reason = RestartReason::IdleTimeout {
                idle_secs: idle.as_secs(),
            };
            return self.restart_locked(&mut handles, reason).await;
        }

        Ok(TickOutcome::Alive)
    }

    /// Kill the current process (if any) and start a new one with an
    /// incremented restart count.
    pub async fn restart(&self, reason: RestartReason) -> Result<TickOutcome, RuntimeError> {
        let mut handles = self.handles.lock().await;
        self.restart_locked(&mut handles, reason).await
    }

    /// Terminate without restarting. The reader keeps running until
    /// [`shutdown`](Self::shutdown).
    pub async fn stop(&self) {
        let mut handles = self.handles.lock().await;
        if let Some(mut process) = handles.process.take() {
            process.terminate(TERMINATE_GRACE).await;
        }
        {
            let mut lc = self.lifecycle.lock();
            if !matches!(lc.status, AgentStatus::Completed | AgentStatus::Retired) {
                lc.status = AgentStatus::Stopped;
            }
        }
        info!(agent = %self.settings.name, "Agent stopped");
        self.bus.publish_agent_event(AgentEvent::Stopped {
            agent_id: self.id,
            stopped_at: Utc::now(),
        });
    }

    /// Stop the process and the log reader.
    pub async fn shutdown(&self) {
        self.stop().await;
        let reader = self.handles.lock().await.reader.take();
        if let Some(mut reader) = reader {
            reader.stop().await;
        }
    }

    /// Mark a not-yet-started agent as already finished (resume path).
    pub fn mark_completed(&self) {
        let mut lc = self.lifecycle.lock();
        if lc.status == AgentStatus::NotStarted {
            lc.status = AgentStatus::Completed;
        }
    }

    /// From now on a clean exit means "finished" for every role.
    pub fn enter_final_phase(&self) {
        self.lifecycle.lock().final_phase = true;
    }

    /// Append a plain-text marker (e.g. the stop sentinel) to the log.
    pub fn append_log_marker(&self, marker: &str) -> Result<(), RuntimeError> {
        self.log.append_line(marker)?;
        Ok(())
    }

    fn spawn_locked(&self, handles: &mut Handles) -> Result<(), RuntimeError> {
        let result = self.try_spawn(handles);
        if let Err(e) = &result {
            self.spawn_failed(e);
        }
        result
    }

    fn spawn_failed(&self, error: &RuntimeError) {
        let (failures, restart_count) = {
            let mut lc = self.lifecycle.lock();
            lc.spawn_failures += 1;
            (lc.spawn_failures, lc.restart_count)
        };

        if failures >= MAX_SPAWN_FAILURES {
            warn!(
                agent = %self.settings.name,
                failures,
                error = %error,
                "Agent keeps failing to spawn, retiring"
            );
            self.retire(restart_count);
            return;
        }

        let delay = self.settings.spawn_retry_delay(failures);
        {
            let mut lc = self.lifecycle.lock();
            lc.status = AgentStatus::Crashed;
            lc.retry_at = Some(Instant::now() + delay);
        }
        warn!(
            agent = %self.settings.name,
            failures,
            retry_in = ?delay,
            error = %error,
            "Agent failed to spawn"
        );
    }

    fn retire(&self, restart_count: u32) {
        self.lifecycle.lock().status = AgentStatus::Retired;
        self.bus.publish_agent_event(AgentEvent::Retired {
            agent_id: self.id,
            restart_count,
            retired_at: Utc::now(),
        });
    }

    fn try_spawn(&self, handles: &mut Handles) -> Result<(), RuntimeError> {
        let restart_count = self.lifecycle.lock().restart_count;
        let prompt = self
            .prompt
            .render(restart_count)
            .map_err(|e| RuntimeError::Template(e.to_string()))?;

        let spec = {
            let mut output = self.output.lock();
            output.adapter.reset();
            let adapter = &output.adapter;
            let args = adapter.build_arguments(
                &prompt,
                self.settings.profile.model.as_deref(),
                self.settings.extra_dir.as_deref(),
            );
            let spec = ProcessSpec::new(adapter.program(), &self.settings.working_dir).args(args);
            if adapter.uses_stdin() {
                spec.stdin(prompt)
            } else {
                spec
            }
        };

        let process = AgentProcess::spawn(&spec, self.log.clone())?;
        let pid = process.pid();
        handles.process = Some(process);
        self.output.lock().touch();
        {
            let mut lc = self.lifecycle.lock();
            lc.status = AgentStatus::Running;
            lc.exit_code = None;
            lc.spawn_failures = 0;
            lc.retry_at = None;
        }

        if handles.reader.is_none() {
            let mut reader = LineStreamReader::new(self.log.path());
            reader.start(self.line_handler());
            handles.reader = Some(reader);
        }

        info!(
            agent = %self.settings.name,
            role = %self.settings.role,
            pid = ?pid,
            restart_count,
            command = %spec.display(),
            "Agent started"
        );
        self.bus.publish_agent_event(AgentEvent::Started {
            agent_id: self.id,
            name: self.settings.name.clone(),
            role: self.settings.role,
            pid,
            restart_count,
            started_at: Utc::now(),
        });
        Ok(())
    }

    async fn restart_locked(
        &self,
        handles: &mut Handles,
        reason: RestartReason,
    ) -> Result<TickOutcome, RuntimeError> {
        let next = self.lifecycle.lock().restart_count + 1;

        if let Some(max) = self.settings.max_restarts {
            if next > max {
                if let Some(mut process) = handles.process.take() {
                    process.terminate(TERMINATE_GRACE).await;
                }
                warn!(
                    agent = %self.settings.name,
                    max_restarts = max,
                    reason = %reason,
                    "Agent exceeded restart cap, retiring"
                );
                self.retire(next - 1);
                return Ok(TickOutcome::Retired);
            }
        }

        {
            let mut lc = self.lifecycle.lock();
            lc.restart_count = next;
            lc.status = AgentStatus::Restarting;
        }
        self.log.append_line(&restart_marker(Utc::now()))?;
        if let Some(mut process) = handles.process.take() {
            process.terminate(TERMINATE_GRACE).await;
        }

        metrics::counter!(
            "arena_agent_restarts_total",
            "role" => self.settings.role.as_str(),
            "reason" => reason.label()
        )
        .increment(1);
        warn!(
            agent = %self.settings.name,
            reason = %reason,
            restart_count = next,
            "Restarting agent"
        );
        self.bus.publish_agent_event(AgentEvent::Restarted {
            agent_id: self.id,
            reason,
            restart_count: next,
            restarted_at: Utc::now(),
        });

        self.spawn_locked(handles)?;
        Ok(TickOutcome::Restarted(reason))
    }

    fn line_handler(&self) -> impl FnMut(String) + Send + 'static {
        let output = self.output.clone();
        let bus = self.bus.clone();
        let agent_id = self.id;
        let role = self.settings.role;

        move |line: String| {
            let parsed: Vec<(Message, bool)> = {
                let mut state = output.lock();
                let messages = state.adapter.parse(&line);
                if !messages.is_empty() {
                    state.touch();
                }
                messages
                    .into_iter()
                    .map(|message| {
                        let keep = role.retains(message.kind());
                        if keep {
                            if state.retained.len() == RETAINED_CAPACITY {
                                state.retained.pop_front();
                            }
                            state.retained.push_back(message.clone());
                        }
                        (message, keep)
                    })
                    .collect()
            };

            for (message, keep) in parsed {
                metrics::counter!(
                    "arena_agent_messages_total",
                    "role" => role.as_str(),
                    "kind" => message.kind().to_string()
                )
                .increment(1);
                if keep {
                    bus.publish_agent_event(AgentEvent::MessageRetained {
                        agent_id,
                        message: message.clone(),
                    });
                }
                bus.publish_agent_event(AgentEvent::MessageReceived {
                    agent_id,
                    message,
                    received_at: Utc::now(),
                });
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.settings.name)
            .field("role", &self.settings.role)
            .field("status", &self.status())
            .finish()
    }
}
