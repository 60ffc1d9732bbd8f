// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console sink: renders bus events as colored lines on stdout.

use colored::{ColoredString, Colorize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use arena_core::domain::agent::AgentId;
use arena_core::domain::events::{AgentEvent, RegistryEvent, RoundEvent};
use arena_core::domain::message::{Message, MessageKind};
use arena_core::infrastructure::event_bus::{DomainEvent, EventBusError, EventReceiver};

/// Longest message line printed before eliding.
const MAX_LINE_CHARS: usize = 200;

pub struct ConsoleSink {
    quiet: bool,
    names: HashMap<AgentId, String>,
}

impl ConsoleSink {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            names: HashMap::new(),
        }
    }

    /// Print events until `stop` fires, then flush whatever is queued.
    pub async fn run(mut self, mut events: EventReceiver, stop: CancellationToken) {
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => self.print(&event),
                    Err(EventBusError::Lagged(n)) => {
                        println!("{}", format!("… {} events skipped", n).dimmed());
                    }
                    Err(_) => return,
                },
            }
        }
        loop {
            match events.try_recv() {
                Ok(event) => self.print(&event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    fn print(&mut self, event: &DomainEvent) {
        if let Some(line) = self.format(event) {
            println!("{}", line);
        }
    }

    fn name(&self, id: AgentId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// One display line per event; `None` for events not worth printing.
    pub fn format(&mut self, event: &DomainEvent) -> Option<String> {
        match event {
            DomainEvent::Registry(event) => self.format_registry(event),
            DomainEvent::Agent(event) => self.format_agent(event),
            DomainEvent::Round(event) => Some(format_round(event)),
        }
    }

    fn format_registry(&mut self, event: &RegistryEvent) -> Option<String> {
        match event {
            RegistryEvent::Added { agent_id, name, .. } => {
                self.names.insert(*agent_id, name.clone());
                None
            }
            RegistryEvent::Removed { agent_id, .. } => {
                self.names.remove(agent_id);
                None
            }
            RegistryEvent::Stopped { name, .. } => {
                Some(format!("■ {} stopped", name).yellow().to_string())
            }
        }
    }

    fn format_agent(&mut self, event: &AgentEvent) -> Option<String> {
        match event {
            AgentEvent::Started {
                agent_id,
                name,
                role,
                pid,
                restart_count,
                ..
            } => {
                self.names.insert(*agent_id, name.clone());
                let pid = pid.map_or_else(|| "?".to_string(), |p| p.to_string());
                let line = if *restart_count > 0 {
                    format!(
                        "▶ {} ({}) started, pid {}, restart #{}",
                        name, role, pid, restart_count
                    )
                } else {
                    format!("▶ {} ({}) started, pid {}", name, role, pid)
                };
                Some(line.green().to_string())
            }
            AgentEvent::MessageRetained { agent_id, message } if !self.quiet => {
                Some(format_message(&self.name(*agent_id), message))
            }
            AgentEvent::Restarted {
                agent_id,
                reason,
                restart_count,
                ..
            } => Some(
                format!(
                    "↻ {} restarted ({}), restart #{}",
                    self.name(*agent_id),
                    reason,
                    restart_count
                )
                .yellow()
                .to_string(),
            ),
            AgentEvent::Exited {
                agent_id,
                exit_code,
                ..
            } => {
                let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                Some(
                    format!("  {} exited ({})", self.name(*agent_id), code)
                        .dimmed()
                        .to_string(),
                )
            }
            AgentEvent::Retired {
                agent_id,
                restart_count,
                ..
            } => Some(
                format!(
                    "✗ {} retired after {} restarts",
                    self.name(*agent_id),
                    restart_count
                )
                .red()
                .to_string(),
            ),
            _ => None,
        }
    }
}

fn format_round(event: &RoundEvent) -> String {
    match event {
        RoundEvent::RoundStarted {
            round,
            max_rounds,
            mode,
            ..
        } => format!("══ Round {}/{} ({}) ══", round, max_rounds, mode)
            .bold()
            .to_string(),
        RoundEvent::NoRemainingWork { round } => {
            format!("No remaining work before round {}", round).green().to_string()
        }
        RoundEvent::PhaseStarted {
            round,
            phase,
            duration_secs,
        } => {
            let line = match duration_secs {
                Some(secs) => format!("── Round {}: {} phase ({}s) ──", round, phase, secs),
                None => format!("── Round {}: {} phase ──", round, phase),
            };
            line.bold().to_string()
        }
        RoundEvent::WorkerCompleted {
            name, exit_code, ..
        } => {
            let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            format!("✓ {} finished (exit {})", name, code).green().to_string()
        }
        RoundEvent::WorkersStopped { count, .. } => {
            format!("■ {} worker(s) stopped", count).yellow().to_string()
        }
        RoundEvent::SupervisorFinished { round, .. } => {
            format!("✓ Supervisor finished round {}", round).green().to_string()
        }
        RoundEvent::SupervisorTimedOut { waited_secs, .. } => {
            format!("⚠ Supervisor stopped after {}s", waited_secs).yellow().to_string()
        }
        RoundEvent::RoundCompleted {
            round,
            removed_worktrees,
            ..
        } => format!(
            "✓ Round {} completed, {} worktree(s) removed",
            round,
            removed_worktrees.len()
        )
        .green()
        .bold()
        .to_string(),
        RoundEvent::RoundAborted { round, error } => {
            format!("✗ Round {} aborted: {}", round, error).red().bold().to_string()
        }
        RoundEvent::Cancelled { round } => {
            format!("Cancelled during round {}", round).yellow().to_string()
        }
    }
}

fn format_message(agent: &str, message: &Message) -> String {
    let first_line = message.content().lines().next().unwrap_or_default();
    let mut text: String = first_line.chars().take(MAX_LINE_CHARS).collect();
    if text.len() < message.content().len() {
        text.push('…');
    }
    let body: ColoredString = match message.kind() {
        MessageKind::Say => text.normal(),
        MessageKind::Do => text.cyan(),
        MessageKind::See => text.dimmed(),
    };
    format!("{} {} {}", format!("[{}]", agent).bold(), message.kind(), body)
}
