// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `arena run`: load configuration, build the orchestrator and run it until
//! the work is done or the user interrupts.
//!
//! Exit status is zero on completion and on Ctrl+C (after cleanup), non-zero
//! on any startup or round failure.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use arena_core::application::registry::AgentRegistry;
use arena_core::domain::adapter::{AgentProfile, Vendor};
use arena_core::domain::config::{ArenaConfig, RoundMode};
use arena_core::infrastructure::event_bus::EventBus;
use arena_swarm::application::orchestrator::RoundOrchestrator;
use arena_swarm::domain::round::{ResumeState, RoundSettings, RoundState, RunOutcome};
use arena_swarm::infrastructure::{GitWorktreeProvisioner, MarkdownTodoGate};

use crate::console::ConsoleSink;

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Round mode (arena, autopilot)
    #[arg(long)]
    pub mode: Option<RoundMode>,

    /// Number of worker agents
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum number of rounds (arena mode)
    #[arg(long)]
    pub rounds: Option<u32>,

    /// Repository to work on
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// CLI used by workers (claude, codex, gemini, cursor)
    #[arg(long)]
    pub worker_vendor: Option<Vendor>,

    /// CLI used by the supervisor
    #[arg(long)]
    pub supervisor_vendor: Option<Vendor>,

    /// Length of the arena work phase in minutes
    #[arg(long, value_name = "MINUTES")]
    pub phase: Option<u64>,

    /// Resume an interrupted round instead of starting at round 1
    #[arg(long, value_name = "N")]
    pub resume_round: Option<u32>,

    /// Workers that already finished the resumed round (comma separated)
    #[arg(long, value_delimiter = ',', requires = "resume_round")]
    pub completed: Vec<String>,

    /// Resume from the snapshot left by an interrupted run
    #[arg(long, conflicts_with = "resume_round")]
    pub resume: bool,

    /// Only print round and lifecycle events, not agent messages
    #[arg(short, long)]
    pub quiet: bool,
}

impl RunArgs {
    /// Flags take precedence over the config file and environment.
    pub fn apply(&self, config: &mut ArenaConfig) {
        let spec = &mut config.spec;
        if let Some(mode) = self.mode {
            spec.mode = mode;
        }
        if let Some(workers) = self.workers {
            spec.workers.count = workers;
        }
        if let Some(rounds) = self.rounds {
            spec.max_rounds = rounds;
        }
        if let Some(repo) = &self.repo {
            spec.repository = repo.clone();
        }
        if let Some(vendor) = self.worker_vendor {
            if vendor != spec.workers.profile.vendor {
                spec.workers.profile = AgentProfile::new(vendor);
            }
        }
        if let Some(vendor) = self.supervisor_vendor {
            if vendor != spec.supervisor.profile.vendor {
                spec.supervisor.profile = AgentProfile::new(vendor);
            }
        }
        if let Some(minutes) = self.phase {
            spec.timing.phase_duration = Duration::from_secs(minutes * 60);
        }
    }

    fn resume_state(&self, settings: &RoundSettings) -> Result<Option<ResumeState>> {
        if let Some(round) = self.resume_round {
            return Ok(Some(ResumeState::new(round, self.completed.clone())));
        }
        if !self.resume {
            return Ok(None);
        }
        let path = settings.snapshot_path();
        if !path.exists() {
            warn!(path = ?path, "No round snapshot found; starting fresh");
            return Ok(None);
        }
        let state = RoundState::load(&path)?;
        Ok(Some(ResumeState::from(&state)))
    }
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config =
        ArenaConfig::load_or_default(config_path).context("Failed to load configuration")?;
    args.apply(&mut config);
    config
        .validate()
        .context("Configuration validation failed")?;

    let settings = RoundSettings::from_config(&config);
    let resume = args.resume_state(&settings)?;

    println!(
        "{} {} mode, {} workers ({}), supervisor ({}), repository {}",
        "Arena".bold(),
        settings.mode,
        settings.worker_count,
        settings.worker_profile.vendor,
        settings.supervisor_profile.vendor,
        settings.repository.display()
    );
    if let Some(resume) = &resume {
        println!(
            "  Resuming round {} (completed: {})",
            resume.round,
            if resume.completed_workers.is_empty() {
                "none".to_string()
            } else {
                resume.completed_workers.join(", ")
            }
        );
    }

    let bus = EventBus::with_default_capacity();
    let registry = Arc::new(AgentRegistry::new(bus.clone()));
    let cancel = CancellationToken::new();

    let provisioner = GitWorktreeProvisioner::new().excluding(settings.state_dir.clone());
    let mut orchestrator = RoundOrchestrator::new(
        settings,
        registry,
        Arc::new(provisioner),
        Arc::new(MarkdownTodoGate),
    )?
    .with_cancellation(cancel.clone());
    if let Some(resume) = resume {
        orchestrator = orchestrator.with_resume(resume);
    }

    let sink_stop = CancellationToken::new();
    let sink = tokio::spawn(ConsoleSink::new(args.quiet).run(bus.subscribe(), sink_stop.clone()));
    let signals = tokio::spawn(cancel_on_signal(cancel));

    let result = orchestrator.run().await;

    signals.abort();
    sink_stop.cancel();
    let _ = sink.await;

    match result.context("Orchestration failed")? {
        RunOutcome::Completed { rounds } => {
            println!("{}", format!("✓ Completed {} round(s)", rounds).green());
        }
        RunOutcome::NoRemainingWork { rounds } => {
            println!(
                "{}",
                format!("✓ No remaining work after {} round(s)", rounds).green()
            );
        }
        RunOutcome::Cancelled => {
            println!("{}", "Cancelled; all agents stopped and worktrees removed".yellow());
        }
    }
    Ok(())
}

/// First Ctrl+C / SIGTERM cancels the run; a second Ctrl+C exits immediately.
async fn cancel_on_signal(cancel: CancellationToken) {
    wait_for_signal().await;
    info!("Shutdown requested; stopping agents");
    eprintln!("{}", "Stopping agents... (Ctrl+C again to force)".yellow());
    cancel.cancel();

    if signal::ctrl_c().await.is_ok() {
        eprintln!("{}", "Forced exit".red());
        std::process::exit(130);
    }
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
