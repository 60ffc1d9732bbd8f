// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
#![cfg(unix)]

use anyhow::Result;
use arena_core::application::registry::AgentRegistry;
use arena_core::domain::adapter::{AgentProfile, CustomCommand, PromptMode};
use arena_core::domain::agent::{FINISHED_SENTINEL, STOP_SENTINEL};
use arena_core::domain::config::ArenaConfig;
use arena_core::domain::events::{AgentEvent, RegistryEvent, RoundEvent};
use arena_core::infrastructure::event_bus::{DomainEvent, EventBus, EventReceiver};
use arena_swarm::application::orchestrator::{OrchestratorError, RoundOrchestrator};
use arena_swarm::domain::round::{ResumeState, RoundMode, RoundSettings, RunOutcome};
use arena_swarm::domain::workspace::{WorkGate, WorktreeProvisioner};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct FakeProvisioner {
    created: Mutex<Vec<PathBuf>>,
    deleted: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl WorktreeProvisioner for FakeProvisioner {
    async fn create(&self, _repo: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        for path in paths {
            std::fs::create_dir_all(path)?;
        }
        self.created.lock().unwrap().extend(paths.iter().cloned());
        Ok(paths.to_vec())
    }

    async fn delete(&self, _repo: &Path, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            if path.exists() {
                std::fs::remove_dir_all(path)?;
            }
        }
        self.deleted.lock().unwrap().extend(paths.iter().cloned());
        Ok(())
    }
}

/// Reports work for the first `rounds` checks.
struct FakeGate {
    remaining: AtomicU32,
}

impl FakeGate {
    fn new(rounds: u32) -> Self {
        Self {
            remaining: AtomicU32::new(rounds),
        }
    }
}

#[async_trait]
impl WorkGate for FakeGate {
    async fn has_remaining_items(&self, _repo: &Path, _task_file: &str) -> Result<bool> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Ok(false);
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Ok(true)
    }
}

fn sh(script: &str) -> AgentProfile {
    AgentProfile::custom(CustomCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        prompt_mode: PromptMode::Stdin,
    })
}

fn settings(repo: &Path, mode: RoundMode, worker: &str, supervisor: &str) -> RoundSettings {
    let mut config = ArenaConfig::default();
    config.spec.mode = mode;
    config.spec.max_rounds = 1;
    config.spec.repository = repo.to_path_buf();
    config.spec.workers.count = 2;
    config.spec.workers.profile = sh(worker);
    config.spec.supervisor.profile = sh(supervisor);
    config.spec.timing.phase_duration = Duration::from_millis(600);
    config.spec.timing.supervisor_timeout = Duration::from_secs(10);
    config.spec.timing.poll_interval = Duration::from_millis(50);
    config.spec.timing.closing_summary_wait = Duration::from_millis(300);
    RoundSettings::from_config(&config)
}

struct Harness {
    repo: TempDir,
    registry: Arc<AgentRegistry>,
    provisioner: Arc<FakeProvisioner>,
    events: EventReceiver,
}

impl Harness {
    fn new() -> Self {
        let bus = EventBus::new(4096);
        let events = bus.subscribe();
        Self {
            repo: TempDir::new().unwrap(),
            registry: Arc::new(AgentRegistry::new(bus)),
            provisioner: Arc::new(FakeProvisioner::default()),
            events,
        }
    }

    fn orchestrator(&self, settings: RoundSettings, gate: FakeGate) -> RoundOrchestrator {
        RoundOrchestrator::new(
            settings,
            self.registry.clone(),
            self.provisioner.clone(),
            Arc::new(gate),
        )
        .unwrap()
    }

    fn drain(&mut self) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}

fn round_events(events: &[DomainEvent]) -> Vec<RoundEvent> {
    events
        .iter()
        .filter_map(|e| match e {
            DomainEvent::Round(r) => Some(r.clone()),
            _ => None,
        })
        .collect()
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

#[tokio::test]
async fn no_remaining_work_registers_no_agents() {
    let mut h = Harness::new();
    let s = settings(h.repo.path(), RoundMode::Arena, "exit 0", "exit 0");
    let outcome = h.orchestrator(s, FakeGate::new(0)).run().await.unwrap();

    assert_eq!(outcome, RunOutcome::NoRemainingWork { rounds: 0 });
    assert!(h.registry.is_empty());
    assert!(h.provisioner.created.lock().unwrap().is_empty());
    let events = h.drain();
    assert!(!events
        .iter()
        .any(|e| matches!(e, DomainEvent::Registry(RegistryEvent::Added { .. }))));
    let rounds = round_events(&events);
    assert!(matches!(
        rounds.as_slice(),
        [RoundEvent::NoRemainingWork { round: 1 }]
    ));
}

#[tokio::test]
async fn arena_round_stops_workers_and_removes_worktrees() {
    let mut h = Harness::new();
    let layout = settings(h.repo.path(), RoundMode::Arena, "", "");
    let log1 = layout.log_path(1, "worker-1");
    let log2 = layout.log_path(1, "worker-2");
    // the supervisor finishes once both workers carry the stop sentinel
    let supervisor = format!(
        "echo watching; for f in '{}' '{}'; do until grep -q 'has been stopped' \"$f\" 2>/dev/null; do sleep 0.05; done; done; echo merged",
        log1.display(),
        log2.display()
    );
    let s = settings(h.repo.path(), RoundMode::Arena, "echo working; sleep 30", &supervisor);
    let worktrees = vec![s.worktree_path(1, "worker-1"), s.worktree_path(1, "worker-2")];

    let outcome = h.orchestrator(s, FakeGate::new(1)).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed { rounds: 1 });

    for log in [&log1, &log2] {
        let text = read(log);
        assert!(text.contains("working"), "{}", text);
        assert!(text.trim_end().ends_with(STOP_SENTINEL), "{}", text);
    }
    assert!(worktrees.iter().all(|p| !p.exists()));
    assert_eq!(*h.provisioner.deleted.lock().unwrap(), worktrees);
    assert!(h.registry.is_empty());

    let rounds = round_events(&h.drain());
    assert!(rounds
        .iter()
        .any(|e| matches!(e, RoundEvent::WorkersStopped { round: 1, count: 2 })));
    assert!(rounds
        .iter()
        .any(|e| matches!(e, RoundEvent::SupervisorFinished { round: 1, .. })));
    assert!(rounds.iter().any(|e| matches!(
        e,
        RoundEvent::RoundCompleted { round: 1, removed_worktrees, .. }
            if removed_worktrees.len() == 2
    )));
}

#[tokio::test]
async fn autopilot_clean_exit_is_not_restarted() {
    let mut h = Harness::new();
    let worker = r#"case "$(basename "$(pwd -P)")" in
        worker-1) echo done-early; exit 0 ;;
        *) echo busy; sleep 1; echo done-late ;;
    esac"#;
    let s = settings(h.repo.path(), RoundMode::Autopilot, worker, "echo monitoring; sleep 30");
    let log1 = s.log_path(1, "worker-1");

    let outcome = h.orchestrator(s, FakeGate::new(1)).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed { rounds: 1 });

    let text = read(&log1);
    assert_eq!(text.matches("done-early").count(), 1, "{}", text);
    assert!(!text.contains("<<agent restarted"), "{}", text);
    // exited on its own, so it is closed as finished rather than stopped
    assert!(text.trim_end().ends_with(FINISHED_SENTINEL), "{}", text);
    assert!(!text.contains(STOP_SENTINEL), "{}", text);

    let events = h.drain();
    let restarts = events
        .iter()
        .filter(|e| matches!(e, DomainEvent::Agent(AgentEvent::Restarted { .. })))
        .count();
    assert_eq!(restarts, 0);

    let rounds = round_events(&events);
    let completed: Vec<(String, Option<i32>)> = rounds
        .iter()
        .filter_map(|e| match e {
            RoundEvent::WorkerCompleted { name, exit_code, .. } => Some((name.clone(), *exit_code)),
            _ => None,
        })
        .collect();
    assert_eq!(
        completed,
        vec![
            ("worker-1".to_string(), Some(0)),
            ("worker-2".to_string(), Some(0))
        ]
    );

    // the supervisor outlives every worker and is only stopped afterwards
    let last_worker = rounds
        .iter()
        .position(|e| matches!(e, RoundEvent::WorkerCompleted { name, .. } if name == "worker-2"))
        .unwrap();
    let supervisor_stop = rounds
        .iter()
        .position(|e| matches!(e, RoundEvent::SupervisorTimedOut { .. }))
        .unwrap();
    assert!(last_worker < supervisor_stop);
}

#[tokio::test]
async fn cancellation_tears_down_the_round() {
    let mut h = Harness::new();
    let mut s = settings(h.repo.path(), RoundMode::Arena, "echo working; sleep 30", "sleep 30");
    s.phase_duration = Duration::from_secs(60);
    let worktrees = vec![s.worktree_path(1, "worker-1"), s.worktree_path(1, "worker-2")];

    let orchestrator = h.orchestrator(s, FakeGate::new(1));
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        token.cancel();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(20), orchestrator.run())
        .await
        .expect("cancellation must not hang")
        .unwrap();
    assert_eq!(outcome, RunOutcome::Cancelled);
    assert!(h.registry.is_empty());
    assert!(worktrees.iter().all(|p| !p.exists()));

    let rounds = round_events(&h.drain());
    assert!(rounds.iter().any(|e| matches!(e, RoundEvent::Cancelled { round: 1 })));
    assert!(!rounds.iter().any(|e| matches!(e, RoundEvent::RoundCompleted { .. })));
}

#[tokio::test]
async fn failed_round_cleans_up_before_returning() {
    let mut h = Harness::new();
    let mut s = settings(h.repo.path(), RoundMode::Arena, "exit 0", "sleep 30");
    s.worker_profile = AgentProfile::custom(CustomCommand {
        program: "/nonexistent/agent-cli".to_string(),
        args: vec![],
        prompt_mode: PromptMode::Stdin,
    });
    let worktrees = vec![s.worktree_path(1, "worker-1"), s.worktree_path(1, "worker-2")];

    let err = h.orchestrator(s, FakeGate::new(1)).run().await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Agent(_)), "{:?}", err);
    assert!(h.registry.is_empty());
    assert!(worktrees.iter().all(|p| !p.exists()));
    assert!(round_events(&h.drain())
        .iter()
        .any(|e| matches!(e, RoundEvent::RoundAborted { round: 1, .. })));
}

#[tokio::test]
async fn resume_skips_completed_workers() {
    let mut h = Harness::new();
    let mut s = settings(h.repo.path(), RoundMode::Arena, "echo resumed; exit 0", "sleep 30");
    s.supervisor_timeout = Duration::from_millis(200);
    let log1 = s.log_path(1, "worker-1");

    let orchestrator = h
        .orchestrator(s, FakeGate::new(1))
        .with_resume(ResumeState::new(1, vec!["worker-1".to_string()]));
    let outcome = orchestrator.run().await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed { rounds: 1 });
    assert!(!read(&log1).contains("resumed"));

    let started: Vec<(String, u32)> = h
        .drain()
        .iter()
        .filter_map(|e| match e {
            DomainEvent::Agent(AgentEvent::Started {
                name, restart_count, ..
            }) => Some((name.clone(), *restart_count)),
            _ => None,
        })
        .collect();
    assert!(!started.iter().any(|(name, _)| name == "worker-1"));
    assert!(started.contains(&("worker-2".to_string(), 1)));
    assert!(started.contains(&("supervisor".to_string(), 1)));
}

#[tokio::test]
async fn rounds_repeat_until_the_gate_is_empty() {
    let mut h = Harness::new();
    let mut s = settings(h.repo.path(), RoundMode::Arena, "echo hi", "sleep 30");
    s.max_rounds = 3;
    s.supervisor_timeout = Duration::from_millis(200);

    let outcome = h.orchestrator(s, FakeGate::new(2)).run().await.unwrap();
    assert_eq!(outcome, RunOutcome::NoRemainingWork { rounds: 2 });
    assert_eq!(h.provisioner.created.lock().unwrap().len(), 4);
    assert_eq!(h.provisioner.deleted.lock().unwrap().len(), 4);

    let rounds = round_events(&h.drain());
    let timed_out = rounds
        .iter()
        .filter(|e| matches!(e, RoundEvent::SupervisorTimedOut { .. }))
        .count();
    assert_eq!(timed_out, 2);
    assert!(rounds
        .iter()
        .any(|e| matches!(e, RoundEvent::NoRemainingWork { round: 3 })));
}
