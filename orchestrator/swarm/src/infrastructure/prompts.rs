// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Templates
//!
//! Startup prompts for workers and supervisors, rendered with Handlebars on
//! every (re)start so a restarted agent is told to recover instead of
//! starting over.
//!
//! # Placeholders
//!
//! - `{{name}}`, `{{round}}`, `{{max_rounds}}` - identity and progress
//! - `{{restart_count}}` / `{{recovering}}` - set after the first start
//! - `{{autopilot}}` - workers open a pull request, the supervisor only monitors
//! - `{{notes_path}}` - the append-only shared channel
//! - `{{#each workers}}` - supervisor only: name, worktree and log per worker

use anyhow::{Context, Result};
use arena_core::domain::agent::{PromptSource, FINISHED_SENTINEL, STOP_SENTINEL};
use handlebars::Handlebars;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

const WORKER_TEMPLATE: &str = "\
You are {{name}}, one of {{worker_count}} coding agents working in parallel on the repository checked out at {{working_dir}}. Work only inside that directory.
{{#if recovering}}
You have been restarted (restart #{{restart_count}}). Do NOT start over and do NOT re-read {{task_file}} from scratch. Recover your state first: read the last part of your own log at {{log_path}}, then run `git status` and `git log` in your working directory, and continue from where you left off.
{{else}}
Read {{task_file}} and choose the unchecked items you will work on. Prefer items other workers have not claimed in the shared notes.
{{/if}}
Shared notes live at {{notes_path}}. Append your findings, claims and warnings there; never overwrite or delete existing content. Re-read the file periodically to learn what the other workers found.
{{#if autopilot}}
Work until your items are done. Then commit, push a branch named after yourself and open a pull request describing the change. Exit when the pull request is open.
{{else}}
This is round {{round}} of {{max_rounds}} and you have {{phase_minutes}} minutes. Commit early and often: when time is up you will be stopped and a supervisor will judge your commits against the other workers'.
{{/if}}";

const SUPERVISOR_TEMPLATE: &str = "\
You are the supervisor of {{worker_count}} coding agents working on the repository at {{repository}}.
{{#if recovering}}
You have been restarted (restart #{{restart_count}}). Recover your state from the last part of your own log at {{log_path}} and from `git status` in {{repository}} before doing anything else.
{{/if}}
Workers:
{{#each workers}}
- {{name}}: worktree {{worktree}}, log {{log}}
{{/each}}
Shared notes written by the workers: {{notes_path}}
{{#if autopilot}}
Monitor the workers by reading their logs. Do not merge or modify anything: each worker opens its own pull request. When a log ends with `{{finished_sentinel}}` or `{{sentinel}}` that worker is finished. Once every worker is finished, write a short closing summary of what each one delivered and exit.
{{else}}
This is round {{round}} of {{max_rounds}}. Watch the worker logs while they work. When every log ends with `{{sentinel}}` (or `{{finished_sentinel}}` for a worker that exited early), compare the commits in each worktree, pick the best result and merge it into {{repository}}. Check off the completed items in {{task_file}}, commit, and exit.
{{/if}}";

/// Compiled worker and supervisor templates.
pub struct PromptTemplates {
    handlebars: Handlebars<'static>,
}

impl PromptTemplates {
    pub fn new() -> Result<Self> {
        Self::with_templates(WORKER_TEMPLATE, SUPERVISOR_TEMPLATE)
    }

    /// Override the built-in templates.
    pub fn with_templates(worker: &str, supervisor: &str) -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // prompts are plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("worker", worker)
            .context("Invalid worker prompt template")?;
        handlebars
            .register_template_string("supervisor", supervisor)
            .context("Invalid supervisor prompt template")?;
        Ok(Self { handlebars })
    }

    pub fn render_worker(&self, context: &WorkerContext, restart_count: u32) -> Result<String> {
        self.render("worker", &Rendered::new(context, restart_count))
    }

    pub fn render_supervisor(
        &self,
        context: &SupervisorContext,
        restart_count: u32,
    ) -> Result<String> {
        self.render("supervisor", &Rendered::new(context, restart_count))
    }

    fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        self.handlebars
            .render(name, data)
            .with_context(|| format!("Failed to render {} prompt", name))
    }
}

#[derive(Serialize)]
struct Rendered<'a, T: Serialize> {
    #[serde(flatten)]
    context: &'a T,
    restart_count: u32,
    recovering: bool,
    sentinel: &'static str,
    finished_sentinel: &'static str,
}

impl<'a, T: Serialize> Rendered<'a, T> {
    fn new(context: &'a T, restart_count: u32) -> Self {
        Self {
            context,
            restart_count,
            recovering: restart_count > 0,
            sentinel: STOP_SENTINEL,
            finished_sentinel: FINISHED_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerContext {
    pub name: String,
    pub worker_count: usize,
    pub round: u32,
    pub max_rounds: u32,
    pub autopilot: bool,
    pub phase_minutes: u64,
    pub task_file: String,
    pub working_dir: PathBuf,
    pub log_path: PathBuf,
    pub notes_path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerRef {
    pub name: String,
    pub worktree: PathBuf,
    pub log: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct SupervisorContext {
    pub worker_count: usize,
    pub round: u32,
    pub max_rounds: u32,
    pub autopilot: bool,
    pub repository: PathBuf,
    pub task_file: String,
    pub log_path: PathBuf,
    pub notes_path: PathBuf,
    pub workers: Vec<WorkerRef>,
}

/// [`PromptSource`] for one worker.
pub struct WorkerPrompt {
    templates: Arc<PromptTemplates>,
    context: WorkerContext,
}

impl WorkerPrompt {
    pub fn new(templates: Arc<PromptTemplates>, context: WorkerContext) -> Self {
        Self { templates, context }
    }
}

impl PromptSource for WorkerPrompt {
    fn render(&self, restart_count: u32) -> Result<String> {
        self.templates.render_worker(&self.context, restart_count)
    }
}

/// [`PromptSource`] for the round's supervisor.
pub struct SupervisorPrompt {
    templates: Arc<PromptTemplates>,
    context: SupervisorContext,
}

impl SupervisorPrompt {
    pub fn new(templates: Arc<PromptTemplates>, context: SupervisorContext) -> Self {
        Self { templates, context }
    }
}

impl PromptSource for SupervisorPrompt {
    fn render(&self, restart_count: u32) -> Result<String> {
        self.templates.render_supervisor(&self.context, restart_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker(autopilot: bool) -> WorkerContext {
        WorkerContext {
            name: "worker-1".to_string(),
            worker_count: 2,
            round: 1,
            max_rounds: 3,
            autopilot,
            phase_minutes: 30,
            task_file: "TODO.md".to_string(),
            working_dir: PathBuf::from("/wt/worker-1"),
            log_path: PathBuf::from("/logs/worker-1.log"),
            notes_path: PathBuf::from("/shared/NOTES.md"),
        }
    }

    #[test]
    fn test_worker_prompt_first_start() {
        let templates = Arc::new(PromptTemplates::new().unwrap());
        let prompt = WorkerPrompt::new(templates, worker(false)).render(0).unwrap();
        assert!(prompt.contains("You are worker-1, one of 2"));
        assert!(prompt.contains("Read TODO.md"));
        assert!(prompt.contains("/shared/NOTES.md"));
        assert!(prompt.contains("round 1 of 3"));
        assert!(!prompt.contains("restarted"));
        assert!(!prompt.contains("pull request"));
    }

    #[test]
    fn test_worker_prompt_after_restart_recovers_from_log() {
        let templates = Arc::new(PromptTemplates::new().unwrap());
        let prompt = WorkerPrompt::new(templates, worker(true)).render(2).unwrap();
        assert!(prompt.contains("restart #2"));
        assert!(prompt.contains("/logs/worker-1.log"));
        assert!(prompt.contains("do NOT re-read TODO.md"));
        assert!(prompt.contains("open a pull request"));
    }

    #[test]
    fn test_supervisor_prompt_lists_workers() {
        let templates = Arc::new(PromptTemplates::new().unwrap());
        let context = SupervisorContext {
            worker_count: 1,
            round: 2,
            max_rounds: 3,
            autopilot: false,
            repository: PathBuf::from("/repo"),
            task_file: "TODO.md".to_string(),
            log_path: PathBuf::from("/logs/supervisor.log"),
            notes_path: PathBuf::from("/shared/NOTES.md"),
            workers: vec![WorkerRef {
                name: "worker-1".to_string(),
                worktree: PathBuf::from("/wt/worker-1"),
                log: PathBuf::from("/logs/worker-1.log"),
            }],
        };
        let prompt = SupervisorPrompt::new(templates, context).render(0).unwrap();
        assert!(prompt.contains("- worker-1: worktree /wt/worker-1, log /logs/worker-1.log"));
        assert!(prompt.contains(STOP_SENTINEL));
        assert!(prompt.contains(FINISHED_SENTINEL));
        assert!(prompt.contains("merge it into /repo"));
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        assert!(PromptTemplates::with_templates("{{#if}}", "ok").is_err());
    }
}
