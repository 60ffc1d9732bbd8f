// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod git_worktree;
pub mod prompts;
pub mod todo_gate;

pub use git_worktree::GitWorktreeProvisioner;
pub use prompts::{PromptTemplates, SupervisorPrompt, WorkerPrompt};
pub use todo_gate::MarkdownTodoGate;
