// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Collaborators the orchestrator delegates repository work to.

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Creates and removes one isolated checkout per worker.
#[async_trait]
pub trait WorktreeProvisioner: Send + Sync {
    /// Provision every path, replacing leftovers from a crashed run.
    /// Returns the paths actually created.
    async fn create(&self, repo: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>>;

    /// Remove the given checkouts. Paths that are already gone are ignored.
    async fn delete(&self, repo: &Path, paths: &[PathBuf]) -> Result<()>;
}

/// Decides whether another round is warranted.
#[async_trait]
pub trait WorkGate: Send + Sync {
    async fn has_remaining_items(&self, repo: &Path, task_file: &str) -> Result<bool>;
}
