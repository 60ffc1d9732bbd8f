// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Worker checkouts as detached `git worktree`s of the main repository.

use crate::domain::workspace::WorktreeProvisioner;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Commit-ish every worktree starts from.
const BASE_REF: &str = "HEAD";

#[derive(Debug, Clone, Default)]
pub struct GitWorktreeProvisioner {
    /// Directory inside the repository kept out of `git status`.
    excluded: Option<PathBuf>,
}

impl GitWorktreeProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide `dir` (the state directory) from the repository via
    /// `info/exclude`. Directories outside the repository are ignored.
    pub fn excluding(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded = Some(dir.into());
        self
    }

    async fn git(repo: &Path, args: &[&str]) -> Result<String> {
        debug!(repo = ?repo, args = ?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .with_context(|| format!("Failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn exclude(repo: &Path, dir: &Path) -> Result<()> {
        let Ok(relative) = dir.strip_prefix(repo) else {
            return Ok(());
        };
        if relative.as_os_str().is_empty() {
            return Ok(());
        }
        let pattern = format!("/{}/", relative.display());

        let git_path = Self::git(repo, &["rev-parse", "--git-path", "info/exclude"]).await?;
        let exclude_file = repo.join(git_path.trim());
        let existing = match tokio::fs::read_to_string(&exclude_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if existing.lines().any(|line| line.trim() == pattern) {
            return Ok(());
        }

        if let Some(parent) = exclude_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut content = existing;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(&pattern);
        content.push('\n');
        tokio::fs::write(&exclude_file, content)
            .await
            .with_context(|| format!("Failed to update {}", exclude_file.display()))?;
        info!(pattern = %pattern, "State directory excluded from git");
        Ok(())
    }

    /// Drop a worktree registration and whatever is left on disk.
    async fn remove(repo: &Path, path: &Path) {
        let path_str = path.display().to_string();
        if let Err(e) = Self::git(repo, &["worktree", "remove", "--force", &path_str]).await {
            debug!(path = %path_str, error = %e, "git worktree remove failed");
        }
        if path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                warn!(path = %path_str, error = %e, "Failed to remove worktree directory");
            }
        }
    }
}

#[async_trait]
impl WorktreeProvisioner for GitWorktreeProvisioner {
    async fn create(&self, repo: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        Self::git(repo, &["worktree", "prune"]).await?;
        if let Some(dir) = &self.excluded {
            Self::exclude(repo, dir).await?;
        }

        let mut created = Vec::with_capacity(paths.len());
        for path in paths {
            if path.exists() {
                warn!(path = ?path, "Removing leftover worktree");
                Self::remove(repo, path).await;
            }
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let path_str = path.display().to_string();
            Self::git(repo, &["worktree", "add", "--detach", &path_str, BASE_REF]).await?;
            info!(path = %path_str, base = BASE_REF, "Worktree created");
            created.push(path.clone());
        }
        Ok(created)
    }

    async fn delete(&self, repo: &Path, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            Self::remove(repo, path).await;
        }
        Self::git(repo, &["worktree", "prune"]).await?;

        // round-<n> directories are left empty once their worktrees are gone
        let mut parents: Vec<&Path> = paths.iter().filter_map(|p| p.parent()).collect();
        parents.dedup();
        for parent in parents {
            let _ = tokio::fs::remove_dir(parent).await;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn init_repo() -> Option<TempDir> {
        let dir = TempDir::new().unwrap();
        let repo = dir.path();
        // git may be missing on minimal hosts
        GitWorktreeProvisioner::git(repo, &["init", "-q"]).await.ok()?;
        std::fs::write(repo.join("README.md"), "hello\n").unwrap();
        GitWorktreeProvisioner::git(repo, &["add", "."]).await.ok()?;
        GitWorktreeProvisioner::git(
            repo,
            &[
                "-c",
                "user.name=test",
                "-c",
                "user.email=test@example.com",
                "commit",
                "-qm",
                "init",
            ],
        )
        .await
        .ok()?;
        Some(dir)
    }

    #[tokio::test]
    async fn test_create_replaces_leftovers_and_delete_cleans_up() {
        let Some(repo) = init_repo().await else {
            return;
        };
        let state_dir = repo.path().join(".arena");
        let provisioner = GitWorktreeProvisioner::new().excluding(&state_dir);
        let round_dir = state_dir.join("worktrees/round-1");
        let paths = vec![round_dir.join("worker-1"), round_dir.join("worker-2")];

        // leftover from a crashed run
        std::fs::create_dir_all(&paths[0]).unwrap();
        std::fs::write(paths[0].join("stale.txt"), "stale").unwrap();

        let created = provisioner.create(repo.path(), &paths).await.unwrap();
        assert_eq!(created, paths);
        assert!(paths[0].join("README.md").exists());
        assert!(!paths[0].join("stale.txt").exists());

        // the state directory does not show up as untracked
        let status = GitWorktreeProvisioner::git(repo.path(), &["status", "--porcelain"])
            .await
            .unwrap();
        assert_eq!(status.trim(), "");

        // idempotent: a second create starts over
        provisioner.create(repo.path(), &paths).await.unwrap();
        let exclude = std::fs::read_to_string(repo.path().join(".git/info/exclude")).unwrap();
        assert_eq!(exclude.lines().filter(|l| *l == "/.arena/").count(), 1);

        provisioner.delete(repo.path(), &paths).await.unwrap();
        assert!(paths.iter().all(|p| !p.exists()));
        assert!(!round_dir.exists());

        // deleting again is harmless
        provisioner.delete(repo.path(), &paths).await.unwrap();
    }
}
