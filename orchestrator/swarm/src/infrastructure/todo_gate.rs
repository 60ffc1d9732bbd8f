// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Work gate backed by a markdown checklist (`- [ ] item`).

use crate::domain::workspace::WorkGate;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, warn};

/// Number of unchecked checklist items in a markdown document.
pub fn count_open_items(markdown: &str) -> usize {
    markdown
        .lines()
        .map(str::trim_start)
        .filter(|line| {
            let rest = line
                .strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .or_else(|| line.strip_prefix("+ "));
            matches!(rest, Some(r) if r.starts_with("[ ]"))
        })
        .count()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownTodoGate;

#[async_trait]
impl WorkGate for MarkdownTodoGate {
    async fn has_remaining_items(&self, repo: &Path, task_file: &str) -> Result<bool> {
        let path = repo.join(task_file);
        if !path.exists() {
            warn!(path = ?path, "Task file not found; nothing to do");
            return Ok(false);
        }
        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read task file {:?}", path))?;
        let open = count_open_items(&text);
        debug!(path = ?path, open, "Checked task file");
        Ok(open > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_open_items() {
        let text = "# TODO\n\
                    - [ ] first\n\
                    - [x] done\n\
                    \x20\x20* [ ] nested\n\
                    + [ ] plus\n\
                    - [] malformed\n\
                    plain - [ ] not a list\n";
        assert_eq!(count_open_items(text), 3);
        assert_eq!(count_open_items(""), 0);
    }

    #[tokio::test]
    async fn test_gate_reads_task_file() {
        let dir = tempfile::tempdir().unwrap();
        let gate = MarkdownTodoGate;
        assert!(!gate.has_remaining_items(dir.path(), "TODO.md").await.unwrap());

        std::fs::write(dir.path().join("TODO.md"), "- [x] done\n").unwrap();
        assert!(!gate.has_remaining_items(dir.path(), "TODO.md").await.unwrap());

        std::fs::write(dir.path().join("TODO.md"), "- [x] done\n- [ ] next\n").unwrap();
        assert!(gate.has_remaining_items(dir.path(), "TODO.md").await.unwrap());
    }
}
