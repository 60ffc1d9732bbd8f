// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::path::PathBuf;
use thiserror::Error;

/// Everything needed to launch one agent CLI process.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Written to stdin, which is then closed.
    pub stdin: Option<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `program arg1 arg2`, prompts elided, for log lines.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            if arg.contains('\n') || arg.len() > 80 {
                parts.push("<prompt>".to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),
    #[error("Agent '{0}' already has a live process")]
    AlreadyRunning(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Agent not found: {0}")]
    NotFound(String),
    #[error("Failed to render prompt: {0}")]
    Template(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_elides_prompt() {
        let spec = ProcessSpec::new("codex", "/tmp")
            .args(["exec", "--full-auto", "line one\nline two"]);
        assert_eq!(spec.display(), "codex exec --full-auto <prompt>");
    }
}
