// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Codex CLI dialect.
//!
//! `codex exec --json` prints `item.*` envelopes; those are parsed first.
//! Plain `codex exec` prints free text where a bare marker line switches
//! what the following lines mean:
//!
//! ```text
//! thinking          reasoning follows
//! codex             assistant text follows
//! exec              next line is `bash -lc '<cmd>' in <dir>`, then a status line, then output
//! tokens used       next line is a count
//! user              echoed prompt follows
//! file update:      changed paths / diff follow
//! ```
//!
//! Marker lines themselves are silent; every other non-empty line yields at
//! least one message. `<<...>>` log sentinels pass through in any mode.

use super::{
    error_text, fallback, parse_envelope, shell_command, summarize_tool, text_of, unwrap_shell,
};
use crate::domain::adapter::{ProtocolAdapter, Vendor};
use crate::domain::message::{Message, TOOL_RESULT_MAX_LINES};
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

static TIMESTAMP_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[\d{4}-\d{2}-\d{2}T[^\]]*\]\s*").expect("valid regex"));

static EXEC_STATUS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(succeeded|exited -?\d+|failed)( in [0-9.]+m?s)?:?$").expect("valid regex")
});

static EXEC_COMMAND_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<cmd>.+?) in (?P<dir>/\S*)$").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    #[default]
    Text,
    Thinking,
    ExecCommand,
    ExecStatus,
    ExecOutput,
    TokenCount,
    FileUpdate,
}

#[derive(Debug, Default)]
pub struct CodexAdapter {
    mode: Mode,
    block_lines: usize,
    block_dropped: usize,
    started_items: HashSet<String>,
}

impl CodexAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn envelope(&mut self, envelope: &Value) -> Option<Vec<Message>> {
        let kind = envelope.get("type")?.as_str()?;
        let messages = match kind {
            "thread.started" | "turn.started" | "turn.completed" | "session.created" => Vec::new(),
            "item.started" | "item.updated" | "item.completed" => {
                let item = envelope.get("item")?;
                self.item(item, kind == "item.completed")
            }
            "turn.failed" | "error" => vec![Message::error(error_text(envelope))],
            _ => return None,
        };
        Some(messages)
    }

    fn item(&mut self, item: &Value, completed: bool) -> Vec<Message> {
        let id = item.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        let item_type = item
            .get("type")
            .or_else(|| item.get("item_type"))
            .and_then(Value::as_str)
            .unwrap_or_default();

        match item_type {
            "agent_message" | "assistant_message" | "reasoning" if completed => item
                .get("text")
                .and_then(text_of)
                .map(|t| Message::say(t.trim()))
                .into_iter()
                .collect(),
            "command_execution" => {
                let mut out = Vec::new();
                let first_sighting = id.is_empty() || self.started_items.insert(id.clone());
                if first_sighting {
                    if let Some(cmd) = item.get("command").and_then(shell_command) {
                        out.push(Message::action(
                            "shell",
                            format!("$ {}", cmd),
                            item.get("command").map(Value::to_string),
                        ));
                    }
                }
                if completed {
                    if let Some(output) = item.get("aggregated_output").and_then(text_of) {
                        out.push(Message::observation_from("shell", &output));
                    }
                    self.started_items.remove(&id);
                }
                out
            }
            "file_change" if completed => item
                .get("changes")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(|c| c.get("path").and_then(Value::as_str))
                .map(|p| Message::action("apply_patch", format!("edit: {}", p), None))
                .collect(),
            "mcp_tool_call" if !completed => {
                let tool = item.get("tool").and_then(Value::as_str).unwrap_or("mcp");
                let args = item.get("arguments").cloned().unwrap_or(Value::Null);
                vec![Message::action(tool, summarize_tool(tool, &args), Some(args.to_string()))]
            }
            "web_search" if !completed => item
                .get("query")
                .and_then(Value::as_str)
                .map(|q| Message::action("web_search", format!("search: {}", q), None))
                .into_iter()
                .collect(),
            "error" => vec![Message::error(error_text(item))],
            _ => Vec::new(),
        }
    }

    fn marker(line: &str) -> Option<Mode> {
        match line {
            "thinking" => Some(Mode::Thinking),
            "codex" => Some(Mode::Text),
            "exec" => Some(Mode::ExecCommand),
            "tokens used" | "tokens used:" => Some(Mode::TokenCount),
            // the echoed prompt reads as plain narration
            "user" => Some(Mode::Text),
            "file update" | "file update:" => Some(Mode::FileUpdate),
            _ if line.starts_with("apply_patch(") => Some(Mode::FileUpdate),
            _ => None,
        }
    }

    fn switch_mode(&mut self, mode: Mode) -> Vec<Message> {
        let mut out = Vec::new();
        if self.block_dropped > 0 {
            out.push(Message::observation(&format!("… (+{} more lines)", self.block_dropped)));
        }
        self.block_lines = 0;
        self.block_dropped = 0;
        self.mode = mode;
        out
    }

    fn block_output(&mut self, line: &str) -> Vec<Message> {
        if self.block_lines < TOOL_RESULT_MAX_LINES {
            self.block_lines += 1;
            vec![Message::observation(line)]
        } else {
            self.block_dropped += 1;
            Vec::new()
        }
    }

    fn free_text(&mut self, raw: &str) -> Vec<Message> {
        let line = TIMESTAMP_PREFIX.replace(raw.trim_end(), "");
        let line = line.as_ref();
        let bare = line.trim();
        if bare.is_empty() {
            return Vec::new();
        }

        if bare.starts_with("<<") && bare.ends_with(">>") {
            return vec![Message::say(bare)];
        }
        if let Some(rest) = bare.strip_prefix("ERROR:") {
            return vec![Message::error(rest)];
        }
        if let Some(mode) = Self::marker(bare) {
            return self.switch_mode(mode);
        }

        match self.mode {
            Mode::Text | Mode::Thinking => vec![Message::say(bare)],
            Mode::ExecCommand => {
                let cmd = match EXEC_COMMAND_DIR.captures(bare) {
                    Some(caps) => unwrap_shell(&caps["cmd"]),
                    None => unwrap_shell(bare),
                };
                self.mode = Mode::ExecStatus;
                vec![Message::action("shell", format!("$ {}", cmd), Some(bare.to_string()))]
            }
            Mode::ExecStatus => {
                self.mode = Mode::ExecOutput;
                if EXEC_STATUS.is_match(bare) {
                    vec![Message::observation(bare.trim_end_matches(':'))]
                } else {
                    self.block_output(line)
                }
            }
            Mode::ExecOutput => self.block_output(line),
            Mode::TokenCount => {
                self.mode = Mode::Text;
                if bare.replace(',', "").chars().all(|c| c.is_ascii_digit()) {
                    vec![Message::say(format!("tokens used: {}", bare))]
                } else {
                    vec![Message::say(bare)]
                }
            }
            Mode::FileUpdate => {
                if let Some(path) = changed_path(bare) {
                    vec![Message::action("apply_patch", format!("edit: {}", path), None)]
                } else {
                    self.block_output(line)
                }
            }
        }
    }
}

/// `M src/lib.rs`, `A new.rs`, `diff --git a/x b/x` → the path.
fn changed_path(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("diff --git ") {
        return rest.split_whitespace().nth(1).map(|p| p.trim_start_matches("b/"));
    }
    let (status, path) = line.split_once(' ')?;
    if matches!(status, "M" | "A" | "D" | "R") && !path.trim().is_empty() {
        Some(path.trim())
    } else {
        None
    }
}

impl ProtocolAdapter for CodexAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Codex
    }

    fn program(&self) -> &str {
        "codex"
    }

    fn build_arguments(
        &self,
        prompt: &str,
        model: Option<&str>,
        extra_dir: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "--full-auto".to_string(),
            "--skip-git-repo-check".to_string(),
        ];
        if let Some(model) = model {
            args.push("-m".to_string());
            args.push(model.to_string());
        }
        if let Some(dir) = extra_dir {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }
        args.push(prompt.to_string());
        args
    }

    fn uses_stdin(&self) -> bool {
        false
    }

    fn parse(&mut self, line: &str) -> Vec<Message> {
        if let Some(envelope) = parse_envelope(line) {
            if let Some(messages) = self.envelope(&envelope) {
                return messages;
            }
            return fallback(line);
        }
        self.free_text(line)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}
