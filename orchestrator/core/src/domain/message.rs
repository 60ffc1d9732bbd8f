// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Canonical Message Model
//!
//! Every vendor CLI speaks its own wire dialect. Protocol adapters normalize
//! that output into [`Message`] values of three kinds:
//!
//! | Kind | Meaning |
//! |------|---------|
//! | [`MessageKind::Say`] | agent reasoning / narration |
//! | [`MessageKind::Do`] | a tool invocation (with a short human summary) |
//! | [`MessageKind::See`] | a tool result |
//!
//! Messages are immutable once constructed.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of lines kept from a tool result.
pub const TOOL_RESULT_MAX_LINES: usize = 8;

/// Maximum number of characters kept from a tool result.
pub const TOOL_RESULT_MAX_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Say,
    Do,
    See,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Say => write!(f, "say"),
            MessageKind::Do => write!(f, "do"),
            MessageKind::See => write!(f, "see"),
        }
    }
}

/// One normalized unit of agent output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    kind: MessageKind,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_input: Option<String>,
}

impl Message {
    /// Agent narration.
    pub fn say(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Say,
            content: content.into(),
            tool_name: None,
            tool_input: None,
        }
    }

    /// A tool invocation. `summary` is the display form (`"$ ls"`, `"read: src/lib.rs"`),
    /// `raw_input` the serialized arguments when the vendor provides them.
    pub fn action(
        tool_name: impl Into<String>,
        summary: impl Into<String>,
        raw_input: Option<String>,
    ) -> Self {
        Self {
            kind: MessageKind::Do,
            content: summary.into(),
            tool_name: Some(tool_name.into()),
            tool_input: raw_input,
        }
    }

    /// A tool result, capped for display.
    pub fn observation(content: &str) -> Self {
        Self {
            kind: MessageKind::See,
            content: cap_tool_result(content),
            tool_name: None,
            tool_input: None,
        }
    }

    /// A tool result attributed to a named tool.
    pub fn observation_from(tool_name: impl Into<String>, content: &str) -> Self {
        Self {
            tool_name: Some(tool_name.into()),
            ..Self::observation(content)
        }
    }

    /// Synthesized `Say` for a terminal vendor error.
    pub fn error(message: impl AsRef<str>) -> Self {
        Self::say(format!("[Error: {}]", message.as_ref().trim()))
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tool_name(&self) -> Option<&str> {
        self.tool_name.as_deref()
    }

    pub fn tool_input(&self) -> Option<&str> {
        self.tool_input.as_deref()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.content)
    }
}

/// Keep the first `max_lines` lines of `text`, noting how many were dropped.
pub fn truncate_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max_lines {
        return text.trim_end().to_string();
    }
    let mut kept = lines[..max_lines].join("\n");
    kept.push_str(&format!("\n… (+{} more lines)", lines.len() - max_lines));
    kept
}

fn cap_tool_result(text: &str) -> String {
    let capped = truncate_lines(text, TOOL_RESULT_MAX_LINES);
    if capped.chars().count() <= TOOL_RESULT_MAX_CHARS {
        return capped;
    }
    let mut cut: String = capped.chars().take(TOOL_RESULT_MAX_CHARS).collect();
    cut.push('…');
    cut
}
