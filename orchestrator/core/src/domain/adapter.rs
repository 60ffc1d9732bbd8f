// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Protocol Adapter Contract
//!
//! A [`ProtocolAdapter`] encodes two things about a vendor CLI: how to invoke
//! it non-interactively, and how to translate each line it prints into
//! canonical [`Message`]s. Concrete adapters live in
//! `infrastructure::adapters`.

use crate::domain::message::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Supported agent CLIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    #[default]
    Claude,
    Codex,
    Gemini,
    Cursor,
    Custom,
}

impl Vendor {
    pub const ALL: [Vendor; 5] = [
        Vendor::Claude,
        Vendor::Codex,
        Vendor::Gemini,
        Vendor::Cursor,
        Vendor::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Claude => "claude",
            Vendor::Codex => "codex",
            Vendor::Gemini => "gemini",
            Vendor::Cursor => "cursor",
            Vendor::Custom => "custom",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" => Ok(Vendor::Claude),
            "codex" => Ok(Vendor::Codex),
            "gemini" => Ok(Vendor::Gemini),
            "cursor" | "cursor-agent" => Ok(Vendor::Cursor),
            "custom" => Ok(Vendor::Custom),
            other => Err(format!(
                "unknown vendor '{}'. Supported: claude, codex, gemini, cursor, custom",
                other
            )),
        }
    }
}

/// How a custom CLI receives its prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptMode {
    #[default]
    Stdin,
    Argument,
}

/// Invocation for the `custom` vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub prompt_mode: PromptMode,
}

/// Which CLI an agent runs and with what model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentProfile {
    #[serde(default)]
    pub vendor: Vendor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Required when `vendor` is `custom`, ignored otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CustomCommand>,
}

impl AgentProfile {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            model: None,
            command: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn custom(command: CustomCommand) -> Self {
        Self {
            vendor: Vendor::Custom,
            model: None,
            command: Some(command),
        }
    }
}

/// Translates one vendor CLI's invocation and output dialect.
///
/// `parse` must never panic: malformed input falls back to a plain `Say`
/// and blank lines yield nothing.
pub trait ProtocolAdapter: Send {
    fn vendor(&self) -> Vendor;

    /// Executable to spawn.
    fn program(&self) -> &str;

    /// Argument vector for a non-interactive run. When [`uses_stdin`](Self::uses_stdin)
    /// is false the prompt is part of the returned vector.
    fn build_arguments(&self, prompt: &str, model: Option<&str>, extra_dir: Option<&Path>)
        -> Vec<String>;

    fn uses_stdin(&self) -> bool;

    fn parse(&mut self, line: &str) -> Vec<Message>;

    /// Clear any implicit mode state. Called before each (re)start.
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_from_str() {
        assert_eq!("Claude".parse::<Vendor>().unwrap(), Vendor::Claude);
        assert_eq!("cursor-agent".parse::<Vendor>().unwrap(), Vendor::Cursor);
        assert!("copilot".parse::<Vendor>().is_err());
    }

    #[test]
    fn test_profile_yaml_shape() {
        let yaml = r#"
vendor: custom
command:
  program: sh
  args: ["-c", "cat"]
  prompt_mode: argument
"#;
        let profile: AgentProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(profile.vendor, Vendor::Custom);
        let command = profile.command.unwrap();
        assert_eq!(command.program, "sh");
        assert_eq!(command.prompt_mode, PromptMode::Argument);
    }
}
