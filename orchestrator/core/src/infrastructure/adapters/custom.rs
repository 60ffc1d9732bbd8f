// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Adapter for user-configured CLIs.
//!
//! Arguments may contain `{model}` and `{extra_dir}` placeholders. Output lines
//! that are JSON objects with a `type` use the generic envelope mapping
//! (`say`/`do`/`see`/`error`/`result` and common aliases); everything else is
//! treated as narration.

use super::{fallback, map_generic_envelope, parse_envelope};
use crate::domain::adapter::{CustomCommand, PromptMode, ProtocolAdapter, Vendor};
use crate::domain::message::Message;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CustomAdapter {
    command: CustomCommand,
}

impl CustomAdapter {
    pub fn new(command: CustomCommand) -> Self {
        Self { command }
    }
}

impl ProtocolAdapter for CustomAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Custom
    }

    fn program(&self) -> &str {
        &self.command.program
    }

    fn build_arguments(
        &self,
        prompt: &str,
        model: Option<&str>,
        extra_dir: Option<&Path>,
    ) -> Vec<String> {
        let extra_dir = extra_dir.map(|d| d.display().to_string());
        let mut args: Vec<String> = self
            .command
            .args
            .iter()
            .map(|arg| {
                arg.replace("{model}", model.unwrap_or_default())
                    .replace("{extra_dir}", extra_dir.as_deref().unwrap_or_default())
            })
            .collect();
        if self.command.prompt_mode == PromptMode::Argument {
            args.push(prompt.to_string());
        }
        args
    }

    fn uses_stdin(&self) -> bool {
        self.command.prompt_mode == PromptMode::Stdin
    }

    fn parse(&mut self, line: &str) -> Vec<Message> {
        parse_envelope(line)
            .and_then(|envelope| map_generic_envelope(&envelope))
            .unwrap_or_else(|| fallback(line))
    }
}
