// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `arena replay`: run a captured agent log through a vendor adapter.
//!
//! Handy when a CLI changes its output format: replay the log, see which
//! lines fall back to plain `say` messages.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use arena_core::domain::adapter::{AgentProfile, CustomCommand, PromptMode, ProtocolAdapter, Vendor};
use arena_core::domain::message::{Message, MessageKind};
use arena_core::infrastructure::adapters::create_adapter;
use arena_core::infrastructure::line_reader::clean_line;

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Vendor whose dialect the log is in
    #[arg(long, default_value = "claude")]
    pub vendor: Vendor,

    /// Print one JSON object per message
    #[arg(long)]
    pub json: bool,

    /// Agent log file
    #[arg(value_name = "LOG")]
    pub log: PathBuf,
}

pub async fn execute(args: ReplayArgs) -> Result<()> {
    let text = tokio::fs::read_to_string(&args.log)
        .await
        .with_context(|| format!("Failed to read {:?}", args.log))?;

    let mut adapter = replay_adapter(args.vendor)?;
    let messages = replay(adapter.as_mut(), &text);

    for message in &messages {
        if args.json {
            println!("{}", serde_json::to_string(message)?);
        } else {
            let label = match message.kind() {
                MessageKind::Say => "say".normal(),
                MessageKind::Do => "do ".cyan(),
                MessageKind::See => "see".dimmed(),
            };
            println!("{} {}", label, message.content());
        }
    }
    if !args.json {
        eprintln!("{}", format!("{} message(s)", messages.len()).dimmed());
    }
    Ok(())
}

fn replay_adapter(vendor: Vendor) -> Result<Box<dyn ProtocolAdapter>> {
    // parsing never runs the command, a placeholder is enough
    let profile = if vendor == Vendor::Custom {
        AgentProfile::custom(CustomCommand {
            program: "custom".to_string(),
            args: Vec::new(),
            prompt_mode: PromptMode::Stdin,
        })
    } else {
        AgentProfile::new(vendor)
    };
    Ok(create_adapter(&profile)?)
}

/// Clean and parse every line the same way a live agent would.
pub fn replay(adapter: &mut dyn ProtocolAdapter, text: &str) -> Vec<Message> {
    text.lines()
        .filter_map(clean_line)
        .flat_map(|line| adapter.parse(&line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_claude_log() {
        let log = concat!(
            "{\"type\":\"system\",\"subtype\":\"init\"}\n",
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"text\",\"text\":\"Looking around\"}]}}\n",
            "{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"Bash\",\"input\":{\"command\":\"ls\"}}]}}\n",
            "\n",
            "<<worker has been stopped>>\n",
        );
        let mut adapter = replay_adapter(Vendor::Claude).unwrap();
        let messages = replay(adapter.as_mut(), log);
        let kinds: Vec<MessageKind> = messages.iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, vec![MessageKind::Say, MessageKind::Do, MessageKind::Say]);
        assert_eq!(messages[1].content(), "$ ls");
        assert_eq!(messages[2].content(), "<<worker has been stopped>>");
    }

    #[test]
    fn test_custom_vendor_needs_no_command() {
        assert!(replay_adapter(Vendor::Custom).is_ok());
    }
}
