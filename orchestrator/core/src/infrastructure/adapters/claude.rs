// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Claude Code `stream-json` dialect.
//!
//! ```text
//! {"type":"system","subtype":"init",...}
//! {"type":"assistant","message":{"content":[{"type":"text","text":"..."},{"type":"tool_use","id":"t1","name":"Bash","input":{...}}]}}
//! {"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"t1","content":"..."}]}}
//! {"type":"result","subtype":"success","is_error":false,"result":"..."}
//! ```

use super::{error_text, fallback, parse_envelope, summarize_tool, text_of};
use crate::domain::adapter::{ProtocolAdapter, Vendor};
use crate::domain::message::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct ClaudeAdapter {
    /// tool_use id → tool name, so results can be attributed.
    pending_tools: HashMap<String, String>,
}

impl ClaudeAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn assistant(&mut self, envelope: &Value) -> Vec<Message> {
        let mut out = Vec::new();
        for block in content_blocks(envelope) {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(text_of) {
                        out.push(Message::say(text.trim()));
                    }
                }
                Some("tool_use") => {
                    let name = block.get("name").and_then(Value::as_str).unwrap_or("tool");
                    let input = block.get("input").cloned().unwrap_or(Value::Null);
                    if let Some(id) = block.get("id").and_then(Value::as_str) {
                        self.pending_tools.insert(id.to_string(), name.to_string());
                    }
                    out.push(Message::action(
                        name,
                        summarize_tool(name, &input),
                        Some(input.to_string()),
                    ));
                }
                _ => {}
            }
        }
        out
    }

    fn user(&mut self, envelope: &Value) -> Vec<Message> {
        let mut out = Vec::new();
        for block in content_blocks(envelope) {
            if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                continue;
            }
            let Some(text) = block.get("content").and_then(text_of) else {
                continue;
            };
            let tool = block
                .get("tool_use_id")
                .and_then(Value::as_str)
                .and_then(|id| self.pending_tools.remove(id));
            out.push(match tool {
                Some(name) => Message::observation_from(name, &text),
                None => Message::observation(&text),
            });
        }
        out
    }
}

fn content_blocks(envelope: &Value) -> impl Iterator<Item = &Value> {
    envelope
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

impl ProtocolAdapter for ClaudeAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Claude
    }

    fn program(&self) -> &str {
        "claude"
    }

    fn build_arguments(
        &self,
        _prompt: &str,
        model: Option<&str>,
        extra_dir: Option<&Path>,
    ) -> Vec<String> {
        let mut args: Vec<String> = [
            "-p",
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if let Some(model) = model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        if let Some(dir) = extra_dir {
            args.push("--add-dir".to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    fn uses_stdin(&self) -> bool {
        true
    }

    fn parse(&mut self, line: &str) -> Vec<Message> {
        let Some(envelope) = parse_envelope(line) else {
            return fallback(line);
        };
        match envelope.get("type").and_then(Value::as_str) {
            Some("system") => Vec::new(),
            Some("assistant") => self.assistant(&envelope),
            Some("user") => self.user(&envelope),
            Some("result") => {
                let failed = envelope.get("is_error").and_then(Value::as_bool).unwrap_or(false)
                    || envelope
                        .get("subtype")
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.starts_with("error"));
                if failed {
                    vec![Message::error(error_text(&envelope))]
                } else {
                    envelope
                        .get("result")
                        .and_then(text_of)
                        .map(|t| Message::say(t.trim()))
                        .into_iter()
                        .collect()
                }
            }
            Some("error") => vec![Message::error(error_text(&envelope))],
            _ => fallback(line),
        }
    }

    fn reset(&mut self) {
        self.pending_tools.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;

    #[test]
    fn test_arguments() {
        let adapter = ClaudeAdapter::new();
        let args = adapter.build_arguments("ignored", Some("sonnet"), Some(Path::new("/shared")));
        assert_eq!(args[0], "-p");
        assert!(args.windows(2).any(|w| w == ["--model", "sonnet"]));
        assert!(args.windows(2).any(|w| w == ["--add-dir", "/shared"]));
        assert!(!args.contains(&"ignored".to_string()));
        assert!(adapter.uses_stdin());
    }

    #[test]
    fn test_assistant_text_and_tool_use() {
        let mut adapter = ClaudeAdapter::new();
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"Looking around."},{"type":"tool_use","id":"t1","name":"Bash","input":{"command":"ls -la"}}]}}"#;
        let msgs = adapter.parse(line);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].kind(), MessageKind::Say);
        assert_eq!(msgs[0].content(), "Looking around.");
        assert_eq!(msgs[1].kind(), MessageKind::Do);
        assert_eq!(msgs[1].content(), "$ ls -la");
    }

    #[test]
    fn test_tool_result_is_attributed_and_capped() {
        let mut adapter = ClaudeAdapter::new();
        adapter.parse(
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t9","name":"Read","input":{"file_path":"a.rs"}}]}}"#,
        );
        let body: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
        let line = serde_json::json!({
            "type": "user",
            "message": {"content": [{"type": "tool_result", "tool_use_id": "t9", "content": body.join("\n")}]}
        })
        .to_string();
        let msgs = adapter.parse(&line);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].kind(), MessageKind::See);
        assert_eq!(msgs[0].tool_name(), Some("Read"));
        assert!(msgs[0].content().ends_with("… (+12 more lines)"));
    }

    #[test]
    fn test_result_and_error_envelopes() {
        let mut adapter = ClaudeAdapter::new();
        let ok = adapter.parse(
            r#"{"type":"result","subtype":"success","is_error":false,"result":"Done."}"#,
        );
        assert_eq!(ok[0].content(), "Done.");

        let failed = adapter.parse(
            r#"{"type":"result","subtype":"error_max_turns","is_error":true}"#,
        );
        assert_eq!(failed[0].content(), "[Error: error_max_turns]");

        let err = adapter.parse(r#"{"type":"error","error":{"message":"overloaded"}}"#);
        assert_eq!(err[0].content(), "[Error: overloaded]");
    }

    #[test]
    fn test_system_is_silent_and_unknown_falls_back() {
        let mut adapter = ClaudeAdapter::new();
        assert!(adapter.parse(r#"{"type":"system","subtype":"init"}"#).is_empty());
        let unknown = adapter.parse(r#"{"type":"telemetry"}"#);
        assert_eq!(unknown[0].content(), r#"{"type":"telemetry"}"#);
    }
}
