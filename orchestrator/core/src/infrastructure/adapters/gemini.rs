// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Gemini CLI `stream-json` dialect.
//!
//! Assistant text arrives as `{"type":"message","role":"assistant","delta":true}`
//! chunks. Chunks are buffered and flushed as a single `Say` when any other
//! envelope (or plain line) arrives.

use super::{error_text, fallback, parse_envelope, str_field, summarize_tool, text_of};
use crate::domain::adapter::{ProtocolAdapter, Vendor};
use crate::domain::message::Message;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default)]
pub struct GeminiAdapter {
    pending_text: String,
    tool_names: HashMap<String, String>,
}

impl GeminiAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn flush(&mut self) -> Option<Message> {
        let text = std::mem::take(&mut self.pending_text);
        let text = text.trim();
        (!text.is_empty()).then(|| Message::say(text))
    }

    fn envelope(&mut self, envelope: &Value) -> Option<Vec<Message>> {
        let kind = envelope.get("type")?.as_str()?;

        if kind == "message" {
            if envelope.get("role").and_then(Value::as_str) == Some("user") {
                return Some(Vec::new());
            }
            let content = envelope.get("content").and_then(text_of).unwrap_or_default();
            if envelope.get("delta").and_then(Value::as_bool).unwrap_or(false) {
                self.pending_text.push_str(&content);
                return Some(Vec::new());
            }
            let mut out: Vec<Message> = self.flush().into_iter().collect();
            if !content.trim().is_empty() {
                out.push(Message::say(content.trim()));
            }
            return Some(out);
        }

        if !matches!(kind, "init" | "tool_use" | "tool_result" | "error" | "result") {
            return None;
        }
        let mut out: Vec<Message> = self.flush().into_iter().collect();
        match kind {
            "init" => {}
            "tool_use" => {
                let name = str_field(envelope, &["tool_name", "name"]).unwrap_or("tool");
                let params = envelope
                    .get("parameters")
                    .or_else(|| envelope.get("args"))
                    .cloned()
                    .unwrap_or(Value::Null);
                if let Some(id) = str_field(envelope, &["tool_id", "id"]) {
                    self.tool_names.insert(id.to_string(), name.to_string());
                }
                out.push(Message::action(
                    name,
                    summarize_tool(name, &params),
                    Some(params.to_string()),
                ));
            }
            "tool_result" => {
                let tool = str_field(envelope, &["tool_id", "id"])
                    .and_then(|id| self.tool_names.remove(id));
                let text = if envelope.get("status").and_then(Value::as_str) == Some("error") {
                    Some(format!("error: {}", error_text(envelope)))
                } else {
                    envelope.get("output").and_then(text_of)
                };
                if let Some(text) = text {
                    out.push(match tool {
                        Some(name) => Message::observation_from(name, &text),
                        None => Message::observation(&text),
                    });
                }
            }
            "error" => out.push(Message::error(error_text(envelope))),
            "result" => {
                if envelope.get("status").and_then(Value::as_str) == Some("error") {
                    out.push(Message::error(error_text(envelope)));
                }
            }
            _ => {}
        }
        Some(out)
    }
}

impl ProtocolAdapter for GeminiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Gemini
    }

    fn program(&self) -> &str {
        "gemini"
    }

    fn build_arguments(
        &self,
        _prompt: &str,
        model: Option<&str>,
        extra_dir: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "--yolo".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];
        if let Some(model) = model {
            args.push("-m".to_string());
            args.push(model.to_string());
        }
        if let Some(dir) = extra_dir {
            args.push("--include-directories".to_string());
            args.push(dir.display().to_string());
        }
        args
    }

    fn uses_stdin(&self) -> bool {
        true
    }

    fn parse(&mut self, line: &str) -> Vec<Message> {
        if let Some(envelope) = parse_envelope(line) {
            if let Some(messages) = self.envelope(&envelope) {
                return messages;
            }
        }
        let mut out: Vec<Message> = self.flush().into_iter().collect();
        out.extend(fallback(line));
        out
    }

    fn reset(&mut self) {
        self.pending_text.clear();
        self.tool_names.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;

    #[test]
    fn test_delta_chunks_are_merged() {
        let mut adapter = GeminiAdapter::new();
        assert!(adapter
            .parse(r#"{"type":"init","session_id":"s","model":"gemini-2.5-pro"}"#)
            .is_empty());
        assert!(adapter
            .parse(r#"{"type":"message","role":"assistant","content":"Hello ","delta":true}"#)
            .is_empty());
        assert!(adapter
            .parse(r#"{"type":"message","role":"assistant","content":"world","delta":true}"#)
            .is_empty());
        let out = adapter.parse(
            r#"{"type":"tool_use","tool_name":"run_shell_command","tool_id":"c1","parameters":{"command":"git status"}}"#,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content(), "Hello world");
        assert_eq!(out[1].kind(), MessageKind::Do);
        assert_eq!(out[1].content(), "$ git status");
    }

    #[test]
    fn test_tool_result_and_error_result() {
        let mut adapter = GeminiAdapter::new();
        adapter.parse(
            r#"{"type":"tool_use","tool_name":"read_file","tool_id":"r1","parameters":{"absolute_path":"/a.txt"}}"#,
        );
        let out = adapter.parse(
            r#"{"type":"tool_result","tool_id":"r1","status":"success","output":"contents"}"#,
        );
        assert_eq!(out[0].kind(), MessageKind::See);
        assert_eq!(out[0].tool_name(), Some("read_file"));

        adapter.parse(r#"{"type":"message","role":"assistant","content":"partial","delta":true}"#);
        let out = adapter.parse(
            r#"{"type":"result","status":"error","error":{"type":"api","message":"quota"}}"#,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content(), "partial");
        assert_eq!(out[1].content(), "[Error: quota]");
    }

    #[test]
    fn test_user_echo_and_plain_text() {
        let mut adapter = GeminiAdapter::new();
        assert!(adapter
            .parse(r#"{"type":"message","role":"user","content":"the prompt"}"#)
            .is_empty());
        assert_eq!(
            adapter.parse("Loaded cached credentials.")[0].content(),
            "Loaded cached credentials."
        );
    }
}
