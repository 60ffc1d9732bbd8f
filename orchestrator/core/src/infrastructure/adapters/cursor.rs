// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! cursor-agent `stream-json` dialect.
//!
//! Tool calls arrive twice: `{"type":"tool_call","subtype":"started"}` carries
//! the arguments, `"completed"` carries the result. The payload is keyed by
//! the call kind, e.g. `{"tool_call":{"shellToolCall":{"args":{...},"result":{...}}}}`.

use super::{error_text, fallback, parse_envelope, str_field, summarize_tool, text_of};
use crate::domain::adapter::{ProtocolAdapter, Vendor};
use crate::domain::message::Message;
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Default)]
pub struct CursorAdapter;

impl CursorAdapter {
    pub fn new() -> Self {
        Self
    }
}

/// Canonical tool name for a cursor call kind (`shellToolCall` → `shell`).
fn tool_name(kind: &str) -> &str {
    match kind {
        "shellToolCall" => "shell",
        "readToolCall" => "read",
        "editToolCall" => "edit",
        "writeToolCall" => "write",
        "deleteToolCall" => "delete",
        "grepToolCall" => "grep",
        "globToolCall" => "glob",
        "lsToolCall" => "ls",
        "todoToolCall" | "updateTodosToolCall" => "todo",
        other => other.strip_suffix("ToolCall").unwrap_or(other),
    }
}

/// The single `{kind: payload}` entry inside `tool_call`.
fn call_payload(envelope: &Value) -> Option<(&str, &Value)> {
    let call: &Map<String, Value> = envelope.get("tool_call")?.as_object()?;
    call.iter().next().map(|(k, v)| (k.as_str(), v))
}

fn started(envelope: &Value) -> Vec<Message> {
    let Some((kind, payload)) = call_payload(envelope) else {
        return Vec::new();
    };
    if kind == "function" {
        let name = payload.get("name").and_then(Value::as_str).unwrap_or("function");
        let args = payload
            .get("arguments")
            .and_then(Value::as_str)
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .unwrap_or(Value::Null);
        return vec![Message::action(name, summarize_tool(name, &args), Some(args.to_string()))];
    }
    let name = tool_name(kind);
    let mut args = payload.get("args").cloned().unwrap_or(Value::Null);
    // cursor names the glob argument `globPattern`
    let pattern = payload.pointer("/args/globPattern").cloned();
    if let (Some(obj), Some(pattern)) = (args.as_object_mut(), pattern) {
        obj.insert("pattern".to_string(), pattern);
    }
    vec![Message::action(name, summarize_tool(name, &args), Some(args.to_string()))]
}

fn completed(envelope: &Value) -> Vec<Message> {
    let Some((kind, payload)) = call_payload(envelope) else {
        return Vec::new();
    };
    let name = tool_name(kind);
    let Some(result) = payload.get("result") else {
        return Vec::new();
    };
    if let Some(err) = result.get("error").or_else(|| result.get("failure")) {
        let text = str_field(err, &["message", "error", "stderr"]).unwrap_or("tool failed");
        return vec![Message::observation_from(name, &format!("error: {}", text))];
    }
    let Some(success) = result.get("success") else {
        return Vec::new();
    };
    let text = if kind == "shellToolCall" {
        let stdout = str_field(success, &["stdout"]).unwrap_or_default();
        let stderr = str_field(success, &["stderr"]).unwrap_or_default();
        let joined = [stdout.trim_end(), stderr.trim_end()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
        (!joined.is_empty()).then_some(joined)
    } else {
        success.get("content").and_then(text_of)
    };
    text.map(|t| vec![Message::observation_from(name, &t)])
        .unwrap_or_default()
}

impl ProtocolAdapter for CursorAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Cursor
    }

    fn program(&self) -> &str {
        "cursor-agent"
    }

    fn build_arguments(
        &self,
        prompt: &str,
        model: Option<&str>,
        _extra_dir: Option<&Path>,
    ) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            "--force".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
        ];
        if let Some(model) = model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args.push(prompt.to_string());
        args
    }

    fn uses_stdin(&self) -> bool {
        false
    }

    fn parse(&mut self, line: &str) -> Vec<Message> {
        let Some(envelope) = parse_envelope(line) else {
            return fallback(line);
        };
        match envelope.get("type").and_then(Value::as_str) {
            Some("system") | Some("user") | Some("thinking") => Vec::new(),
            Some("assistant") => envelope
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(text_of)
                .map(|t| vec![Message::say(t.trim())])
                .unwrap_or_default(),
            Some("tool_call") => match envelope.get("subtype").and_then(Value::as_str) {
                Some("started") => started(&envelope),
                Some("completed") => completed(&envelope),
                _ => Vec::new(),
            },
            Some("result") => {
                let failed = envelope.get("is_error").and_then(Value::as_bool).unwrap_or(false)
                    || envelope.get("subtype").and_then(Value::as_str) == Some("error");
                if failed {
                    vec![Message::error(error_text(&envelope))]
                } else {
                    envelope
                        .get("result")
                        .and_then(text_of)
                        .map(|t| vec![Message::say(t.trim())])
                        .unwrap_or_default()
                }
            }
            Some("error") => vec![Message::error(error_text(&envelope))],
            _ => fallback(line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;

    #[test]
    fn test_shell_call_lifecycle() {
        let mut adapter = CursorAdapter::new();
        let start = adapter.parse(
            r#"{"type":"tool_call","subtype":"started","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"npm test"}}}}"#,
        );
        assert_eq!(start.len(), 1);
        assert_eq!(start[0].kind(), MessageKind::Do);
        assert_eq!(start[0].content(), "$ npm test");

        let done = adapter.parse(
            r#"{"type":"tool_call","subtype":"completed","call_id":"c1","tool_call":{"shellToolCall":{"args":{"command":"npm test"},"result":{"success":{"stdout":"ok\n","stderr":"","exitCode":0}}}}}"#,
        );
        assert_eq!(done[0].kind(), MessageKind::See);
        assert_eq!(done[0].content(), "ok");
        assert_eq!(done[0].tool_name(), Some("shell"));
    }

    #[test]
    fn test_read_and_glob_summaries() {
        let mut adapter = CursorAdapter::new();
        let read = adapter.parse(
            r#"{"type":"tool_call","subtype":"started","tool_call":{"readToolCall":{"args":{"path":"src/app.ts"}}}}"#,
        );
        assert_eq!(read[0].content(), "read: src/app.ts");
        let glob = adapter.parse(
            r#"{"type":"tool_call","subtype":"started","tool_call":{"globToolCall":{"args":{"globPattern":"**/*.ts"}}}}"#,
        );
        assert_eq!(glob[0].content(), "glob: **/*.ts");
    }

    #[test]
    fn test_assistant_and_result() {
        let mut adapter = CursorAdapter::new();
        let say = adapter.parse(
            r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"Reading files"}]}}"#,
        );
        assert_eq!(say[0].content(), "Reading files");
        assert!(adapter.parse(r#"{"type":"system","subtype":"init","model":"gpt-5"}"#).is_empty());
        let err = adapter.parse(
            r#"{"type":"result","subtype":"error","is_error":true,"result":"aborted"}"#,
        );
        assert_eq!(err[0].content(), "[Error: aborted]");
    }

    #[test]
    fn test_prompt_as_argument() {
        let adapter = CursorAdapter::new();
        let args = adapter.build_arguments("do work", None, Some(Path::new("/x")));
        assert_eq!(args.last().map(String::as_str), Some("do work"));
        assert!(!args.contains(&"/x".to_string()));
    }
}
