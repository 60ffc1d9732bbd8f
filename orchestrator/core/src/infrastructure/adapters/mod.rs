// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Vendor Protocol Adapters
//!
//! One [`ProtocolAdapter`] per supported CLI plus the helpers they share:
//! JSON envelope detection, the plain-`Say` fallback and the tool summary
//! formatter that turns `{"command": "ls"}` into `"$ ls"`.

pub mod claude;
pub mod codex;
pub mod cursor;
pub mod custom;
pub mod gemini;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use cursor::CursorAdapter;
pub use custom::CustomAdapter;
pub use gemini::GeminiAdapter;

use crate::domain::adapter::{AgentProfile, ProtocolAdapter, Vendor};
use crate::domain::message::Message;
use crate::domain::runtime::RuntimeError;
use serde_json::Value;

const SUMMARY_ARG_MAX_CHARS: usize = 120;

/// Build the adapter for `profile`.
pub fn create_adapter(profile: &AgentProfile) -> Result<Box<dyn ProtocolAdapter>, RuntimeError> {
    let adapter: Box<dyn ProtocolAdapter> = match profile.vendor {
        Vendor::Claude => Box::new(ClaudeAdapter::new()),
        Vendor::Codex => Box::new(CodexAdapter::new()),
        Vendor::Gemini => Box::new(GeminiAdapter::new()),
        Vendor::Cursor => Box::new(CursorAdapter::new()),
        Vendor::Custom => {
            let command = profile.command.clone().ok_or_else(|| {
                RuntimeError::SpawnFailed("custom vendor requires a command".to_string())
            })?;
            Box::new(CustomAdapter::new(command))
        }
    };
    Ok(adapter)
}

/// Parse `line` as a JSON object, or `None` for anything else.
pub(crate) fn parse_envelope(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

/// Plain text becomes a `Say`; blank input yields nothing.
pub(crate) fn fallback(line: &str) -> Vec<Message> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Vec::new()
    } else {
        vec![Message::say(trimmed)]
    }
}

pub(crate) fn str_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find_map(Value::as_str)
}

/// Flatten the text of a string, an array of content blocks, or an object
/// with a `text`/`content` member.
pub(crate) fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(text_of)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => {
            if let Some(t) = value.get("text").and_then(text_of) {
                t
            } else if let Some(c) = value.get("content").and_then(text_of) {
                c
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Extract the error text from `"error": "..."`, `"error": {"message": ...}` or `"message"`.
pub(crate) fn error_text(value: &Value) -> String {
    if let Some(err) = value.get("error") {
        if let Some(s) = err.as_str() {
            return s.to_string();
        }
        if let Some(s) = str_field(err, &["message", "msg", "detail"]) {
            return s.to_string();
        }
    }
    str_field(value, &["message", "result", "subtype"])
        .unwrap_or("unknown error")
        .to_string()
}

/// Short human-readable summary of a tool invocation.
///
/// Shell-like tools render as `"$ <command>"`, file tools as
/// `"read: <path>"`/`"write: <path>"`/`"edit: <path>"`, search tools as
/// `"grep: <pattern>"`/`"glob: <pattern>"`, web tools as
/// `"fetch: <url>"`/`"search: <query>"`.
pub fn summarize_tool(name: &str, input: &Value) -> String {
    let lower = name.to_ascii_lowercase();
    let lower = lower.as_str();

    if is_shell_tool(lower) {
        if let Some(cmd) = shell_command(input) {
            return format!("$ {}", cmd);
        }
    }

    let path = || {
        str_field(
            input,
            &[
                "file_path",
                "path",
                "absolute_path",
                "filename",
                "target_file",
                "notebook_path",
            ],
        )
    };

    let labelled = match lower {
        "read" | "read_file" | "view" | "cat" | "read_many_files" => {
            path().map(|p| format!("read: {}", p))
        }
        "write" | "write_file" | "create_file" => path().map(|p| format!("write: {}", p)),
        "edit" | "multiedit" | "replace" | "edit_file" | "str_replace" | "str_replace_editor"
        | "apply_patch" | "notebookedit" | "search_replace" => {
            path().map(|p| format!("edit: {}", p))
        }
        "grep" | "search_file_content" | "search" | "codebase_search" => {
            str_field(input, &["pattern", "query", "regex"]).map(|p| format!("grep: {}", p))
        }
        "glob" | "find" | "file_search" => {
            str_field(input, &["pattern", "glob", "glob_pattern", "query"])
                .map(|p| format!("glob: {}", p))
        }
        "ls" | "list_directory" | "list_dir" => path().map(|p| format!("ls: {}", p)),
        "webfetch" | "web_fetch" | "fetch" => {
            str_field(input, &["url", "prompt"]).map(|u| format!("fetch: {}", u))
        }
        "websearch" | "web_search" | "google_web_search" => {
            str_field(input, &["query", "q"]).map(|q| format!("search: {}", q))
        }
        _ => None,
    };
    if let Some(summary) = labelled {
        return summary;
    }

    match first_string_argument(input) {
        Some(arg) => format!("{}: {}", name, shorten(&arg)),
        None => name.to_string(),
    }
}

fn is_shell_tool(lower: &str) -> bool {
    matches!(
        lower,
        "bash" | "shell" | "sh" | "exec" | "run_shell_command" | "command_execution"
            | "local_shell" | "terminal" | "run_terminal_cmd" | "execute_command"
    ) || lower.contains("shell")
}

/// Command string from `{"command": ...}` / `{"cmd": ...}` or a bare value.
/// Array commands are joined by spaces; `bash -lc '<cmd>'` wrappers are unwrapped.
pub(crate) fn shell_command(input: &Value) -> Option<String> {
    let raw = match input {
        Value::Object(_) => input.get("command").or_else(|| input.get("cmd"))?,
        other => other,
    };
    let joined = match raw {
        Value::String(s) => s.clone(),
        Value::Array(parts) => {
            let parts: Vec<String> = parts
                .iter()
                .filter_map(|p| p.as_str().map(str::to_string))
                .collect();
            if parts.len() >= 3 && is_shell_wrapper(&parts[0], &parts[1]) {
                return Some(parts[2..].join(" "));
            }
            parts.join(" ")
        }
        _ => return None,
    };
    let cmd = unwrap_shell(&joined);
    if cmd.is_empty() {
        None
    } else {
        Some(cmd)
    }
}

fn is_shell_wrapper(program: &str, flag: &str) -> bool {
    let program = program.rsplit('/').next().unwrap_or(program);
    matches!(program, "bash" | "sh" | "zsh") && matches!(flag, "-lc" | "-c")
}

/// `bash -lc 'ls -la'` → `ls -la`; anything else is returned trimmed.
pub(crate) fn unwrap_shell(command: &str) -> String {
    let trimmed = command.trim();
    for prefix in [
        "bash -lc ",
        "bash -c ",
        "/bin/bash -lc ",
        "/bin/bash -c ",
        "sh -c ",
        "zsh -lc ",
    ] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return strip_quotes(rest.trim()).to_string();
        }
    }
    trimmed.to_string()
}

fn strip_quotes(s: &str) -> &str {
    for quote in ['\'', '"'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

fn first_string_argument(input: &Value) -> Option<String> {
    match input {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .values()
            .find_map(|v| v.as_str().filter(|s| !s.trim().is_empty()))
            .map(str::to_string),
        _ => None,
    }
}

fn shorten(arg: &str) -> String {
    let first_line = arg.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > SUMMARY_ARG_MAX_CHARS {
        let mut cut: String = first_line.chars().take(SUMMARY_ARG_MAX_CHARS).collect();
        cut.push('…');
        cut
    } else {
        first_line.to_string()
    }
}

/// Route a `{"type": ...}` envelope in the generic dialect.
///
/// Returns `None` for unknown types so the caller can fall back to a raw `Say`.
pub(crate) fn map_generic_envelope(value: &Value) -> Option<Vec<Message>> {
    let kind = value.get("type")?.as_str()?;
    let messages = match kind {
        "say" | "message" | "assistant" | "text" => {
            ["content", "text", "message"]
                .iter()
                .filter_map(|k| value.get(*k))
                .find_map(text_of)
                .map(Message::say)
                .into_iter()
                .collect()
        }
        "do" | "tool_use" | "tool_call" => {
            let name = str_field(value, &["name", "tool", "tool_name"]).unwrap_or("tool");
            let input = value
                .get("input")
                .or_else(|| value.get("args"))
                .or_else(|| value.get("parameters"))
                .cloned()
                .unwrap_or(Value::Null);
            vec![Message::action(
                name,
                summarize_tool(name, &input),
                (!input.is_null()).then(|| input.to_string()),
            )]
        }
        "see" | "tool_result" | "observation" => ["content", "output", "result"]
            .iter()
            .filter_map(|k| value.get(*k))
            .find_map(text_of)
            .map(|t| Message::observation(&t))
            .into_iter()
            .collect(),
        "error" => vec![Message::error(error_text(value))],
        "result" => {
            if value.get("is_error").and_then(Value::as_bool).unwrap_or(false) {
                vec![Message::error(error_text(value))]
            } else {
                value
                    .get("result")
                    .and_then(text_of)
                    .map(Message::say)
                    .into_iter()
                    .collect()
            }
        }
        _ => return None,
    };
    Some(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_shell_summary() {
        assert_eq!(summarize_tool("Bash", &json!({"command": "cargo test"})), "$ cargo test");
        assert_eq!(
            summarize_tool("shell", &json!({"command": ["bash", "-lc", "ls -la"]})),
            "$ ls -la"
        );
        assert_eq!(
            summarize_tool("run_shell_command", &json!({"command": "bash -lc 'git status'"})),
            "$ git status"
        );
    }

    #[test]
    fn test_file_and_search_summaries() {
        assert_eq!(summarize_tool("Read", &json!({"file_path": "src/lib.rs"})), "read: src/lib.rs");
        assert_eq!(
            summarize_tool("Write", &json!({"file_path": "a.txt", "content": "x"})),
            "write: a.txt"
        );
        assert_eq!(summarize_tool("MultiEdit", &json!({"file_path": "b.rs"})), "edit: b.rs");
        assert_eq!(summarize_tool("Grep", &json!({"pattern": "TODO"})), "grep: TODO");
        assert_eq!(summarize_tool("Glob", &json!({"pattern": "**/*.rs"})), "glob: **/*.rs");
        assert_eq!(
            summarize_tool("WebFetch", &json!({"url": "https://x.dev"})),
            "fetch: https://x.dev"
        );
        assert_eq!(summarize_tool("WebSearch", &json!({"query": "tokio"})), "search: tokio");
    }

    #[test]
    fn test_unknown_tool_summary() {
        assert_eq!(summarize_tool("TodoWrite", &json!({"todos": []})), "TodoWrite");
        assert_eq!(summarize_tool("Task", &json!({"description": "explore"})), "Task: explore");
    }

    #[test]
    fn test_fallback_and_blank() {
        assert!(fallback("   ").is_empty());
        assert_eq!(fallback(" hi ")[0].content(), "hi");
    }

    #[test]
    fn test_parse_envelope_rejects_non_objects() {
        assert!(parse_envelope("[1,2]").is_none());
        assert!(parse_envelope("{broken").is_none());
        assert!(parse_envelope("{\"type\":\"x\"}").is_some());
    }

    #[test]
    fn test_create_adapter_requires_custom_command() {
        assert!(create_adapter(&AgentProfile::new(Vendor::Custom)).is_err());
        let adapter = create_adapter(&AgentProfile::new(Vendor::Gemini)).unwrap();
        assert_eq!(adapter.vendor(), Vendor::Gemini);
    }
}
