// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Properties every vendor adapter must hold.

use arena_core::domain::adapter::{
    AgentProfile, CustomCommand, PromptMode, ProtocolAdapter, Vendor,
};
use arena_core::domain::message::MessageKind;
use arena_core::infrastructure::adapters::create_adapter;

fn all_adapters() -> Vec<Box<dyn ProtocolAdapter>> {
    Vendor::ALL
        .iter()
        .map(|vendor| {
            let profile = if *vendor == Vendor::Custom {
                AgentProfile::custom(CustomCommand {
                    program: "agent".to_string(),
                    args: vec![],
                    prompt_mode: PromptMode::Stdin,
                })
            } else {
                AgentProfile::new(*vendor)
            };
            create_adapter(&profile).unwrap()
        })
        .collect()
}

const MALFORMED: &[&str] = &[
    "not json at all",
    "{\"type\": \"assistant\", \"message\": ",
    "{}",
    "{\"type\": 42}",
    "[1, 2, 3]",
    "{\"type\":\"some_future_envelope\",\"payload\":{}}",
    "null",
    "\u{1F980} unicode narration",
    "OpenAI Codex v0.46.0 (research preview)",
    "--------",
    "model: gpt-5",
    "workdir: /tmp/arena/worker-1",
    "<<worker has been stopped>>",
];

#[test]
fn malformed_input_never_panics_and_falls_back_to_say() {
    for mut adapter in all_adapters() {
        for line in MALFORMED {
            let messages = adapter.parse(line);
            assert!(
                !messages.is_empty(),
                "{} dropped non-empty line {:?}",
                adapter.vendor(),
                line
            );
            assert!(
                messages.iter().all(|m| m.kind() == MessageKind::Say),
                "{} produced non-Say for {:?}",
                adapter.vendor(),
                line
            );
        }
    }
}

#[test]
fn lines_after_an_echoed_prompt_marker_are_not_swallowed() {
    for mut adapter in all_adapters() {
        adapter.parse("user");
        for line in MALFORMED {
            let messages = adapter.parse(line);
            assert!(
                !messages.is_empty(),
                "{} dropped {:?} after a user marker",
                adapter.vendor(),
                line
            );
            assert!(
                messages.iter().all(|m| m.kind() == MessageKind::Say),
                "{} produced non-Say for {:?}",
                adapter.vendor(),
                line
            );
        }
    }
}

#[test]
fn blank_lines_yield_nothing() {
    for mut adapter in all_adapters() {
        for line in ["", "   ", "\t  "] {
            assert!(adapter.parse(line).is_empty(), "{} emitted for blank", adapter.vendor());
        }
    }
}

#[test]
fn shell_tool_invocations_summarize_as_dollar_command() {
    let cases: &[(Vendor, &str)] = &[
        (
            Vendor::Claude,
            r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"1","name":"Bash","input":{"command":"cargo fmt"}}]}}"#,
        ),
        (
            Vendor::Codex,
            r#"{"type":"item.started","item":{"id":"1","type":"command_execution","command":"cargo fmt"}}"#,
        ),
        (
            Vendor::Gemini,
            r#"{"type":"tool_use","tool_name":"run_shell_command","tool_id":"1","parameters":{"command":"cargo fmt"}}"#,
        ),
        (
            Vendor::Cursor,
            r#"{"type":"tool_call","subtype":"started","call_id":"1","tool_call":{"shellToolCall":{"args":{"command":"cargo fmt"}}}}"#,
        ),
        (
            Vendor::Custom,
            r#"{"type":"tool_use","name":"bash","input":{"command":"cargo fmt"}}"#,
        ),
    ];

    let mut adapters = all_adapters();
    for (vendor, line) in cases {
        let adapter = adapters
            .iter_mut()
            .find(|a| a.vendor() == *vendor)
            .unwrap();
        let messages = adapter.parse(line);
        let action = messages
            .iter()
            .find(|m| m.kind() == MessageKind::Do)
            .unwrap_or_else(|| panic!("{} produced no Do", vendor));
        assert_eq!(action.content(), "$ cargo fmt", "{}", vendor);
    }
}

#[test]
fn codex_free_text_exec_summarizes_as_dollar_command() {
    let mut adapter = create_adapter(&AgentProfile::new(Vendor::Codex)).unwrap();
    assert!(adapter.parse("exec").is_empty());
    let messages = adapter.parse("bash -lc 'cargo fmt' in /repo");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content(), "$ cargo fmt");
}

#[test]
fn stdin_vendors_keep_prompt_out_of_arguments() {
    for adapter in all_adapters() {
        let args = adapter.build_arguments("THE PROMPT", None, None);
        let in_args = args.iter().any(|a| a == "THE PROMPT");
        assert_eq!(in_args, !adapter.uses_stdin(), "{}", adapter.vendor());
    }
}
