//! End-to-end coverage of the turn protocol across real storage,
//! identity, facts, and semantic stores — the wiring `coco-agent`'s
//! `main.rs` assembles, exercised through the public `coco-core` API
//! rather than `engine`'s own internal unit tests.

mod harness;

use std::sync::Arc;
use std::time::Duration;

use coco_core::config::AppConfig;
use coco_core::tools::{ToolCategory, ToolDefinition, ToolRegistry};
use harness::{build_harness, EchoTool, ScriptedLlm};

#[tokio::test]
async fn a_plain_turn_round_trips_through_real_storage() {
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text_reply("Hello, friend.")]));
    let h = build_harness(AppConfig::default(), llm, ToolRegistry::new());

    let output = h.engine.run_turn("session-a", "hi there").await.unwrap();
    assert_eq!(output.assistant_text, "Hello, friend.");
    assert_eq!(output.exchange_id, 1);

    let stored_agent_text: String = h
        .storage
        .with_reader(|conn| {
            conn.query_row("SELECT agent_text FROM exchanges WHERE id = 1", [], |r| r.get(0))
                .map_err(coco_core::error::CocoError::Database)
        })
        .unwrap();
    assert_eq!(stored_agent_text, "Hello, friend.");
}

#[tokio::test]
async fn tool_use_invokes_the_registry_and_the_follow_up_has_matching_results() {
    let mut registry = ToolRegistry::new();
    registry.register(ToolDefinition::new(
        "echo",
        "echoes its input",
        serde_json::json!({"type": "object"}),
        ToolCategory::Filesystem,
        Duration::from_secs(1),
        Arc::new(EchoTool),
    ));

    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::tool_use("call-1", "echo", serde_json::json!({"greeting": "hi"})),
        ScriptedLlm::text_reply("Echoed it back."),
    ]));
    let h = build_harness(AppConfig::default(), llm, registry);

    let output = h.engine.run_turn("session-b", "echo hi").await.unwrap();
    assert_eq!(output.assistant_text, "Echoed it back.");
    assert_eq!(output.tool_calls.len(), 1);
    assert_eq!(output.tool_calls[0].name, "echo");
    assert!(output.observability.tools_executed.contains(&"echo".to_string()));
}

#[tokio::test]
async fn an_unreachable_llm_still_produces_a_turn_and_is_logged_as_an_error() {
    let h = build_harness(AppConfig::default(), Arc::new(harness::AlwaysFailsLlm), ToolRegistry::new());

    let output = h.engine.run_turn("session-c", "hello?").await.unwrap();
    assert!(output.assistant_text.contains("ExternalFailure"));
    assert!(output.observability.error_kinds.contains(&"ExternalFailure"));
}

#[tokio::test]
async fn consecutive_turns_in_a_session_persist_as_separate_exchanges() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        ScriptedLlm::text_reply("first"),
        ScriptedLlm::text_reply("second"),
    ]));
    let h = build_harness(AppConfig::default(), llm, ToolRegistry::new());

    let first = h.engine.run_turn("session-d", "one").await.unwrap();
    let second = h.engine.run_turn("session-d", "two").await.unwrap();
    assert_eq!(second.exchange_id, first.exchange_id + 1);

    let count: i64 = h
        .storage
        .with_reader(|conn| {
            conn.query_row("SELECT COUNT(*) FROM exchanges", [], |r| r.get(0))
                .map_err(coco_core::error::CocoError::Database)
        })
        .unwrap();
    assert_eq!(count, 2);
}
