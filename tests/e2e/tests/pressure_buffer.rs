//! End-to-end coverage of pressure-adaptive context sizing and the
//! emergency compression ladder (spec §4.E, §4.J).

mod harness;

use std::sync::Arc;

use coco_core::config::AppConfig;
use coco_core::episodic::target_length_for_pressure;
use coco_core::identity::IdentityDocument;
use coco_core::tools::ToolRegistry;
use harness::{build_harness, ScriptedLlm};

#[test]
fn target_length_shrinks_as_pressure_rises() {
    assert_eq!(target_length_for_pressure(0.1), 35);
    assert_eq!(target_length_for_pressure(0.65), 25);
    assert_eq!(target_length_for_pressure(0.80), 20);
    assert_eq!(target_length_for_pressure(0.95), 15);
}

#[tokio::test]
async fn a_bloated_identity_document_trips_the_full_compression_ladder() {
    let mut config = AppConfig::default();
    config.context_warning_tokens = 100;
    config.context_critical_tokens = 150;
    config.summary_budget_tokens = 50;
    config.document_budget_low = 10;
    config.identity_budget_tokens = 50_000;
    config.facts_autoinject_threshold = 2.0; // never autoinject here

    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text_reply("noted.")]));
    let h = build_harness(config, llm, ToolRegistry::new());

    // Bypass the Identity Store's write path to plant an oversized
    // self-identity document directly, forcing pressure past both
    // thresholds on the very first turn.
    let bloated = "This is a long-winded paragraph about who I am. ".repeat(40);
    std::fs::write(
        h.identity_dir.path().join(IdentityDocument::SelfIdentity.filename()),
        bloated,
    )
    .unwrap();

    let output = h.engine.run_turn("session-p", "hello").await.unwrap();
    assert_eq!(output.assistant_text, "noted.");

    let applied = &output.observability.compression_applied;
    assert!(applied.contains(&"reduced_document_budget"));
    assert!(applied.contains(&"capped_summary_text"));
    assert!(applied.contains(&"dropped_oldest_working_memory"));
    assert!(applied.contains(&"dropped_facts_autoinjection"));
}

#[tokio::test]
async fn a_short_identity_document_never_triggers_compression() {
    let config = AppConfig::default();
    let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text_reply("hi")]));
    let h = build_harness(config, llm, ToolRegistry::new());

    let output = h.engine.run_turn("session-q", "hello").await.unwrap();
    assert!(output.observability.compression_applied.is_empty());
}

#[tokio::test]
async fn working_memory_grows_across_turns_until_summarization_kicks_in() {
    let mut config = AppConfig::default();
    config.buffer_rolling_checkpoint = 3;
    let replies: Vec<_> = (0..6).map(|i| ScriptedLlm::text_reply(&format!("reply {i}"))).collect();
    let llm = Arc::new(ScriptedLlm::new(replies));
    let h = build_harness(config, llm, ToolRegistry::new());

    for i in 0..6 {
        h.engine.run_turn("session-r", &format!("message {i}")).await.unwrap();
    }

    let count: i64 = h
        .storage
        .with_reader(|conn| {
            conn.query_row("SELECT COUNT(*) FROM exchanges", [], |r| r.get(0))
                .map_err(coco_core::error::CocoError::Database)
        })
        .unwrap();
    assert_eq!(count, 6, "every turn persists durably regardless of in-memory summarization");
}
