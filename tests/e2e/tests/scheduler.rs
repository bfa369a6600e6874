//! End-to-end coverage of the Autonomous Scheduler: natural-language
//! schedule parsing, ticking due tasks through real templates, and the
//! manual-approval outbox (spec §4.K).

mod harness;

use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coco_core::error::CocoError;
use coco_core::facts::SqliteFactsStore;
use coco_core::scheduler::templates::{default_templates, TemplateContext};
use coco_core::scheduler::{ExecutionStatus, Scheduler, SchedulerStore};
use coco_core::semantic::{HashEmbedder, SqliteSemanticStore};
use coco_core::storage::Storage;
use coco_core::tools::providers::UnlimitedRateLimiter;
use coco_core::tools::{ToolCategory, ToolDefinition, ToolHandler, ToolRegistry};

struct FakeSearchWeb;

#[async_trait]
impl ToolHandler for FakeSearchWeb {
    async fn call(&self, input: serde_json::Value) -> std::result::Result<serde_json::Value, CocoError> {
        let query = input.get("query").and_then(|v| v.as_str()).unwrap_or("");
        Ok(serde_json::json!({"results": format!("three articles about {query}")}))
    }
}

fn registry_with_search_web() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ToolDefinition::new(
        "search_web",
        "searches the web",
        serde_json::json!({"type": "object"}),
        ToolCategory::Web,
        Duration::from_secs(5),
        Arc::new(FakeSearchWeb),
    ));
    registry
}

fn force_due(store: &SchedulerStore, task_id: &str) {
    store
        .reschedule(task_id, chrono::Utc::now() - chrono::Duration::seconds(1))
        .unwrap();
}

#[test]
fn a_natural_language_schedule_resolves_to_a_future_fire_time() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let store = SchedulerStore::new(storage);

    let task = store
        .create_task("morning digest", "every day at 7am", "health_check", serde_json::Value::Null)
        .unwrap();

    assert!(task.next_run_at > chrono::Utc::now());
    assert_eq!(task.cron.to_cron_string(), "0 7 * * *");
}

#[tokio::test]
async fn a_health_check_task_completes_without_approval() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let facts = Arc::new(SqliteFactsStore::new(storage.clone()));
    let semantic = Arc::new(SqliteSemanticStore::new(storage.clone(), Arc::new(HashEmbedder::new(32))));
    let store = Arc::new(SchedulerStore::new(storage));

    let task = store
        .create_task("hc", "every 5 minutes", "health_check", serde_json::Value::Null)
        .unwrap();
    force_due(&store, &task.id);

    let context = TemplateContext {
        tools: Arc::new(ToolRegistry::new()),
        rate_limiter: Arc::new(UnlimitedRateLimiter),
        facts: Some(facts),
        semantic: Some(semantic),
    };
    let scheduler = Scheduler::new(store.clone(), default_templates(), context, Arc::new(AtomicI64::new(1)));

    let results = scheduler.tick().await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1, ExecutionStatus::Ok);
    assert!(store.pending_outbox().unwrap().is_empty(), "a read-only template must never write to the outbox");
}

#[tokio::test]
async fn a_web_research_task_files_a_semantic_memory_and_needs_no_approval() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let semantic = Arc::new(SqliteSemanticStore::new(storage.clone(), Arc::new(HashEmbedder::new(32))));
    let store = Arc::new(SchedulerStore::new(storage));

    let task = store
        .create_task("research", "every 5 minutes", "web_research", serde_json::json!({"query": "rust async runtimes"}))
        .unwrap();
    force_due(&store, &task.id);

    let context = TemplateContext {
        tools: Arc::new(registry_with_search_web()),
        rate_limiter: Arc::new(UnlimitedRateLimiter),
        facts: None,
        semantic: Some(semantic.clone()),
    };
    let scheduler = Scheduler::new(store.clone(), default_templates(), context, Arc::new(AtomicI64::new(1)));

    let results = scheduler.tick().await.unwrap();
    assert_eq!(results[0].1, ExecutionStatus::Ok);
    // One from the template itself, one from the scheduler's own
    // autonomous-fire recording (spec §4.K).
    assert_eq!(coco_core::semantic::SemanticStore::count(semantic.as_ref()).unwrap(), 2);
}

#[tokio::test]
async fn a_posting_template_lands_in_the_outbox_awaiting_approval() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let store = Arc::new(SchedulerStore::new(storage));

    let task = store
        .create_task(
            "weekly email",
            "every 5 minutes",
            "simple_email",
            serde_json::json!({"to": "owner@example.com", "subject": "status", "body": "all clear"}),
        )
        .unwrap();
    force_due(&store, &task.id);

    let context = TemplateContext {
        tools: Arc::new(ToolRegistry::new()),
        rate_limiter: Arc::new(UnlimitedRateLimiter),
        facts: None,
        semantic: None,
    };
    let scheduler = Scheduler::new(store.clone(), default_templates(), context, Arc::new(AtomicI64::new(1)));

    scheduler.tick().await.unwrap();

    let pending = store.pending_outbox().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].1, "simple_email");
    assert_eq!(pending[0].2["to"], "owner@example.com");

    // A human approves it out of band; marking it sent drains the queue.
    store.mark_outbox_sent(&pending[0].0).unwrap();
    assert!(store.pending_outbox().unwrap().is_empty());
}

#[tokio::test]
async fn a_disabled_task_never_comes_due() {
    let storage = Arc::new(Storage::open_in_memory().unwrap());
    let store = Arc::new(SchedulerStore::new(storage));

    let task = store
        .create_task("paused", "every 5 minutes", "health_check", serde_json::Value::Null)
        .unwrap();
    force_due(&store, &task.id);
    store.set_enabled(&task.id, false).unwrap();

    assert!(store.due_tasks(chrono::Utc::now()).unwrap().is_empty());
}
