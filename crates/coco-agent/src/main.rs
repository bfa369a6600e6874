//! COCO process entry point
//!
//! Wires configuration, storage, memory stores, the tool registry, the
//! consciousness engine, and the autonomous scheduler together, then
//! drives a line-oriented terminal loop on stdin/stdout. A full
//! terminal UI is out of scope (spec Non-goals); this is the minimal
//! foreground loop that actually exercises `run_turn`.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use coco_core::{
    config::AppConfig,
    docs::NullDocumentIndex,
    engine::{Capabilities, ConsciousnessEngine},
    error::CocoError,
    facts::SqliteFactsStore,
    identity::IdentityStore,
    llm::anthropic::{AnthropicClient, AnthropicConfig},
    llm::LlmClient,
    scheduler::{
        templates::{default_templates, TemplateContext},
        Scheduler, SchedulerStore,
    },
    semantic::{CachingEmbedder, HashEmbedder, SqliteSemanticStore},
    storage::Storage,
    tools::catalog::{build_default_registry, CatalogProviders},
    tools::providers::UnlimitedRateLimiter,
};
use directories::ProjectDirs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

fn workspace_root() -> PathBuf {
    if let Some(raw) = std::env::var("COCO_WORKSPACE_DIR").ok().filter(|s| !s.is_empty()) {
        return PathBuf::from(raw);
    }
    ProjectDirs::from("dev", "coco", "agent")
        .map(|dirs| dirs.data_dir().join("workspace"))
        .unwrap_or_else(|| PathBuf::from("./coco-workspace"))
}

fn build_llm(config: &AppConfig) -> Arc<dyn LlmClient> {
    match std::env::var("ANTHROPIC_API_KEY").ok().filter(|k| !k.is_empty()) {
        Some(api_key) => {
            let anthropic_config = AnthropicConfig::new(api_key, config.llm_model.clone());
            match AnthropicClient::new(anthropic_config) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    error!(error = %e, "failed to build Anthropic client, falling back to a stub");
                    Arc::new(StubLlm)
                }
            }
        }
        None => {
            warn!("ANTHROPIC_API_KEY not set, running with a stub LLM that cannot actually converse");
            Arc::new(StubLlm)
        }
    }
}

/// Returned when no real LLM credential is configured. Keeps the
/// process runnable (for scheduler-only or storage-inspection use) even
/// without an API key, rather than refusing to start.
struct StubLlm;

#[async_trait::async_trait]
impl LlmClient for StubLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[coco_core::llm::Message],
        _tools: &[coco_core::llm::ToolSchema],
    ) -> Result<coco_core::llm::CompletionResponse, CocoError> {
        Err(CocoError::ExternalFailure(
            "no LLM configured: set ANTHROPIC_API_KEY".to_string(),
        ))
    }
}

async fn run_scheduler_loop(scheduler: Arc<Scheduler>, tick: std::time::Duration) {
    loop {
        tokio::time::sleep(tick).await;
        match scheduler.tick().await {
            Ok(results) => {
                if !results.is_empty() {
                    info!(fired = results.len(), "scheduler tick ran tasks");
                }
            }
            Err(e) => warn!(error = %e, "scheduler tick failed"),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_target(false)
        .init();

    let config = Arc::new(AppConfig::from_env());
    info!(model = %config.llm_model, context_limit = config.context_limit_tokens, "starting coco");

    let root = workspace_root();
    if let Err(e) = std::fs::create_dir_all(&root) {
        error!(error = %e, path = %root.display(), "failed to create workspace directory");
        std::process::exit(1);
    }

    let db_path = root.join("coco.db");
    let storage = match Storage::open(Some(db_path)) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!(error = %e, "failed to open storage");
            std::process::exit(1);
        }
    };

    let identity = Arc::new(IdentityStore::new(root.clone()));
    if let Err(e) = identity.validate_layout() {
        error!(error = %e, "identity document layout is corrupted");
        std::process::exit(1);
    }

    let facts_store = Arc::new(SqliteFactsStore::new(storage.clone()));
    let embedder = Arc::new(CachingEmbedder::new(
        HashEmbedder::new(config.embedding_dim),
        std::num::NonZeroUsize::new(256).expect("256 is nonzero"),
    ));
    let semantic_store = Arc::new(SqliteSemanticStore::new(storage.clone(), embedder));

    let tools = Arc::new(build_default_registry(root.clone(), CatalogProviders::default()));
    info!(tool_count = tools.len(), "tool registry ready");

    let llm = build_llm(&config);

    let capabilities = Capabilities {
        facts: Some(facts_store.clone()),
        semantic: Some(semantic_store.clone()),
        docs: Some(Arc::new(NullDocumentIndex)),
    };

    let engine = match ConsciousnessEngine::new(
        config.clone(),
        llm,
        tools.clone(),
        identity.clone(),
        storage.clone(),
        capabilities,
    ) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(error = %e, "failed to construct consciousness engine");
            std::process::exit(1);
        }
    };

    let scheduler_store = Arc::new(SchedulerStore::new(storage.clone()));
    let scheduler_context = TemplateContext {
        tools: tools.clone(),
        rate_limiter: Arc::new(UnlimitedRateLimiter),
        facts: Some(facts_store),
        semantic: Some(semantic_store),
    };
    let scheduler = Arc::new(Scheduler::new(
        scheduler_store,
        default_templates(),
        scheduler_context,
        engine.exchange_id_counter(),
    ));

    tokio::spawn(run_scheduler_loop(scheduler.clone(), config.scheduler_tick));

    info!("coco is ready, type a message and press enter (Ctrl+D to exit)");
    let mut stdout = std::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let session_id = "local-terminal";

    loop {
        print!("> ");
        let _ = stdout.flush();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read from stdin");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match engine.run_turn(session_id, line).await {
            Ok(output) => println!("{}", output.assistant_text),
            Err(e) => println!("(internal error: {})", e.kind()),
        }
    }

    info!("coco shutting down");
}
