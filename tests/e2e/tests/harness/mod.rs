//! Shared test doubles and bootstrap helpers for the end-to-end suite.
//! Not a test target itself — each `tests/*.rs` file pulls this in with
//! `mod harness;`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use coco_core::config::AppConfig;
use coco_core::docs::NullDocumentIndex;
use coco_core::engine::{Capabilities, ConsciousnessEngine};
use coco_core::error::{CocoError, Result};
use coco_core::facts::SqliteFactsStore;
use coco_core::identity::IdentityStore;
use coco_core::llm::{Block, CompletionResponse, FinishReason, LlmClient, Message, ToolSchema};
use coco_core::semantic::{HashEmbedder, SqliteSemanticStore};
use coco_core::storage::Storage;
use coco_core::tools::{ToolHandler, ToolRegistry};

/// Replays a fixed script of responses, then falls back to a plain
/// `end_turn` "done" once exhausted — the same double the engine's own
/// unit tests use, reused here so e2e tests drive the real wiring path
/// (`Storage::open_in_memory`, real `IdentityStore`, real fact/semantic
/// stores) rather than engine internals directly.
pub struct ScriptedLlm {
    responses: StdMutex<Vec<CompletionResponse>>,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: StdMutex::new(responses),
        }
    }

    pub fn text_reply(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: vec![Block::text(text)],
            finish_reason: FinishReason::EndTurn,
        }
    }

    pub fn tool_use(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            content: vec![Block::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
            finish_reason: FinishReason::ToolUse,
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<CompletionResponse> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(Self::text_reply("done"));
        }
        Ok(responses.remove(0))
    }
}

/// Always fails, for exercising the engine's apology-not-a-crash path.
pub struct AlwaysFailsLlm;

#[async_trait]
impl LlmClient for AlwaysFailsLlm {
    async fn complete(
        &self,
        _system_prompt: &str,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<CompletionResponse> {
        Err(CocoError::ExternalFailure("provider unreachable".to_string()))
    }
}

/// Echoes its input back as the tool result.
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, input: serde_json::Value) -> std::result::Result<serde_json::Value, CocoError> {
        Ok(input)
    }
}

/// A fully wired engine over in-memory/tempfile storage: real
/// `IdentityStore`, real SQLite-backed Facts and Semantic stores, the
/// given tool registry and LLM double. Mirrors what `coco-agent`'s
/// `main.rs` wires up, minus the network-backed LLM client and the
/// external provider tools.
pub struct Harness {
    pub engine: ConsciousnessEngine,
    pub storage: Arc<Storage>,
    pub identity_dir: tempfile::TempDir,
    pub config: Arc<AppConfig>,
}

pub fn build_harness(config: AppConfig, llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Harness {
    let identity_dir = tempfile::TempDir::new().expect("tempdir");
    let storage = Arc::new(Storage::open_in_memory().expect("open in-memory storage"));
    let identity = Arc::new(IdentityStore::new(identity_dir.path()));
    let config = Arc::new(config);

    let facts = Arc::new(SqliteFactsStore::new(storage.clone()));
    let semantic = Arc::new(SqliteSemanticStore::new(storage.clone(), Arc::new(HashEmbedder::new(64))));

    let capabilities = Capabilities {
        facts: Some(facts),
        semantic: Some(semantic),
        docs: Some(Arc::new(NullDocumentIndex)),
    };

    let engine = ConsciousnessEngine::new(config.clone(), llm, Arc::new(tools), identity, storage.clone(), capabilities)
        .expect("construct engine");

    Harness {
        engine,
        storage,
        identity_dir,
        config,
    }
}
