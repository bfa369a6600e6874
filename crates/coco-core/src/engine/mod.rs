//! Consciousness Engine (component J)
//!
//! The tool-using reasoning loop: assembles a bounded system prompt from
//! identity, summaries, working memory, document context, and auto-
//! injected facts; calls the LLM; dispatches any `tool_use` blocks
//! through the Tool Registry; and persists the resulting exchange into
//! every memory layer (spec §4.J).
//!
//! Per REDESIGN FLAGS, capabilities the engine may or may not have
//! (Facts, Semantic, Docs) are carried as an explicit `Capabilities`
//! struct rather than looked up dynamically; call sites branch on
//! `Option` rather than relying on a silent fall-through.

mod message_builder;

pub use message_builder::ToolResultMessageBuilder;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::AppConfig;
use crate::docs::DocumentIndex;
use crate::episodic::{EpisodicBuffer, Exchange, ToolCallRecord};
use crate::error::{CocoError, Result};
use crate::extractor::ExtractorRegistry;
use crate::facts::{FactsStore, NewFact};
use crate::identity::{IdentityDocument, IdentityStore};
use crate::llm::{Block, LlmClient, Message, Role};
use crate::router;
use crate::semantic::SemanticStore;
use crate::storage::Storage;
use crate::summary::SummaryBuffer;
use crate::tokens;
use crate::tools::ToolRegistry;

/// At least 3 per spec §4.J step 3d; beyond this the engine synthesizes
/// an error message instead of calling the LLM again.
const MAX_TOOL_USE_DEPTH: u32 = 3;

/// Optional capabilities the engine may be constructed without. Missing
/// capabilities degrade the relevant feature rather than failing the
/// turn (spec §4.B "a broken store must degrade... never crash a turn").
pub struct Capabilities {
    pub facts: Option<Arc<dyn FactsStore>>,
    pub semantic: Option<Arc<dyn SemanticStore>>,
    pub docs: Option<Arc<dyn DocumentIndex>>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            facts: None,
            semantic: None,
            docs: None,
        }
    }
}

/// Per-turn observability record (spec §4.J "Observability").
#[derive(Debug, Clone, Default)]
pub struct TurnObservability {
    pub identity_tokens: u32,
    pub summary_tokens: u32,
    pub working_memory_tokens: u32,
    pub document_tokens: u32,
    pub facts_tokens: u32,
    pub total_prompt_tokens: u32,
    pub finish_reason: Option<&'static str>,
    pub tools_executed: Vec<String>,
    pub error_kinds: Vec<&'static str>,
    pub compression_applied: Vec<&'static str>,
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct TurnOutput {
    pub exchange_id: i64,
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub observability: TurnObservability,
}

/// Truncate `text` to approximately `max_tokens` (per the byte-length
/// estimator's `ceil(bytes/3)` contract), cutting on a char boundary and
/// marking the cut with an ellipsis. A no-op if already under budget.
fn truncate_to_tokens(text: &str, max_tokens: u32) -> String {
    if tokens::estimate(text) <= max_tokens {
        return text.to_string();
    }
    let max_bytes = (max_tokens as usize) * 3;
    let mut end = max_bytes.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}

/// Context-pressure ratio: assembled tokens so far over the context
/// limit (spec §4.E, §4.J).
fn pressure(used_tokens: u32, context_limit: u32) -> f32 {
    if context_limit == 0 {
        return 1.0;
    }
    used_tokens as f32 / context_limit as f32
}

struct AssembledPrompt {
    text: String,
    obs: TurnObservability,
}

/// The tool-using reasoning loop (spec §4.J).
pub struct ConsciousnessEngine {
    config: Arc<AppConfig>,
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    identity: Arc<IdentityStore>,
    storage: Arc<Storage>,
    episodic: std::sync::Mutex<EpisodicBuffer>,
    summary: AsyncMutex<SummaryBuffer>,
    extractor: Arc<ExtractorRegistry>,
    capabilities: Capabilities,
    /// Shared (not owned) so the scheduler's autonomous template fires
    /// can allocate ids from the exact same counter and never collide
    /// with a foreground turn's exchange id in the shared `exchanges`
    /// table — see `exchange_id_counter()`.
    next_exchange_id: Arc<AtomicI64>,
}

impl ConsciousnessEngine {
    pub fn new(
        config: Arc<AppConfig>,
        llm: Arc<dyn LlmClient>,
        tools: Arc<ToolRegistry>,
        identity: Arc<IdentityStore>,
        storage: Arc<Storage>,
        capabilities: Capabilities,
    ) -> Result<Self> {
        let next_exchange_id = storage.with_reader(|conn| {
            let max_id: Option<i64> =
                conn.query_row("SELECT MAX(id) FROM exchanges", [], |r| r.get(0))?;
            Ok(max_id.unwrap_or(0) + 1)
        })?;

        let summary_buffer = SummaryBuffer::new(llm.clone(), config.summary_budget_tokens);

        Ok(Self {
            episodic: std::sync::Mutex::new(EpisodicBuffer::new(config.buffer_rolling_checkpoint)),
            summary: AsyncMutex::new(summary_buffer),
            next_exchange_id: Arc::new(AtomicI64::new(next_exchange_id)),
            config,
            llm,
            tools,
            identity,
            storage,
            extractor: Arc::new(ExtractorRegistry::new()),
            capabilities,
        })
    }

    /// The exchange id allocator this engine seeded from `MAX(id)+1` at
    /// construction. Clone this into the scheduler's `Scheduler::new` so
    /// autonomous template fires allocate from the same counter instead
    /// of risking a primary-key collision with a foreground turn.
    pub fn exchange_id_counter(&self) -> Arc<AtomicI64> {
        self.next_exchange_id.clone()
    }

    /// Step 1: context assembly (spec §4.J).
    async fn assemble_context(&self, user_input: &str) -> Result<AssembledPrompt> {
        let mut obs = TurnObservability::default();

        let identity_docs = self.identity.read_all()?;
        let identity_text = truncate_to_tokens(
            &format!(
                "# Identity\n\n{}\n\n# User profile\n\n{}\n\n# Preferences\n\n{}",
                identity_docs
                    .get(&IdentityDocument::SelfIdentity)
                    .map(String::as_str)
                    .unwrap_or_default(),
                identity_docs
                    .get(&IdentityDocument::UserProfile)
                    .map(String::as_str)
                    .unwrap_or_default(),
                identity_docs
                    .get(&IdentityDocument::Preferences)
                    .map(String::as_str)
                    .unwrap_or_default(),
            ),
            self.config.identity_budget_tokens,
        );
        obs.identity_tokens = tokens::estimate(&identity_text);

        let mut summary_budget = self.config.summary_budget_tokens;
        let mut summary_text = self.summary.lock().await.context_text(summary_budget);
        obs.summary_tokens = tokens::estimate(&summary_text);

        let p = pressure(obs.identity_tokens + obs.summary_tokens, self.config.context_limit_tokens);

        let working_memory = {
            let buffer = self
                .episodic
                .lock()
                .map_err(|_| CocoError::Internal("episodic buffer mutex poisoned".to_string()))?;
            buffer.context_text(self.config.context_limit_tokens)
        };
        obs.working_memory_tokens = tokens::estimate(&working_memory);

        let mut document_budget = self.config.document_budget_for_pressure(p);
        let mut document_text = match &self.capabilities.docs {
            Some(docs) => docs.relevant_chunks(user_input, document_budget).unwrap_or_default(),
            None => String::new(),
        };
        obs.document_tokens = tokens::estimate(&document_text);

        let route = router::route(user_input);
        let mut facts_text = String::new();
        if route.confidence >= self.config.facts_autoinject_threshold {
            if let Some(facts_store) = &self.capabilities.facts {
                let types = if route.suggested_fact_types.is_empty() {
                    None
                } else {
                    Some(route.suggested_fact_types.as_slice())
                };
                if let Ok(top) = facts_store.search(user_input, self.config.facts_autoinject_k, types) {
                    if !top.is_empty() {
                        let lines: Vec<String> = top
                            .iter()
                            .map(|f| format!("- [{}] {}", f.fact_type, f.content))
                            .collect();
                        facts_text = truncate_to_tokens(&lines.join("\n"), 1000);
                        for f in &top {
                            let _ = facts_store.touch(&f.id);
                        }
                    }
                }
            }
        }
        obs.facts_tokens = tokens::estimate(&facts_text);

        let mut sections = vec![identity_text.clone()];
        if !summary_text.is_empty() {
            sections.push(format!("# Prior conversation summary\n\n{summary_text}"));
        }
        if !working_memory.is_empty() {
            sections.push(format!("# Recent conversation\n\n{working_memory}"));
        }
        if !document_text.is_empty() {
            sections.push(format!("# Relevant documents\n\n{document_text}"));
        }
        if !facts_text.is_empty() {
            sections.push(format!("# Remembered facts\n\n{facts_text}"));
        }

        let mut assembled = sections.join("\n\n");
        obs.total_prompt_tokens = tokens::estimate(&assembled);

        // Emergency context policy (spec §4.J): compress in order until
        // under the critical threshold. Identity is never dropped.
        if obs.total_prompt_tokens >= self.config.context_warning_tokens {
            if obs.total_prompt_tokens >= self.config.context_critical_tokens {
                document_budget = self.config.document_budget_low.min(document_budget);
                document_text = match &self.capabilities.docs {
                    Some(docs) => docs.relevant_chunks(user_input, document_budget).unwrap_or_default(),
                    None => String::new(),
                };
                obs.compression_applied.push("reduced_document_budget");
            }

            summary_budget = summary_budget.min(self.config.summary_budget_tokens / 2);
            summary_text = truncate_to_tokens(&summary_text, summary_budget);
            obs.compression_applied.push("capped_summary_text");

            let working_memory = truncate_to_tokens(&working_memory, self.config.context_limit_tokens / 10);
            obs.compression_applied.push("dropped_oldest_working_memory");

            if obs.total_prompt_tokens >= self.config.context_critical_tokens {
                facts_text = String::new();
                obs.compression_applied.push("dropped_facts_autoinjection");
            }

            let mut sections = vec![identity_text];
            if !summary_text.is_empty() {
                sections.push(format!("# Prior conversation summary\n\n{summary_text}"));
            }
            if !working_memory.is_empty() {
                sections.push(format!("# Recent conversation\n\n{working_memory}"));
            }
            if !document_text.is_empty() {
                sections.push(format!("# Relevant documents\n\n{document_text}"));
            }
            if !facts_text.is_empty() {
                sections.push(format!("# Remembered facts\n\n{facts_text}"));
            }
            assembled = sections.join("\n\n");
            obs.total_prompt_tokens = tokens::estimate(&assembled);
        }

        Ok(AssembledPrompt { text: assembled, obs })
    }

    fn persist_exchange_durable(&self, exchange: &Exchange) -> Result<()> {
        let tool_calls_json = serde_json::to_string(&exchange.tool_calls).unwrap_or_else(|_| "[]".to_string());
        self.storage.with_writer(|conn| {
            conn.execute(
                "INSERT INTO exchanges (id, created_at, user_text, agent_text, tool_calls, token_estimate, summarized, autonomous)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
                params![
                    exchange.id,
                    exchange.created_at,
                    exchange.user_text,
                    exchange.agent_text,
                    tool_calls_json,
                    exchange.token_estimate,
                    exchange.summarized,
                ],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    /// Runs fact extraction and semantic indexing for a persisted
    /// exchange. Failures here are logged, never surfaced or rolled
    /// back (spec §4.H).
    fn run_extraction(&self, session_id: &str, exchange: &Exchange) {
        if let Some(facts_store) = &self.capabilities.facts {
            for mut new_fact in self.extractor.extract_all(exchange) {
                new_fact.session_id = session_id.to_string();
                if let Err(e) = facts_store.add(new_fact) {
                    tracing::warn!(error = %e, "fact extraction insert failed");
                }
            }
        }
        if let Some(semantic) = &self.capabilities.semantic {
            let text = format!("{}\n{}", exchange.user_text, exchange.agent_text);
            if let Err(e) = semantic.add(&text, 1.0) {
                tracing::warn!(error = %e, "semantic store insert failed");
            }
        }
    }

    /// Step 5: maintenance. Schedules summarization of the eligible
    /// window if the buffer exceeds the pressure-adjusted target.
    async fn run_maintenance(&self, pressure_ratio: f32) {
        let target_n = crate::episodic::target_length_for_pressure(pressure_ratio);

        let eligible = {
            let buffer = match self.episodic.lock() {
                Ok(b) => b,
                Err(_) => return,
            };
            buffer.eligible_for_summary(target_n)
        };

        if eligible.is_empty() {
            return;
        }

        let mut summary_buffer = self.summary.lock().await;
        match summary_buffer.summarize(&eligible).await {
            Ok(summary) => {
                let ids: Vec<i64> = eligible.iter().map(|e| e.id).collect();
                summary_buffer.append(summary);
                drop(summary_buffer);
                if let Ok(mut buffer) = self.episodic.lock() {
                    buffer.mark_summarized(&ids);
                    buffer.checkpoint();
                }
            }
            Err(e) => {
                // Failed summarization never loses exchanges: they stay
                // live and unsummarized, retried on the next eligible
                // turn (spec §4.F failure semantics).
                tracing::warn!(error = %e, "summarization failed, exchanges remain live");
            }
        }
    }

    /// Executes the full turn protocol for one user message (spec §4.J).
    pub async fn run_turn(&self, session_id: &str, user_input: &str) -> Result<TurnOutput> {
        let span = tracing::info_span!("turn", session_id, started_at = %Utc::now());
        let _enter = span.enter();

        let assembled = self.assemble_context(user_input).await?;
        let mut obs = assembled.obs;
        let system_prompt = assembled.text;
        let tool_schemas = self.tools.schemas_for_llm();

        let mut messages = vec![Message::user(vec![Block::text(user_input)])];
        let mut all_tool_calls = Vec::new();
        let mut depth = 0u32;
        let mut assistant_text = String::new();

        loop {
            let response = match self.llm.complete(&system_prompt, &messages, &tool_schemas).await {
                Ok(r) => r,
                Err(e) => {
                    obs.error_kinds.push(e.kind());
                    assistant_text = format!(
                        "I ran into a problem ({}) and couldn't finish that. Could you try again?",
                        e.kind()
                    );
                    break;
                }
            };

            obs.finish_reason = Some(match response.finish_reason {
                crate::llm::FinishReason::EndTurn => "end_turn",
                crate::llm::FinishReason::ToolUse => "tool_use",
                crate::llm::FinishReason::MaxTokens => "max_tokens",
                crate::llm::FinishReason::Error => "error",
            });

            let tool_uses: Vec<(String, String, serde_json::Value)> = response
                .tool_uses()
                .into_iter()
                .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
                .collect();

            messages.push(Message::assistant(response.content.clone()));

            if tool_uses.is_empty() {
                assistant_text = response.text();
                break;
            }

            depth += 1;
            if depth > MAX_TOOL_USE_DEPTH {
                assistant_text =
                    "I wasn't able to finish that after several tool attempts, so I'm stopping here."
                        .to_string();
                obs.error_kinds.push("ToolUseDepthExceeded");
                break;
            }

            let pending_ids: Vec<String> = tool_uses.iter().map(|(id, _, _)| id.clone()).collect();
            let mut builder = ToolResultMessageBuilder::new(&pending_ids);

            for (id, name, input) in &tool_uses {
                let result = self.tools.dispatch(name, input.clone()).await;
                obs.tools_executed.push(name.clone());
                if let Some(kind) = result.error_kind {
                    obs.error_kinds.push(kind);
                }
                all_tool_calls.push(ToolCallRecord {
                    name: name.clone(),
                    input: input.clone(),
                    result_summary: result.as_content_string(),
                });
                builder.add_result(id, result.as_content_string());
            }

            messages.push(builder.finish());
        }

        let exchange_id = self.next_exchange_id.fetch_add(1, Ordering::SeqCst);
        let exchange = Exchange::new(exchange_id, user_input, assistant_text.clone())
            .with_tool_calls(all_tool_calls.clone());

        self.persist_exchange_durable(&exchange)?;
        {
            let mut buffer = self
                .episodic
                .lock()
                .map_err(|_| CocoError::Internal("episodic buffer mutex poisoned".to_string()))?;
            buffer.append(exchange.clone());
        }
        self.run_extraction(session_id, &exchange);

        let pressure_ratio = pressure(obs.total_prompt_tokens, self.config.context_limit_tokens);
        self.run_maintenance(pressure_ratio).await;

        tracing::info!(
            exchange_id,
            total_prompt_tokens = obs.total_prompt_tokens,
            finish_reason = obs.finish_reason,
            tools_executed = obs.tools_executed.len(),
            errors = obs.error_kinds.len(),
            "turn complete"
        );

        Ok(TurnOutput {
            exchange_id,
            assistant_text,
            tool_calls: all_tool_calls,
            observability: obs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionResponse, FinishReason, ToolSchema};
    use crate::tools::{ToolCategory, ToolDefinition, ToolHandler, ToolRegistry};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ScriptedLlm {
        responses: StdMutex<Vec<CompletionResponse>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<CompletionResponse>) -> Self {
            Self {
                responses: StdMutex::new(responses),
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
                return Ok(CompletionResponse {
                    content: vec![Block::text("done")],
                    finish_reason: FinishReason::EndTurn,
                });
            }
            Ok(responses.remove(0))
        }
    }

    struct Echo;
    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, input: serde_json::Value) -> std::result::Result<serde_json::Value, CocoError> {
            Ok(input)
        }
    }

    fn build_engine(llm: Arc<dyn LlmClient>, registry: ToolRegistry) -> ConsciousnessEngine {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let identity = Arc::new(IdentityStore::new(dir.path()));
        ConsciousnessEngine::new(
            Arc::new(AppConfig::default()),
            llm,
            Arc::new(registry),
            identity,
            storage,
            Capabilities::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn plain_text_turn_persists_exchange_with_no_tool_calls() {
        let llm = Arc::new(ScriptedLlm::new(vec![CompletionResponse {
            content: vec![Block::text("Hi there!")],
            finish_reason: FinishReason::EndTurn,
        }]));
        let engine = build_engine(llm, ToolRegistry::new());

        let output = engine.run_turn("session-1", "hello").await.unwrap();
        assert_eq!(output.assistant_text, "Hi there!");
        assert!(output.tool_calls.is_empty());
        assert_eq!(output.exchange_id, 1);
    }

    #[tokio::test]
    async fn tool_use_round_produces_matching_tool_results_and_continues() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            CompletionResponse {
                content: vec![Block::ToolUse {
                    id: "call-1".to_string(),
                    name: "echo".to_string(),
                    input: serde_json::json!({"x": 1}),
                }],
                finish_reason: FinishReason::ToolUse,
            },
            CompletionResponse {
                content: vec![Block::text("I echoed it.")],
                finish_reason: FinishReason::EndTurn,
            },
        ]));

        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new(
            "echo",
            "echoes input",
            serde_json::json!({"type": "object"}),
            ToolCategory::Filesystem,
            Duration::from_secs(1),
            Arc::new(Echo),
        ));

        let engine = build_engine(llm, registry);
        let output = engine.run_turn("session-1", "echo this").await.unwrap();

        assert_eq!(output.assistant_text, "I echoed it.");
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].name, "echo");
    }

    #[tokio::test]
    async fn exceeding_tool_use_depth_synthesizes_a_stop_message() {
        let endless_tool_use = CompletionResponse {
            content: vec![Block::ToolUse {
                id: "call".to_string(),
                name: "echo".to_string(),
                input: serde_json::json!({}),
            }],
            finish_reason: FinishReason::ToolUse,
        };
        let llm = Arc::new(ScriptedLlm::new(vec![
            endless_tool_use.clone(),
            endless_tool_use.clone(),
            endless_tool_use.clone(),
            endless_tool_use,
        ]));

        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new(
            "echo",
            "echoes input",
            serde_json::json!({"type": "object"}),
            ToolCategory::Filesystem,
            Duration::from_secs(1),
            Arc::new(Echo),
        ));

        let engine = build_engine(llm, registry);
        let output = engine.run_turn("session-1", "loop forever").await.unwrap();

        assert!(output.observability.error_kinds.contains(&"ToolUseDepthExceeded"));
        assert!(!output.assistant_text.is_empty());
    }

    #[tokio::test]
    async fn llm_failure_produces_an_apology_not_a_crash() {
        struct AlwaysFailsLlm;
        #[async_trait]
        impl LlmClient for AlwaysFailsLlm {
            async fn complete(
                &self,
                _system_prompt: &str,
                _messages: &[Message],
                _tools: &[ToolSchema],
            ) -> Result<CompletionResponse> {
                Err(CocoError::ExternalFailure("provider down".to_string()))
            }
        }

        let engine = build_engine(Arc::new(AlwaysFailsLlm), ToolRegistry::new());
        let output = engine.run_turn("session-1", "hello?").await.unwrap();

        assert!(output.assistant_text.contains("ExternalFailure"));
        assert!(output.observability.error_kinds.contains(&"ExternalFailure"));
    }

    #[tokio::test]
    async fn second_turn_gets_the_next_exchange_id() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            CompletionResponse { content: vec![Block::text("a")], finish_reason: FinishReason::EndTurn },
            CompletionResponse { content: vec![Block::text("b")], finish_reason: FinishReason::EndTurn },
        ]));
        let engine = build_engine(llm, ToolRegistry::new());

        let first = engine.run_turn("s", "one").await.unwrap();
        let second = engine.run_turn("s", "two").await.unwrap();
        assert_eq!(second.exchange_id, first.exchange_id + 1);
    }

    #[test]
    fn truncate_to_tokens_is_noop_under_budget() {
        let text = "short text";
        assert_eq!(truncate_to_tokens(text, 1000), text);
    }

    #[test]
    fn truncate_to_tokens_cuts_long_text() {
        let text = "a".repeat(10_000);
        let truncated = truncate_to_tokens(&text, 10);
        assert!(truncated.len() < text.len());
    }

    #[test]
    fn pressure_matches_ratio() {
        assert_eq!(pressure(50_000, 200_000), 0.25);
        assert_eq!(pressure(100, 0), 1.0);
    }
}
