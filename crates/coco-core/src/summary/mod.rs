//! Summary Buffer (component F)
//!
//! Compresses contiguous batches of exchanges the Episodic Buffer has
//! aged out into durable, never-rewritten `Summary` records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::episodic::Exchange;
use crate::error::Result;
use crate::llm::{Block, LlmClient, Message, ToolSchema};
use crate::tokens;

const BATCH_SIZE: usize = 10;
const SUMMARIZE_SYSTEM_PROMPT: &str =
    "Summarize these exchanges preserving decisions, commitments, and user preferences. Be concise.";

/// A compressed window of exchanges. Never rewritten; only appended or
/// evicted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub window_start: i64,
    pub window_end: i64,
    pub text: String,
    pub token_estimate: u32,
    pub created_at: DateTime<Utc>,
}

/// Holds live summaries and produces bounded context text from them.
pub struct SummaryBuffer {
    llm: Arc<dyn LlmClient>,
    summaries: Vec<Summary>,
    next_id: i64,
    budget_tokens: u32,
}

impl SummaryBuffer {
    pub fn new(llm: Arc<dyn LlmClient>, budget_tokens: u32) -> Self {
        Self {
            llm,
            summaries: Vec::new(),
            next_id: 1,
            budget_tokens,
        }
    }

    /// Summarize a contiguous slice of exchanges via the LLM. On failure
    /// the exchanges are left untouched by the caller: this method
    /// returns the error without mutating any buffer state.
    pub async fn summarize(&mut self, exchanges: &[Exchange]) -> Result<Summary> {
        if exchanges.is_empty() {
            return Err(crate::error::CocoError::InvalidInput(
                "cannot summarize an empty exchange window".to_string(),
            ));
        }

        let mut text = String::new();
        for batch in exchanges.chunks(BATCH_SIZE) {
            let prompt = batch
                .iter()
                .map(|e| format!("User: {}\nAgent: {}", e.user_text, e.agent_text))
                .collect::<Vec<_>>()
                .join("\n\n");

            let response = self
                .llm
                .complete(
                    SUMMARIZE_SYSTEM_PROMPT,
                    &[Message::user(vec![Block::text(prompt)])],
                    &[] as &[ToolSchema],
                )
                .await?;

            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&response.text());
        }

        let summary = Summary {
            id: self.next_id,
            window_start: exchanges.first().unwrap().id,
            window_end: exchanges.last().unwrap().id,
            token_estimate: tokens::estimate(&text),
            text,
            created_at: Utc::now(),
        };
        self.next_id += 1;
        Ok(summary)
    }

    pub fn append(&mut self, summary: Summary) {
        self.summaries.push(summary);
        self.prune(self.budget_tokens);
    }

    /// Newest-first concatenation up to `max_tokens`, oldest summaries
    /// dropped first when over budget.
    pub fn context_text(&self, max_tokens: u32) -> String {
        let mut used = 0u32;
        let mut fragments = Vec::new();
        for summary in self.summaries.iter().rev() {
            if used + summary.token_estimate > max_tokens && !fragments.is_empty() {
                break;
            }
            used += summary.token_estimate;
            fragments.push(summary.text.as_str());
        }
        fragments.reverse();
        fragments.join("\n\n")
    }

    /// Drop the oldest summaries until the total is within `max_tokens`.
    pub fn prune(&mut self, max_tokens: u32) {
        let mut total: u32 = self.summaries.iter().map(|s| s.token_estimate).sum();
        while total > max_tokens && !self.summaries.is_empty() {
            let dropped = self.summaries.remove(0);
            total = total.saturating_sub(dropped.token_estimate);
        }
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        fail_next: Mutex<bool>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(|s| s.to_string()).collect()),
                fail_next: Mutex::new(false),
            }
        }

        fn failing() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
                fail_next: Mutex::new(true),
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
        ) -> Result<crate::llm::CompletionResponse> {
            if *self.fail_next.lock().unwrap() {
                return Err(crate::error::CocoError::ExternalFailure("simulated failure".to_string()));
            }
            let text = self.responses.lock().unwrap().remove(0);
            Ok(crate::llm::CompletionResponse {
                content: vec![Block::text(text)],
                finish_reason: crate::llm::FinishReason::EndTurn,
            })
        }
    }

    fn exchange(id: i64) -> Exchange {
        Exchange::new(id, format!("q{id}"), format!("a{id}"))
    }

    #[tokio::test]
    async fn summarize_produces_summary_with_correct_window() {
        let llm = Arc::new(ScriptedLlm::new(vec!["decided to ship on Friday"]));
        let mut buffer = SummaryBuffer::new(llm, 5000);

        let exchanges = vec![exchange(1), exchange(2), exchange(3)];
        let summary = buffer.summarize(&exchanges).await.unwrap();

        assert_eq!(summary.window_start, 1);
        assert_eq!(summary.window_end, 3);
        assert_eq!(summary.text, "decided to ship on Friday");
    }

    #[tokio::test]
    async fn summarize_failure_does_not_panic_and_buffer_stays_empty() {
        let llm = Arc::new(ScriptedLlm::failing());
        let mut buffer = SummaryBuffer::new(llm, 5000);

        let result = buffer.summarize(&[exchange(1)]).await;
        assert!(result.is_err());
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn prune_drops_oldest_summaries_first() {
        let llm = Arc::new(ScriptedLlm::new(vec!["s1", "s2", "s3"]));
        let mut buffer = SummaryBuffer::new(llm, 5000);

        for i in 0..3 {
            let summary = buffer.summarize(&[exchange(i)]).await.unwrap();
            buffer.append(summary);
        }
        assert_eq!(buffer.len(), 3);

        buffer.prune(4);
        assert!(buffer.len() < 3);
        assert_eq!(buffer.summaries.last().unwrap().text, "s3");
    }

    #[tokio::test]
    async fn context_text_respects_budget() {
        let llm = Arc::new(ScriptedLlm::new(vec!["alpha", "beta"]));
        let mut buffer = SummaryBuffer::new(llm, 5000);
        for i in 0..2 {
            let summary = buffer.summarize(&[exchange(i)]).await.unwrap();
            buffer.append(summary);
        }

        let text = buffer.context_text(5000);
        assert!(text.contains("alpha"));
        assert!(text.contains("beta"));
    }
}
