//! Episodic Buffer (component E)
//!
//! A bounded, ordered in-memory tail of exchanges, pressure-adaptive in
//! size (spec §4.E) so the working-memory window shrinks as context
//! fills up instead of overflowing the LLM's context window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tokens;

/// One tool invocation recorded inside an exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: serde_json::Value,
    pub result_summary: String,
}

/// A single user/agent turn. Immutable once written except for the
/// `summarized` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub user_text: String,
    pub agent_text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub token_estimate: u32,
    pub summarized: bool,
}

impl Exchange {
    pub fn new(id: i64, user_text: impl Into<String>, agent_text: impl Into<String>) -> Self {
        let user_text = user_text.into();
        let agent_text = agent_text.into();
        let token_estimate = tokens::estimate(&user_text) + tokens::estimate(&agent_text);
        Self {
            id,
            created_at: Utc::now(),
            user_text,
            agent_text,
            tool_calls: Vec::new(),
            token_estimate,
            summarized: false,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCallRecord>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    fn as_context_fragment(&self) -> String {
        let mut out = format!("User: {}\nAgent: {}", self.user_text, self.agent_text);
        for call in &self.tool_calls {
            out.push_str(&format!("\n  [tool:{}] {}", call.name, call.result_summary));
        }
        out
    }
}

/// Target buffer length for a given context-pressure ratio (spec §4.E).
pub fn target_length_for_pressure(pressure: f32) -> usize {
    if pressure < 0.60 {
        35
    } else if pressure < 0.75 {
        25
    } else if pressure < 0.85 {
        20
    } else {
        15
    }
}

/// Bounded ordered in-memory tail of live exchanges.
pub struct EpisodicBuffer {
    exchanges: Vec<Exchange>,
    rolling_checkpoint: usize,
}

impl EpisodicBuffer {
    pub fn new(rolling_checkpoint: usize) -> Self {
        Self {
            exchanges: Vec::new(),
            rolling_checkpoint,
        }
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn append(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    /// Most-recent-first context fragment up to `max_tokens`. Never
    /// truncates inside an exchange.
    pub fn context_text(&self, max_tokens: u32) -> String {
        let mut budget_used = 0u32;
        let mut fragments = Vec::new();

        for exchange in self.exchanges.iter().rev() {
            let fragment = exchange.as_context_fragment();
            let cost = tokens::estimate(&fragment);
            if budget_used + cost > max_tokens && !fragments.is_empty() {
                break;
            }
            budget_used += cost;
            fragments.push(fragment);
        }

        fragments.reverse();
        fragments.join("\n\n")
    }

    /// Exchanges eligible for summarization: everything beyond the
    /// rolling checkpoint, once the buffer exceeds `target_n`.
    pub fn eligible_for_summary(&self, target_n: usize) -> Vec<Exchange> {
        if self.exchanges.len() <= target_n {
            return Vec::new();
        }
        let keep = self.rolling_checkpoint.max(1);
        if self.exchanges.len() <= keep {
            return Vec::new();
        }
        self.exchanges[..self.exchanges.len() - keep]
            .iter()
            .filter(|e| !e.summarized)
            .cloned()
            .collect()
    }

    /// Marks the given exchange ids as summarized without removing them
    /// from the buffer; `checkpoint` is what actually trims the tail.
    pub fn mark_summarized(&mut self, ids: &[i64]) {
        for exchange in &mut self.exchanges {
            if ids.contains(&exchange.id) {
                exchange.summarized = true;
            }
        }
    }

    /// Trims summarized exchanges older than the rolling checkpoint out
    /// of the in-memory tail (their durable copy lives elsewhere).
    pub fn checkpoint(&mut self) {
        let keep = self.rolling_checkpoint.max(1);
        if self.exchanges.len() <= keep {
            return;
        }
        let cutoff = self.exchanges.len() - keep;
        let mut index = 0usize;
        self.exchanges.retain(|e| {
            let keep = index >= cutoff || !e.summarized;
            index += 1;
            keep
        });
    }
}
