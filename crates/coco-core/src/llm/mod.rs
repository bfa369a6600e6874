//! LLM contract (spec §6.1) and an Anthropic Messages API client.
//!
//! The engine is written against `LlmClient` so tests substitute a
//! scripted double; `AnthropicClient` is the real backend, following the
//! retry-with-backoff shape used elsewhere in the ecosystem for HTTP LLM
//! backends.

pub mod anthropic;

pub use anthropic::AnthropicClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Who sent a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One content block inside a message (spec §6.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl Block {
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }

    pub fn tool_use_id(&self) -> Option<&str> {
        match self {
            Block::ToolUse { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// A single turn in the conversation sent to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<Block>,
}

impl Message {
    pub fn user(content: Vec<Block>) -> Self {
        Self { role: Role::User, content }
    }

    pub fn assistant(content: Vec<Block>) -> Self {
        Self { role: Role::Assistant, content }
    }

    /// Every `tool_use` id present in this message's blocks.
    pub fn tool_use_ids(&self) -> Vec<String> {
        self.content
            .iter()
            .filter_map(|b| b.tool_use_id())
            .map(|s| s.to_string())
            .collect()
    }
}

/// A tool schema handed to the LLM alongside the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: Vec<Block>,
    pub finish_reason: FinishReason,
}

impl CompletionResponse {
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                Block::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
                _ => None,
            })
            .collect()
    }

    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The non-streaming LLM operations the engine depends on (spec §6.1).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<CompletionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_ids_collects_only_tool_use_blocks() {
        let message = Message::assistant(vec![
            Block::text("thinking out loud"),
            Block::ToolUse {
                id: "a".to_string(),
                name: "list_dir".to_string(),
                input: serde_json::json!({}),
            },
            Block::ToolUse {
                id: "b".to_string(),
                name: "search_web".to_string(),
                input: serde_json::json!({}),
            },
        ]);
        assert_eq!(message.tool_use_ids(), vec!["a", "b"]);
    }

    #[test]
    fn completion_response_extracts_text_and_tool_uses() {
        let response = CompletionResponse {
            content: vec![
                Block::text("Here's what I found:"),
                Block::ToolUse {
                    id: "x".to_string(),
                    name: "read_file".to_string(),
                    input: serde_json::json!({"path": "a.txt"}),
                },
            ],
            finish_reason: FinishReason::ToolUse,
        };
        assert_eq!(response.text(), "Here's what I found:");
        assert_eq!(response.tool_uses().len(), 1);
    }
}
