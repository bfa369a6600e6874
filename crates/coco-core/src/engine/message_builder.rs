//! Enforces the tool-use invariant (spec §6.1, §9) by construction: a
//! follow-up message can only be produced once every pending `tool_use`
//! id has a matching `tool_result`.

use std::collections::HashSet;

use crate::llm::{Block, Message};

/// Accumulates `tool_result` blocks for a fixed set of pending
/// `tool_use` ids. `finish()` panics if any id was never answered —
/// this is a wiring bug the engine must prevent by construction, the
/// same class of programmer error `ToolRegistry::register` panics on
/// for a duplicate name.
pub struct ToolResultMessageBuilder {
    pending: HashSet<String>,
    results: Vec<Block>,
}

impl ToolResultMessageBuilder {
    pub fn new(tool_use_ids: &[String]) -> Self {
        Self {
            pending: tool_use_ids.iter().cloned().collect(),
            results: Vec::with_capacity(tool_use_ids.len()),
        }
    }

    /// Record a `tool_result` for `tool_use_id`. No-op on an id outside
    /// the pending set (a tool the engine didn't ask for).
    pub fn add_result(&mut self, tool_use_id: &str, content: String) {
        self.pending.remove(tool_use_id);
        self.results.push(Block::ToolResult {
            tool_use_id: tool_use_id.to_string(),
            content,
        });
    }

    /// Build the follow-up user message. Panics if any `tool_use` id
    /// from construction still lacks a `tool_result`.
    pub fn finish(self) -> Message {
        assert!(
            self.pending.is_empty(),
            "missing tool_result for tool_use ids: {:?}",
            self.pending
        );
        Message::user(self.results)
    }
}
