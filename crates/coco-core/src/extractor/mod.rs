//! Fact Extractor (component H)
//!
//! Turns a durably-persisted exchange (and any tool calls it made) into
//! zero or more Facts. REDESIGN FLAGS calls out the anti-pattern of one
//! giant per-type branch; instead each fact type gets its own small
//! extractor, and the per-tool extractors are looked up by name rather
//! than matched.

mod exchange_heuristics;
mod tool_heuristics;

pub use exchange_heuristics::default_exchange_extractors;
pub use tool_heuristics::default_tool_registry;

use crate::episodic::{Exchange, ToolCallRecord};
use crate::facts::NewFact;

/// Extracts facts from an exchange's free text, one struct per fact
/// type/heuristic (spec §4.H).
pub trait FactExtractor: Send + Sync {
    fn extract(&self, exchange: &Exchange) -> Vec<NewFact>;
}

/// Extracts facts from a single tool call, keyed by tool name.
pub trait ToolFactExtractor: Send + Sync {
    fn extract(&self, call: &ToolCallRecord, exchange: &Exchange) -> Vec<NewFact>;
}

/// Registers a fixed set of exchange extractors and tool extractors, and
/// runs all of them over a newly-persisted exchange.
pub struct ExtractorRegistry {
    exchange_extractors: Vec<Box<dyn FactExtractor>>,
    tool_extractors: std::collections::HashMap<String, Box<dyn ToolFactExtractor>>,
    fallback_tool_extractor: Box<dyn ToolFactExtractor>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            exchange_extractors: default_exchange_extractors(),
            tool_extractors: default_tool_registry(),
            fallback_tool_extractor: Box::new(tool_heuristics::GenericToolUseExtractor),
        }
    }

    pub fn register_exchange_extractor(&mut self, extractor: Box<dyn FactExtractor>) {
        self.exchange_extractors.push(extractor);
    }

    pub fn register_tool_extractor(&mut self, tool_name: &str, extractor: Box<dyn ToolFactExtractor>) {
        self.tool_extractors.insert(tool_name.to_string(), extractor);
    }

    /// Run every registered extractor over `exchange`, including its
    /// tool calls. Extraction failures in one extractor never prevent
    /// another from running; a failure here never rolls back the
    /// exchange itself (spec §4.H).
    pub fn extract_all(&self, exchange: &Exchange) -> Vec<NewFact> {
        let mut facts = Vec::new();

        for extractor in &self.exchange_extractors {
            facts.extend(extractor.extract(exchange));
        }

        for call in &exchange.tool_calls {
            let extractor = self
                .tool_extractors
                .get(&call.name)
                .unwrap_or(&self.fallback_tool_extractor);
            facts.extend(extractor.extract(call, exchange));
        }

        facts
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episodic::ToolCallRecord;
    use crate::facts::FactType;

    #[test]
    fn unregistered_tool_gets_generic_fallback_fact() {
        let registry = ExtractorRegistry::new();
        let exchange = Exchange::new(1, "run something", "done").with_tool_calls(vec![ToolCallRecord {
            name: "some_unlisted_tool".to_string(),
            input: serde_json::json!({}),
            result_summary: "ok".to_string(),
        }]);

        let facts = registry.extract_all(&exchange);
        let tool_facts: Vec<_> = facts.iter().filter(|f| f.fact_type == FactType::ToolUse).collect();
        assert_eq!(tool_facts.len(), 1);
    }

    #[test]
    fn registered_tool_gets_its_own_extractor() {
        let registry = ExtractorRegistry::new();
        let exchange = Exchange::new(1, "send an email", "sent").with_tool_calls(vec![ToolCallRecord {
            name: "send_email".to_string(),
            input: serde_json::json!({"to": "alice@example.com", "subject": "hi"}),
            result_summary: "sent to alice@example.com".to_string(),
        }]);

        let facts = registry.extract_all(&exchange);
        assert!(facts.len() >= 2);
    }
}
