//! Query Router (component G)
//!
//! Decides whether a natural-language query is better served by the
//! Facts Store (exact recall) or the Semantic Store (fuzzy retrieval),
//! and scores its own confidence in that decision (spec §4.G).

use crate::facts::FactType;

const EXACT_RECALL_KEYWORDS: &[&str] =
    &["what was", "show me", "which", "when", "where", "who", "how much"];
const FACT_TYPE_KEYWORDS: &[&str] = &[
    "meeting", "email", "password", "task", "appointment", "preference", "contact",
    "note", "location", "recommendation", "routine", "health", "financial", "communication",
    "command", "code", "file", "url",
];
const TEMPORAL_KEYWORDS: &[&str] = &["yesterday", "last week", "tomorrow", "ago"];

/// Where a query should be routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteTarget {
    Facts,
    Semantic,
}

#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub target: RouteTarget,
    pub confidence: f32,
    pub suggested_fact_types: Vec<FactType>,
}

/// Confidence threshold above which a query routes to Facts (spec §4.G).
pub const ROUTE_CONFIDENCE_THRESHOLD: f32 = 0.6;

fn matching_fact_types(query_lower: &str) -> Vec<FactType> {
    FactType::ALL
        .iter()
        .copied()
        .filter(|ft| query_lower.contains(ft.as_str().replace('_', " ").as_str()))
        .collect()
}

/// Route a query, scoring confidence exactly per spec §4.G.
pub fn route(query: &str) -> RouteDecision {
    let lower = query.to_lowercase();
    let mut confidence = 0.0f32;

    if EXACT_RECALL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        confidence += 0.4;
    }

    let fact_keyword_hit = FACT_TYPE_KEYWORDS.iter().any(|kw| lower.contains(kw));
    if fact_keyword_hit {
        confidence += 0.3;
    }

    if TEMPORAL_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        confidence += 0.3;
    }

    let suggested_fact_types = if fact_keyword_hit {
        matching_fact_types(&lower)
    } else {
        Vec::new()
    };

    let target = if confidence >= ROUTE_CONFIDENCE_THRESHOLD {
        RouteTarget::Facts
    } else {
        RouteTarget::Semantic
    };

    RouteDecision {
        target,
        confidence,
        suggested_fact_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_recall_plus_fact_type_routes_to_facts() {
        let decision = route("What was my dentist appointment time?");
        assert_eq!(decision.target, RouteTarget::Facts);
        assert!(decision.confidence >= ROUTE_CONFIDENCE_THRESHOLD);
    }

    #[test]
    fn plain_chit_chat_routes_to_semantic() {
        let decision = route("Tell me something interesting about octopuses");
        assert_eq!(decision.target, RouteTarget::Semantic);
    }

    #[test]
    fn temporal_plus_fact_keyword_crosses_threshold() {
        let decision = route("What did I say about the meeting yesterday?");
        assert_eq!(decision.target, RouteTarget::Facts);
    }

    #[test]
    fn suggests_fact_types_only_on_keyword_match() {
        let decision = route("What was my appointment?");
        assert!(decision.suggested_fact_types.contains(&FactType::Appointment));
    }
}
