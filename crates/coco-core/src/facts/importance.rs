//! Importance computation for newly-inserted facts (spec §4.B).

use super::FactType;

const TEMPORAL_URGENCY_KEYWORDS: &[&str] =
    &["today", "tomorrow", "urgent", "asap", "deadline"];
const EMPHASIS_KEYWORDS: &[&str] = &["important", "must", "required"];

fn base_importance(fact_type: FactType) -> f32 {
    match fact_type {
        FactType::Appointment
        | FactType::Contact
        | FactType::Communication
        | FactType::Task
        | FactType::Preference
        | FactType::Note => 0.8,
        FactType::Location
        | FactType::Recommendation
        | FactType::Routine
        | FactType::Health
        | FactType::Financial
        | FactType::ToolUse => 0.6,
        FactType::Command
        | FactType::Code
        | FactType::File
        | FactType::Url
        | FactType::Error
        | FactType::Config => 0.4,
    }
}

fn has_temporal_urgency(text: &str) -> bool {
    let lower = text.to_lowercase();
    TEMPORAL_URGENCY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn has_emphasis(text: &str) -> bool {
    let lower = text.to_lowercase();
    if EMPHASIS_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return true;
    }
    if text.trim_end().ends_with('!') {
        return true;
    }
    text.split_whitespace()
        .any(|word| word.len() >= 3 && word.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()))
}

/// Compute importance for a fact at insert time: base-per-type plus
/// temporal-urgency and emphasis boosts, clamped to `[0, 1]`.
pub fn compute_importance(fact_type: FactType, content: &str, context: &str) -> f32 {
    let mut score = base_importance(fact_type);
    let combined = format!("{content} {context}");

    if has_temporal_urgency(&combined) {
        score += 0.2;
    }
    if has_emphasis(&combined) {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_groups_match_spec() {
        assert_eq!(base_importance(FactType::Appointment), 0.8);
        assert_eq!(base_importance(FactType::Health), 0.6);
        assert_eq!(base_importance(FactType::Command), 0.4);
    }

    #[test]
    fn urgency_and_emphasis_boost_and_clamp() {
        let score = compute_importance(
            FactType::Appointment,
            "URGENT meeting tomorrow, MUST attend!",
            "",
        );
        assert!((score - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn plain_content_keeps_base() {
        let score = compute_importance(FactType::Url, "https://example.com", "");
        assert_eq!(score, 0.4);
    }
}
