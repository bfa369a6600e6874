//! Process-wide configuration
//!
//! Every setting enumerated in the specification's configuration surface,
//! built once at startup and passed by reference into components — no
//! module-level singletons (see REDESIGN FLAGS: global mutable state).

use std::env;
use std::time::Duration;

/// All tunables the core consumes. Read-mostly after construction.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub context_limit_tokens: u32,
    pub context_warning_tokens: u32,
    pub context_critical_tokens: u32,
    pub buffer_rolling_checkpoint: usize,
    pub summary_budget_tokens: u32,
    pub document_budget_low: u32,
    pub document_budget_med: u32,
    pub document_budget_high: u32,
    pub identity_budget_tokens: u32,
    pub facts_autoinject_threshold: f32,
    pub facts_autoinject_k: usize,
    pub scheduler_tick: Duration,
    pub task_default_timeout: Duration,
    pub task_hard_timeout: Duration,
    pub embedding_dim: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_model: "claude-opus-4".to_string(),
            llm_max_tokens: 4096,
            context_limit_tokens: 200_000,
            context_warning_tokens: 140_000,
            context_critical_tokens: 160_000,
            buffer_rolling_checkpoint: 22,
            summary_budget_tokens: 5_000,
            document_budget_low: 5_000,
            document_budget_med: 10_000,
            document_budget_high: 20_000,
            identity_budget_tokens: 8_000,
            facts_autoinject_threshold: 0.6,
            facts_autoinject_k: 5,
            scheduler_tick: Duration::from_secs(60),
            task_default_timeout: Duration::from_secs(300),
            task_hard_timeout: Duration::from_secs(900),
            embedding_dim: 128,
        }
    }
}

impl AppConfig {
    /// Build a config from defaults, overridden by `COCO_*` environment
    /// variables where present. A malformed value is logged and the
    /// default is kept — startup never panics on a bad env var.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_string("COCO_LLM_MODEL") {
            cfg.llm_model = v;
        }
        env_parsed("COCO_LLM_MAX_TOKENS", &mut cfg.llm_max_tokens);
        env_parsed("COCO_CONTEXT_LIMIT_TOKENS", &mut cfg.context_limit_tokens);
        env_parsed(
            "COCO_CONTEXT_WARNING_TOKENS",
            &mut cfg.context_warning_tokens,
        );
        env_parsed(
            "COCO_CONTEXT_CRITICAL_TOKENS",
            &mut cfg.context_critical_tokens,
        );
        env_parsed(
            "COCO_BUFFER_ROLLING_CHECKPOINT",
            &mut cfg.buffer_rolling_checkpoint,
        );
        env_parsed("COCO_SUMMARY_BUDGET_TOKENS", &mut cfg.summary_budget_tokens);
        env_parsed("COCO_FACTS_AUTOINJECT_K", &mut cfg.facts_autoinject_k);
        env_parsed("COCO_EMBEDDING_DIM", &mut cfg.embedding_dim);

        if let Some(v) = env::var("COCO_FACTS_AUTOINJECT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
        {
            cfg.facts_autoinject_threshold = v;
        }

        if let Some(secs) = env::var("COCO_SCHEDULER_TICK_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            cfg.scheduler_tick = Duration::from_secs(secs);
        }

        cfg
    }

    /// Document-context budget for the current pressure tier, per the
    /// engine's context-assembly rules.
    pub fn document_budget_for_pressure(&self, pressure: f32) -> u32 {
        if pressure < 0.60 {
            self.document_budget_high
        } else if pressure < 0.75 {
            self.document_budget_med
        } else {
            self.document_budget_low
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, raw, "ignoring malformed environment override"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.context_limit_tokens, 200_000);
        assert_eq!(cfg.buffer_rolling_checkpoint, 22);
        assert_eq!(cfg.facts_autoinject_k, 5);
    }

    #[test]
    fn document_budget_tiers() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.document_budget_for_pressure(0.1), 20_000);
        assert_eq!(cfg.document_budget_for_pressure(0.65), 10_000);
        assert_eq!(cfg.document_budget_for_pressure(0.9), 5_000);
    }
}
