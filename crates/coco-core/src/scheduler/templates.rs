//! Task templates (spec §4.K)
//!
//! Each template is a small, named unit of autonomous behavior a `Task`
//! can be bound to. A template either completes directly (read-only or
//! internal work) or produces an `Outboxed` effect for anything that
//! posts externally, so a human approves the content before it goes out
//! (spec §4.K "manual-approval outbox").

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{CocoError, Result};
use crate::facts::FactsStore;
use crate::semantic::SemanticStore;
use crate::tools::providers::RateLimiter;
use crate::tools::ToolRegistry;

/// What running a template produced.
pub enum TemplateEffect {
    /// Ran to completion with no outstanding approval needed.
    Completed { output_summary: String },
    /// Produced content that must be approved before it's sent; the
    /// scheduler writes `payload` to the outbox rather than dispatching
    /// the send itself.
    Outboxed { payload: Value, output_summary: String },
    /// Short-circuited because the backing service's rate limit is
    /// exhausted; counted as a successful, idempotent no-op.
    RateLimited { output_summary: String },
}

/// Capabilities available to a running template. Mirrors the engine's
/// `Capabilities` split (facts/semantic are optional) plus the tool
/// registry and rate limiter templates need to act.
pub struct TemplateContext {
    pub tools: Arc<ToolRegistry>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub facts: Option<Arc<dyn FactsStore>>,
    pub semantic: Option<Arc<dyn SemanticStore>>,
}

#[async_trait]
pub trait Template: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect>;
}

fn config_str<'a>(config: &'a Value, field: &str) -> Result<&'a str> {
    config
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| CocoError::InvalidInput(format!("task config missing required field `{field}`")))
}

fn config_str_or<'a>(config: &'a Value, field: &str, default: &'a str) -> &'a str {
    config.get(field).and_then(Value::as_str).unwrap_or(default)
}

async fn dispatch_ok(tools: &ToolRegistry, tool: &str, input: Value) -> Result<Value> {
    let result = tools.dispatch(tool, input).await;
    if result.ok {
        Ok(result.value.unwrap_or(Value::Null))
    } else {
        Err(CocoError::ExternalFailure(format!(
            "{tool}: {}",
            result.error_message.unwrap_or_default()
        )))
    }
}

/// Sends one email with a fixed subject/body from task config. The most
/// direct template; everything else in this module composes the same
/// rate-limit/outbox shape around a different tool call.
pub struct SimpleEmailTemplate;

#[async_trait]
impl Template for SimpleEmailTemplate {
    fn name(&self) -> &'static str {
        "simple_email"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("email").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "email rate limit exhausted, skipped".to_string(),
            });
        }
        let to = config_str(config, "to")?;
        let subject = config_str(config, "subject")?;
        let body = config_str(config, "body")?;
        Ok(TemplateEffect::Outboxed {
            payload: json!({"to": to, "subject": subject, "body": body}),
            output_summary: format!("drafted email to {to}"),
        })
    }
}

/// Summarizes the next day's calendar into an email.
pub struct CalendarEmailTemplate;

#[async_trait]
impl Template for CalendarEmailTemplate {
    fn name(&self) -> &'static str {
        "calendar_email"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("email").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "email rate limit exhausted, skipped".to_string(),
            });
        }
        let to = config_str(config, "to")?;
        let now = chrono::Utc::now();
        let events = dispatch_ok(
            &ctx.tools,
            "list_events",
            json!({"from": now.to_rfc3339(), "to": (now + chrono::Duration::days(1)).to_rfc3339()}),
        )
        .await?;
        let body = format!("Upcoming events:\n{events}");
        Ok(TemplateEffect::Outboxed {
            payload: json!({"to": to, "subject": "Your schedule", "body": body}),
            output_summary: format!("drafted calendar digest for {to}"),
        })
    }
}

/// Searches a fixed topic list and emails the results.
pub struct NewsDigestTemplate;

#[async_trait]
impl Template for NewsDigestTemplate {
    fn name(&self) -> &'static str {
        "news_digest"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("email").is_exhausted() || ctx.rate_limiter.snapshot("web_search").is_exhausted()
        {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "rate limit exhausted, skipped".to_string(),
            });
        }
        let to = config_str(config, "to")?;
        let topics: Vec<String> = config
            .get("topics")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let mut sections = Vec::new();
        for topic in &topics {
            let results = dispatch_ok(&ctx.tools, "search_web", json!({"query": topic})).await?;
            sections.push(format!("## {topic}\n{results}"));
        }
        let body = sections.join("\n\n");
        Ok(TemplateEffect::Outboxed {
            payload: json!({"to": to, "subject": "Your news digest", "body": body}),
            output_summary: format!("drafted news digest across {} topics", topics.len()),
        })
    }
}

/// Internal-only: records memory store sizes as a fact. Has no external
/// side effect, so it never needs approval.
pub struct HealthCheckTemplate;

#[async_trait]
impl Template for HealthCheckTemplate {
    fn name(&self) -> &'static str {
        "health_check"
    }

    async fn run(&self, ctx: &TemplateContext, _config: &Value) -> Result<TemplateEffect> {
        let facts_total = match &ctx.facts {
            Some(facts) => facts.stats()?.total,
            None => 0,
        };
        let semantic_total = match &ctx.semantic {
            Some(semantic) => semantic.count()?,
            None => 0,
        };
        let tool_count = ctx.tools.schemas_for_llm().len();
        Ok(TemplateEffect::Completed {
            output_summary: format!(
                "health check: {facts_total} facts, {semantic_total} semantic memories, {tool_count} tools available"
            ),
        })
    }
}

/// Runs a web search and files the results as a semantic memory for
/// later recall; no external posting, so no approval is required.
pub struct WebResearchTemplate;

#[async_trait]
impl Template for WebResearchTemplate {
    fn name(&self) -> &'static str {
        "web_research"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("web_search").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "web_search rate limit exhausted, skipped".to_string(),
            });
        }
        let query = config_str(config, "query")?;
        let results = dispatch_ok(&ctx.tools, "search_web", json!({"query": query})).await?;
        if let Some(semantic) = &ctx.semantic {
            semantic.add(&format!("Research on \"{query}\":\n{results}"), 1.0)?;
        }
        Ok(TemplateEffect::Completed {
            output_summary: format!("researched \"{query}\""),
        })
    }
}

/// Looks ahead `minutes_before` for upcoming events and files prep notes.
pub struct MeetingPrepTemplate;

#[async_trait]
impl Template for MeetingPrepTemplate {
    fn name(&self) -> &'static str {
        "meeting_prep"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        let minutes_before = config.get("minutes_before").and_then(Value::as_i64).unwrap_or(30);
        let now = chrono::Utc::now();
        let events = dispatch_ok(
            &ctx.tools,
            "list_events",
            json!({
                "from": now.to_rfc3339(),
                "to": (now + chrono::Duration::minutes(minutes_before)).to_rfc3339(),
            }),
        )
        .await?;
        if let Some(semantic) = &ctx.semantic {
            semantic.add(&format!("Meeting prep notes:\n{events}"), 1.0)?;
        }
        Ok(TemplateEffect::Completed {
            output_summary: "filed meeting prep notes".to_string(),
        })
    }
}

/// Weekly rollup of memory-store growth, emailed to the configured
/// recipient.
pub struct WeeklyReportTemplate;

#[async_trait]
impl Template for WeeklyReportTemplate {
    fn name(&self) -> &'static str {
        "weekly_report"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("email").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "email rate limit exhausted, skipped".to_string(),
            });
        }
        let to = config_str(config, "to")?;
        let facts_total = match &ctx.facts {
            Some(facts) => facts.stats()?.total,
            None => 0,
        };
        let semantic_total = match &ctx.semantic {
            Some(semantic) => semantic.count()?,
            None => 0,
        };
        let body = format!("This week: {facts_total} facts stored, {semantic_total} semantic memories stored.");
        Ok(TemplateEffect::Outboxed {
            payload: json!({"to": to, "subject": "Weekly report", "body": body}),
            output_summary: "drafted weekly report".to_string(),
        })
    }
}

/// Generates a short video message via a media tool. Generation isn't a
/// public post, so it completes directly rather than going through the
/// outbox.
pub struct VideoMessageTemplate;

#[async_trait]
impl Template for VideoMessageTemplate {
    fn name(&self) -> &'static str {
        "video_message"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        let prompt = config_str(config, "prompt")?;
        let result = dispatch_ok(&ctx.tools, "generate_video", json!({"prompt": prompt})).await?;
        Ok(TemplateEffect::Completed {
            output_summary: format!("generated video for prompt \"{prompt}\": {result}"),
        })
    }
}

/// Searches a topic list and drafts a single tweet.
pub struct TweetDigestTemplate;

#[async_trait]
impl Template for TweetDigestTemplate {
    fn name(&self) -> &'static str {
        "tweet_digest"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("twitter").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "twitter rate limit exhausted, skipped".to_string(),
            });
        }
        let topic = config_str(config, "topic")?;
        let results = dispatch_ok(&ctx.tools, "search_web", json!({"query": topic})).await?;
        let text = truncate_for_post(&format!("{topic}: {results}"));
        Ok(TemplateEffect::Outboxed {
            payload: json!({"text": text}),
            output_summary: format!("drafted tweet about \"{topic}\""),
        })
    }
}

/// Drafts a multi-post thread from a list of points in task config.
pub struct ThreadSummaryTemplate;

#[async_trait]
impl Template for ThreadSummaryTemplate {
    fn name(&self) -> &'static str {
        "thread_summary"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("twitter").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "twitter rate limit exhausted, skipped".to_string(),
            });
        }
        let points: Vec<String> = config
            .get("points")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if points.is_empty() {
            return Err(CocoError::InvalidInput("task config missing required field `points`".to_string()));
        }
        let posts: Vec<String> = points.iter().map(|p| truncate_for_post(p)).collect();
        Ok(TemplateEffect::Outboxed {
            payload: json!({"posts": posts}),
            output_summary: format!("drafted a {}-post thread", posts.len()),
        })
    }
}

/// Searches for mentions and drafts a reply to the most recent one.
pub struct ReplyMentionsTemplate;

#[async_trait]
impl Template for ReplyMentionsTemplate {
    fn name(&self) -> &'static str {
        "reply_mentions"
    }

    async fn run(&self, ctx: &TemplateContext, config: &Value) -> Result<TemplateEffect> {
        if ctx.rate_limiter.snapshot("twitter").is_exhausted() {
            return Ok(TemplateEffect::RateLimited {
                output_summary: "twitter rate limit exhausted, skipped".to_string(),
            });
        }
        let handle = config_str_or(config, "handle", "");
        let query = format!("mentions:{handle}");
        let mentions = dispatch_ok(&ctx.tools, "search_tweets", json!({"query": query})).await?;
        let text = truncate_for_post(&format!("Thanks for reaching out! {mentions}"));
        Ok(TemplateEffect::Outboxed {
            payload: json!({"text": text}),
            output_summary: "drafted a reply to the latest mention".to_string(),
        })
    }
}

fn truncate_for_post(text: &str) -> String {
    const MAX_CHARS: usize = 280;
    if text.chars().count() <= MAX_CHARS {
        return text.to_string();
    }
    text.chars().take(MAX_CHARS - 1).collect::<String>() + "…"
}

/// Every built-in template, by name (spec §4.K lists a minimum of 8, plus
/// the 3 Twitter-style posting templates).
pub fn default_templates() -> Vec<Arc<dyn Template>> {
    vec![
        Arc::new(SimpleEmailTemplate),
        Arc::new(CalendarEmailTemplate),
        Arc::new(NewsDigestTemplate),
        Arc::new(HealthCheckTemplate),
        Arc::new(WebResearchTemplate),
        Arc::new(MeetingPrepTemplate),
        Arc::new(WeeklyReportTemplate),
        Arc::new(VideoMessageTemplate),
        Arc::new(TweetDigestTemplate),
        Arc::new(ThreadSummaryTemplate),
        Arc::new(ReplyMentionsTemplate),
    ]
}
