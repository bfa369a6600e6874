//! Facts Store (component B)
//!
//! A structured, typed fact database with a closed 18-type taxonomy
//! (spec §6.3), insert-time importance scoring, and a search ranking
//! that blends keyword match, importance, access frequency, and recency.

mod importance;

pub use importance::compute_importance;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CocoError, Result};
use crate::storage::Storage;

/// The closed set of 18 fact types (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Appointment,
    Contact,
    Task,
    Preference,
    Note,
    Location,
    Recommendation,
    Routine,
    Health,
    Financial,
    Communication,
    ToolUse,
    Command,
    Code,
    File,
    Url,
    Error,
    Config,
}

impl FactType {
    pub const ALL: [FactType; 18] = [
        FactType::Appointment,
        FactType::Contact,
        FactType::Task,
        FactType::Preference,
        FactType::Note,
        FactType::Location,
        FactType::Recommendation,
        FactType::Routine,
        FactType::Health,
        FactType::Financial,
        FactType::Communication,
        FactType::ToolUse,
        FactType::Command,
        FactType::Code,
        FactType::File,
        FactType::Url,
        FactType::Error,
        FactType::Config,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FactType::Appointment => "appointment",
            FactType::Contact => "contact",
            FactType::Task => "task",
            FactType::Preference => "preference",
            FactType::Note => "note",
            FactType::Location => "location",
            FactType::Recommendation => "recommendation",
            FactType::Routine => "routine",
            FactType::Health => "health",
            FactType::Financial => "financial",
            FactType::Communication => "communication",
            FactType::ToolUse => "tool_use",
            FactType::Command => "command",
            FactType::Code => "code",
            FactType::File => "file",
            FactType::Url => "url",
            FactType::Error => "error",
            FactType::Config => "config",
        }
    }
}

impl std::str::FromStr for FactType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        FactType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown fact type: {s}"))
    }
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed, recallable claim extracted from conversation or tool use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub fact_type: FactType,
    pub content: String,
    pub context: String,
    pub episode_id: Option<i64>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub importance: f32,
    pub access_count: u32,
    pub last_accessed: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

/// Input to `FactsStore::add`. Importance is always computed by the
/// store, never supplied by the caller.
#[derive(Debug, Clone)]
pub struct NewFact {
    pub fact_type: FactType,
    pub content: String,
    pub context: String,
    pub episode_id: Option<i64>,
    pub session_id: String,
    pub tags: Vec<String>,
    pub metadata: serde_json::Value,
}

impl NewFact {
    pub fn new(fact_type: FactType, content: impl Into<String>) -> Self {
        Self {
            fact_type,
            content: content.into(),
            context: String::new(),
            episode_id: None,
            session_id: String::new(),
            tags: Vec::new(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_episode(mut self, episode_id: i64) -> Self {
        self.episode_id = Some(episode_id);
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FactsStats {
    pub total: u64,
    pub by_type: std::collections::HashMap<String, u64>,
}

/// The Facts Store contract (spec §4.B). Implementations must degrade
/// gracefully — a broken store should never crash a turn; callers treat
/// it as an optional capability (`Option<Arc<dyn FactsStore>>`).
pub trait FactsStore: Send + Sync {
    fn add(&self, fact: NewFact) -> Result<Fact>;
    fn search(&self, query: &str, limit: usize, fact_types: Option<&[FactType]>) -> Result<Vec<Fact>>;
    fn by_type(&self, fact_type: FactType, limit: usize) -> Result<Vec<Fact>>;
    fn stats(&self) -> Result<FactsStats>;
    fn touch(&self, id: &str) -> Result<()>;
    /// Apply a half-life decay to every fact's importance. Intended to be
    /// invoked by an optional background worker between sessions, never
    /// mid-turn (spec §9 Open Question: no automatic within-session decay).
    fn decay_all(&self, half_life_days: f64) -> Result<usize>;
}

/// SQLite-backed `FactsStore`.
pub struct SqliteFactsStore {
    storage: Arc<Storage>,
}

impl SqliteFactsStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    fn row_to_fact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Fact> {
        let fact_type_str: String = row.get("fact_type")?;
        let fact_type = fact_type_str
            .parse::<FactType>()
            .unwrap_or(FactType::Note);
        let tags_json: String = row.get("tags")?;
        let metadata_json: String = row.get("metadata")?;

        Ok(Fact {
            id: row.get("id")?,
            fact_type,
            content: row.get("content")?,
            context: row.get("context")?,
            episode_id: row.get("episode_id")?,
            session_id: row.get("session_id")?,
            timestamp: row.get("timestamp")?,
            importance: row.get("importance")?,
            access_count: row.get::<_, i64>("access_count")? as u32,
            last_accessed: row.get("last_accessed")?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata_json).unwrap_or_else(|_| serde_json::json!({})),
        })
    }

    /// Weighted ranking score for a single candidate row against `query`.
    /// Keyword match (substring) + importance + log-scaled access count +
    /// ~30-day recency half-life, per spec §4.B.
    fn rank_score(fact: &Fact, query_lower: &str, now: DateTime<Utc>) -> f64 {
        let keyword_match = if query_lower.is_empty() {
            0.0
        } else {
            let content_lower = fact.content.to_lowercase();
            let context_lower = fact.context.to_lowercase();
            if content_lower.contains(query_lower) || context_lower.contains(query_lower) {
                1.0
            } else {
                0.0
            }
        };

        let access_component = ((fact.access_count as f64) + 1.0).ln();

        let age_days = (now - fact.timestamp).num_seconds() as f64 / 86_400.0;
        let recency = 0.5_f64.powf(age_days.max(0.0) / 30.0);

        0.45 * keyword_match + 0.25 * (fact.importance as f64) + 0.1 * access_component
            + 0.2 * recency
    }
}

impl FactsStore for SqliteFactsStore {
    fn add(&self, fact: NewFact) -> Result<Fact> {
        let importance = compute_importance(fact.fact_type, &fact.content, &fact.context);
        let record = Fact {
            id: Uuid::new_v4().to_string(),
            fact_type: fact.fact_type,
            content: fact.content,
            context: fact.context,
            episode_id: fact.episode_id,
            session_id: fact.session_id,
            timestamp: Utc::now(),
            importance,
            access_count: 0,
            last_accessed: None,
            tags: fact.tags,
            metadata: fact.metadata,
        };

        self.storage.with_writer(|conn| {
            conn.execute(
                "INSERT INTO facts (id, fact_type, content, context, episode_id, session_id,
                    timestamp, importance, access_count, last_accessed, tags, metadata)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id,
                    record.fact_type.as_str(),
                    record.content,
                    record.context,
                    record.episode_id,
                    record.session_id,
                    record.timestamp,
                    record.importance,
                    record.access_count,
                    record.last_accessed,
                    serde_json::to_string(&record.tags).unwrap_or_else(|_| "[]".to_string()),
                    serde_json::to_string(&record.metadata).unwrap_or_else(|_| "{}".to_string()),
                ],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })?;

        Ok(record)
    }

    fn search(&self, query: &str, limit: usize, fact_types: Option<&[FactType]>) -> Result<Vec<Fact>> {
        let query_lower = query.to_lowercase();
        let now = Utc::now();

        let candidates = self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM facts")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map([], Self::row_to_fact)
                .map_err(CocoError::Database)?;
            let mut facts = Vec::new();
            for row in rows {
                facts.push(row.map_err(CocoError::Database)?);
            }
            Ok(facts)
        })?;

        let mut scored: Vec<(f64, Fact)> = candidates
            .into_iter()
            .filter(|f| {
                fact_types
                    .map(|types| types.contains(&f.fact_type))
                    .unwrap_or(true)
            })
            .map(|f| (Self::rank_score(&f, &query_lower, now), f))
            .collect();

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.1.importance.partial_cmp(&a.1.importance).unwrap_or(std::cmp::Ordering::Equal))
                .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
        });

        Ok(scored.into_iter().take(limit).map(|(_, f)| f).collect())
    }

    fn by_type(&self, fact_type: FactType, limit: usize) -> Result<Vec<Fact>> {
        self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT * FROM facts WHERE fact_type = ?1
                     ORDER BY importance DESC, timestamp DESC LIMIT ?2",
                )
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map(params![fact_type.as_str(), limit as i64], Self::row_to_fact)
                .map_err(CocoError::Database)?;
            let mut facts = Vec::new();
            for row in rows {
                facts.push(row.map_err(CocoError::Database)?);
            }
            Ok(facts)
        })
    }

    fn stats(&self) -> Result<FactsStats> {
        self.storage.with_reader(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM facts", [], |r| r.get(0))
                .map_err(CocoError::Database)?;

            let mut stmt = conn
                .prepare("SELECT fact_type, COUNT(*) FROM facts GROUP BY fact_type")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map([], |row| {
                    let t: String = row.get(0)?;
                    let c: i64 = row.get(1)?;
                    Ok((t, c as u64))
                })
                .map_err(CocoError::Database)?;

            let mut by_type = std::collections::HashMap::new();
            for row in rows {
                let (t, c) = row.map_err(CocoError::Database)?;
                by_type.insert(t, c);
            }

            Ok(FactsStats {
                total: total as u64,
                by_type,
            })
        })
    }

    fn touch(&self, id: &str) -> Result<()> {
        self.storage.with_writer(|conn| {
            conn.execute(
                "UPDATE facts SET access_count = access_count + 1, last_accessed = ?1 WHERE id = ?2",
                params![Utc::now(), id],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    fn decay_all(&self, half_life_days: f64) -> Result<usize> {
        let now = Utc::now();
        let rows = self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, importance, timestamp FROM facts")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let importance: f32 = row.get(1)?;
                    let timestamp: DateTime<Utc> = row.get(2)?;
                    Ok((id, importance, timestamp))
                })
                .map_err(CocoError::Database)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(CocoError::Database)?);
            }
            Ok(out)
        })?;

        let mut updated = 0;
        for (id, importance, timestamp) in rows {
            let age_days = (now - timestamp).num_seconds() as f64 / 86_400.0;
            let decayed = (importance as f64) * 0.5_f64.powf(age_days.max(0.0) / half_life_days);
            self.storage.with_writer(|conn| {
                conn.execute(
                    "UPDATE facts SET importance = ?1 WHERE id = ?2",
                    params![decayed.clamp(0.0, 1.0) as f32, id],
                )
                .map_err(CocoError::Database)?;
                Ok(())
            })?;
            updated += 1;
        }

        Ok(updated)
    }
}

/// Quiet no-op store used when no Facts capability is configured; every
/// call returns empty results instead of an error so callers that treat
/// this as the degraded path don't need special-casing.
pub struct NullFactsStore;

impl FactsStore for NullFactsStore {
    fn add(&self, _fact: NewFact) -> Result<Fact> {
        Err(CocoError::Internal("facts store not configured".to_string()))
    }
    fn search(&self, _query: &str, _limit: usize, _fact_types: Option<&[FactType]>) -> Result<Vec<Fact>> {
        Ok(Vec::new())
    }
    fn by_type(&self, _fact_type: FactType, _limit: usize) -> Result<Vec<Fact>> {
        Ok(Vec::new())
    }
    fn stats(&self) -> Result<FactsStats> {
        Ok(FactsStats::default())
    }
    fn touch(&self, _id: &str) -> Result<()> {
        Ok(())
    }
    fn decay_all(&self, _half_life_days: f64) -> Result<usize> {
        Ok(0)
    }
}
