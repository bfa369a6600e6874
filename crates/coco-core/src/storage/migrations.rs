//! Database migrations
//!
//! Additive-only schema history. A migration never drops or narrows a
//! column; anything destructive belongs behind an explicit
//! `CocoError::SchemaIncompatible` failure instead (see `apply_migrations`).

use rusqlite::Connection;

use crate::error::{CocoError, Result};

/// A single schema migration.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Facts store: typed facts with recall indexes",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Semantic store: free-text memories with embeddings",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Episodic/summary durable tables",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Scheduler: tasks, executions, outbox",
        up: MIGRATION_V4_UP,
    },
];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    fact_type TEXT NOT NULL,
    content TEXT NOT NULL,
    context TEXT NOT NULL DEFAULT '',
    episode_id INTEGER,
    session_id TEXT NOT NULL DEFAULT '',
    timestamp TEXT NOT NULL,
    importance REAL NOT NULL DEFAULT 0.5,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    metadata TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_facts_type ON facts(fact_type);
CREATE INDEX IF NOT EXISTS idx_facts_importance ON facts(importance);
CREATE INDEX IF NOT EXISTS idx_facts_timestamp ON facts(timestamp);
CREATE INDEX IF NOT EXISTS idx_facts_episode ON facts(episode_id);
CREATE INDEX IF NOT EXISTS idx_facts_session ON facts(session_id);
CREATE INDEX IF NOT EXISTS idx_facts_access_count ON facts(access_count);
"#;

const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS semantic_memories (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    embedding BLOB NOT NULL,
    importance REAL NOT NULL DEFAULT 1.0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_semantic_created_at ON semantic_memories(created_at);
"#;

const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS exchanges (
    id INTEGER PRIMARY KEY,
    created_at TEXT NOT NULL,
    user_text TEXT NOT NULL,
    agent_text TEXT NOT NULL,
    tool_calls TEXT NOT NULL DEFAULT '[]',
    token_estimate INTEGER NOT NULL DEFAULT 0,
    summarized INTEGER NOT NULL DEFAULT 0,
    autonomous INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_exchanges_summarized ON exchanges(summarized);

CREATE TABLE IF NOT EXISTS summaries (
    id TEXT PRIMARY KEY,
    window_start INTEGER NOT NULL,
    window_end INTEGER NOT NULL,
    text TEXT NOT NULL,
    token_estimate INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_summaries_window ON summaries(window_start, window_end);
"#;

const MIGRATION_V4_UP: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    schedule_text TEXT NOT NULL,
    cron TEXT NOT NULL,
    timezone TEXT NOT NULL DEFAULT 'UTC',
    template_name TEXT NOT NULL,
    config TEXT NOT NULL DEFAULT '{}',
    enabled INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    last_run_at TEXT,
    last_status TEXT,
    next_run_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS executions (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    status TEXT NOT NULL,
    output_summary TEXT NOT NULL DEFAULT '',
    FOREIGN KEY (task_id) REFERENCES tasks(id)
);

CREATE INDEX IF NOT EXISTS idx_executions_task_started ON executions(task_id, started_at);

CREATE TABLE IF NOT EXISTS outbox (
    id TEXT PRIMARY KEY,
    task_id TEXT NOT NULL,
    template_name TEXT NOT NULL,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL,
    sent_at TEXT
);
"#;

fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);",
    )?;
    let version: Option<u32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the database's current version.
/// Migrations are additive by construction (`CREATE TABLE IF NOT EXISTS`,
/// new columns only); there is currently no destructive migration path,
/// so `SchemaIncompatible` is reserved for a future migration that would
/// need one.
pub fn apply_migrations(conn: &Connection) -> Result<u32> {
    let current_version = get_current_version(conn).map_err(CocoError::Database)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)
                .map_err(CocoError::Database)?;
            applied += 1;
        }
    }

    if applied > 0 {
        let latest = MIGRATIONS.iter().map(|m| m.version).max().unwrap_or(0);
        conn.execute_batch("DELETE FROM schema_version;")
            .map_err(CocoError::Database)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [latest])
            .map_err(CocoError::Database)?;
    }

    Ok(applied)
}
