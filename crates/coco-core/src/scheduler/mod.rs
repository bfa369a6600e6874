//! Autonomous Scheduler (component K)
//!
//! Tasks fire on a schedule (natural-language or raw cron, canonicalized
//! by [`schedule`]) and run a named [`templates::Template`]. The
//! scheduler owns persistence (tasks/executions/outbox, migration v4)
//! and the tick loop; `Template::run` owns the behavior.

pub mod schedule;
pub mod templates;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{CocoError, Result};
use crate::storage::Storage;
use schedule::{next_run_at, parse_schedule, CanonicalCron};
use templates::{Template, TemplateContext, TemplateEffect};

/// A task's lifecycle state (spec §4.K): `Disabled`, or `Enabled` with
/// its next scheduled fire time. `Running` is transient and never
/// persisted — it exists only while a tick is executing a task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Disabled,
    Enabled { next_run_at: DateTime<Utc> },
    Running,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub schedule_text: String,
    pub cron: CanonicalCron,
    pub template_name: String,
    pub config: Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<String>,
    pub next_run_at: DateTime<Utc>,
}

impl Task {
    pub fn state(&self) -> TaskState {
        if self.enabled {
            TaskState::Enabled {
                next_run_at: self.next_run_at,
            }
        } else {
            TaskState::Disabled
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Ok,
    Error,
}

impl ExecutionStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Ok => "ok",
            ExecutionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Execution {
    pub id: String,
    pub task_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    pub output_summary: String,
}

/// The dedupe window a fire is keyed to: minute-grained, so two ticks
/// landing in the same wall-clock minute are treated as one fire (spec
/// §4.K "idempotent within a fire window").
fn fire_window_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M").to_string()
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<(Task, String)> {
    let cron_text: String = row.get("cron")?;
    let config_text: String = row.get("config")?;
    Ok((
        Task {
            id: row.get("id")?,
            name: row.get("name")?,
            schedule_text: row.get("schedule_text")?,
            // Placeholder; re-parsed from `cron_text` by the caller since
            // `CanonicalCron` doesn't implement `FromSql`.
            cron: CanonicalCron {
                minute: schedule::CronField::Any,
                hour: schedule::CronField::Any,
                dom: schedule::DomField::Any,
                month: schedule::CronField::Any,
                dow: schedule::CronField::Any,
                timezone: row.get("timezone")?,
            },
            template_name: row.get("template_name")?,
            config: serde_json::from_str(&config_text).unwrap_or(Value::Null),
            enabled: row.get::<_, i64>("enabled")? != 0,
            created_at: row.get("created_at")?,
            last_run_at: row.get("last_run_at")?,
            last_status: row.get("last_status")?,
            next_run_at: row.get("next_run_at")?,
        },
        cron_text,
    ))
}

/// Durable task/execution/outbox store (migration v4). Re-parses the
/// canonical cron string on every read rather than persisting the
/// `CanonicalCron` structure itself, keeping the stored representation
/// a plain portable string.
pub struct SchedulerStore {
    storage: Arc<Storage>,
}

impl SchedulerStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// The shared durable handle, for callers (the autonomous-fire
    /// recorder) that need to write outside this store's own tables.
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Registers a new task from a schedule string and template binding.
    /// The schedule is parsed and canonicalized immediately so a bad
    /// schedule fails at creation, not at the next tick.
    pub fn create_task(&self, name: &str, schedule_text: &str, template_name: &str, config: Value) -> Result<Task> {
        let cron = parse_schedule(schedule_text)?;
        let now = Utc::now();
        let next = next_run_at(&cron, now)?;
        let task = Task {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            schedule_text: schedule_text.to_string(),
            cron,
            template_name: template_name.to_string(),
            config,
            enabled: true,
            created_at: now,
            last_run_at: None,
            last_status: None,
            next_run_at: next,
        };
        self.insert(&task)?;
        Ok(task)
    }

    fn insert(&self, task: &Task) -> Result<()> {
        let config_text = serde_json::to_string(&task.config).unwrap_or_else(|_| "{}".to_string());
        self.storage.with_writer(|conn| {
            conn.execute(
                "INSERT INTO tasks (id, name, schedule_text, cron, timezone, template_name, config, enabled, created_at, last_run_at, last_status, next_run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    task.id,
                    task.name,
                    task.schedule_text,
                    task.cron.to_cron_string(),
                    task.cron.timezone,
                    task.template_name,
                    config_text,
                    task.enabled as i64,
                    task.created_at,
                    task.last_run_at,
                    task.last_status,
                    task.next_run_at,
                ],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    pub fn set_enabled(&self, task_id: &str, enabled: bool) -> Result<()> {
        self.storage.with_writer(|conn| {
            conn.execute(
                "UPDATE tasks SET enabled = ?1 WHERE id = ?2",
                params![enabled as i64, task_id],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    /// Forces a task's next fire time, e.g. to run it ahead of its
    /// regular schedule. Does not touch `last_run_at`/`last_status`.
    pub fn reschedule(&self, task_id: &str, next_run_at: DateTime<Utc>) -> Result<()> {
        self.storage.with_writer(|conn| {
            conn.execute(
                "UPDATE tasks SET next_run_at = ?1 WHERE id = ?2",
                params![next_run_at, task_id],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    /// Every task currently due to fire (`next_run_at <= now`, enabled).
    pub fn due_tasks(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT * FROM tasks WHERE enabled = 1 AND next_run_at <= ?1 ORDER BY next_run_at ASC")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map(params![now], row_to_task)
                .map_err(CocoError::Database)?;
            let mut tasks = Vec::new();
            for row in rows {
                let (mut task, cron_text) = row.map_err(CocoError::Database)?;
                task.cron = schedule::parse_schedule(&cron_text).unwrap_or(task.cron);
                tasks.push(task);
            }
            Ok(tasks)
        })
    }

    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        self.storage.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tasks ORDER BY created_at ASC").map_err(CocoError::Database)?;
            let rows = stmt.query_map([], row_to_task).map_err(CocoError::Database)?;
            let mut tasks = Vec::new();
            for row in rows {
                let (mut task, cron_text) = row.map_err(CocoError::Database)?;
                task.cron = schedule::parse_schedule(&cron_text).unwrap_or(task.cron);
                tasks.push(task);
            }
            Ok(tasks)
        })
    }

    /// Exact-id lookup, used by `Scheduler::run_now`.
    pub fn get(&self, task_id: &str) -> Result<Option<Task>> {
        self.storage.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM tasks WHERE id = ?1").map_err(CocoError::Database)?;
            let mut rows = stmt.query_map(params![task_id], row_to_task).map_err(CocoError::Database)?;
            match rows.next() {
                Some(row) => {
                    let (mut task, cron_text) = row.map_err(CocoError::Database)?;
                    task.cron = schedule::parse_schedule(&cron_text).unwrap_or(task.cron);
                    Ok(Some(task))
                }
                None => Ok(None),
            }
        })
    }

    /// Deletes the task whose id starts with `id_prefix` (spec §4.K
    /// "prefix match is permitted"). Zero matches is `InvalidInput`;
    /// more than one is `Ambiguous` rather than guessing which task the
    /// caller meant. Deletion is the only way a task leaves its
    /// `Disabled`/`Enabled` lifecycle (spec §3).
    pub fn delete(&self, id_prefix: &str) -> Result<Task> {
        let matches: Vec<Task> = self
            .all_tasks()?
            .into_iter()
            .filter(|t| t.id.starts_with(id_prefix))
            .collect();

        let task = match matches.len() {
            0 => {
                return Err(CocoError::InvalidInput(format!(
                    "no task matches id prefix \"{id_prefix}\""
                )))
            }
            1 => matches.into_iter().next().expect("len checked above"),
            n => {
                return Err(CocoError::Ambiguous {
                    prefix: id_prefix.to_string(),
                    matches: n,
                })
            }
        };

        self.storage.with_writer(|conn| {
            conn.execute("DELETE FROM executions WHERE task_id = ?1", params![task.id])
                .map_err(CocoError::Database)?;
            conn.execute("DELETE FROM outbox WHERE task_id = ?1", params![task.id])
                .map_err(CocoError::Database)?;
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![task.id])
                .map_err(CocoError::Database)?;
            Ok(())
        })?;

        Ok(task)
    }

    /// Has this task already recorded an execution in `window`? Used to
    /// enforce idempotency within a fire window before a template runs.
    fn has_execution_in_window(&self, task_id: &str, window: &str) -> Result<bool> {
        self.storage.with_reader(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM executions WHERE task_id = ?1 AND started_at LIKE ?2",
                    params![task_id, format!("{window}%")],
                    |r| r.get(0),
                )
                .map_err(CocoError::Database)?;
            Ok(count > 0)
        })
    }

    fn start_execution(&self, task_id: &str, started_at: DateTime<Utc>) -> Result<Execution> {
        let execution = Execution {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            started_at,
            completed_at: None,
            status: ExecutionStatus::Running,
            output_summary: String::new(),
        };
        self.storage.with_writer(|conn| {
            conn.execute(
                "INSERT INTO executions (id, task_id, started_at, completed_at, status, output_summary)
                 VALUES (?1, ?2, ?3, NULL, ?4, '')",
                params![execution.id, execution.task_id, execution.started_at, execution.status.as_str()],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })?;
        Ok(execution)
    }

    fn complete_execution(&self, execution_id: &str, status: &ExecutionStatus, output_summary: &str) -> Result<()> {
        self.storage.with_writer(|conn| {
            conn.execute(
                "UPDATE executions SET completed_at = ?1, status = ?2, output_summary = ?3 WHERE id = ?4",
                params![Utc::now(), status.as_str(), output_summary, execution_id],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    fn advance_task(&self, task: &Task, ran_at: DateTime<Utc>, status: &ExecutionStatus) -> Result<()> {
        let next = next_run_at(&task.cron, ran_at)?;
        self.storage.with_writer(|conn| {
            conn.execute(
                "UPDATE tasks SET last_run_at = ?1, last_status = ?2, next_run_at = ?3 WHERE id = ?4",
                params![ran_at, status.as_str(), next, task.id],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    fn write_outbox(&self, task_id: &str, template_name: &str, payload: &Value) -> Result<()> {
        let payload_text = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        self.storage.with_writer(|conn| {
            conn.execute(
                "INSERT INTO outbox (id, task_id, template_name, payload, created_at, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
                params![Uuid::new_v4().to_string(), task_id, template_name, payload_text, Utc::now()],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    /// Unsent outbox entries awaiting human approval.
    pub fn pending_outbox(&self) -> Result<Vec<(String, String, Value)>> {
        self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, template_name, payload FROM outbox WHERE sent_at IS NULL ORDER BY created_at ASC")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map([], |row| {
                    let id: String = row.get(0)?;
                    let template_name: String = row.get(1)?;
                    let payload_text: String = row.get(2)?;
                    Ok((id, template_name, payload_text))
                })
                .map_err(CocoError::Database)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, template_name, payload_text) = row.map_err(CocoError::Database)?;
                out.push((id, template_name, serde_json::from_str(&payload_text).unwrap_or(Value::Null)));
            }
            Ok(out)
        })
    }

    pub fn mark_outbox_sent(&self, outbox_id: &str) -> Result<()> {
        self.storage.with_writer(|conn| {
            conn.execute("UPDATE outbox SET sent_at = ?1 WHERE id = ?2", params![Utc::now(), outbox_id])
                .map_err(CocoError::Database)?;
            Ok(())
        })
    }

    pub fn executions_for(&self, task_id: &str) -> Result<Vec<Execution>> {
        self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, task_id, started_at, completed_at, status, output_summary FROM executions WHERE task_id = ?1 ORDER BY started_at DESC")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map(params![task_id], |row| {
                    let status: String = row.get(4)?;
                    Ok(Execution {
                        id: row.get(0)?,
                        task_id: row.get(1)?,
                        started_at: row.get(2)?,
                        completed_at: row.get(3)?,
                        status: match status.as_str() {
                            "ok" => ExecutionStatus::Ok,
                            "error" => ExecutionStatus::Error,
                            _ => ExecutionStatus::Running,
                        },
                        output_summary: row.get(5)?,
                    })
                })
                .map_err(CocoError::Database)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(CocoError::Database)
        })
    }
}

/// Snapshot of scheduler-wide state, returned by `Scheduler::status()`.
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub total_tasks: usize,
    pub enabled_tasks: usize,
    pub disabled_tasks: usize,
    pub next_run_at: Option<DateTime<Utc>>,
    pub pending_outbox: usize,
}

/// Drives due tasks through their bound template (spec §4.K execution
/// loop). Owns no timer itself; `tick()` is meant to be called on a
/// fixed interval (`AppConfig::scheduler_tick_interval`, default
/// bounded at 60s) by the process entry point.
pub struct Scheduler {
    store: Arc<SchedulerStore>,
    templates: HashMap<String, Arc<dyn Template>>,
    context: TemplateContext,
    /// Shared with the Consciousness Engine's own exchange id allocator
    /// (see `ConsciousnessEngine::exchange_id_counter`) so autonomous
    /// exchanges a template fire writes never collide with a foreground
    /// turn's id, even though both write into the same `exchanges` table.
    exchange_ids: Arc<AtomicI64>,
}

impl Scheduler {
    pub fn new(
        store: Arc<SchedulerStore>,
        templates: Vec<Arc<dyn Template>>,
        context: TemplateContext,
        exchange_ids: Arc<AtomicI64>,
    ) -> Self {
        let templates = templates.into_iter().map(|t| (t.name().to_string(), t)).collect();
        Self { store, templates, context, exchange_ids }
    }

    /// Runs every task currently due. Tasks with no registered template,
    /// or whose template errors, are recorded as failed executions and
    /// still advanced to their next scheduled time — a broken task
    /// never blocks the ones after it.
    pub async fn tick(&self) -> Result<Vec<(Task, ExecutionStatus)>> {
        let now = Utc::now();
        let due = self.store.due_tasks(now)?;
        let mut results = Vec::with_capacity(due.len());

        for task in due {
            let window = fire_window_key(now);
            if self.store.has_execution_in_window(&task.id, &window)? {
                tracing::debug!(task_id = %task.id, window, "skipping duplicate fire within window");
                self.store.advance_task(&task, now, &ExecutionStatus::Ok)?;
                continue;
            }

            let execution = self.store.start_execution(&task.id, now)?;
            let status = self.run_task(&task, &execution.id).await;
            self.store.advance_task(&task, now, &status)?;
            results.push((task, status));
        }

        Ok(results)
    }

    /// Runs one task immediately, regardless of its `next_run_at`. Still
    /// respects the fire-window dedup so a manual trigger landing in the
    /// same minute as a just-completed tick doesn't double-send; still
    /// advances `next_run_at` afterward like a regular fire (spec §4.K
    /// `run_now(id)`).
    pub async fn run_now(&self, task_id: &str) -> Result<(Task, ExecutionStatus)> {
        let task = self
            .store
            .get(task_id)?
            .ok_or_else(|| CocoError::InvalidInput(format!("no task with id \"{task_id}\"")))?;

        let now = Utc::now();
        let window = fire_window_key(now);
        if self.store.has_execution_in_window(&task.id, &window)? {
            tracing::debug!(task_id = %task.id, window, "run_now skipped: already fired this window");
            self.store.advance_task(&task, now, &ExecutionStatus::Ok)?;
            return Ok((task, ExecutionStatus::Ok));
        }

        let execution = self.store.start_execution(&task.id, now)?;
        let status = self.run_task(&task, &execution.id).await;
        self.store.advance_task(&task, now, &status)?;
        Ok((task, status))
    }

    /// Aggregate scheduler state (spec §4.K `status()`): task counts by
    /// enabled/disabled, the earliest upcoming fire among enabled tasks,
    /// and how many outbox entries are awaiting manual approval.
    pub fn status(&self) -> Result<SchedulerStatus> {
        let tasks = self.store.all_tasks()?;
        let enabled_tasks = tasks.iter().filter(|t| t.enabled).count();
        let next_run_at = tasks
            .iter()
            .filter(|t| t.enabled)
            .map(|t| t.next_run_at)
            .min();
        let pending_outbox = self.store.pending_outbox()?.len();

        Ok(SchedulerStatus {
            total_tasks: tasks.len(),
            enabled_tasks,
            disabled_tasks: tasks.len() - enabled_tasks,
            next_run_at,
            pending_outbox,
        })
    }

    async fn run_task(&self, task: &Task, execution_id: &str) -> ExecutionStatus {
        let Some(template) = self.templates.get(&task.template_name) else {
            let message = format!("no template registered named `{}`", task.template_name);
            tracing::warn!(task_id = %task.id, template = %task.template_name, "unknown template");
            let _ = self.store.complete_execution(execution_id, &ExecutionStatus::Error, &message);
            return ExecutionStatus::Error;
        };

        let outcome = template.run(&self.context, &task.config).await;

        // Every fire of a registered template leaves a trace in memory
        // (spec §4.K "writes both an Exchange marked as `autonomous` and
        // a SemanticMemory entry"), whether it completed, was outboxed,
        // was rate-limited, or errored.
        let fire_summary = match &outcome {
            Ok(TemplateEffect::Completed { output_summary }) => output_summary.clone(),
            Ok(TemplateEffect::RateLimited { output_summary }) => output_summary.clone(),
            Ok(TemplateEffect::Outboxed { output_summary, .. }) => output_summary.clone(),
            Err(e) => format!("failed: {e}"),
        };
        self.record_autonomous_fire(task, &fire_summary);

        match outcome {
            Ok(TemplateEffect::Completed { output_summary }) => {
                let _ = self.store.complete_execution(execution_id, &ExecutionStatus::Ok, &output_summary);
                ExecutionStatus::Ok
            }
            Ok(TemplateEffect::RateLimited { output_summary }) => {
                let _ = self.store.complete_execution(execution_id, &ExecutionStatus::Ok, &output_summary);
                ExecutionStatus::Ok
            }
            Ok(TemplateEffect::Outboxed { payload, output_summary }) => {
                if let Err(e) = self.store.write_outbox(&task.id, &task.template_name, &payload) {
                    tracing::warn!(task_id = %task.id, error = %e, "failed to write outbox entry");
                    let _ = self.store.complete_execution(execution_id, &ExecutionStatus::Error, &e.to_string());
                    return ExecutionStatus::Error;
                }
                let _ = self.store.complete_execution(execution_id, &ExecutionStatus::Ok, &output_summary);
                ExecutionStatus::Ok
            }
            Err(e) => {
                tracing::warn!(task_id = %task.id, template = %task.template_name, error = %e, "template run failed");
                let _ = self.store.complete_execution(execution_id, &ExecutionStatus::Error, &e.to_string());
                ExecutionStatus::Error
            }
        }
    }

    /// Writes the autonomous Exchange + SemanticMemory entry a template
    /// fire produces. Allocated from the shared `exchange_ids` counter so
    /// this never collides with a foreground turn's exchange id even
    /// though both land in the same durable `exchanges` table. Failures
    /// here are logged, never propagated — a memory-write hiccup must not
    /// turn a successful template run into a failed `Execution` (mirrors
    /// the engine's own fact/semantic extraction failure policy).
    fn record_autonomous_fire(&self, task: &Task, agent_text: &str) {
        let user_text = format!("[scheduled: {}] {}", task.template_name, task.name);
        let id = self.exchange_ids.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let token_estimate = crate::tokens::estimate(agent_text);

        let inserted = self.store.storage().with_writer(|conn| {
            conn.execute(
                "INSERT INTO exchanges (id, created_at, user_text, agent_text, tool_calls, token_estimate, summarized, autonomous)
                 VALUES (?1, ?2, ?3, ?4, '[]', ?5, 0, 1)",
                params![id, now, user_text, agent_text, token_estimate],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        });
        if let Err(e) = inserted {
            tracing::warn!(task_id = %task.id, error = %e, "failed to record autonomous exchange");
        }

        if let Some(semantic) = &self.context.semantic {
            if let Err(e) = semantic.add(&format!("{user_text}\n{agent_text}"), 1.0) {
                tracing::warn!(task_id = %task.id, error = %e, "failed to record autonomous semantic memory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::providers::UnlimitedRateLimiter;
    use crate::tools::ToolRegistry;

    fn store() -> Arc<SchedulerStore> {
        Arc::new(SchedulerStore::new(Arc::new(Storage::open_in_memory().unwrap())))
    }

    fn context() -> TemplateContext {
        TemplateContext {
            tools: Arc::new(ToolRegistry::new()),
            rate_limiter: Arc::new(UnlimitedRateLimiter),
            facts: None,
            semantic: None,
        }
    }

    fn exchange_ids() -> Arc<AtomicI64> {
        Arc::new(AtomicI64::new(1))
    }

    #[test]
    fn create_task_parses_and_canonicalizes_schedule() {
        let store = store();
        let task = store.create_task("digest", "daily at 9am", "health_check", Value::Null).unwrap();
        assert_eq!(task.cron.to_cron_string(), "0 9 * * *");
        assert!(task.next_run_at > Utc::now());
    }

    #[test]
    fn create_task_rejects_unparseable_schedule() {
        let store = store();
        let err = store.create_task("bad", "whenever", "health_check", Value::Null).unwrap_err();
        assert!(matches!(err, CocoError::InvalidInput(_)));
    }

    #[test]
    fn due_tasks_only_returns_enabled_tasks_past_next_run() {
        let store = store();
        let task = store.create_task("t", "every 1 minutes", "health_check", Value::Null).unwrap();
        // Not due yet: next_run_at is in the future relative to now.
        assert!(store.due_tasks(Utc::now()).unwrap().is_empty());
        assert!(!store.due_tasks(task.next_run_at + chrono::Duration::seconds(1)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn tick_runs_due_task_and_advances_next_run() {
        let store = store();
        let task = store.create_task("hc", "every 1 minutes", "health_check", Value::Null).unwrap();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());

        store.reschedule(&task.id, Utc::now() - chrono::Duration::seconds(1)).unwrap();

        let results = scheduler.tick().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, ExecutionStatus::Ok);

        let tasks = store.all_tasks().unwrap();
        assert!(tasks[0].next_run_at > Utc::now());
        assert!(tasks[0].last_run_at.is_some());
    }

    #[tokio::test]
    async fn tick_does_not_double_fire_within_the_same_window() {
        let store = store();
        let task = store.create_task("hc", "every 1 minutes", "health_check", Value::Null).unwrap();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());

        store.reschedule(&task.id, Utc::now() - chrono::Duration::seconds(1)).unwrap();

        scheduler.tick().await.unwrap();
        let executions_after_first = store.executions_for(&task.id).unwrap().len();

        // Simulate a second tick landing in the same wall-clock minute by
        // forcing next_run_at due again without advancing real time.
        store.reschedule(&task.id, Utc::now() - chrono::Duration::seconds(1)).unwrap();
        scheduler.tick().await.unwrap();

        let executions_after_second = store.executions_for(&task.id).unwrap().len();
        assert_eq!(executions_after_first, executions_after_second, "duplicate fire within the same minute window must not record a second execution");
    }

    #[tokio::test]
    async fn unknown_template_records_error_but_still_advances() {
        let store = store();
        let task = store.create_task("t", "every 1 minutes", "no_such_template", Value::Null).unwrap();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());

        store.reschedule(&task.id, Utc::now() - chrono::Duration::seconds(1)).unwrap();

        let results = scheduler.tick().await.unwrap();
        assert_eq!(results[0].1, ExecutionStatus::Error);
        let tasks = store.all_tasks().unwrap();
        assert!(tasks[0].next_run_at > Utc::now(), "a failed task still advances past its stale fire time");
    }

    #[tokio::test]
    async fn outboxed_template_writes_a_pending_outbox_entry() {
        let store = store();
        let task = store
            .create_task("email", "every 1 minutes", "simple_email", serde_json::json!({"to": "a@b.com", "subject": "hi", "body": "hello"}))
            .unwrap();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());

        store.reschedule(&task.id, Utc::now() - chrono::Duration::seconds(1)).unwrap();

        scheduler.tick().await.unwrap();
        let pending = store.pending_outbox().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1, "simple_email");
    }

    #[test]
    fn delete_by_unique_prefix_removes_the_task() {
        let store = store();
        let task = store.create_task("t", "every 1 minutes", "health_check", Value::Null).unwrap();
        let prefix = &task.id[..8];

        let deleted = store.delete(prefix).unwrap();
        assert_eq!(deleted.id, task.id);
        assert!(store.all_tasks().unwrap().is_empty());
    }

    #[test]
    fn delete_with_no_match_is_invalid_input() {
        let store = store();
        let err = store.delete("nonexistent-prefix").unwrap_err();
        assert!(matches!(err, CocoError::InvalidInput(_)));
    }

    #[test]
    fn delete_with_ambiguous_prefix_fails() {
        let store = store();
        store.create_task("a", "every 1 minutes", "health_check", Value::Null).unwrap();
        store.create_task("b", "every 1 minutes", "health_check", Value::Null).unwrap();

        // Every UUID shares the empty-string prefix, so this always matches both.
        let err = store.delete("").unwrap_err();
        assert!(matches!(err, CocoError::Ambiguous { matches: 2, .. }));
    }

    #[test]
    fn delete_removes_executions_and_outbox_rows_too() {
        let store = store();
        let task = store
            .create_task("email", "every 1 minutes", "simple_email", serde_json::json!({"to": "a@b.com", "subject": "hi", "body": "hello"}))
            .unwrap();
        store.start_execution(&task.id, Utc::now()).unwrap();
        store.write_outbox(&task.id, "simple_email", &Value::Null).unwrap();

        store.delete(&task.id).unwrap();

        assert!(store.executions_for(&task.id).unwrap().is_empty());
        assert!(store.pending_outbox().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_now_fires_a_task_ahead_of_its_schedule() {
        let store = store();
        let task = store.create_task("hc", "daily at 9am", "health_check", Value::Null).unwrap();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());

        let (ran, status) = scheduler.run_now(&task.id).await.unwrap();
        assert_eq!(ran.id, task.id);
        assert_eq!(status, ExecutionStatus::Ok);
        assert_eq!(store.executions_for(&task.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_now_rejects_an_unknown_task_id() {
        let store = store();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());
        let err = scheduler.run_now("does-not-exist").await.unwrap_err();
        assert!(matches!(err, CocoError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn status_reports_task_counts_and_next_run() {
        let store = store();
        let scheduler = Scheduler::new(store.clone(), templates::default_templates(), context(), exchange_ids());
        let task = store.create_task("hc", "every 1 minutes", "health_check", Value::Null).unwrap();
        store.set_enabled(&task.id, false).unwrap();
        store.create_task("hc2", "daily at 9am", "health_check", Value::Null).unwrap();

        let status = scheduler.status().unwrap();
        assert_eq!(status.total_tasks, 2);
        assert_eq!(status.enabled_tasks, 1);
        assert_eq!(status.disabled_tasks, 1);
        assert!(status.next_run_at.is_some());
        assert_eq!(status.pending_outbox, 0);
    }
}
