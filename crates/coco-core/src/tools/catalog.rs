//! Default tool catalog (spec §6.2): filesystem and shell tools run for
//! real against the local workspace; the external-service tools are
//! wired against the provider traits in `super::providers` and default
//! to `Unavailable` so the registry never depends on a real network SDK.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::providers::{
    CalendarProvider, DriveProvider, EmailProvider, TwitterProvider, UnavailableCalendarProvider,
    UnavailableDriveProvider, UnavailableEmailProvider, UnavailableTwitterProvider,
    UnavailableWebSearchProvider, WebSearchProvider,
};
use super::{ToolCategory, ToolDefinition, ToolHandler, ToolRegistry};
use crate::error::CocoError;

const SHELL_WHITELIST: &[&str] = &["git", "ls", "cat", "pwd", "grep", "find", "wc"];
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, CocoError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CocoError::InvalidInput(format!("missing required field `{key}`")))
}

struct ReadFileHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for ReadFileHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let path = require_str(&input, "path")?;
        let full = self.workspace_root.join(path);
        let contents = tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("read_file failed: {e}")))?;
        Ok(Value::String(contents))
    }
}

struct WriteFileHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for WriteFileHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let path = require_str(&input, "path")?;
        let content = require_str(&input, "content")?;
        let full = self.workspace_root.join(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CocoError::ExternalFailure(format!("write_file failed: {e}")))?;
        }
        tokio::fs::write(&full, content)
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("write_file failed: {e}")))?;
        Ok(serde_json::json!({"bytes_written": content.len()}))
    }
}

struct ListDirHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for ListDirHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let path = input.get("path").and_then(Value::as_str).unwrap_or(".");
        let full = self.workspace_root.join(path);
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&full)
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("list_dir failed: {e}")))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("list_dir failed: {e}")))?
        {
            entries.push(entry.file_name().to_string_lossy().to_string());
        }
        Ok(Value::Array(entries.into_iter().map(Value::String).collect()))
    }
}

struct SearchCodeHandler {
    workspace_root: PathBuf,
}

#[async_trait]
impl ToolHandler for SearchCodeHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let query = require_str(&input, "query")?.to_string();
        let root = self.workspace_root.clone();
        let matches = tokio::task::spawn_blocking(move || search_files_containing(&root, &query))
            .await
            .map_err(|e| CocoError::Internal(format!("search_code task failed: {e}")))??;
        Ok(Value::Array(matches.into_iter().map(Value::String).collect()))
    }
}

fn search_files_containing(root: &std::path::Path, query: &str) -> Result<Vec<String>, CocoError> {
    let mut matches = Vec::new();
    visit(root, query, &mut matches)?;
    Ok(matches)
}

fn visit(dir: &std::path::Path, query: &str, matches: &mut Vec<String>) -> Result<(), CocoError> {
    let Ok(entries) = std::fs::read_dir(dir) else { return Ok(()) };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            visit(&path, query, matches)?;
        } else if let Ok(text) = std::fs::read_to_string(&path) {
            if text.contains(query) {
                matches.push(path.to_string_lossy().to_string());
            }
        }
    }
    Ok(())
}

struct ShellHandler;

#[async_trait]
impl ToolHandler for ShellHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let command = require_str(&input, "command")?;
        let program = command.split_whitespace().next().unwrap_or("");
        if !SHELL_WHITELIST.contains(&program) {
            return Err(CocoError::ExternalFailure(format!(
                "`{program}` is not in the shell whitelist"
            )));
        }
        let args: Vec<&str> = command.split_whitespace().skip(1).collect();
        let output = tokio::process::Command::new(program)
            .args(&args)
            .output()
            .await
            .map_err(|e| CocoError::ExternalFailure(format!("shell exec failed: {e}")))?;
        Ok(serde_json::json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "status": output.status.code(),
        }))
    }
}

struct WebSearchHandler {
    provider: Arc<dyn WebSearchProvider>,
}

#[async_trait]
impl ToolHandler for WebSearchHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let query = require_str(&input, "q")?;
        let results = self.provider.search(query).await?;
        Ok(Value::Array(results.into_iter().map(Value::String).collect()))
    }
}

struct SendEmailHandler {
    provider: Arc<dyn EmailProvider>,
}

#[async_trait]
impl ToolHandler for SendEmailHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let to = require_str(&input, "to")?;
        let subject = require_str(&input, "subject")?;
        let body = input.get("body").and_then(Value::as_str).unwrap_or("");
        self.provider.send(to, subject, body).await?;
        Ok(serde_json::json!({"sent": true}))
    }
}

struct CheckEmailsHandler {
    provider: Arc<dyn EmailProvider>,
}

#[async_trait]
impl ToolHandler for CheckEmailsHandler {
    async fn call(&self, _input: Value) -> Result<Value, CocoError> {
        let inbox = self.provider.check_inbox().await?;
        Ok(Value::Array(inbox.into_iter().map(Value::String).collect()))
    }
}

struct ListEventsHandler {
    provider: Arc<dyn CalendarProvider>,
}

#[async_trait]
impl ToolHandler for ListEventsHandler {
    async fn call(&self, _input: Value) -> Result<Value, CocoError> {
        let now = chrono::Utc::now();
        let events = self.provider.list_events(now, now + chrono::Duration::days(7)).await?;
        Ok(Value::Array(events.into_iter().map(Value::String).collect()))
    }
}

struct CreateEventHandler {
    provider: Arc<dyn CalendarProvider>,
}

#[async_trait]
impl ToolHandler for CreateEventHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        let title = require_str(&input, "title")?;
        let id = self.provider.create_event(title, chrono::Utc::now()).await?;
        Ok(Value::String(id))
    }
}

struct DriveOpHandler {
    provider: Arc<dyn DriveProvider>,
    kind: &'static str,
    op: DriveOp,
}

#[derive(Clone, Copy)]
enum DriveOp {
    Create,
    Read,
    Update,
}

#[async_trait]
impl ToolHandler for DriveOpHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        match self.op {
            DriveOp::Create => {
                let name = require_str(&input, "name")?;
                Ok(Value::String(self.provider.create(self.kind, name).await?))
            }
            DriveOp::Read => {
                let id = require_str(&input, "id")?;
                Ok(Value::String(self.provider.read(id).await?))
            }
            DriveOp::Update => {
                let id = require_str(&input, "id")?;
                let content = require_str(&input, "content")?;
                self.provider.update(id, content).await?;
                Ok(serde_json::json!({"updated": true}))
            }
        }
    }
}

struct GenerationStubHandler {
    kind: &'static str,
}

#[async_trait]
impl ToolHandler for GenerationStubHandler {
    async fn call(&self, _input: Value) -> Result<Value, CocoError> {
        Err(CocoError::ExternalFailure(format!("{} generation is not configured", self.kind)))
    }
}

struct TwitterOpHandler {
    provider: Arc<dyn TwitterProvider>,
    op: TwitterOp,
}

#[derive(Clone, Copy)]
enum TwitterOp {
    Post,
    Search,
    Thread,
}

#[async_trait]
impl ToolHandler for TwitterOpHandler {
    async fn call(&self, input: Value) -> Result<Value, CocoError> {
        match self.op {
            TwitterOp::Post => {
                let text = require_str(&input, "text")?;
                Ok(Value::String(self.provider.post(text).await?))
            }
            TwitterOp::Search => {
                let query = require_str(&input, "query")?;
                Ok(Value::Array(self.provider.search(query).await?.into_iter().map(Value::String).collect()))
            }
            TwitterOp::Thread => {
                let posts: Vec<String> = input
                    .get("posts")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                Ok(Value::Array(self.provider.thread(&posts).await?.into_iter().map(Value::String).collect()))
            }
        }
    }
}

/// Inputs shared by every provider-backed tool: optional real providers,
/// defaulting to the `Unavailable` stand-ins.
pub struct CatalogProviders {
    pub email: Arc<dyn EmailProvider>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub drive: Arc<dyn DriveProvider>,
    pub twitter: Arc<dyn TwitterProvider>,
    pub web_search: Arc<dyn WebSearchProvider>,
}

impl Default for CatalogProviders {
    fn default() -> Self {
        Self {
            email: Arc::new(UnavailableEmailProvider),
            calendar: Arc::new(UnavailableCalendarProvider),
            drive: Arc::new(UnavailableDriveProvider),
            twitter: Arc::new(UnavailableTwitterProvider),
            web_search: Arc::new(UnavailableWebSearchProvider),
        }
    }
}

/// Builds the spec §6.2 catalog against a workspace root and a set of
/// (possibly stub) providers.
pub fn build_default_registry(workspace_root: PathBuf, providers: CatalogProviders) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(ToolDefinition::new(
        "read_file",
        "Read a UTF-8 text file relative to the workspace root.",
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}),
        ToolCategory::Filesystem,
        DEFAULT_TIMEOUT,
        Arc::new(ReadFileHandler { workspace_root: workspace_root.clone() }),
    ));
    registry.register(ToolDefinition::new(
        "write_file",
        "Write a UTF-8 text file relative to the workspace root.",
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}, "content": {"type": "string"}}, "required": ["path", "content"]}),
        ToolCategory::Filesystem,
        DEFAULT_TIMEOUT,
        Arc::new(WriteFileHandler { workspace_root: workspace_root.clone() }),
    ));
    registry.register(ToolDefinition::new(
        "list_dir",
        "List entries in a directory relative to the workspace root.",
        serde_json::json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        ToolCategory::Filesystem,
        DEFAULT_TIMEOUT,
        Arc::new(ListDirHandler { workspace_root: workspace_root.clone() }),
    ));
    registry.register(ToolDefinition::new(
        "search_code",
        "Search workspace files for a literal substring.",
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        ToolCategory::Filesystem,
        DEFAULT_TIMEOUT,
        Arc::new(SearchCodeHandler { workspace_root }),
    ));

    registry.register(ToolDefinition::new(
        "run_command",
        "Run a whitelisted shell command (git, ls, cat, pwd, grep, find, wc).",
        serde_json::json!({"type": "object", "properties": {"command": {"type": "string"}}, "required": ["command"]}),
        ToolCategory::Shell,
        DEFAULT_TIMEOUT,
        Arc::new(ShellHandler),
    ));

    let web_available = providers.web_search.is_available();
    registry.register(
        ToolDefinition::new(
            "search_web",
            "Search the web for a query.",
            serde_json::json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]}),
            ToolCategory::Web,
            DEFAULT_TIMEOUT,
            Arc::new(WebSearchHandler { provider: providers.web_search }),
        )
        .with_availability(Arc::new(move || web_available)),
    );

    registry.register(ToolDefinition::new(
        "run_python_snippet",
        "Execute a short Python snippet and return stdout.",
        serde_json::json!({"type": "object", "properties": {"code": {"type": "string"}}, "required": ["code"]}),
        ToolCategory::CodeExecution,
        Duration::from_secs(10),
        Arc::new(GenerationStubHandler { kind: "python execution" }),
    ));

    let email_available = providers.email.is_available();
    registry.register(
        ToolDefinition::new(
            "send_email",
            "Send an email.",
            serde_json::json!({"type": "object", "properties": {"to": {"type": "string"}, "subject": {"type": "string"}, "body": {"type": "string"}}, "required": ["to", "subject"]}),
            ToolCategory::Email,
            DEFAULT_TIMEOUT,
            Arc::new(SendEmailHandler { provider: providers.email.clone() }),
        )
        .with_availability(Arc::new(move || email_available)),
    );
    registry.register(
        ToolDefinition::new(
            "check_emails",
            "List recent inbox messages.",
            serde_json::json!({"type": "object", "properties": {}}),
            ToolCategory::Email,
            DEFAULT_TIMEOUT,
            Arc::new(CheckEmailsHandler { provider: providers.email.clone() }),
        )
        .with_availability(Arc::new(move || providers.email.is_available())),
    );

    let calendar_available = providers.calendar.is_available();
    registry.register(
        ToolDefinition::new(
            "list_events",
            "List upcoming calendar events.",
            serde_json::json!({"type": "object", "properties": {}}),
            ToolCategory::Calendar,
            DEFAULT_TIMEOUT,
            Arc::new(ListEventsHandler { provider: providers.calendar.clone() }),
        )
        .with_availability(Arc::new(move || calendar_available)),
    );
    registry.register(
        ToolDefinition::new(
            "create_event",
            "Create a calendar event.",
            serde_json::json!({"type": "object", "properties": {"title": {"type": "string"}}, "required": ["title"]}),
            ToolCategory::Calendar,
            DEFAULT_TIMEOUT,
            Arc::new(CreateEventHandler { provider: providers.calendar.clone() }),
        )
        .with_availability(Arc::new(move || providers.calendar.is_available())),
    );

    for (name, kind, op) in [
        ("create_doc", "doc", DriveOp::Create),
        ("read_doc", "doc", DriveOp::Read),
        ("update_doc", "doc", DriveOp::Update),
        ("create_sheet", "sheet", DriveOp::Create),
        ("read_sheet", "sheet", DriveOp::Read),
        ("update_sheet", "sheet", DriveOp::Update),
    ] {
        let available = providers.drive.is_available();
        registry.register(
            ToolDefinition::new(
                name,
                format!("{op_name} a {kind} via the drive provider.", op_name = match op {
                    DriveOp::Create => "create",
                    DriveOp::Read => "read",
                    DriveOp::Update => "update",
                }),
                serde_json::json!({"type": "object"}),
                ToolCategory::Drive,
                DEFAULT_TIMEOUT,
                Arc::new(DriveOpHandler { provider: providers.drive.clone(), kind, op }),
            )
            .with_availability(Arc::new(move || available)),
        );
    }

    registry.register(ToolDefinition::new(
        "generate_image",
        "Generate an image from a prompt.",
        serde_json::json!({"type": "object", "properties": {"prompt": {"type": "string"}}}),
        ToolCategory::Media,
        DEFAULT_TIMEOUT,
        Arc::new(GenerationStubHandler { kind: "image" }),
    ));
    registry.register(ToolDefinition::new(
        "generate_video",
        "Generate a video from a prompt.",
        serde_json::json!({"type": "object", "properties": {"prompt": {"type": "string"}}}),
        ToolCategory::Media,
        DEFAULT_TIMEOUT,
        Arc::new(GenerationStubHandler { kind: "video" }),
    ));

    for (name, op) in [
        ("post_tweet", TwitterOp::Post),
        ("search_tweets", TwitterOp::Search),
        ("post_thread", TwitterOp::Thread),
    ] {
        let available = providers.twitter.is_available();
        registry.register(
            ToolDefinition::new(
                name,
                "Twitter operation.",
                serde_json::json!({"type": "object"}),
                ToolCategory::Twitter,
                DEFAULT_TIMEOUT,
                Arc::new(TwitterOpHandler { provider: providers.twitter.clone(), op }),
            )
            .with_availability(Arc::new(move || available)),
        );
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filesystem_tools_operate_within_workspace_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = build_default_registry(dir.path().to_path_buf(), CatalogProviders::default());

        let write = registry
            .dispatch("write_file", serde_json::json!({"path": "note.txt", "content": "hello"}))
            .await;
        assert!(write.ok);

        let read = registry.dispatch("read_file", serde_json::json!({"path": "note.txt"})).await;
        assert!(read.ok);
        assert_eq!(read.value.unwrap(), "hello");
    }

    #[tokio::test]
    async fn unconfigured_providers_are_excluded_from_schemas() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = build_default_registry(dir.path().to_path_buf(), CatalogProviders::default());
        let schemas = registry.schemas_for_llm();
        assert!(schemas.iter().all(|s| s.name != "send_email"));
        assert!(schemas.iter().any(|s| s.name == "read_file"));
    }

    #[tokio::test]
    async fn shell_rejects_non_whitelisted_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let registry = build_default_registry(dir.path().to_path_buf(), CatalogProviders::default());
        let result = registry.dispatch("run_command", serde_json::json!({"command": "rm -rf /"})).await;
        assert!(!result.ok);
        assert_eq!(result.error_kind, Some("ExternalFailure"));
    }
}
