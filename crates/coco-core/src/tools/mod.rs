//! Tool Registry (component I)
//!
//! A tool is fully described by a single `ToolDefinition` struct,
//! registered once (REDESIGN FLAGS: the teacher's `handle_tools_list`
//! hardcoded its tool list in three separate places; here there is
//! exactly one source of truth per tool).

pub mod catalog;
pub mod providers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::CocoError;
use crate::llm::ToolSchema;

/// Grouping used for documentation and availability probing, not
/// behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Filesystem,
    Shell,
    Web,
    CodeExecution,
    Email,
    Calendar,
    Docs,
    Sheets,
    Drive,
    Media,
    Twitter,
}

/// Result of dispatching a tool, in the shape the engine turns into a
/// `tool_result` block (spec §4.I).
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub ok: bool,
    pub value: Option<Value>,
    pub error_kind: Option<&'static str>,
    pub error_message: Option<String>,
    pub elapsed_ms: u64,
}

impl ToolResult {
    fn ok(value: Value, elapsed_ms: u64) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error_kind: None,
            error_message: None,
            elapsed_ms,
        }
    }

    fn err(error: CocoError, elapsed_ms: u64) -> Self {
        Self {
            ok: false,
            value: None,
            error_kind: Some(error.kind()),
            error_message: Some(error.to_string()),
            elapsed_ms,
        }
    }

    /// A short human-readable rendering suitable for a `tool_result`
    /// block's content.
    pub fn as_content_string(&self) -> String {
        if self.ok {
            self.value
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default()
        } else {
            format!(
                "{}: {}",
                self.error_kind.unwrap_or("Internal"),
                self.error_message.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// A single tool's callable behavior. Implementors take validated JSON
/// input and return a JSON value or a structured error (spec §4.I).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: Value) -> Result<Value, CocoError>;
}

/// Everything the registry and the LLM need to know about one tool.
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub category: ToolCategory,
    pub timeout: Duration,
    handler: Arc<dyn ToolHandler>,
    /// Probed once at registration and re-checked on demand; tools whose
    /// probe fails are excluded from `schemas_for_llm`.
    availability: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        category: ToolCategory,
        timeout: Duration,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            category,
            timeout,
            handler,
            availability: Arc::new(|| true),
        }
    }

    pub fn with_availability(mut self, probe: Arc<dyn Fn() -> bool + Send + Sync>) -> Self {
        self.availability = probe;
        self
    }

    pub fn is_available(&self) -> bool {
        (self.availability)()
    }

    fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Registers tools once and dispatches calls to them by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Panics on a duplicate name: that is a wiring
    /// bug caught at startup, not a runtime condition.
    pub fn register(&mut self, tool: ToolDefinition) {
        assert!(
            !self.tools.contains_key(&tool.name),
            "duplicate tool registration: {}",
            tool.name
        );
        self.order.push(tool.name.clone());
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Schemas for every currently-available tool, in registration order.
    pub fn schemas_for_llm(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .filter(|tool| tool.is_available())
            .map(ToolDefinition::to_schema)
            .collect()
    }

    /// Invoke a tool's handler by name, applying its declared timeout.
    pub async fn dispatch(&self, name: &str, input: Value) -> ToolResult {
        let start = Instant::now();
        let Some(tool) = self.tools.get(name) else {
            return ToolResult::err(CocoError::UnknownTool(name.to_string()), start.elapsed().as_millis() as u64);
        };

        let call = tool.handler.call(input);
        match tokio::time::timeout(tool.timeout, call).await {
            Ok(Ok(value)) => ToolResult::ok(value, start.elapsed().as_millis() as u64),
            Ok(Err(e)) => ToolResult::err(e, start.elapsed().as_millis() as u64),
            Err(_) => ToolResult::err(
                CocoError::ExternalFailure(format!("{name} timed out after {:?}", tool.timeout)),
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
