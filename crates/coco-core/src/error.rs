//! Error taxonomy
//!
//! Mirrors the transport-independent error classes the engine, tool
//! registry, and scheduler all reason about. `InvalidInput`/`UnknownTool`/
//! `RateLimited`/`ExternalFailure` are recoverable within a turn;
//! `SchemaIncompatible`/`FilesystemCorruption` are fatal at startup only.

use std::time::Duration;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CocoError>;

#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CocoError {
    /// Caller-supplied input failed schema validation. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A dispatched tool has no registered handler.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// External service quota exhausted.
    #[error("rate limited on {service}, retry after {retry_after:?}")]
    RateLimited {
        service: String,
        retry_after: Duration,
    },

    /// Network, provider 5xx, or timeout.
    #[error("external failure: {0}")]
    ExternalFailure(String),

    /// Unanticipated exception. Logged, never crashes the process.
    #[error("internal error: {0}")]
    Internal(String),

    /// A schema migration would have dropped or narrowed a column.
    #[error("schema incompatible: {0}")]
    SchemaIncompatible(String),

    /// Duplicate identity documents or other on-disk layout corruption.
    #[error("filesystem corruption: {0}")]
    FilesystemCorruption(String),

    /// A prefix or partial identifier matched more than one record.
    #[error("ambiguous identifier \"{prefix}\": matches {matches} records")]
    Ambiguous { prefix: String, matches: usize },

    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CocoError {
    /// Short, stable label suitable for `tracing` fields and `tool_result`
    /// error_kind values. Never includes the message body (no stack
    /// traces leak to the user).
    pub fn kind(&self) -> &'static str {
        match self {
            CocoError::InvalidInput(_) => "InvalidInput",
            CocoError::UnknownTool(_) => "UnknownTool",
            CocoError::RateLimited { .. } => "RateLimited",
            CocoError::ExternalFailure(_) => "ExternalFailure",
            CocoError::Internal(_) => "Internal",
            CocoError::SchemaIncompatible(_) => "SchemaIncompatible",
            CocoError::FilesystemCorruption(_) => "FilesystemCorruption",
            CocoError::Ambiguous { .. } => "Ambiguous",
            CocoError::Database(_) => "Internal",
            CocoError::Io(_) => "Internal",
        }
    }
}
