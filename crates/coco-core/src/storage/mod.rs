//! Storage module
//!
//! A single SQLite database backs the durable side of the Facts,
//! Semantic, Episodic/Summary, and Scheduler stores (spec §6.5). Each
//! store module (`facts`, `semantic`, `episodic`, `summary`, `scheduler`)
//! holds an `Arc<Storage>` and runs its own SQL against the shared
//! connections; `Storage` itself only owns connection lifecycle, PRAGMAs,
//! and migrations.

mod migrations;

pub use migrations::MIGRATIONS;

use std::path::PathBuf;
use std::sync::Mutex;

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{CocoError, Result};

/// Shared SQLite handle: separate reader/writer connections (as the
/// teacher does) so readers never block on a long writer transaction.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    /// True for `open_in_memory()`, where the reader connection is a
    /// separate empty database and reads must go through the writer.
    single_connection: bool,
}

impl Storage {
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(CocoError::Database)
    }

    /// Open (or create) the workspace database at `db_path`, or at the
    /// platform-default data directory when `None`.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "coco", "agent").ok_or_else(|| {
                    CocoError::Internal("could not determine project directories".to_string())
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("coco.db")
            }
        };

        let writer_conn = Connection::open(&path).map_err(CocoError::Database)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path).map_err(CocoError::Database)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            single_connection: false,
        })
    }

    /// Open a private, non-persistent in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        let writer_conn = Connection::open_in_memory().map_err(CocoError::Database)?;
        // An in-memory db is single-connection; WAL doesn't apply but the
        // rest of the PRAGMA batch is harmless.
        writer_conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(CocoError::Database)?;
        migrations::apply_migrations(&writer_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(Connection::open_in_memory().map_err(CocoError::Database)?),
            single_connection: true,
        })
    }

    /// Run `f` with exclusive access to the writer connection.
    pub fn with_writer<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .writer
            .lock()
            .map_err(|_| CocoError::Internal("writer connection mutex poisoned".to_string()))?;
        f(&conn)
    }

    /// Run `f` with shared (read-only intent) access to the reader
    /// connection. In-memory databases share the writer connection since
    /// a fresh in-memory connection would see an empty schema.
    pub fn with_reader<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        if self.single_connection {
            return self.with_writer(f);
        }
        let conn = self
            .reader
            .lock()
            .map_err(|_| CocoError::Internal("reader connection mutex poisoned".to_string()))?;
        f(&conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_in_memory_and_applies_migrations() {
        let storage = Storage::open_in_memory().expect("open");
        let count: i64 = storage
            .with_writer(|conn| {
                conn.query_row("SELECT COUNT(*) FROM facts", [], |r| r.get(0))
                    .map_err(CocoError::Database)
            })
            .expect("query");
        assert_eq!(count, 0);
    }
}
