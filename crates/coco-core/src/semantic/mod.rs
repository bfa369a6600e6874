//! Semantic Store (component C)
//!
//! Vector-ish retrieval over free text. The embedding scheme is
//! pluggable; `HashEmbedder` is the zero-dependency default,
//! `LocalModelEmbedder` (under the `embeddings` feature) is the upgrade
//! path.

pub mod embedder;

pub use embedder::{cosine_similarity, CachingEmbedder, Embedder, HashEmbedder};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CocoError, Result};
use crate::storage::Storage;

/// A free-text memory retrievable by vector similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMemory {
    pub id: String,
    pub content: String,
    pub importance: f32,
    pub created_at: DateTime<Utc>,
}

/// The Semantic Store contract.
pub trait SemanticStore: Send + Sync {
    fn add(&self, content: &str, importance: f32) -> Result<SemanticMemory>;
    /// Returns the `k` most similar stored entries' content, most similar
    /// first. Deterministic given the same rows and query.
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>>;
    fn count(&self) -> Result<u64>;
}

fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// SQLite-backed `SemanticStore`, parameterized over an `Embedder`.
pub struct SqliteSemanticStore {
    storage: Arc<Storage>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteSemanticStore {
    pub fn new(storage: Arc<Storage>, embedder: Arc<dyn Embedder>) -> Self {
        Self { storage, embedder }
    }

    pub fn with_default_embedder(storage: Arc<Storage>, dimensions: usize) -> Self {
        Self::new(storage, Arc::new(HashEmbedder::new(dimensions)))
    }
}

impl SemanticStore for SqliteSemanticStore {
    fn add(&self, content: &str, importance: f32) -> Result<SemanticMemory> {
        let record = SemanticMemory {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            importance,
            created_at: Utc::now(),
        };
        let embedding = encode_embedding(&self.embedder.embed(content));

        self.storage.with_writer(|conn| {
            conn.execute(
                "INSERT INTO semantic_memories (id, content, embedding, importance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![record.id, record.content, embedding, record.importance, record.created_at],
            )
            .map_err(CocoError::Database)?;
            Ok(())
        })?;

        Ok(record)
    }

    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        let query_embedding = self.embedder.embed(query);

        let rows = self.storage.with_reader(|conn| {
            let mut stmt = conn
                .prepare("SELECT content, embedding, id FROM semantic_memories")
                .map_err(CocoError::Database)?;
            let rows = stmt
                .query_map([], |row| {
                    let content: String = row.get(0)?;
                    let embedding: Vec<u8> = row.get(1)?;
                    let id: String = row.get(2)?;
                    Ok((content, embedding, id))
                })
                .map_err(CocoError::Database)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row.map_err(CocoError::Database)?);
            }
            Ok(out)
        })?;

        let mut scored: Vec<(f32, String, String)> = rows
            .into_iter()
            .map(|(content, embedding, id)| {
                let vector = decode_embedding(&embedding);
                let score = cosine_similarity(&query_embedding, &vector);
                (score, content, id)
            })
            .collect();

        // Deterministic tie-break on id keeps retrieval stable given the
        // same underlying rows and query.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.2.cmp(&b.2))
        });

        Ok(scored.into_iter().take(k).map(|(_, content, _)| content).collect())
    }

    fn count(&self) -> Result<u64> {
        self.storage.with_reader(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM semantic_memories", [], |r| r.get(0))
                .map_err(CocoError::Database)?;
            Ok(count as u64)
        })
    }
}

/// Quiet no-op store for deployments without a Semantic capability.
pub struct NullSemanticStore;

impl SemanticStore for NullSemanticStore {
    fn add(&self, _content: &str, _importance: f32) -> Result<SemanticMemory> {
        Err(CocoError::Internal("semantic store not configured".to_string()))
    }
    fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
    fn count(&self) -> Result<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteSemanticStore {
        SqliteSemanticStore::with_default_embedder(Arc::new(Storage::open_in_memory().unwrap()), 128)
    }

    #[test]
    fn retrieve_is_deterministic() {
        let store = store();
        store.add("the cat sat on the mat", 1.0).unwrap();
        store.add("quarterly revenue grew 12 percent", 1.0).unwrap();

        let first = store.retrieve("cat on a mat", 1).unwrap();
        let second = store.retrieve("cat on a mat", 1).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], "the cat sat on the mat");
    }

    #[test]
    fn count_tracks_inserts() {
        let store = store();
        assert_eq!(store.count().unwrap(), 0);
        store.add("one", 1.0).unwrap();
        store.add("two", 1.0).unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn own_text_is_top_hit_for_enough_k() {
        let store = store();
        for i in 0..5 {
            store.add(&format!("filler memory number {i}"), 1.0).unwrap();
        }
        store.add("a very distinctive phrase about rust crates", 1.0).unwrap();

        let results = store
            .retrieve("a very distinctive phrase about rust crates", 3)
            .unwrap();
        assert!(results.contains(&"a very distinctive phrase about rust crates".to_string()));
    }
}
