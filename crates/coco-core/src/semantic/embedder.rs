//! Embedders for the Semantic Store.
//!
//! `HashEmbedder` is the default: a deterministic, hash-based
//! bag-of-bigram-features embedding that needs no model download and is
//! sufficient for the retrieval quality the engine depends on.
//! `LocalModelEmbedder` is the upgrade path to a real embedding service,
//! gated behind the `embeddings` feature so the default build stays
//! dependency-light.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

/// Anything that can turn text into a fixed-length dense vector. The
/// dimensionality must stay constant within a deployment.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimensions(&self) -> usize;
}

/// Deterministic hash-based bag-of-bigram-features embedder.
///
/// Tokenizes on whitespace/punctuation, forms adjacent token bigrams, and
/// hashes each bigram into one of `dimensions` buckets with a sign chosen
/// by a second hash bit (a small feature-hashing trick that reduces
/// collision bias versus summing into one sign). Unigrams are also hashed
/// in (halved weight) so single-word queries still retrieve something.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    fn hash_feature(&self, feature: &str, vector: &mut [f32], weight: f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let bucket = (h as usize) % self.dimensions;
        let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let tokens = Self::tokenize(text);
        let mut vector = vec![0.0_f32; self.dimensions];

        for token in &tokens {
            self.hash_feature(token, &mut vector, 0.5);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.hash_feature(&bigram, &mut vector, 1.0);
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Wraps any `Embedder` with an LRU cache keyed on the raw text. The
/// query side of retrieval re-embeds the same handful of recent queries
/// across a session; caching avoids re-hashing (or, under the
/// `embeddings` feature, re-running a model) on every repeat.
pub struct CachingEmbedder<E: Embedder> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    pub fn new(inner: E, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl<E: Embedder> Embedder for CachingEmbedder<E> {
    fn embed(&self, text: &str) -> Vec<f32> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(text) {
                return hit.clone();
            }
            let vector = self.inner.embed(text);
            cache.put(text.to_string(), vector.clone());
            return vector;
        }
        self.inner.embed(text)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Cosine similarity between two equal-length vectors. Returns 0.0 on a
/// dimension mismatch or zero-magnitude vector rather than panicking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Local ONNX-backed embedding model (nomic-embed-text-v1.5), an upgrade
/// path for deployments that want real semantic similarity. Feature-gated:
/// most deployments are well served by `HashEmbedder` and shouldn't pay
/// for a model download.
#[cfg(feature = "embeddings")]
pub mod local_model {
    use super::Embedder;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::sync::{Mutex, OnceLock};

    pub const EMBEDDING_DIMENSIONS: usize = 256;

    static MODEL: OnceLock<std::result::Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

    fn get_model() -> std::result::Result<std::sync::MutexGuard<'static, TextEmbedding>, String> {
        let result = MODEL.get_or_init(|| {
            let cache_dir = directories::ProjectDirs::from("dev", "coco", "agent")
                .map(|d| d.cache_dir().join("fastembed"))
                .unwrap_or_else(|| std::path::PathBuf::from(".fastembed_cache"));
            let _ = std::fs::create_dir_all(&cache_dir);

            let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
                .with_cache_dir(cache_dir);

            TextEmbedding::try_new(options)
                .map(Mutex::new)
                .map_err(|e| format!("failed to initialize embedding model: {e}"))
        });

        match result {
            Ok(model) => model
                .lock()
                .map_err(|_| "embedding model mutex poisoned".to_string()),
            Err(e) => Err(e.clone()),
        }
    }

    /// Embedder backed by a local ONNX model. Falls back to a zero
    /// vector (logged) if the model failed to initialize, so a download
    /// failure degrades gracefully rather than panicking mid-turn.
    pub struct LocalModelEmbedder;

    impl Embedder for LocalModelEmbedder {
        fn embed(&self, text: &str) -> Vec<f32> {
            match get_model() {
                Ok(mut model) => match model.embed(vec![text], None) {
                    Ok(mut vectors) => vectors.pop().unwrap_or_else(|| vec![0.0; EMBEDDING_DIMENSIONS]),
                    Err(e) => {
                        tracing::warn!("embedding generation failed: {e}");
                        vec![0.0; EMBEDDING_DIMENSIONS]
                    }
                },
                Err(e) => {
                    tracing::warn!("embedding model unavailable: {e}");
                    vec![0.0; EMBEDDING_DIMENSIONS]
                }
            }
        }

        fn dimensions(&self) -> usize {
            EMBEDDING_DIMENSIONS
        }
    }
}
