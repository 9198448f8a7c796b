//! Embedding Service (C2, spec §4.2)
//!
//! `embed_text` / `embed_filename` are exposed behind the [`EmbeddingService`] trait so
//! that local word-averaging, n-gram, and provider-backed implementations are
//! interchangeable (spec §4.2). A content-addressed cache keyed by `(text hash, model
//! id)` sits in front of any implementation and is the single place recomputation is
//! avoided.

mod cache;
mod local;

pub use cache::{content_hash, EmbeddingCache, InMemoryEmbeddingCache};
pub use local::LocalEmbeddingService;

use std::sync::Arc;

/// Fixed output dimension for every embedding produced by this crate.
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Tolerance for the unit-norm invariant (spec §4.2: "magnitude = 1 ± 1e-6").
pub const NORM_TOLERANCE: f32 = 1e-6;

/// A source of fixed-dimension, unit-norm (or zero) embedding vectors.
pub trait EmbeddingService: Send + Sync {
    /// Stable identifier for the model/algorithm, used as part of the cache key.
    fn model_id(&self) -> &str;

    /// Embed arbitrary text. Returns the zero vector iff `text` is empty (spec §4.2).
    fn embed_text(&self, text: &str) -> Vec<f32>;

    /// Embed a filename already split into keyword tokens.
    fn embed_filename(&self, tokens: &[String]) -> Vec<f32> {
        self.embed_text(&tokens.join(" "))
    }
}

/// L2-normalize `v` in place. No-op on the zero vector.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// True iff `v` is the zero vector.
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// True iff `v` satisfies the unit-norm invariant or is exactly zero.
pub fn is_valid_embedding(v: &[f32]) -> bool {
    if is_zero_vector(v) {
        return true;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (norm - 1.0).abs() <= NORM_TOLERANCE.max(1e-4)
}

/// Cosine similarity between two unit vectors (dot product). Callers are expected to
/// pass normalized vectors; this does not re-normalize.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Wraps an [`EmbeddingService`] with a read-through, content-addressed cache
/// (spec §4.2, §5 "embedding cache is a read-through cache with single-writer
/// semantics per key"). The cache is never populated with the zero vector (spec §8
/// "embedding of empty string ... is never added to the cache").
pub struct CachingEmbeddingService<S: EmbeddingService> {
    inner: S,
    cache: Arc<dyn EmbeddingCache>,
}

impl<S: EmbeddingService> CachingEmbeddingService<S> {
    pub fn new(inner: S, cache: Arc<dyn EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    fn embed_cached(&self, text: &str) -> Vec<f32> {
        if text.is_empty() {
            return vec![0.0; EMBEDDING_DIMENSIONS];
        }
        let key = content_hash(text);
        let model_id = self.inner.model_id();
        if let Some(cached) = self.cache.get(&key, model_id) {
            return cached;
        }
        let vector = self.inner.embed_text(text);
        if !is_zero_vector(&vector) {
            self.cache.put(&key, model_id, &vector);
        }
        vector
    }
}

impl<S: EmbeddingService> EmbeddingService for CachingEmbeddingService<S> {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        self.embed_cached(text)
    }

    fn embed_filename(&self, tokens: &[String]) -> Vec<f32> {
        self.embed_cached(&tokens.join(" "))
    }
}
