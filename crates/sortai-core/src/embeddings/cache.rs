//! Content-addressed embedding cache (spec §4.2, §5).

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Deterministic FNV-1a hash of `text`, as a fixed-width hex string. `std`'s default
/// `HashMap` hasher is randomized per process and unsuitable for a cache key that must
/// be stable across runs, so this is hand-rolled rather than reaching for `Hash`.
pub fn content_hash(text: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET;
    for byte in text.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// A content-addressed embedding cache keyed by `(text hash, model id)`.
pub trait EmbeddingCache: Send + Sync {
    fn get(&self, text_hash: &str, model_id: &str) -> Option<Vec<f32>>;
    fn put(&self, text_hash: &str, model_id: &str, vector: &[f32]);
}

fn composite_key(text_hash: &str, model_id: &str) -> String {
    format!("{model_id}:{text_hash}")
}

/// Pure in-memory LRU cache. Used standalone in tests and as the fast front layer in
/// front of a persisted backend (spec §5: "single-writer semantics per key").
pub struct InMemoryEmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
}

impl InMemoryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EmbeddingCache for InMemoryEmbeddingCache {
    fn get(&self, text_hash: &str, model_id: &str) -> Option<Vec<f32>> {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .get(&composite_key(text_hash, model_id))
            .cloned()
    }

    fn put(&self, text_hash: &str, model_id: &str, vector: &[f32]) {
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .put(composite_key(text_hash, model_id), vector.to_vec());
    }
}
