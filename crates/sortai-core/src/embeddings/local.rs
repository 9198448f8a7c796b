//! Local word-averaging embedding backend.
//!
//! No ML runtime, no network call: every token is hashed into a small number of
//! buckets across the output dimensions (a feature-hashing / "hashing trick"
//! embedding, the same family of technique the teacher's `model2vec`-style static
//! embeddings belong to) and the per-token vectors are averaged and re-normalized.
//! This is the default [`super::EmbeddingService`]; a provider-backed implementation
//! can be substituted without any caller-visible change (spec §4.2).

use super::{l2_normalize, EmbeddingService, EMBEDDING_DIMENSIONS};

/// Number of hashed projections summed per token; higher spreads a token's signal
/// across more dimensions and reduces collision noise.
const PROJECTIONS_PER_TOKEN: usize = 4;

fn fnv1a(bytes: &[u8], seed: u64) -> u64 {
    let mut hash = 0xcbf29ce484222325u64 ^ seed;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// Local, deterministic, hashing-trick word-averaging embedder.
pub struct LocalEmbeddingService {
    model_id: String,
}

impl Default for LocalEmbeddingService {
    fn default() -> Self {
        Self {
            model_id: "local-hashing-v1".to_string(),
        }
    }
}

impl LocalEmbeddingService {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }

    fn embed_token(&self, token: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; EMBEDDING_DIMENSIONS];
        for seed in 0..PROJECTIONS_PER_TOKEN as u64 {
            let hash = fnv1a(token.as_bytes(), seed);
            let bucket = (hash % EMBEDDING_DIMENSIONS as u64) as usize;
            // Use another bit of the hash to pick a sign, spreading mass across +/-.
            let sign = if hash & 0x1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        v
    }
}

impl EmbeddingService for LocalEmbeddingService {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec![0.0; EMBEDDING_DIMENSIONS];
        }

        let mut acc = vec![0.0f32; EMBEDDING_DIMENSIONS];
        for token in &tokens {
            let token_vec = self.embed_token(token);
            for (a, t) in acc.iter_mut().zip(token_vec.iter()) {
                *a += t;
            }
        }
        for x in acc.iter_mut() {
            *x /= tokens.len() as f32;
        }
        l2_normalize(&mut acc);
        acc
    }
}
