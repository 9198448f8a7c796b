//! Prototype Store (C5, spec §4.5)
//!
//! One L2-normalized centroid per category, EMA-updated on confirmation. Categories
//! can share the same centroid via a shared-prototype id (spec "Shared prototypes");
//! updates through any referring category are observed by all referrers.

#[cfg(feature = "vector-search")]
pub mod index;

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::embeddings::{cosine_similarity, l2_normalize, EMBEDDING_DIMENSIONS};
use crate::model::CategoryId;

pub type SharedPrototypeId = Uuid;

/// Default EMA decay parameter (spec §4.5: `α ∈ (0, 1]`).
pub const DEFAULT_ALPHA: f32 = 0.3;

#[derive(Debug, thiserror::Error)]
pub enum PrototypeError {
    #[error("prototype dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("invalid EMA decay parameter {0}: must be in (0, 1]")]
    InvalidAlpha(f32),
    #[error("no prototype registered for category {0}")]
    NotFound(CategoryId),
}

pub type Result<T> = std::result::Result<T, PrototypeError>;

#[derive(Debug, Clone)]
struct PrototypeEntry {
    centroid: Vec<f32>,
    sample_count: f64,
    last_update: DateTime<Utc>,
    alpha: f32,
}

/// Per-category EMA-updated centroid vectors, shared across categories that
/// reference the same underlying prototype.
pub struct PrototypeStore {
    prototypes: HashMap<SharedPrototypeId, PrototypeEntry>,
    category_to_prototype: HashMap<CategoryId, SharedPrototypeId>,
}

impl Default for PrototypeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PrototypeStore {
    pub fn new() -> Self {
        Self {
            prototypes: HashMap::new(),
            category_to_prototype: HashMap::new(),
        }
    }

    /// Ensure `category` has a backing prototype, creating a fresh (zero) one if
    /// needed, and return its shared-prototype id.
    pub fn ensure_category(&mut self, category: CategoryId) -> SharedPrototypeId {
        if let Some(&id) = self.category_to_prototype.get(&category) {
            return id;
        }
        let id = Uuid::new_v4();
        self.prototypes.insert(
            id,
            PrototypeEntry {
                centroid: vec![0.0; EMBEDDING_DIMENSIONS],
                sample_count: 0.0,
                last_update: Utc::now(),
                alpha: DEFAULT_ALPHA,
            },
        );
        self.category_to_prototype.insert(category, id);
        id
    }

    /// Make `category` reference the same centroid as `existing_category`
    /// (spec "Shared prototypes"). Creates a prototype for `existing_category` if it
    /// doesn't have one yet.
    pub fn share_with(&mut self, category: CategoryId, existing_category: CategoryId) -> SharedPrototypeId {
        let id = self.ensure_category(existing_category);
        self.category_to_prototype.insert(category, id);
        id
    }

    fn entry_mut(&mut self, category: CategoryId) -> Result<&mut PrototypeEntry> {
        let id = self
            .category_to_prototype
            .get(&category)
            .copied()
            .ok_or(PrototypeError::NotFound(category))?;
        self.prototypes
            .get_mut(&id)
            .ok_or(PrototypeError::NotFound(category))
    }

    /// EMA-update `category`'s centroid with `new_vector` at time `now`.
    /// `centroid ← L2normalize((1 − α) · centroid + α · new_vector)` (spec §4.5).
    /// Updates are applied in timestamp order by the caller for reproducibility
    /// (spec §5); this method itself is a pure function of its arguments.
    pub fn update(&mut self, category: CategoryId, new_vector: &[f32], now: DateTime<Utc>) -> Result<()> {
        if new_vector.len() != EMBEDDING_DIMENSIONS {
            return Err(PrototypeError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                got: new_vector.len(),
            });
        }
        self.ensure_category(category);
        let entry = self.entry_mut(category)?;
        if entry.alpha <= 0.0 || entry.alpha > 1.0 {
            return Err(PrototypeError::InvalidAlpha(entry.alpha));
        }

        let mut blended: Vec<f32> = entry
            .centroid
            .iter()
            .zip(new_vector.iter())
            .map(|(c, n)| (1.0 - entry.alpha) * c + entry.alpha * n)
            .collect();
        l2_normalize(&mut blended);
        entry.centroid = blended;
        entry.sample_count += 1.0;
        entry.last_update = now;
        Ok(())
    }

    pub fn set_alpha(&mut self, category: CategoryId, alpha: f32) -> Result<()> {
        if alpha <= 0.0 || alpha > 1.0 {
            return Err(PrototypeError::InvalidAlpha(alpha));
        }
        self.ensure_category(category);
        self.entry_mut(category)?.alpha = alpha;
        Ok(())
    }

    pub fn centroid(&self, category: CategoryId) -> Option<&[f32]> {
        let id = self.category_to_prototype.get(&category)?;
        self.prototypes.get(id).map(|e| e.centroid.as_slice())
    }

    pub fn sample_count(&self, category: CategoryId) -> Option<f64> {
        let id = self.category_to_prototype.get(&category)?;
        self.prototypes.get(id).map(|e| e.sample_count)
    }

    /// Top-k categories by cosine similarity to `query`, above `floor`.
    pub fn top_k(&self, query: &[f32], k: usize, floor: f32) -> Vec<(CategoryId, f32)> {
        let mut scored: Vec<(CategoryId, f32)> = self
            .category_to_prototype
            .iter()
            .filter_map(|(category, proto_id)| {
                let entry = self.prototypes.get(proto_id)?;
                if entry.centroid.iter().all(|x| *x == 0.0) {
                    return None;
                }
                let similarity = cosine_similarity(query, &entry.centroid);
                (similarity >= floor).then_some((*category, similarity))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Halve the sample count of every prototype not updated within
    /// `retention_window` of `now`. This is a decay *policy*, never a data loss
    /// (spec §4.5): the centroid itself is untouched.
    pub fn decay_stale(&mut self, now: DateTime<Utc>, retention_window: Duration) {
        for entry in self.prototypes.values_mut() {
            if now - entry.last_update > retention_window {
                entry.sample_count /= 2.0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let mut padded = vec![0.0; EMBEDDING_DIMENSIONS];
        for (i, x) in v.into_iter().enumerate() {
            padded[i] = x;
        }
        l2_normalize(&mut padded);
        padded
    }

    #[test]
    fn ema_update_keeps_unit_norm() {
        let mut store = PrototypeStore::new();
        let category = Uuid::new_v4();
        store.update(category, &unit(vec![1.0, 0.0, 0.0]), Utc::now()).unwrap();
        store.update(category, &unit(vec![0.0, 1.0, 0.0]), Utc::now()).unwrap();
        let centroid = store.centroid(category).unwrap();
        let norm: f32 = centroid.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-6);
    }

    #[test]
    fn shared_prototypes_observe_each_others_updates() {
        let mut store = PrototypeStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.ensure_category(a);
        store.share_with(b, a);
        store.update(a, &unit(vec![1.0, 0.0]), Utc::now()).unwrap();
        assert_eq!(store.centroid(a), store.centroid(b));
    }

    #[test]
    fn top_k_respects_floor_and_order() {
        let mut store = PrototypeStore::new();
        let sales = Uuid::new_v4();
        let recipes = Uuid::new_v4();
        store.update(sales, &unit(vec![1.0, 0.0]), Utc::now()).unwrap();
        store.update(recipes, &unit(vec![0.0, 1.0]), Utc::now()).unwrap();
        let results = store.top_k(&unit(vec![0.9, 0.1]), 2, 0.5);
        assert_eq!(results[0].0, sales);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn decay_halves_sample_count_for_stale_entries_only() {
        let mut store = PrototypeStore::new();
        let category = Uuid::new_v4();
        let now = Utc::now();
        store.update(category, &unit(vec![1.0, 0.0]), now - Duration::days(100)).unwrap();
        store.decay_stale(now, Duration::days(30));
        assert_eq!(store.sample_count(category), Some(0.5));
    }
}
