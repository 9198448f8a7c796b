//! HNSW-backed nearest-prototype index (optional `vector-search` feature).
//!
//! [`PrototypeStore::top_k`] does a brute-force cosine scan, which is the right
//! default for the handful-to-low-hundreds of categories a taxonomy typically has.
//! This index exists for installations with unusually large, flat taxonomies where
//! an approximate index pays for itself — grounded on the teacher's
//! `search::vector::VectorIndex` wrapper around USearch.

use std::collections::HashMap;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::embeddings::EMBEDDING_DIMENSIONS;
use crate::model::CategoryId;

#[derive(Debug, thiserror::Error)]
pub enum PrototypeIndexError {
    #[error("index creation failed: {0}")]
    Creation(String),
    #[error("index operation failed: {0}")]
    Operation(String),
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, PrototypeIndexError>;

/// Approximate nearest-neighbor index over category prototype centroids.
pub struct PrototypeIndex {
    index: Index,
    category_to_key: HashMap<CategoryId, u64>,
    key_to_category: HashMap<u64, CategoryId>,
    next_key: u64,
}

impl PrototypeIndex {
    pub fn new() -> Result<Self> {
        let options = IndexOptions {
            dimensions: EMBEDDING_DIMENSIONS,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            multi: false,
        };
        let index = Index::new(&options).map_err(|e| PrototypeIndexError::Creation(e.to_string()))?;
        index
            .reserve(64)
            .map_err(|e| PrototypeIndexError::Creation(e.to_string()))?;
        Ok(Self {
            index,
            category_to_key: HashMap::new(),
            key_to_category: HashMap::new(),
            next_key: 0,
        })
    }

    pub fn upsert(&mut self, category: CategoryId, centroid: &[f32]) -> Result<()> {
        if centroid.len() != EMBEDDING_DIMENSIONS {
            return Err(PrototypeIndexError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                got: centroid.len(),
            });
        }
        if let Some(&key) = self.category_to_key.get(&category) {
            self.index
                .remove(key)
                .map_err(|e| PrototypeIndexError::Operation(e.to_string()))?;
            self.index
                .add(key, centroid)
                .map_err(|e| PrototypeIndexError::Operation(e.to_string()))?;
            return Ok(());
        }

        if self.index.size() >= self.index.capacity() {
            let new_capacity = (self.index.capacity() * 2).max(64);
            self.index
                .reserve(new_capacity)
                .map_err(|e| PrototypeIndexError::Operation(e.to_string()))?;
        }

        let key = self.next_key;
        self.next_key += 1;
        self.index
            .add(key, centroid)
            .map_err(|e| PrototypeIndexError::Operation(e.to_string()))?;
        self.category_to_key.insert(category, key);
        self.key_to_category.insert(key, category);
        Ok(())
    }

    pub fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(CategoryId, f32)>> {
        if query.len() != EMBEDDING_DIMENSIONS {
            return Err(PrototypeIndexError::DimensionMismatch {
                expected: EMBEDDING_DIMENSIONS,
                got: query.len(),
            });
        }
        if self.index.size() == 0 {
            return Ok(Vec::new());
        }
        let matches = self
            .index
            .search(query, limit)
            .map_err(|e| PrototypeIndexError::Operation(e.to_string()))?;
        Ok(matches
            .keys
            .iter()
            .zip(matches.distances.iter())
            .filter_map(|(key, distance)| {
                self.key_to_category.get(key).map(|c| (*c, 1.0 - *distance))
            })
            .collect())
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
