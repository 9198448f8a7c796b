//! Portable archive export/import (spec §6 "Exported portable archive format")
//!
//! A versioned JSON document capturing the knowledge graph, learned prototypes,
//! and summary statistics, with optional gzip framing on top of the JSON bytes.
//! Export then import into an empty store reproduces the graph modulo
//! autogenerated ids (spec §8).

use std::io::{Read, Write};

use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::graph::{Entity, Relationship};
use crate::model::CategoryId;

pub const ARCHIVE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported archive version {0}, expected {ARCHIVE_VERSION}")]
    UnsupportedVersion(u32),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// A learned prototype centroid, base64-encoded for JSON portability (spec
/// "patterns[with base64 embeddings]").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternRecord {
    pub category_id: CategoryId,
    pub embedding_base64: String,
    pub sample_count: f64,
    pub last_update: DateTime<Utc>,
}

impl PatternRecord {
    pub fn from_centroid(category_id: CategoryId, centroid: &[f32], sample_count: f64, last_update: DateTime<Utc>) -> Self {
        let bytes: Vec<u8> = centroid.iter().flat_map(|f| f.to_le_bytes()).collect();
        Self {
            category_id,
            embedding_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            sample_count,
            last_update,
        }
    }

    pub fn decode_centroid(&self) -> Result<Vec<f32>> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(&self.embedding_base64)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStatistics {
    pub entity_count: usize,
    pub relationship_count: usize,
    pub pattern_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub patterns: Vec<PatternRecord>,
    pub statistics: ArchiveStatistics,
}

impl Archive {
    pub fn new(entities: Vec<Entity>, relationships: Vec<Relationship>, patterns: Vec<PatternRecord>, exported_at: DateTime<Utc>) -> Self {
        let statistics = ArchiveStatistics {
            entity_count: entities.len(),
            relationship_count: relationships.len(),
            pattern_count: patterns.len(),
        };
        Self {
            version: ARCHIVE_VERSION,
            exported_at,
            entities,
            relationships,
            patterns,
            statistics,
        }
    }

    /// Serialize to JSON bytes, optionally gzip-framed.
    pub fn to_bytes(&self, gzip: bool) -> Result<Vec<u8>> {
        let json = serde_json::to_vec_pretty(self)?;
        if !gzip {
            return Ok(json);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json)?;
        Ok(encoder.finish()?)
    }

    /// Deserialize from bytes, auto-detecting gzip framing via the magic number.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let is_gzip = bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b;
        let json = if is_gzip {
            let mut decoder = GzDecoder::new(bytes);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            out
        } else {
            bytes.to_vec()
        };
        let archive: Self = serde_json::from_slice(&json)?;
        if archive.version != ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion(archive.version));
        }
        Ok(archive)
    }
}
