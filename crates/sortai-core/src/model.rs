//! Shared data model (spec §3)
//!
//! Types referenced by more than one component live here so that ownership of the
//! *behavior* around them can stay with their respective component while the shape
//! itself is not duplicated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Coarse type hint derived from a file extension (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoarseType {
    Document,
    Image,
    Video,
    Audio,
    Archive,
    #[default]
    Other,
}

impl CoarseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoarseType::Document => "document",
            CoarseType::Image => "image",
            CoarseType::Video => "video",
            CoarseType::Audio => "audio",
            CoarseType::Archive => "archive",
            CoarseType::Other => "other",
        }
    }

    /// Classify by (lowercased, no-dot) extension. Pure and deterministic.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" | "doc" | "docx" | "txt" | "md" | "rtf" | "odt" | "pages" | "xls" | "xlsx"
            | "csv" | "ppt" | "pptx" | "key" => CoarseType::Document,
            "jpg" | "jpeg" | "png" | "gif" | "heic" | "bmp" | "tiff" | "webp" | "svg" | "raw" => {
                CoarseType::Image
            }
            "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" | "wmv" => CoarseType::Video,
            "mp3" | "wav" | "flac" | "aac" | "m4a" | "ogg" | "wma" => CoarseType::Audio,
            "zip" | "tar" | "gz" | "rar" | "7z" | "bz2" | "xz" => CoarseType::Archive,
            _ => CoarseType::Other,
        }
    }
}

/// Stable identity assigned to every scanned file (spec §3 "File record").
pub type FileId = uuid::Uuid;
/// Stable identity assigned to every taxonomy node (spec §3 "Taxonomy tree").
pub type CategoryId = uuid::Uuid;

/// Extracted signals produced by the (out-of-scope) media inspector, if any.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSignals {
    pub textual_cue: Option<String>,
    pub scene_tags: Vec<String>,
    pub detected_objects: Vec<String>,
    pub language: Option<String>,
    pub page_count: Option<u32>,
    pub word_count: Option<u32>,
    pub frame_count: Option<u32>,
    pub duration_secs: Option<f64>,
}

/// A single scanned file. Mutated only during extraction (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: FileId,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub coarse_type: CoarseType,
    pub signals: Option<ExtractedSignals>,
}

impl FileRecord {
    pub fn new(path: PathBuf, size: u64, modified_at: DateTime<Utc>) -> Self {
        let coarse_type = path
            .extension()
            .and_then(|e| e.to_str())
            .map(CoarseType::from_extension)
            .unwrap_or_default();
        Self {
            id: uuid::Uuid::new_v4(),
            path,
            size,
            modified_at,
            content_hash: None,
            coarse_type,
            signals: None,
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A sub-folder treated as an atomic move unit (spec §3 "Scanned folder").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannedFolder {
    pub path: PathBuf,
    pub files: Vec<FileId>,
    pub aggregate_size: u64,
    pub dominant_type: CoarseType,
}

/// Where a file assignment came from (spec §3 "File assignment").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentSource {
    Phase1,
    Phase2,
    User,
    Learned,
}

/// A proposed or committed mapping of a file onto a taxonomy category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAssignment {
    pub file_id: FileId,
    pub category_id: CategoryId,
    pub confidence: f32,
    pub rationale: String,
    pub source: AssignmentSource,
    pub decided_at: DateTime<Utc>,
}

/// Confidence bands (spec §4.11). Centralized so every component agrees on the cuts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceBands {
    pub auto_accept: f32,
    pub review: f32,
    pub escalate: f32,
}

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            auto_accept: 0.85,
            review: 0.5,
            escalate: 0.5,
        }
    }
}

impl ConfidenceBands {
    pub fn is_auto_accept(&self, confidence: f32) -> bool {
        confidence >= self.auto_accept
    }

    pub fn is_review(&self, confidence: f32) -> bool {
        confidence >= self.review && confidence < self.auto_accept
    }

    pub fn is_escalate(&self, confidence: f32) -> bool {
        confidence < self.escalate
    }
}

/// Clamp a blended confidence score into `[0, 1]`.
pub fn clamp_confidence(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}
