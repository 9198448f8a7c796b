//! External-collaborator contracts (spec §6, §1 Non-goals)
//!
//! Concrete LLM vendor HTTP payloads and media-decoder glue are explicitly out of
//! scope; this module defines the trait boundary the rest of the engine programs
//! against instead, mirroring the teacher's pattern of keeping provider-specific
//! wire formats behind a narrow trait.

use serde::{Deserialize, Serialize};

use crate::model::CoarseType;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    #[error("provider timed out after {0}ms")]
    Timeout(u64),
    #[error("provider returned malformed output: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest {
    pub filename: String,
    pub keywords: Vec<String>,
    pub coarse_type: CoarseType,
    /// Candidate category paths already known to the taxonomy, offered as context.
    pub candidate_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResponse {
    pub category_path: Vec<String>,
    pub confidence: f32,
    pub rationale: Option<String>,
}

/// A source of categorization judgments: a local heuristic, a local model runtime,
/// or a cloud vendor. The router (C10) treats all of these uniformly.
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationResponse>;

    /// Cheap liveness probe used by the router's health-check loop. Default
    /// implementation assumes always healthy, appropriate for in-process providers.
    fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    LocalHeuristic,
    LocalModel,
    Cloud,
}

/// Coarse media-type probe: sniffs a file's true kind from content, not just its
/// extension (used to correct misleadingly-named files before keyword extraction).
/// The real decoder is out of scope; this is the narrow interface the engine needs.
pub trait MediaInspector: Send + Sync {
    fn inspect(&self, path: &std::path::Path) -> Result<CoarseType>;
}
