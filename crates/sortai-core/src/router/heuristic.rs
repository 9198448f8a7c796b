//! Always-available local heuristic provider (spec §4.10 "at least one provider is
//! always available").
//!
//! Scores each candidate category path by keyword overlap and picks the best
//! match, capped at [`HEURISTIC_CONFIDENCE_CAP`] since it has no semantic
//! understanding beyond token overlap.

use crate::external::{ClassificationRequest, ClassificationResponse, LlmProvider, ProviderKind, Result};

/// The heuristic provider never reports a confidence above this (spec §4.10).
pub const HEURISTIC_CONFIDENCE_CAP: f32 = 0.85;

pub struct HeuristicProvider;

impl Default for HeuristicProvider {
    fn default() -> Self {
        Self
    }
}

fn path_tokens(path: &str) -> Vec<String> {
    path.split(['/', '_', '-', ' '])
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_lowercase())
        .collect()
}

impl LlmProvider for HeuristicProvider {
    fn id(&self) -> &str {
        "local-heuristic"
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalHeuristic
    }

    fn classify(&self, request: &ClassificationRequest) -> Result<ClassificationResponse> {
        let keywords: Vec<String> = request.keywords.iter().map(|k| k.to_ascii_lowercase()).collect();

        let mut best: Option<(&str, usize)> = None;
        for candidate in &request.candidate_paths {
            let tokens = path_tokens(candidate);
            let overlap = tokens.iter().filter(|t| keywords.contains(t)).count();
            if best.is_none_or(|(_, best_overlap)| overlap > best_overlap) {
                best = Some((candidate.as_str(), overlap));
            }
        }

        let (path, overlap) = match best {
            Some(found) if found.1 > 0 => found,
            _ => {
                let fallback = request.coarse_type.as_str().to_string();
                return Ok(ClassificationResponse {
                    category_path: vec![fallback],
                    confidence: 0.3,
                    rationale: Some("no keyword overlap with any candidate path".to_string()),
                });
            }
        };

        let confidence = (0.4 + 0.15 * overlap as f32).min(HEURISTIC_CONFIDENCE_CAP);
        Ok(ClassificationResponse {
            category_path: path.split('/').map(str::to_string).collect(),
            confidence,
            rationale: Some(format!("{overlap} keyword(s) matched category path")),
        })
    }
}
