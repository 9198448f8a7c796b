//! Mock LLM providers
//!
//! In-process stand-ins for the out-of-scope cloud/local-model vendors, so the
//! router's cascade-on-failure behavior can be exercised without a network
//! call.

use sortai_core::{ClassificationRequest, ClassificationResponse, LlmProvider, ProviderError, ProviderKind};

/// A provider that always fails, used to force the router to move on to the
/// next candidate.
pub struct AlwaysFailsProvider {
    id: String,
}

impl AlwaysFailsProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl LlmProvider for AlwaysFailsProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    fn classify(&self, _request: &ClassificationRequest) -> std::result::Result<ClassificationResponse, ProviderError> {
        Err(ProviderError::Unavailable(format!("{} is down", self.id)))
    }

    fn health_check(&self) -> std::result::Result<(), ProviderError> {
        Err(ProviderError::Unavailable(format!("{} is down", self.id)))
    }
}

/// A provider that always succeeds with a fixed response, regardless of the
/// request it's given.
pub struct FixedResponseProvider {
    id: String,
    kind: ProviderKind,
    category_path: Vec<String>,
    confidence: f32,
}

impl FixedResponseProvider {
    pub fn new(id: impl Into<String>, kind: ProviderKind, category_path: Vec<String>, confidence: f32) -> Self {
        Self {
            id: id.into(),
            kind,
            category_path,
            confidence,
        }
    }
}

impl LlmProvider for FixedResponseProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn classify(&self, _request: &ClassificationRequest) -> std::result::Result<ClassificationResponse, ProviderError> {
        Ok(ClassificationResponse {
            category_path: self.category_path.clone(),
            confidence: self.confidence,
            rationale: Some(format!("fixed response from {}", self.id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> ClassificationRequest {
        ClassificationRequest {
            filename: "test.pdf".to_string(),
            keywords: vec!["test".to_string()],
            coarse_type: sortai_core::CoarseType::Document,
            candidate_paths: vec!["Work".to_string()],
        }
    }

    #[test]
    fn always_fails_provider_errors_on_classify_and_health_check() {
        let provider = AlwaysFailsProvider::new("flaky-cloud");
        assert!(provider.classify(&sample_request()).is_err());
        assert!(provider.health_check().is_err());
    }

    #[test]
    fn fixed_response_provider_returns_configured_confidence() {
        let provider = FixedResponseProvider::new("reliable-cloud", ProviderKind::Cloud, vec!["Work".to_string()], 0.88);
        let response = provider.classify(&sample_request()).unwrap();
        assert_eq!(response.confidence, 0.88);
        assert_eq!(response.category_path, vec!["Work".to_string()]);
    }
}
