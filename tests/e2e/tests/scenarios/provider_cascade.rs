//! Scenario: under `automatic` preference, a successful-but-low-confidence
//! response doesn't end the cascade. The router keeps trying subsequent
//! candidates and returns the best result across the whole set (spec §4.10,
//! §8 scenario 4). A provider that fails outright is skipped the same way.

use chrono::Utc;

use sortai_core::{ClassificationRequest, CoarseType, LlmRouter, ProviderKind};
use sortai_e2e_tests::mocks::providers::{AlwaysFailsProvider, FixedResponseProvider};

fn request() -> ClassificationRequest {
    ClassificationRequest {
        filename: "invoice_acme.pdf".to_string(),
        keywords: vec!["invoice".to_string(), "acme".to_string()],
        coarse_type: CoarseType::Document,
        candidate_paths: vec!["Work/Finance".to_string()],
    }
}

#[test]
fn low_confidence_success_escalates_to_the_next_candidate_and_returns_the_best() {
    let mut router = LlmRouter::new(Default::default(), 0.5);
    router.register(Box::new(FixedResponseProvider::new(
        "weak-cloud",
        ProviderKind::Cloud,
        vec!["Work".to_string()],
        0.42,
    )));
    router.register(Box::new(FixedResponseProvider::new(
        "reliable-cloud",
        ProviderKind::Cloud,
        vec!["Work".to_string(), "Finance".to_string()],
        0.88,
    )));

    let outcome = router.route(&request(), Utc::now()).expect("routing should succeed");

    assert_eq!(outcome.provider_id, "reliable-cloud");
    assert_eq!(outcome.response.confidence, 0.88);
    assert!(
        outcome.escalated_from.contains(&"weak-cloud".to_string()),
        "expected the low-confidence provider to be recorded as escalated past, got {:?}",
        outcome.escalated_from
    );
}

#[test]
fn router_escalates_past_a_failed_provider_to_a_successful_one() {
    let mut router = LlmRouter::new(Default::default(), 0.5);
    router.register(Box::new(AlwaysFailsProvider::new("flaky-cloud")));
    router.register(Box::new(FixedResponseProvider::new(
        "reliable-cloud",
        ProviderKind::Cloud,
        vec!["Work".to_string(), "Finance".to_string()],
        0.88,
    )));

    let outcome = router.route(&request(), Utc::now()).expect("routing should succeed on the second provider");

    assert_eq!(outcome.provider_id, "reliable-cloud");
    assert_eq!(outcome.response.confidence, 0.88);
    assert!(
        outcome.escalated_from.contains(&"flaky-cloud".to_string()),
        "expected escalation record to include the failed provider, got {:?}",
        outcome.escalated_from
    );
}

#[test]
fn router_falls_through_to_the_heuristic_when_every_registered_provider_fails() {
    let mut router = LlmRouter::new(Default::default(), 0.5);
    router.register(Box::new(AlwaysFailsProvider::new("flaky-cloud")));
    router.register(Box::new(AlwaysFailsProvider::new("flaky-local-model")));

    let request = ClassificationRequest {
        filename: "tutorial_python_decorators.mp4".to_string(),
        keywords: vec!["tutorial".to_string(), "python".to_string(), "decorators".to_string()],
        coarse_type: CoarseType::Video,
        candidate_paths: vec!["Learning/Python".to_string()],
    };

    let outcome = router.route(&request, Utc::now()).expect("the always-registered heuristic should still answer");
    assert_ne!(outcome.provider_id, "flaky-cloud");
    assert_ne!(outcome.provider_id, "flaky-local-model");
    assert_eq!(outcome.escalated_from.len(), 2);
}

#[test]
fn non_automatic_preference_stops_at_the_first_success_even_if_low_confidence() {
    let mut router = LlmRouter::new(sortai_core::LlmPreference::LocalOnly, 0.5);
    router.register(Box::new(FixedResponseProvider::new(
        "weak-local-model",
        ProviderKind::LocalModel,
        vec!["Work".to_string()],
        0.42,
    )));

    let outcome = router.route(&request(), Utc::now()).expect("routing should succeed");

    assert_eq!(outcome.provider_id, "weak-local-model");
    assert_eq!(outcome.response.confidence, 0.42);
}
