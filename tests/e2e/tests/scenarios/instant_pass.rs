//! Scenario: an already-trained taxonomy confidently files most of a small,
//! unambiguous batch on the very first pass, with no clustering or LLM
//! escalation needed.

use sortai_core::categorization::phase1::{run_phase1, Phase1Input, Phase1Outcome};
use sortai_core::categorization::{route_assignment, RoutingDecision};
use sortai_core::model::ConfidenceBands;
use sortai_core::{keywords, scan, EmbeddingService, ScanConfig};
use sortai_e2e_tests::harness::TestWorkspace;
use sortai_e2e_tests::mocks::fixtures::FixtureFactory;

#[test]
fn at_least_four_of_five_files_are_confidently_assigned() {
    let mut workspace = TestWorkspace::new();

    workspace.seed_category(&["Work", "Finance"], "invoice receipt acme payment billing");
    workspace.seed_category(&["Work", "HR"], "employee handbook policy update hr");
    workspace.seed_category(&["Personal", "Photos"], "beach sunset vacation hawaii photo");

    FixtureFactory::write_instant_pass_set(&workspace);

    let scanned = scan(workspace.path(), &ScanConfig::default()).expect("scan should succeed");
    assert_eq!(scanned.files.len(), 5);

    let bands = ConfidenceBands::default();
    let mut confidently_assigned = 0;

    for file in &scanned.files {
        let extracted = keywords::extract(&file.file_name());
        let embedding = workspace.embeddings.embed_filename(&extracted.tokens);

        let input = Phase1Input {
            file_id: file.id,
            extracted: &extracted,
            embedding: &embedding,
            parent_folder_name: None,
        };

        let outcome = run_phase1(
            &input,
            &workspace.prototypes,
            &workspace.graph,
            |category| workspace.leaf_name(category),
            &bands,
        );

        if let Phase1Outcome::Assigned(assignment) = outcome {
            if route_assignment(&assignment, &bands) == RoutingDecision::AutoAccept {
                confidently_assigned += 1;
            }
        }
    }

    assert!(
        confidently_assigned >= 4,
        "expected at least 4 of 5 files to auto-accept, got {confidently_assigned}"
    );
}
