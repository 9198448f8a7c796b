//! Scenario: correcting a misfiled suggestion teaches the knowledge graph a
//! keyword → category association that benefits a second, unrelated file
//! sharing that keyword.

use chrono::Utc;

use sortai_core::categorization::phase1::{run_phase1, Phase1Input, Phase1Outcome};
use sortai_core::model::ConfidenceBands;
use sortai_core::{keywords, EmbeddingService};
use sortai_e2e_tests::harness::TestWorkspace;
use sortai_e2e_tests::mocks::fixtures::FixtureFactory;

fn phase1_confidence(workspace: &TestWorkspace, file_name: &str, bands: &ConfidenceBands) -> f32 {
    let extracted = keywords::extract(file_name);
    let embedding = workspace.embeddings.embed_filename(&extracted.tokens);
    let input = Phase1Input {
        file_id: uuid::Uuid::new_v4(),
        extracted: &extracted,
        embedding: &embedding,
        parent_folder_name: None,
    };
    match run_phase1(&input, &workspace.prototypes, &workspace.graph, |c| workspace.leaf_name(c), bands) {
        Phase1Outcome::Assigned(assignment) => assignment.confidence,
        Phase1Outcome::NeedsClustering(_) => 0.0,
    }
}

#[test]
fn correcting_one_file_raises_confidence_for_a_keyword_sibling() {
    let mut workspace = TestWorkspace::new();
    let bands = ConfidenceBands::default();

    let finance = workspace.seed_category(&["Work", "Finance"], "budget finance money spreadsheet");
    let misc = workspace.seed_category(&["Work", "Misc"], "miscellaneous uncategorized");

    let (first, second) = FixtureFactory::write_correction_pair(&workspace);

    let confidence_before = phase1_confidence(&workspace, &first.relative_path, &bands);
    let sibling_confidence_before = phase1_confidence(&workspace, &second.relative_path, &bands);

    let extracted = keywords::extract(&first.relative_path);
    let embedding = workspace.embeddings.embed_filename(&extracted.tokens);
    let keyword_list: Vec<String> = extracted.keywords.iter().cloned().collect();

    let item_id = workspace.feedback.enqueue(
        uuid::Uuid::new_v4(),
        misc,
        confidence_before.max(0.2),
        "initially misfiled under Misc",
        keyword_list,
        Utc::now(),
    );

    workspace
        .feedback
        .correct(item_id, finance, &embedding, &mut workspace.prototypes, &mut workspace.graph, Utc::now())
        .expect("correction should succeed");

    let sibling_confidence_after = phase1_confidence(&workspace, &second.relative_path, &bands);

    assert!(
        sibling_confidence_after > sibling_confidence_before,
        "expected keyword-graph evidence to raise the sibling's confidence: before={sibling_confidence_before}, after={sibling_confidence_after}"
    );
}
