//! Scenario: a batch with no taxonomic history at all — nothing for Phase 1 to
//! match against — must not all collapse into one bare coarse-type bucket.
//! The similarity clusterer groups files by shared keywords, and the
//! embedding clusterer further splits clusters large enough to be worth it.
//! A file sharing nothing with anyone else lands in a dedicated "Other"
//! bucket rather than the largest unrelated cluster.

use std::collections::{BTreeSet, HashMap};

use sortai_core::categorization::phase1::{run_phase1, Phase1Input, Phase1Outcome};
use sortai_core::model::ConfidenceBands;
use sortai_core::similarity::{cluster, ClusterConfig, ClusterRecord};
use sortai_core::{keywords, EmbeddingService, FileId};
use sortai_e2e_tests::harness::TestWorkspace;
use sortai_e2e_tests::mocks::fixtures::FixtureFactory;

#[test]
fn an_empty_taxonomy_routes_every_file_through_the_clusterer() {
    let workspace = TestWorkspace::new();
    let files = FixtureFactory::write_unclustered_batch(&workspace);
    let bands = ConfidenceBands::default();

    let mut records = Vec::new();
    let mut names_by_id: HashMap<FileId, &str> = HashMap::new();

    for file in &files {
        let extracted = keywords::extract(&file.relative_path);
        let embedding = workspace.embeddings.embed_filename(&extracted.tokens);
        let file_id = uuid::Uuid::new_v4();

        let input = Phase1Input {
            file_id,
            extracted: &extracted,
            embedding: &embedding,
            parent_folder_name: None,
        };
        let outcome = run_phase1(&input, &workspace.prototypes, &workspace.graph, |c| workspace.leaf_name(c), &bands);
        assert!(
            matches!(outcome, Phase1Outcome::NeedsClustering(_)),
            "an untrained taxonomy should never confidently assign {}",
            file.relative_path
        );

        names_by_id.insert(file_id, file.relative_path.as_str());
        records.push(ClusterRecord::from_extracted(file_id, file.relative_path.clone(), &extracted));
    }

    let clusters = cluster(records, &ClusterConfig::default());

    // Three meaningfully different groups: invoices, recipes, and the lone
    // outlier — never one flat bucket keyed only on "document"/"other".
    assert!(
        clusters.len() >= 3,
        "expected at least 3 clusters (invoices, recipes, outlier), got {}: {:?}",
        clusters.len(),
        clusters.iter().map(|c| (c.name.clone(), c.members.len())).collect::<Vec<_>>()
    );

    let names_for = |cluster: &sortai_core::similarity::Cluster| -> BTreeSet<&str> {
        cluster.members.iter().map(|m| names_by_id[&m.file_id]).collect()
    };

    let invoice_cluster = clusters
        .iter()
        .find(|c| names_for(c).iter().any(|n| n.starts_with("invoice")))
        .expect("an invoice cluster should exist");
    assert!(
        names_for(invoice_cluster).iter().all(|n| n.starts_with("invoice")),
        "invoices should not be mixed with recipes or the outlier: {:?}",
        names_for(invoice_cluster)
    );

    let recipe_cluster = clusters
        .iter()
        .find(|c| names_for(c).iter().any(|n| n.starts_with("recipe")))
        .expect("a recipe cluster should exist");
    assert!(
        names_for(recipe_cluster).iter().all(|n| n.starts_with("recipe")),
        "recipes should not be mixed with invoices or the outlier: {:?}",
        names_for(recipe_cluster)
    );

    let outlier_cluster = clusters
        .iter()
        .find(|c| names_for(c).contains("zzqqxx_outlier_888.bin"))
        .expect("the outlier should end up in some cluster");
    assert_eq!(
        outlier_cluster.members.len(),
        1,
        "the outlier shares nothing with the other files and should stay alone"
    );
    assert_ne!(
        outlier_cluster.name, invoice_cluster.name,
        "the outlier must not be folded into the larger invoice cluster just because it's bigger"
    );
}
