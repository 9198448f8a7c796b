//! Phase 1: instant, synchronous categorization (spec §4.11).
//!
//! Must stay fast enough for 5,000 files on modest hardware: no network calls, no
//! media extraction, just keywords, cached embeddings, and the prototype/knowledge
//! graph stores built up from prior runs.

use chrono::Utc;

use crate::graph::KnowledgeGraph;
use crate::keywords::ExtractedKeywords;
use crate::model::{AssignmentSource, CategoryId, ConfidenceBands, FileAssignment, FileId};
use crate::prototypes::PrototypeStore;

/// Weight given to prototype cosine similarity in the Phase-1 blend (spec §4.11).
pub const PROTOTYPE_WEIGHT: f32 = 0.5;
/// Weight given to keyword-graph evidence.
pub const KEYWORD_GRAPH_WEIGHT: f32 = 0.3;
/// Weight given to extension/parent-folder priors.
pub const EXTENSION_PARENT_WEIGHT: f32 = 0.2;

/// Minimum blended confidence for Phase 1 to assign a file outright rather than
/// batch it for the clusterer (spec "insufficient evidence").
pub const MIN_COVERAGE: f32 = 0.35;

pub struct Phase1Input<'a> {
    pub file_id: FileId,
    pub extracted: &'a ExtractedKeywords,
    pub embedding: &'a [f32],
    pub parent_folder_name: Option<&'a str>,
}

pub enum Phase1Outcome {
    Assigned(FileAssignment),
    NeedsClustering(FileId),
}

/// Cumulative keyword-graph evidence for a file's keyword set against a candidate
/// category, normalized into `[0, 1]` by treating any positive cumulative weight
/// above 1.0 as maxed out (the graph's edge weights are individually bounded, but
/// several keywords can each contribute).
fn keyword_graph_evidence(graph: &KnowledgeGraph, keywords: &ExtractedKeywords, category: CategoryId) -> f32 {
    if keywords.keywords.is_empty() {
        return 0.0;
    }
    let mut total = 0.0;
    let mut hits = 0;
    for keyword in &keywords.keywords {
        if let Some((_, weight)) = graph
            .category_candidates_for_keyword(keyword)
            .into_iter()
            .find(|(c, _)| *c == category)
        {
            total += weight;
            hits += 1;
        }
    }
    if hits == 0 {
        0.0
    } else {
        (total / hits as f32).min(1.0)
    }
}

/// Extension/parent-folder prior: 1.0 if the parent folder name is itself a strong
/// lexical match for the candidate category's leaf name, else a smaller constant
/// reflecting only the coarse-type match.
fn extension_parent_prior(parent_folder_name: Option<&str>, candidate_leaf_name: &str) -> f32 {
    match parent_folder_name {
        Some(parent) if parent.eq_ignore_ascii_case(candidate_leaf_name) => 1.0,
        Some(parent) if parent.to_ascii_lowercase().contains(&candidate_leaf_name.to_ascii_lowercase()) => 0.6,
        _ => 0.2,
    }
}

/// Blend the three Phase-1 evidence signals into one confidence score (spec §4.11).
pub fn blend_confidence(prototype_similarity: f32, keyword_graph_evidence: f32, extension_parent_prior: f32) -> f32 {
    crate::model::clamp_confidence(
        PROTOTYPE_WEIGHT * prototype_similarity
            + KEYWORD_GRAPH_WEIGHT * keyword_graph_evidence
            + EXTENSION_PARENT_WEIGHT * extension_parent_prior,
    )
}

/// Run Phase 1 for a single file. `category_leaf_names` maps each candidate
/// category's id to its display name, needed for the extension/parent prior.
pub fn run_phase1(
    input: &Phase1Input<'_>,
    prototypes: &PrototypeStore,
    graph: &KnowledgeGraph,
    category_leaf_names: impl Fn(CategoryId) -> String,
    bands: &ConfidenceBands,
) -> Phase1Outcome {
    let candidates = prototypes.top_k(input.embedding, 5, 0.0);
    let Some((best_category, prototype_similarity)) = candidates.into_iter().next() else {
        return Phase1Outcome::NeedsClustering(input.file_id);
    };

    let leaf_name = category_leaf_names(best_category);
    let evidence = keyword_graph_evidence(graph, input.extracted, best_category);
    let prior = extension_parent_prior(input.parent_folder_name, &leaf_name);
    let confidence = blend_confidence(prototype_similarity, evidence, prior);

    if confidence < MIN_COVERAGE {
        return Phase1Outcome::NeedsClustering(input.file_id);
    }

    let _ = bands;
    Phase1Outcome::Assigned(FileAssignment {
        file_id: input.file_id,
        category_id: best_category,
        confidence,
        rationale: format!(
            "prototype similarity {prototype_similarity:.2}, keyword evidence {evidence:.2}, prior {prior:.2}"
        ),
        source: AssignmentSource::Phase1,
        decided_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::l2_normalize;
    use uuid::Uuid;

    fn unit(v: Vec<f32>) -> Vec<f32> {
        let mut padded = vec![0.0; crate::embeddings::EMBEDDING_DIMENSIONS];
        for (i, x) in v.into_iter().enumerate() {
            padded[i] = x;
        }
        l2_normalize(&mut padded);
        padded
    }

    #[test]
    fn high_prototype_similarity_and_prior_reaches_auto_accept() {
        let mut prototypes = PrototypeStore::new();
        let category = Uuid::new_v4();
        prototypes.update(category, &unit(vec![1.0, 0.0]), Utc::now()).unwrap();
        let graph = KnowledgeGraph::new();
        let extracted = ExtractedKeywords {
            keywords: Default::default(),
            tokens: Vec::new(),
            coarse_type: crate::model::CoarseType::Document,
        };
        let input = Phase1Input {
            file_id: Uuid::new_v4(),
            extracted: &extracted,
            embedding: &unit(vec![1.0, 0.0]),
            parent_folder_name: Some("Invoices"),
        };
        let bands = ConfidenceBands::default();
        match run_phase1(&input, &prototypes, &graph, |_| "Invoices".to_string(), &bands) {
            Phase1Outcome::Assigned(assignment) => {
                assert!(assignment.confidence >= PROTOTYPE_WEIGHT + EXTENSION_PARENT_WEIGHT - 0.01);
            }
            Phase1Outcome::NeedsClustering(_) => panic!("expected an assignment"),
        }
    }

    #[test]
    fn no_prototypes_routes_to_clustering() {
        let prototypes = PrototypeStore::new();
        let graph = KnowledgeGraph::new();
        let extracted = ExtractedKeywords {
            keywords: Default::default(),
            tokens: Vec::new(),
            coarse_type: crate::model::CoarseType::Other,
        };
        let input = Phase1Input {
            file_id: Uuid::new_v4(),
            extracted: &extracted,
            embedding: &unit(vec![1.0, 0.0]),
            parent_folder_name: None,
        };
        let bands = ConfidenceBands::default();
        assert!(matches!(
            run_phase1(&input, &prototypes, &graph, |_| String::new(), &bands),
            Phase1Outcome::NeedsClustering(_)
        ));
    }
}
