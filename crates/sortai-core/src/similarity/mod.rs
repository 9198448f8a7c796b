//! Similarity Clusterer (C3, spec §4.3)
//!
//! Groups extracted-keyword records into clusters without embeddings, for the
//! instant Phase-1 view. Greedy agglomeration ordered by descending
//! keyword-richness; no shared mutable state, so this is a pure function over its
//! inputs.

use std::collections::BTreeSet;

use crate::keywords::ExtractedKeywords;
use crate::model::{CoarseType, FileId};

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Jaccard similarity threshold (spec default 0.2).
    pub jaccard_threshold: f32,
    /// Levenshtein threshold, only consulted once Jaccard clears 0.05 (spec default 0.7).
    pub levenshtein_threshold: f32,
    /// Clusters smaller than this are merged into their closest same-type neighbor.
    pub min_size: usize,
    /// Clusters larger than this are recursively split with stricter thresholds.
    pub max_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            jaccard_threshold: 0.2,
            levenshtein_threshold: 0.7,
            min_size: 2,
            max_size: 40,
        }
    }
}

/// One file as seen by the clusterer.
#[derive(Debug, Clone)]
pub struct ClusterRecord {
    pub file_id: FileId,
    pub filename: String,
    pub keywords: BTreeSet<String>,
    pub coarse_type: CoarseType,
}

impl ClusterRecord {
    pub fn from_extracted(file_id: FileId, filename: String, extracted: &ExtractedKeywords) -> Self {
        Self {
            file_id,
            filename,
            keywords: extracted.keywords.clone(),
            coarse_type: extracted.coarse_type,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Cluster {
    pub name: String,
    pub members: Vec<ClusterRecord>,
    pub coarse_type: CoarseType,
    /// Marks the dedicated catch-all bucket small clusters fall into when no
    /// same-coarse-type cluster exists to merge into (spec §4.3 "fallback: Other").
    is_other_fallback: bool,
}

impl Cluster {
    fn keyword_union(&self) -> BTreeSet<String> {
        self.members.iter().flat_map(|m| m.keywords.iter().cloned()).collect()
    }
}

/// Similarity between two clusters, measured as the Jaccard overlap of their
/// combined keyword vocabularies.
fn cluster_similarity(a: &Cluster, b: &Cluster) -> f32 {
    jaccard(&a.keyword_union(), &b.keyword_union())
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Levenshtein edit distance, normalized to `[0, 1]` similarity (1 = identical).
fn normalized_levenshtein(a: &str, b: &str) -> f32 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (n, m) = (a_chars.len(), b_chars.len());
    if n == 0 && m == 0 {
        return 1.0;
    }
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];
    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a_chars[i - 1] == b_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let distance = prev[m];
    1.0 - (distance as f32 / n.max(m).max(1) as f32)
}

fn is_similar(a: &ClusterRecord, b: &ClusterRecord, config: &ClusterConfig) -> bool {
    let j = jaccard(&a.keywords, &b.keywords);
    if j >= config.jaccard_threshold {
        return true;
    }
    j > 0.05 && normalized_levenshtein(&a.filename, &b.filename) >= config.levenshtein_threshold
}

/// Capitalized top-3 keywords present in more than half of a cluster's members.
fn cluster_name(members: &[ClusterRecord], fallback_type: CoarseType) -> String {
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for member in members {
        for kw in &member.keywords {
            *counts.entry(kw.as_str()).or_insert(0) += 1;
        }
    }
    let threshold = members.len() / 2 + 1;
    let mut common: Vec<&str> = counts
        .iter()
        .filter(|(_, count)| **count >= threshold)
        .map(|(kw, _)| *kw)
        .collect();
    common.sort_by(|a, b| counts[b].cmp(&counts[a]).then(a.cmp(b)));
    common.truncate(3);

    if common.is_empty() {
        match fallback_type {
            CoarseType::Other => "Other".to_string(),
            other => format!("{:?}", other),
        }
    } else {
        common
            .iter()
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Greedy agglomeration ordered by descending keyword-richness, followed by
/// min-size merge and max-size split post-processing (spec §4.3).
pub fn cluster(records: Vec<ClusterRecord>, config: &ClusterConfig) -> Vec<Cluster> {
    let mut remaining = records;
    remaining.sort_by(|a, b| b.keywords.len().cmp(&a.keywords.len()));

    let mut clusters: Vec<Cluster> = Vec::new();
    for record in remaining {
        let mut placed = false;
        for cluster in clusters.iter_mut() {
            if cluster
                .members
                .iter()
                .any(|member| is_similar(member, &record, config))
            {
                cluster.members.push(record.clone());
                placed = true;
                break;
            }
        }
        if !placed {
            let coarse_type = record.coarse_type;
            clusters.push(Cluster {
                name: String::new(),
                members: vec![record],
                coarse_type,
                is_other_fallback: false,
            });
        }
    }

    merge_small_clusters(&mut clusters, config);
    let mut result = Vec::new();
    for cluster in clusters {
        if cluster.members.len() > config.max_size {
            result.extend(split_large_cluster(cluster, config));
        } else {
            result.push(cluster);
        }
    }

    for cluster in result.iter_mut() {
        cluster.name = if cluster.is_other_fallback {
            "Other".to_string()
        } else {
            cluster_name(&cluster.members, cluster.coarse_type)
        };
    }

    // Stable ordering: largest first, ties by name.
    result.sort_by(|a, b| b.members.len().cmp(&a.members.len()).then(a.name.cmp(&b.name)));
    result
}

fn merge_small_clusters(clusters: &mut Vec<Cluster>, config: &ClusterConfig) {
    loop {
        let small_index = clusters
            .iter()
            .position(|c| !c.is_other_fallback && c.members.len() < config.min_size && clusters.len() > 1);
        let Some(small_index) = small_index else { break };
        let small = clusters.remove(small_index);

        // Find the most-similar same-type cluster by keyword-vocabulary overlap;
        // fall back to a dedicated "Other" bucket if none shares the coarse type.
        let target_index = clusters
            .iter()
            .enumerate()
            .filter(|(_, c)| c.coarse_type == small.coarse_type && !c.is_other_fallback)
            .max_by(|(_, a), (_, b)| {
                cluster_similarity(&small, a)
                    .partial_cmp(&cluster_similarity(&small, b))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i);

        match target_index {
            Some(idx) => clusters[idx].members.extend(small.members),
            None => match clusters.iter().position(|c| c.is_other_fallback) {
                Some(idx) => clusters[idx].members.extend(small.members),
                None => clusters.push(Cluster {
                    name: "Other".to_string(),
                    members: small.members,
                    coarse_type: small.coarse_type,
                    is_other_fallback: true,
                }),
            },
        }
    }
}

fn split_large_cluster(cluster: Cluster, config: &ClusterConfig) -> Vec<Cluster> {
    if cluster.is_other_fallback {
        return vec![cluster];
    }
    let stricter = ClusterConfig {
        jaccard_threshold: (config.jaccard_threshold * 1.5).min(0.9),
        levenshtein_threshold: (config.levenshtein_threshold * 1.1).min(0.95),
        min_size: config.min_size,
        max_size: config.max_size,
    };
    let sub_clusters = cluster_without_postprocessing(cluster.members.clone(), &stricter);
    if sub_clusters.len() <= 1 {
        return vec![cluster];
    }
    sub_clusters
}

fn cluster_without_postprocessing(mut records: Vec<ClusterRecord>, config: &ClusterConfig) -> Vec<Cluster> {
    records.sort_by(|a, b| b.keywords.len().cmp(&a.keywords.len()));
    let mut clusters: Vec<Cluster> = Vec::new();
    for record in records {
        let mut placed = false;
        for cluster in clusters.iter_mut() {
            if cluster.members.iter().any(|m| is_similar(m, &record, config)) {
                cluster.members.push(record.clone());
                placed = true;
                break;
            }
        }
        if !placed {
            let coarse_type = record.coarse_type;
            clusters.push(Cluster {
                name: String::new(),
                members: vec![record],
                coarse_type,
                is_other_fallback: false,
            });
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, keywords: &[&str], coarse_type: CoarseType) -> ClusterRecord {
        ClusterRecord {
            file_id: uuid::Uuid::new_v4(),
            filename: name.to_string(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            coarse_type,
        }
    }

    #[test]
    fn jaccard_groups_similar_keyword_sets() {
        let records = vec![
            record("sales_q1.pdf", &["sales", "report", "q1"], CoarseType::Document),
            record("sales_q2.pdf", &["sales", "report", "q2"], CoarseType::Document),
            record("recipe.md", &["chocolate", "cake"], CoarseType::Document),
        ];
        let clusters = cluster(records, &ClusterConfig { min_size: 1, ..Default::default() });
        assert!(clusters.iter().any(|c| c.members.len() == 2));
    }

    #[test]
    fn stable_ordering_largest_first() {
        let records = vec![
            record("a.pdf", &["alpha"], CoarseType::Document),
            record("b.pdf", &["beta", "gamma"], CoarseType::Document),
            record("c.pdf", &["beta", "gamma"], CoarseType::Document),
        ];
        let clusters = cluster(records, &ClusterConfig { min_size: 1, ..Default::default() });
        assert!(clusters[0].members.len() >= clusters.last().unwrap().members.len());
    }

    #[test]
    fn small_clusters_merge_into_other_fallback() {
        let records = vec![
            record("unique1.xyz", &["zzz"], CoarseType::Other),
            record("sales_q1.pdf", &["sales", "report"], CoarseType::Document),
            record("sales_q2.pdf", &["sales", "report"], CoarseType::Document),
        ];
        let clusters = cluster(records, &ClusterConfig::default());
        // The lone "Other" record has no same-coarse-type cluster to merge into,
        // so it lands in the dedicated "Other" bucket rather than the largest
        // (Document) cluster.
        assert!(clusters.iter().map(|c| c.members.len()).sum::<usize>() == 3);
        let other = clusters.iter().find(|c| c.name == "Other").expect("expected an Other bucket");
        assert_eq!(other.members.len(), 1);
    }

    #[test]
    fn small_cluster_merges_into_the_most_similar_same_type_cluster_not_the_largest() {
        let records = vec![
            // A large cluster of its own coarse type, sharing no keywords with the
            // singleton below.
            record("meeting_notes_1.txt", &["meeting", "agenda"], CoarseType::Document),
            record("meeting_notes_2.txt", &["meeting", "agenda"], CoarseType::Document),
            record("meeting_notes_3.txt", &["meeting", "agenda"], CoarseType::Document),
            // A singleton with high keyword overlap with the singleton below, but
            // with a dissimilar filename so the two never merge during the initial
            // greedy pass.
            record("zzz111.pdf", &["invoice", "acme", "payment"], CoarseType::Document),
            record("qqq222.pdf", &["invoice", "payment"], CoarseType::Document),
        ];
        // A high jaccard threshold keeps the two invoice singletons apart during
        // the greedy pass, so only `merge_small_clusters`'s similarity search can
        // bring them together.
        let clusters = cluster(
            records,
            &ClusterConfig {
                jaccard_threshold: 0.9,
                min_size: 2,
                ..Default::default()
            },
        );
        let invoice_cluster = clusters
            .iter()
            .find(|c| c.members.iter().any(|m| m.filename == "zzz111.pdf"))
            .expect("expected an invoice cluster");
        assert!(
            invoice_cluster.members.iter().any(|m| m.filename == "qqq222.pdf"),
            "expected the lone invoice record to merge by keyword similarity, not into the larger meeting cluster; got {:?}",
            clusters.iter().map(|c| (c.name.clone(), c.members.len())).collect::<Vec<_>>()
        );
        assert_eq!(invoice_cluster.members.len(), 2);
    }

    #[test]
    fn levenshtein_catches_near_duplicate_names_with_disjoint_keywords() {
        let a = record("vacation_photo_01.jpg", &["vacation", "photo", "01"], CoarseType::Image);
        let b = record("vacation_photo_02.jpg", &["vacation", "photo", "02"], CoarseType::Image);
        assert!(normalized_levenshtein(&a.filename, &b.filename) >= 0.7);
    }
}
