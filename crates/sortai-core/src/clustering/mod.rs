//! Spherical K-Means / Hierarchical Clusterer (C4, spec §4.4)
//!
//! Operates on unit-norm embeddings with cosine similarity. A deterministic
//! splitmix64-based generator (not the `rand` crate — the teacher's workspace does
//! not pull it in, and the spec requires bit-for-bit reproducibility across runs
//! from a given seed, which is easiest to guarantee over a generator this crate
//! owns outright) drives k-means++ seeding so that identical inputs with an
//! identical seed always yield identical output (spec §4.4 "Reproducibility").

use crate::embeddings::cosine_similarity;

/// A tiny, deterministic PRNG used only for reproducible seeding. Not cryptographic.
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed ^ 0x9E3779B97F4A7C15 }
    }

    fn next_u64(&mut self) -> u64 {
        // splitmix64
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    fn gen_range(&mut self, bound: usize) -> usize {
        if bound == 0 {
            0
        } else {
            (self.next_u64() as usize) % bound
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub restarts: usize,
    pub seed: Option<u64>,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 4,
            max_iterations: 100,
            restarts: 4,
            seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f32>>,
    pub inertia: f32,
}

fn nearest_centroid(vector: &[f32], centroids: &[Vec<f32>]) -> (usize, f32) {
    let mut best_index = 0;
    let mut best_similarity = f32::NEG_INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let similarity = cosine_similarity(vector, centroid);
        if similarity > best_similarity {
            best_similarity = similarity;
            best_index = i;
        }
    }
    (best_index, best_similarity)
}

/// k-means++ seeding: pick the first centroid uniformly, then each subsequent
/// centroid with probability proportional to its squared distance (here,
/// `1 - cosine_similarity`) from the nearest already-chosen centroid.
fn kmeans_plus_plus_seed(vectors: &[Vec<f32>], k: usize, rng: &mut DeterministicRng) -> Vec<Vec<f32>> {
    let mut centroids = Vec::with_capacity(k);
    if vectors.is_empty() {
        return centroids;
    }
    centroids.push(vectors[rng.gen_range(vectors.len())].clone());

    while centroids.len() < k && centroids.len() < vectors.len() {
        let weights: Vec<f64> = vectors
            .iter()
            .map(|v| {
                let (_, sim) = nearest_centroid(v, &centroids);
                ((1.0 - sim).max(0.0) as f64).powi(2)
            })
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            centroids.push(vectors[rng.gen_range(vectors.len())].clone());
            continue;
        }
        let mut target = rng.next_f64() * total;
        let mut chosen = vectors.len() - 1;
        for (i, w) in weights.iter().enumerate() {
            if target <= *w {
                chosen = i;
                break;
            }
            target -= w;
        }
        centroids.push(vectors[chosen].clone());
    }
    centroids
}

fn assign(vectors: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
    vectors
        .iter()
        .map(|v| nearest_centroid(v, centroids).0)
        .collect()
}

/// Recompute cluster sums then project each centroid back to the unit sphere.
/// Empty clusters retain their previous centroid (spec §4.4).
fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    previous: &[Vec<f32>],
) -> Vec<Vec<f32>> {
    let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut sums = vec![vec![0.0f32; dim]; k];
    let mut counts = vec![0usize; k];

    for (vector, &cluster) in vectors.iter().zip(assignments.iter()) {
        counts[cluster] += 1;
        for (s, v) in sums[cluster].iter_mut().zip(vector.iter()) {
            *s += v;
        }
    }

    (0..k)
        .map(|i| {
            if counts[i] == 0 {
                previous.get(i).cloned().unwrap_or_else(|| vec![0.0; dim])
            } else {
                let mut centroid = sums[i].clone();
                crate::embeddings::l2_normalize(&mut centroid);
                centroid
            }
        })
        .collect()
}

fn total_inertia(vectors: &[Vec<f32>], assignments: &[usize], centroids: &[Vec<f32>]) -> f32 {
    vectors
        .iter()
        .zip(assignments.iter())
        .map(|(v, &c)| 1.0 - cosine_similarity(v, &centroids[c]))
        .sum()
}

fn run_once(vectors: &[Vec<f32>], k: usize, max_iterations: usize, rng: &mut DeterministicRng) -> KMeansResult {
    let k = k.min(vectors.len()).max(1);
    let mut centroids = kmeans_plus_plus_seed(vectors, k, rng);
    let mut assignments = assign(vectors, &centroids);

    for _ in 0..max_iterations {
        let new_centroids = update_centroids(vectors, &assignments, k, &centroids);
        let new_assignments = assign(vectors, &new_centroids);
        let converged = new_assignments == assignments;
        centroids = new_centroids;
        assignments = new_assignments;
        if converged {
            break;
        }
    }

    let inertia = total_inertia(vectors, &assignments, &centroids);
    KMeansResult {
        assignments,
        centroids,
        inertia,
    }
}

/// Run spherical k-means with multiple restarts, keeping the run that minimizes
/// total inertia. With a seed supplied, identical inputs yield identical outputs.
pub fn spherical_kmeans(vectors: &[Vec<f32>], config: &KMeansConfig) -> KMeansResult {
    assert!(!vectors.is_empty(), "spherical_kmeans requires at least one vector");
    let base_seed = config.seed.unwrap_or(0x5EED);
    let mut best: Option<KMeansResult> = None;

    for restart in 0..config.restarts.max(1) {
        let mut rng = DeterministicRng::new(base_seed.wrapping_add(restart as u64));
        let result = run_once(vectors, config.k, config.max_iterations, &mut rng);
        best = Some(match best {
            Some(current) if current.inertia <= result.inertia => current,
            _ => result,
        });
    }
    best.unwrap()
}

/// Elbow-method helper: pick `k` in `[k_min, k_max]` maximizing the second
/// difference of inertia (the point where adding another cluster stops helping).
pub fn elbow_k(vectors: &[Vec<f32>], k_min: usize, k_max: usize, config: &KMeansConfig) -> usize {
    let k_max = k_max.min(vectors.len()).max(k_min);
    if k_min >= k_max {
        return k_min.max(1);
    }

    let inertias: Vec<f32> = (k_min..=k_max)
        .map(|k| {
            let cfg = KMeansConfig { k, ..config.clone() };
            spherical_kmeans(vectors, &cfg).inertia
        })
        .collect();

    if inertias.len() < 3 {
        return k_min;
    }

    let mut best_k = k_min;
    let mut best_second_diff = f32::NEG_INFINITY;
    for i in 1..inertias.len() - 1 {
        let second_diff = inertias[i - 1] - 2.0 * inertias[i] + inertias[i + 1];
        if second_diff > best_second_diff {
            best_second_diff = second_diff;
            best_k = k_min + i;
        }
    }
    best_k
}

#[derive(Debug, Clone)]
pub struct HierarchicalConfig {
    pub max_depth: usize,
    pub min_leaf_size: usize,
    pub branching_factor: usize,
    pub kmeans: KMeansConfig,
}

impl Default for HierarchicalConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_leaf_size: 2,
            branching_factor: 3,
            kmeans: KMeansConfig::default(),
        }
    }
}

/// A node in the recursive hierarchical clustering tree. Indices refer back into
/// the caller's original vector slice.
#[derive(Debug, Clone)]
pub struct HierarchicalNode {
    pub centroid: Vec<f32>,
    pub member_indices: Vec<usize>,
    pub children: Vec<HierarchicalNode>,
}

/// Recursively cluster leaves up to `max_depth`, provided each child would have at
/// least `min_leaf_size` members; otherwise the node stays a leaf (spec §4.4).
pub fn hierarchical_cluster(vectors: &[Vec<f32>], config: &HierarchicalConfig) -> HierarchicalNode {
    let indices: Vec<usize> = (0..vectors.len()).collect();
    build_node(vectors, &indices, config, 0)
}

fn build_node(
    vectors: &[Vec<f32>],
    indices: &[usize],
    config: &HierarchicalConfig,
    depth: usize,
) -> HierarchicalNode {
    let members: Vec<Vec<f32>> = indices.iter().map(|&i| vectors[i].clone()).collect();
    let mut centroid = members.iter().fold(vec![0.0f32; members[0].len()], |mut acc, v| {
        for (a, x) in acc.iter_mut().zip(v.iter()) {
            *a += x;
        }
        acc
    });
    crate::embeddings::l2_normalize(&mut centroid);

    let can_split = depth < config.max_depth && indices.len() >= config.min_leaf_size * 2;
    if !can_split {
        return HierarchicalNode {
            centroid,
            member_indices: indices.to_vec(),
            children: Vec::new(),
        };
    }

    let k = config
        .branching_factor
        .min(indices.len() / config.min_leaf_size)
        .max(1);
    let cfg = KMeansConfig { k, ..config.kmeans.clone() };
    let result = spherical_kmeans(&members, &cfg);

    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); result.centroids.len()];
    for (local_i, &cluster) in result.assignments.iter().enumerate() {
        buckets[cluster].push(indices[local_i]);
    }

    // Any bucket that fails the min_leaf_size requirement is folded back into a
    // single leaf rather than recursed into further.
    if buckets.iter().any(|b| !b.is_empty() && b.len() < config.min_leaf_size) || buckets.len() <= 1 {
        return HierarchicalNode {
            centroid,
            member_indices: indices.to_vec(),
            children: Vec::new(),
        };
    }

    let children = buckets
        .into_iter()
        .filter(|b| !b.is_empty())
        .map(|bucket| build_node(vectors, &bucket, config, depth + 1))
        .collect();

    HierarchicalNode {
        centroid,
        member_indices: indices.to_vec(),
        children,
    }
}
