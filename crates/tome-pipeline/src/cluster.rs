//! Topic clustering over fragment embeddings.
//!
//! Deterministic k-means-style partitioning: the target cluster count comes
//! from the granularity fraction, seeds are evenly spaced over the input,
//! and the iteration budget is fixed, so the same sample always produces the
//! same clusters. Size bounds are applied afterward: undersized clusters are
//! dropped (assignments partition, but need not cover, the sample) and
//! oversized clusters are split.

use uuid::Uuid;

use tome_index::cosine_similarity;

/// Bounds controlling the clusterer.
#[derive(Clone, Copy, Debug)]
pub struct ClusterParams {
    /// Target cluster count as a fraction of the sample size. Range (0, 1].
    pub granularity: f64,
    /// Clusters smaller than this are dropped. 0 means no lower bound.
    pub min_size: usize,
    /// Clusters larger than this are split. 0 means no upper bound.
    pub max_size: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            granularity: 0.05,
            min_size: 0,
            max_size: 0,
        }
    }
}

/// A transient topic group of fragment IDs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<Uuid>,
}

/// Fixed iteration budget; assignment stabilizes quickly at these sizes.
const KMEANS_ITERATIONS: usize = 4;

/// Partition embedded fragments into topic clusters.
///
/// Guarantees at least one cluster for a non-empty input, even when the
/// min-size bound would otherwise drop everything.
pub fn cluster_fragments(items: &[(Uuid, Vec<f32>)], params: &ClusterParams) -> Vec<Cluster> {
    let n = items.len();
    if n == 0 {
        return Vec::new();
    }

    let k = ((n as f64 * params.granularity).ceil() as usize).clamp(1, n);

    // Evenly spaced seeds keep the outcome independent of RNG state.
    let mut centroids: Vec<Vec<f32>> = (0..k).map(|i| items[i * n / k].1.clone()).collect();
    let mut assignment = vec![0usize; n];

    for _ in 0..KMEANS_ITERATIONS {
        for (i, (_, embedding)) in items.iter().enumerate() {
            assignment[i] = nearest_centroid(embedding, &centroids);
        }
        recompute_centroids(items, &assignment, &mut centroids);
    }

    let mut groups: Vec<Vec<Uuid>> = vec![Vec::new(); k];
    for (i, (id, _)) in items.iter().enumerate() {
        groups[assignment[i]].push(*id);
    }
    groups.retain(|g| !g.is_empty());

    if params.max_size > 0 {
        groups = groups
            .into_iter()
            .flat_map(|g| {
                g.chunks(params.max_size)
                    .map(|c| c.to_vec())
                    .collect::<Vec<_>>()
            })
            .collect();
    }

    if params.min_size > 0 {
        let largest = groups
            .iter()
            .max_by_key(|g| g.len())
            .cloned()
            .unwrap_or_default();
        groups.retain(|g| g.len() >= params.min_size);
        // Sampling may be lossy, but an exploration turn always needs at
        // least one cluster to summarize.
        if groups.is_empty() && !largest.is_empty() {
            groups.push(largest);
        }
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(id, members)| Cluster { id, members })
        .collect()
}

fn nearest_centroid(embedding: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0usize;
    let mut best_score = f64::NEG_INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let score = cosine_similarity(embedding, centroid);
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

fn recompute_centroids(
    items: &[(Uuid, Vec<f32>)],
    assignment: &[usize],
    centroids: &mut [Vec<f32>],
) {
    let dims = items[0].1.len();
    for (c, centroid) in centroids.iter_mut().enumerate() {
        let mut sum = vec![0.0f32; dims];
        let mut count = 0usize;
        for (i, (_, embedding)) in items.iter().enumerate() {
            if assignment[i] == c {
                for (s, v) in sum.iter_mut().zip(embedding.iter()) {
                    *s += v;
                }
                count += 1;
            }
        }
        // An orphaned centroid keeps its previous position.
        if count > 0 {
            for s in &mut sum {
                *s /= count as f32;
            }
            *centroid = sum;
        }
    }
}
