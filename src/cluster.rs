use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{Cluster, Stage};
use crate::similarity::{euclidean_distance, squared_distance};

#[derive(Debug, Clone)]
pub struct ClusterParams {
    pub seed: u64,           // e.g., 42
    pub n_init: usize,       // independent k-means++ restarts, best inertia wins
    pub max_iter: usize,     // Lloyd iterations per restart
    pub max_clusters: usize, // hard ceiling, 10
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_init: 10,
            max_iter: 300,
            max_clusters: 10,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ClusterError {
    #[error("cannot form {k} clusters from {n} points")]
    TooFewPoints { k: usize, n: usize },
    #[error("embeddings have inconsistent dimensions")]
    RaggedInput,
    #[error("fewer than {k} distinct points")]
    Degenerate { k: usize },
}

/// A partition of the batch: every record index belongs to exactly one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clustering {
    pub labels: Vec<usize>,
    pub clusters: Vec<Cluster>,
}

impl Clustering {
    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    /// Every record in one cluster labelled 0.
    pub fn single(n: usize) -> Self {
        if n == 0 {
            return Self { labels: Vec::new(), clusters: Vec::new() };
        }
        Self {
            labels: vec![0; n],
            clusters: vec![Cluster { label: 0, members: (0..n).collect() }],
        }
    }

    /// Relabel densely in order of first appearance, dropping empty labels.
    fn from_labels(raw: &[usize]) -> Self {
        let mut mapping: Vec<Option<usize>> = Vec::new();
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut labels = Vec::with_capacity(raw.len());
        for (idx, &l) in raw.iter().enumerate() {
            if l >= mapping.len() {
                mapping.resize(l + 1, None);
            }
            let dense = *mapping[l].get_or_insert_with(|| {
                clusters.push(Cluster { label: clusters.len(), members: Vec::new() });
                clusters.len() - 1
            });
            clusters[dense].members.push(idx);
            labels.push(dense);
        }
        Self { labels, clusters }
    }
}

/// Group embeddings, choosing the cluster count automatically.
///
/// Never fails: any algorithmic problem yields a single cluster holding every
/// record, reported as [`Stage::Fallback`].
pub fn cluster_embeddings(embeddings: &[Vec<f32>], params: &ClusterParams) -> Stage<Clustering> {
    let n = embeddings.len();
    if n == 0 {
        return Stage::Ok(Clustering::single(0));
    }
    let start = std::time::Instant::now();

    let chosen = choose_k(embeddings, params);
    let search_fell_back = chosen.is_fallback();
    let k = final_k(*chosen.value(), n, params.max_clusters);
    debug!("Cluster count - candidate={}, final={}, n={}", chosen.value(), k, n);

    match kmeans(embeddings, k, params) {
        Ok(raw) => {
            let clustering = Clustering::from_labels(&raw);
            let sizes: Vec<usize> = clustering.clusters.iter().map(Cluster::size).collect();
            info!(
                "Clustering completed - duration={:.2}s, n={}, clusters={}, sizes={:?}",
                start.elapsed().as_secs_f32(),
                n,
                clustering.n_clusters(),
                sizes
            );
            if search_fell_back || clustering.n_clusters() < 2 {
                Stage::Fallback(clustering)
            } else {
                Stage::Ok(clustering)
            }
        }
        Err(e) => {
            warn!("Clustering failed, using single cluster - n={}, error={}", n, e);
            Stage::Fallback(Clustering::single(n))
        }
    }
}

/// `max(2, min(k, max_clusters, n / 3))`: clusters average at least three members.
pub fn final_k(k: usize, n: usize, max_clusters: usize) -> usize {
    k.min(max_clusters).min(n / 3).max(2)
}

/// Candidate cluster count.
///
/// Starts from `round(sqrt(n / 2))` clamped to `[2, 8]`; batches of 10–100
/// records search `k` in `[2, min(8, n / 2))` for the best silhouette score.
pub fn choose_k(embeddings: &[Vec<f32>], params: &ClusterParams) -> Stage<usize> {
    let n = embeddings.len();
    let k0 = ((n as f64 / 2.0).sqrt().round() as usize).clamp(2, 8);
    if !(10..=100).contains(&n) {
        return Stage::Ok(k0);
    }

    let mut best: Option<(usize, f64)> = None;
    for k in 2..8.min(n / 2) {
        let Ok(labels) = kmeans(embeddings, k, params) else {
            continue;
        };
        let Some(score) = silhouette_score(embeddings, &labels) else {
            continue;
        };
        debug!("Silhouette - k={}, score={:.4}", k, score);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((k, score));
        }
    }
    match best {
        Some((k, _)) => Stage::Ok(k),
        None => {
            warn!("Cluster count search found no scorable k, using k0={}", k0);
            Stage::Fallback(k0)
        }
    }
}

/// Seeded k-means (k-means++ init, Lloyd iterations); best of `n_init` restarts.
///
/// Returned labels are in `[0, k)`. The same input and seed always give the
/// same labels.
pub fn kmeans(points: &[Vec<f32>], k: usize, params: &ClusterParams) -> Result<Vec<usize>, ClusterError> {
    let n = points.len();
    if k == 0 || n < k {
        return Err(ClusterError::TooFewPoints { k, n });
    }
    let dim = points[0].len();
    if points.iter().any(|p| p.len() != dim) {
        return Err(ClusterError::RaggedInput);
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut best: Option<(Vec<usize>, f64)> = None;
    for _ in 0..params.n_init.max(1) {
        let mut centers = init_plus_plus(points, k, &mut rng)?;
        let (labels, inertia) = lloyd(points, &mut centers, params.max_iter);
        if best.as_ref().map_or(true, |(_, b)| inertia < *b) {
            best = Some((labels, inertia));
        }
    }
    best.map(|(labels, _)| labels).ok_or(ClusterError::Degenerate { k })
}

fn init_plus_plus(points: &[Vec<f32>], k: usize, rng: &mut StdRng) -> Result<Vec<Vec<f32>>, ClusterError> {
    let n = points.len();
    let mut centers = vec![points[rng.gen_range(0..n)].clone()];
    let mut d2: Vec<f64> = points.iter().map(|p| squared_distance(p, &centers[0])).collect();

    while centers.len() < k {
        let total: f64 = d2.iter().sum();
        if total <= f64::EPSILON {
            return Err(ClusterError::Degenerate { k });
        }
        let mut target = rng.gen::<f64>() * total;
        let mut pick = n - 1;
        for (i, w) in d2.iter().enumerate() {
            if target < *w {
                pick = i;
                break;
            }
            target -= w;
        }
        // a zero-weight point is already a center
        if d2[pick] <= 0.0 {
            pick = (0..n)
                .max_by(|&a, &b| d2[a].total_cmp(&d2[b]).then_with(|| b.cmp(&a)))
                .unwrap_or(pick);
        }
        centers.push(points[pick].clone());
        let newest = centers.len() - 1;
        for (i, p) in points.iter().enumerate() {
            d2[i] = d2[i].min(squared_distance(p, &centers[newest]));
        }
    }
    Ok(centers)
}

fn nearest(p: &[f32], centers: &[Vec<f32>]) -> (usize, f64) {
    let mut best = (0usize, f64::INFINITY);
    for (c, center) in centers.iter().enumerate() {
        let d = squared_distance(p, center);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn lloyd(points: &[Vec<f32>], centers: &mut [Vec<f32>], max_iter: usize) -> (Vec<usize>, f64) {
    let k = centers.len();
    let dim = points[0].len();
    let mut labels = vec![usize::MAX; points.len()];

    for _ in 0..max_iter.max(1) {
        let assigned: Vec<(usize, f64)> = points.par_iter().map(|p| nearest(p, centers)).collect();
        let new_labels: Vec<usize> = assigned.iter().map(|(c, _)| *c).collect();
        let changed = new_labels != labels;
        labels = new_labels;
        if !changed {
            break;
        }

        let mut sums = vec![vec![0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (p, &c) in points.iter().zip(&labels) {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(p) {
                *s += *x as f64;
            }
        }
        for c in 0..k {
            if counts[c] == 0 {
                // empty cluster: reseed on the point farthest from its center
                let far = assigned
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1).then_with(|| b.0.cmp(&a.0)))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                centers[c] = points[far].clone();
                continue;
            }
            centers[c] = sums[c].iter().map(|s| (*s / counts[c] as f64) as f32).collect();
        }
    }

    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &c)| squared_distance(p, &centers[c]))
        .sum();
    (labels, inertia)
}

/// Mean silhouette coefficient (Euclidean).
///
/// `None` when there are fewer than two labels or every point is its own cluster.
pub fn silhouette_score(points: &[Vec<f32>], labels: &[usize]) -> Option<f64> {
    let n = points.len();
    if n == 0 || labels.len() != n {
        return None;
    }
    let n_labels = labels.iter().max()? + 1;
    let mut sizes = vec![0usize; n_labels];
    for &l in labels {
        sizes[l] += 1;
    }
    let populated = sizes.iter().filter(|&&s| s > 0).count();
    if populated < 2 || populated == n {
        return None;
    }

    let per_point: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            let own = labels[i];
            if sizes[own] <= 1 {
                return 0.0;
            }
            let mut sums = vec![0f64; n_labels];
            for j in 0..n {
                if i != j {
                    sums[labels[j]] += euclidean_distance(&points[i], &points[j]);
                }
            }
            let a = sums[own] / (sizes[own] - 1) as f64;
            let b = (0..n_labels)
                .filter(|&l| l != own && sizes[l] > 0)
                .map(|l| sums[l] / sizes[l] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();
    Some(per_point.iter().sum::<f64>() / n as f64)
}
