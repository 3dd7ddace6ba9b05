//! Centroid clustering in the reduced space.
//!
//! Two passes: leader clustering seeds centroids in document order, then
//! every point is reassigned to its nearest centroid. Points below the
//! similarity threshold and members of undersized clusters get
//! [`OUTLIER_TOPIC`]. Outliers are never reassigned afterwards.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2, ArrayView1, Axis};

use ticketscope_core::{ClusterParams, OUTLIER_TOPIC};

/// Cluster id and confidence per input row.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub labels: Vec<i64>,
    pub probabilities: Vec<f64>,
}

impl Clustering {
    pub fn outlier_count(&self) -> usize {
        self.labels.iter().filter(|l| **l == OUTLIER_TOPIC).count()
    }

    /// Distinct non-outlier ids.
    pub fn topic_count(&self) -> usize {
        let mut ids: Vec<i64> = self.labels.iter().copied().filter(|l| *l != OUTLIER_TOPIC).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }
}

pub fn cosine(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let denom = a.dot(&a).sqrt() * b.dot(&b).sqrt();
    if denom > 0.0 {
        a.dot(&b) / denom
    } else {
        0.0
    }
}

/// Normalized mean vector of every non-outlier label.
pub fn centroids(x: &Array2<f32>, labels: &[i64]) -> BTreeMap<i64, Array1<f32>> {
    let mut sums: BTreeMap<i64, Array1<f32>> = BTreeMap::new();
    for (row, &label) in x.axis_iter(Axis(0)).zip(labels) {
        if label == OUTLIER_TOPIC {
            continue;
        }
        *sums.entry(label).or_insert_with(|| Array1::zeros(x.ncols())) += &row;
    }
    for v in sums.values_mut() {
        let norm = v.dot(v).sqrt();
        if norm > 0.0 {
            *v /= norm;
        }
    }
    sums
}

/// Renumber clusters by size (largest is 0; ties by first member) and set
/// each member's probability to its similarity with the final centroid.
pub fn finalize(x: &Array2<f32>, mut labels: Vec<i64>) -> Clustering {
    let mut stats: BTreeMap<i64, (usize, usize)> = BTreeMap::new();
    for (i, &l) in labels.iter().enumerate() {
        if l != OUTLIER_TOPIC {
            let e = stats.entry(l).or_insert((0, i));
            e.0 += 1;
        }
    }
    let mut order: Vec<(i64, usize, usize)> = stats.into_iter().map(|(l, (n, first))| (l, n, first)).collect();
    order.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    let remap: BTreeMap<i64, i64> = order
        .iter()
        .enumerate()
        .map(|(new, (old, _, _))| (*old, new as i64))
        .collect();
    for l in labels.iter_mut() {
        if let Some(new) = remap.get(&*l) {
            *l = *new;
        }
    }

    let cents = centroids(x, &labels);
    let probabilities = labels
        .iter()
        .enumerate()
        .map(|(i, l)| match cents.get(l) {
            Some(c) => cosine(x.row(i), c.view()).clamp(0.0, 1.0) as f64,
            None => 0.0,
        })
        .collect();
    Clustering { labels, probabilities }
}

pub struct CentroidClusterer {
    params: ClusterParams,
}

impl CentroidClusterer {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn fit(&self, x: &Array2<f32>) -> Clustering {
        let threshold = self.params.similarity_threshold;

        // Pass 1: leader clustering.
        let mut seeds: Vec<Array1<f32>> = Vec::new();
        for row in x.axis_iter(Axis(0)) {
            match nearest(&seeds, row) {
                Some((j, sim)) if sim >= threshold => seeds[j] += &row,
                _ => seeds.push(row.to_owned()),
            }
        }

        // Pass 2: reassign against the settled centroids.
        let mut labels: Vec<i64> = x
            .axis_iter(Axis(0))
            .map(|row| match nearest(&seeds, row) {
                Some((j, sim)) if sim >= threshold => j as i64,
                _ => OUTLIER_TOPIC,
            })
            .collect();

        let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
        for l in &labels {
            *sizes.entry(*l).or_default() += 1;
        }
        for l in labels.iter_mut() {
            if *l != OUTLIER_TOPIC && sizes[&*l] < self.params.min_cluster_size {
                *l = OUTLIER_TOPIC;
            }
        }

        finalize(x, labels)
    }
}

fn nearest(centroids: &[Array1<f32>], row: ArrayView1<f32>) -> Option<(usize, f32)> {
    centroids
        .iter()
        .enumerate()
        .map(|(j, c)| (j, cosine(row, c.view())))
        .fold(None, |best, (j, sim)| match best {
            Some((_, b)) if b >= sim => best,
            _ => Some((j, sim)),
        })
}
