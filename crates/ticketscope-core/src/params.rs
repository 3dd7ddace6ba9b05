//! Structural parameters for topic modeling, recorded on every run.

use serde::{Deserialize, Serialize};

/// Topic id of documents no cluster claimed.
pub const OUTLIER_TOPIC: i64 = -1;

/// Dimensionality reduction applied before clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionParams {
    /// Target dimensionality of the reduced space.
    pub n_components: usize,
    /// Seed of the projection; fixed so reruns are reproducible.
    pub seed: u64,
}

impl Default for ReductionParams {
    fn default() -> Self {
        Self {
            n_components: 5,
            seed: 42,
        }
    }
}

/// Clustering in the reduced space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    /// Clusters with fewer members are dissolved into the outlier topic.
    pub min_cluster_size: usize,
    /// Cosine similarity a point needs to its centroid to count as assigned.
    pub similarity_threshold: f32,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 10,
            similarity_threshold: 0.75,
        }
    }
}

/// Everything the topic model runner needs besides the tickets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelParams {
    pub reduction: ReductionParams,
    pub clustering: ClusterParams,
    /// Reduce to this many topics when fewer than discovered.
    pub target_topics: Option<usize>,
    /// Corpora smaller than this are not modeled.
    pub min_documents: usize,
    /// Keywords kept per topic.
    pub top_n_words: usize,
    /// Representative documents kept per topic.
    pub representative_docs: usize,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            reduction: ReductionParams::default(),
            clustering: ClusterParams::default(),
            target_topics: None,
            min_documents: 5,
            top_n_words: 12,
            representative_docs: 10,
        }
    }
}
