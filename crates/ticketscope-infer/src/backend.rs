//! The topic model seam and its local implementation.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use ndarray::Array2;
use tracing::{debug, info};

use crate::cluster::{centroids, cosine, finalize, CentroidClusterer, Clustering};
use crate::ctfidf::rank_keywords;
use crate::embedder::EmbedderBackend;
use crate::reduce::RandomProjection;
use ticketscope_core::{ModelParams, Result, OUTLIER_TOPIC};

/// One discovered topic, outlier topic included.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTopic {
    pub topic_id: i64,
    pub size: usize,
    /// Ranked `(keyword, weight)` pairs.
    pub keywords: Vec<(String, f64)>,
    /// Corpus indices, most confident first.
    pub representative_docs: Vec<usize>,
}

/// Output of one fit over a corpus.
#[derive(Debug, Clone)]
pub struct TopicFit {
    /// Topic per corpus document.
    pub assignments: Vec<i64>,
    pub probabilities: Vec<f64>,
    /// Sorted by topic id, so the outlier topic (if any) comes first.
    pub topics: Vec<FittedTopic>,
    /// Documents in the reduced space; needed to merge topics later.
    pub reduced: Array2<f32>,
}

impl TopicFit {
    /// Number of real (non-outlier) topics.
    pub fn topic_count(&self) -> usize {
        self.topics.iter().filter(|t| t.topic_id != OUTLIER_TOPIC).count()
    }

    pub fn outlier_count(&self) -> usize {
        self.assignments.iter().filter(|a| **a == OUTLIER_TOPIC).count()
    }
}

pub trait TopicBackend: Send + Sync {
    /// Embed, reduce, cluster and rank keywords for `docs`.
    fn fit(&self, docs: &[String], params: &ModelParams) -> Result<TopicFit>;

    /// Merge topics of `fit` until at most `target` real topics remain.
    fn reduce_topics(&self, docs: &[String], fit: TopicFit, target: usize, params: &ModelParams) -> Result<TopicFit>;

    /// Embedding model identifier recorded with the run.
    fn model_name(&self) -> String;
}

pub struct LocalTopicBackend {
    embedder: Arc<dyn EmbedderBackend>,
}

impl LocalTopicBackend {
    pub fn new(embedder: Arc<dyn EmbedderBackend>) -> Self {
        Self { embedder }
    }
}

impl TopicBackend for LocalTopicBackend {
    fn fit(&self, docs: &[String], params: &ModelParams) -> Result<TopicFit> {
        let texts: Vec<&str> = docs.iter().map(String::as_str).collect();
        let embeddings = self.embedder.embed_batch(&texts)?;
        let projection = RandomProjection::new(self.embedder.dimension(), &params.reduction)?;
        let reduced = projection.transform(&embeddings)?;
        debug!(
            "Reduced {} x {} embeddings to {} components",
            embeddings.nrows(),
            embeddings.ncols(),
            reduced.ncols()
        );

        let clustering = CentroidClusterer::new(params.clustering.clone()).fit(&reduced);
        let fit = summarize(docs, clustering, reduced, params);
        info!(
            "Fitted {} documents: {} topics, {} outliers",
            docs.len(),
            fit.topic_count(),
            fit.outlier_count()
        );
        Ok(fit)
    }

    fn reduce_topics(&self, docs: &[String], fit: TopicFit, target: usize, params: &ModelParams) -> Result<TopicFit> {
        let target = target.max(1);
        let before = fit.topic_count();
        let mut labels = fit.assignments;

        loop {
            let cents = centroids(&fit.reduced, &labels);
            if cents.len() <= target {
                break;
            }
            let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
            for l in labels.iter().filter(|l| **l != OUTLIER_TOPIC) {
                *sizes.entry(*l).or_default() += 1;
            }
            // Smallest topic; among equals the highest id.
            let Some((&smallest, _)) = sizes.iter().min_by_key(|(id, n)| (**n, Reverse(**id))) else {
                break;
            };
            let source = &cents[&smallest];
            let Some(into) = cents
                .iter()
                .filter(|(id, _)| **id != smallest)
                .map(|(id, c)| (*id, cosine(source.view(), c.view())))
                .fold(None, |best: Option<(i64, f32)>, (id, sim)| match best {
                    Some((_, b)) if b >= sim => best,
                    _ => Some((id, sim)),
                })
                .map(|(id, _)| id)
            else {
                break;
            };

            debug!("Merging topic {} into {}", smallest, into);
            for l in labels.iter_mut() {
                if *l == smallest {
                    *l = into;
                }
            }
        }

        let clustering = finalize(&fit.reduced, labels);
        let reduced = summarize(docs, clustering, fit.reduced, params);
        info!("Reduced topics {} -> {}", before, reduced.topic_count());
        Ok(reduced)
    }

    fn model_name(&self) -> String {
        self.embedder.model_name()
    }
}

fn summarize(docs: &[String], clustering: Clustering, reduced: Array2<f32>, params: &ModelParams) -> TopicFit {
    let Clustering { labels, probabilities } = clustering;
    let mut keywords = rank_keywords(docs, &labels, params.top_n_words);

    let mut members: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, l) in labels.iter().enumerate() {
        members.entry(*l).or_default().push(i);
    }

    let topics = members
        .into_iter()
        .map(|(topic_id, mut idx)| {
            let size = idx.len();
            idx.sort_by(|a, b| probabilities[*b].total_cmp(&probabilities[*a]).then(a.cmp(b)));
            idx.truncate(params.representative_docs);
            FittedTopic {
                topic_id,
                size,
                keywords: keywords.remove(&topic_id).unwrap_or_default(),
                representative_docs: idx,
            }
        })
        .collect();

    TopicFit {
        assignments: labels,
        probabilities,
        topics,
        reduced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use ndarray::array;

    fn corpus() -> Vec<String> {
        let mut docs = Vec::new();
        for i in 0..6 {
            docs.push(format!("license activation fails with error code {}", i));
            docs.push(format!("pdf export crashes when saving page {}", i));
        }
        docs
    }

    #[test]
    fn test_fit_is_deterministic() {
        let backend = LocalTopicBackend::new(Arc::new(HashingEmbedder::new(128)));
        let params = ModelParams::default();
        let a = backend.fit(&corpus(), &params).unwrap();
        let b = backend.fit(&corpus(), &params).unwrap();
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.topics, b.topics);
        assert_eq!(a.assignments.len(), 12);
        assert!(a.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
        assert_eq!(backend.model_name(), "hashing-128");
    }

    #[test]
    fn test_reduce_merges_smallest_into_nearest() {
        let backend = LocalTopicBackend::new(Arc::new(HashingEmbedder::new(8)));
        let docs: Vec<String> = ["alpha one", "alpha two", "alpha three", "beta one", "beta two", "alphaish"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let reduced = array![
            [1.0f32, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.9, 0.0, 0.1],
        ];
        let params = ModelParams {
            representative_docs: 2,
            ..ModelParams::default()
        };
        let clustering = finalize(&reduced, vec![0, 0, 0, 1, 1, 2]);
        let fit = summarize(&docs, clustering, reduced, &params);
        assert_eq!(fit.topic_count(), 3);

        let merged = backend.reduce_topics(&docs, fit, 2, &params).unwrap();
        assert_eq!(merged.topic_count(), 2);
        assert_eq!(merged.assignments, vec![0, 0, 0, 1, 1, 0]);
        assert_eq!(merged.topics[0].size, 4);
        assert_eq!(merged.topics[0].representative_docs.len(), 2);
    }
}
