//! Fits a topic model over one ticket set.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::corpus::Corpus;
use crate::types::{ModelStatus, TopicModelOutput, TopicSummary};
use ticketscope_core::{ModelParams, Result, Ticket};
use ticketscope_infer::{TopicBackend, TopicFit};

pub struct TopicModelRunner {
    backend: Arc<dyn TopicBackend>,
}

impl TopicModelRunner {
    pub fn new(backend: Arc<dyn TopicBackend>) -> Self {
        Self { backend }
    }

    pub fn embedding_model(&self) -> String {
        self.backend.model_name()
    }

    /// CPU-bound; call from a blocking context.
    ///
    /// A corpus below `params.min_documents` is not an error: the output is
    /// empty with [`ModelStatus::SkippedSmallCorpus`]. Only a failing fit
    /// returns `Err`.
    pub fn run(&self, tickets: &[Ticket], params: &ModelParams) -> Result<TopicModelOutput> {
        let corpus = Corpus::build(tickets);
        let embedding_model = self.backend.model_name();

        if corpus.len() < params.min_documents {
            info!(
                "Corpus has {} documents (< {}); skipping topic modeling",
                corpus.len(),
                params.min_documents
            );
            return Ok(TopicModelOutput {
                corpus,
                assignments: Vec::new(),
                probabilities: Vec::new(),
                topics: Vec::new(),
                status: ModelStatus::SkippedSmallCorpus,
                embedding_model,
            });
        }

        let mut fit = self.backend.fit(&corpus.docs, params)?;

        match params.target_topics {
            Some(target) if target > 0 && target < fit.topic_count() => {
                let unreduced = fit.clone();
                fit = match self.backend.reduce_topics(&corpus.docs, fit, target, params) {
                    Ok(reduced) => reduced,
                    Err(e) => {
                        warn!("Topic reduction to {} failed, keeping {} topics: {}", target, unreduced.topic_count(), e);
                        unreduced
                    }
                };
            }
            Some(target) => debug!(
                "Skipping reduction: target {} vs {} discovered topics",
                target,
                fit.topic_count()
            ),
            None => {}
        }

        Ok(shape_output(corpus, fit, embedding_model))
    }
}

fn shape_output(corpus: Corpus, fit: TopicFit, embedding_model: String) -> TopicModelOutput {
    let topics = fit
        .topics
        .into_iter()
        .map(|t| TopicSummary {
            topic_id: t.topic_id,
            size: t.size,
            keywords: t.keywords.into_iter().map(|(word, _)| word).collect(),
            representative_docs: t.representative_docs,
        })
        .collect();
    TopicModelOutput {
        corpus,
        assignments: fit.assignments,
        probabilities: fit.probabilities,
        topics,
        status: ModelStatus::Completed,
        embedding_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ndarray::Array2;
    use ticketscope_infer::FittedTopic;

    /// Reports a fixed number of one-document topics.
    struct FixedBackend {
        topics: usize,
        reduce_calls: AtomicUsize,
    }

    impl FixedBackend {
        fn new(topics: usize) -> Arc<Self> {
            Arc::new(Self {
                topics,
                reduce_calls: AtomicUsize::new(0),
            })
        }

        fn fit_with(&self, docs: &[String], topics: usize) -> TopicFit {
            let assignments: Vec<i64> = (0..docs.len()).map(|i| (i % topics) as i64).collect();
            let topics = (0..topics as i64)
                .map(|id| FittedTopic {
                    topic_id: id,
                    size: assignments.iter().filter(|a| **a == id).count(),
                    keywords: vec![(format!("kw{}", id), 1.0)],
                    representative_docs: vec![id as usize],
                })
                .collect();
            TopicFit {
                probabilities: vec![1.0; docs.len()],
                assignments,
                topics,
                reduced: Array2::zeros((docs.len(), 2)),
            }
        }
    }

    impl TopicBackend for FixedBackend {
        fn fit(&self, docs: &[String], _params: &ModelParams) -> Result<TopicFit> {
            Ok(self.fit_with(docs, self.topics))
        }

        fn reduce_topics(&self, docs: &[String], _fit: TopicFit, target: usize, _params: &ModelParams) -> Result<TopicFit> {
            self.reduce_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.fit_with(docs, target))
        }

        fn model_name(&self) -> String {
            "fixed".into()
        }
    }

    fn tickets(n: usize) -> Vec<Ticket> {
        (0..n).map(|i| Ticket::new(i.to_string(), format!("ticket body {}", i))).collect()
    }

    #[test]
    fn test_small_corpus_skips_without_error() {
        let backend = FixedBackend::new(2);
        let runner = TopicModelRunner::new(backend);
        let out = runner.run(&tickets(4), &ModelParams::default()).unwrap();
        assert_eq!(out.status, ModelStatus::SkippedSmallCorpus);
        assert_eq!(out.topic_count(), 0);
        assert_eq!(out.corpus.len(), 4);
    }

    #[test]
    fn test_reduction_guard() {
        let backend = FixedBackend::new(3);
        let runner = TopicModelRunner::new(backend.clone());
        let params = ModelParams {
            target_topics: Some(10),
            ..ModelParams::default()
        };
        let out = runner.run(&tickets(9), &params).unwrap();
        assert_eq!(out.topic_count(), 3);
        assert_eq!(backend.reduce_calls.load(Ordering::SeqCst), 0);

        let params = ModelParams {
            target_topics: Some(3),
            ..ModelParams::default()
        };
        runner.run(&tickets(9), &params).unwrap();
        assert_eq!(backend.reduce_calls.load(Ordering::SeqCst), 0);

        let params = ModelParams {
            target_topics: Some(2),
            ..ModelParams::default()
        };
        let out = runner.run(&tickets(9), &params).unwrap();
        assert_eq!(out.topic_count(), 2);
        assert_eq!(backend.reduce_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_output_keeps_keyword_order() {
        let runner = TopicModelRunner::new(FixedBackend::new(1));
        let out = runner.run(&tickets(5), &ModelParams::default()).unwrap();
        assert_eq!(out.status, ModelStatus::Completed);
        assert_eq!(out.topics[0].keywords, vec!["kw0"]);
        assert_eq!(out.assignments.len(), 5);
        assert_eq!(out.embedding_model, "fixed");
    }
}
