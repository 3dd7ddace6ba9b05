//! Topic run types.

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use ticketscope_core::OUTLIER_TOPIC;

/// One topic of a finished model run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicSummary {
    pub topic_id: i64,
    pub size: usize,
    /// Most relevant first.
    pub keywords: Vec<String>,
    /// Corpus indices, most confident first.
    pub representative_docs: Vec<usize>,
}

impl TopicSummary {
    pub fn is_outlier(&self) -> bool {
        self.topic_id == OUTLIER_TOPIC
    }
}

/// How a model run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Completed,
    /// Fewer documents than the configured minimum; nothing was fitted.
    SkippedSmallCorpus,
}

#[derive(Debug, Clone)]
pub struct TopicModelOutput {
    pub corpus: Corpus,
    /// Topic per corpus document.
    pub assignments: Vec<i64>,
    pub probabilities: Vec<f64>,
    /// Sorted by topic id; the outlier topic, when present, is first.
    pub topics: Vec<TopicSummary>,
    pub status: ModelStatus,
    pub embedding_model: String,
}

impl TopicModelOutput {
    pub fn topic_count(&self) -> usize {
        self.topics.iter().filter(|t| !t.is_outlier()).count()
    }

    pub fn outlier_count(&self) -> usize {
        self.assignments.iter().filter(|a| **a == OUTLIER_TOPIC).count()
    }
}

/// Name and one-sentence description of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicLabel {
    pub label: String,
    #[serde(default)]
    pub description: String,
}
