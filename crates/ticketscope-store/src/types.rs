//! Row types for the cache and result tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest text (in characters) written to any result column.
pub const MAX_TEXT_CHARS: usize = 4000;

/// Truncate to at most `max_chars` characters. Lossy and one-way.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Cached translation/cleaning state of one ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub ticket_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preprocessed_body: Option<String>,
    pub cleaning_attempted: bool,
    pub translation_fallback: bool,
    pub cleaning_fallback: bool,
    pub updated_at: i64,
}

/// Final state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Corpus below the minimum document count; no topics.
    SkippedSmallCorpus,
    /// The topic model raised; the run is recorded with no topics.
    ModelFailed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::SkippedSmallCorpus => "skipped_small_corpus",
            Self::ModelFailed => "model_failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "skipped_small_corpus" => Self::SkippedSmallCorpus,
            "model_failed" => Self::ModelFailed,
            _ => Self::Completed,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `topic_runs` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub doc_count: i64,
    pub topic_count: i64,
    pub outlier_count: i64,
    pub embedding_model: String,
    pub reduction_params: serde_json::Value,
    pub cluster_params: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_label: Option<String>,
    pub status: RunStatus,
}

/// A `topics` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub run_id: String,
    pub topic_id: i64,
    pub label: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub doc_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_label: Option<String>,
}

/// A `topic_documents` row: denormalized copy of a ticket within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DocumentRecord {
    pub run_id: String,
    pub doc_index: i64,
    pub ticket_id: String,
    pub topic_id: i64,
    pub probability: f64,
    pub text: String,
    pub created_at: Option<String>,
    pub region: Option<String>,
    pub status: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub translated_body: Option<String>,
    pub preprocessed_body: Option<String>,
    pub product_context: Option<String>,
    pub product_label: Option<String>,
}

/// A `topic_representative_docs` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentativeDocRecord {
    pub run_id: String,
    pub topic_id: i64,
    pub rep_index: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    pub text: String,
}

/// Row counts across the result tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultStats {
    pub runs: i64,
    pub topics: i64,
    pub documents: i64,
    pub representative_docs: i64,
}
