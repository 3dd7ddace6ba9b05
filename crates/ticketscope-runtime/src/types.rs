//! Runtime types.

use std::path::PathBuf;

use serde::Serialize;

use ticketscope_ingest::StageReport;
use ticketscope_store::{DocumentRecord, RepresentativeDocRecord, RunRecord, RunStatus, TopicRecord};

/// Everything persisted for one run, in one write.
#[derive(Debug, Clone)]
pub struct RunBatch {
    pub run: RunRecord,
    pub topics: Vec<TopicRecord>,
    pub documents: Vec<DocumentRecord>,
    pub representative_docs: Vec<RepresentativeDocRecord>,
}

/// Summary of one (global or per-product) run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(rename = "runId")]
    pub run_id: String,
    #[serde(rename = "productLabel", skip_serializing_if = "Option::is_none")]
    pub product_label: Option<String>,
    pub status: RunStatus,
    #[serde(rename = "docCount")]
    pub doc_count: usize,
    #[serde(rename = "topicCount")]
    pub topic_count: usize,
    #[serde(rename = "outlierCount")]
    pub outlier_count: usize,
    /// Topics (outlier excluded) that ended with a keyword label.
    #[serde(rename = "labelFallbacks")]
    pub label_fallbacks: usize,
    /// Artifact directory, absent when writing artifacts failed.
    #[serde(rename = "outputDir", skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

/// Summary of a whole pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Tickets in the raw snapshot.
    pub fetched: usize,
    /// Tickets left after the date filter and document caps.
    pub selected: usize,
    pub translation: StageReport,
    pub cleaning: StageReport,
    pub runs: Vec<RunReport>,
}
