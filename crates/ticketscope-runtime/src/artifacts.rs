//! Per-run output files.
//!
//! Each run gets `<output>/<run_id>/` with:
//! - `topic_info.csv`: one row per topic
//! - `document_topics.csv`: one row per corpus document
//! - `topics.json`: run metadata plus topics
//! - `topic_sizes.html`: bar chart of topic sizes

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use ticketscope_core::{Error, Result};
use ticketscope_store::{DocumentRecord, RunRecord, TopicRecord};

pub struct ArtifactWriter {
    root: PathBuf,
}

#[derive(Serialize)]
struct TopicsFile<'a> {
    run: &'a RunRecord,
    topics: &'a [TopicRecord],
}

impl ArtifactWriter {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Write all artifacts of one run, replacing earlier files of the same run id.
    pub fn write(&self, run: &RunRecord, topics: &[TopicRecord], documents: &[DocumentRecord]) -> Result<PathBuf> {
        if run.run_id.is_empty() || run.run_id.contains(['/', '\\']) || run.run_id.starts_with('.') {
            return Err(Error::Internal(format!("Unusable run id for output: {:?}", run.run_id)));
        }
        let dir = self.root.join(&run.run_id);
        std::fs::create_dir_all(&dir)?;

        std::fs::write(dir.join("topic_info.csv"), topic_info_csv(topics))?;
        std::fs::write(dir.join("document_topics.csv"), document_topics_csv(documents))?;
        std::fs::write(
            dir.join("topics.json"),
            serde_json::to_string_pretty(&TopicsFile { run, topics })?,
        )?;
        std::fs::write(dir.join("topic_sizes.html"), topic_sizes_html(run, topics))?;

        debug!("Wrote artifacts for run {} to {}", run.run_id, dir.display());
        Ok(dir)
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn csv_row(fields: &[&str]) -> String {
    let mut row = fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",");
    row.push('\n');
    row
}

fn topic_info_csv(topics: &[TopicRecord]) -> String {
    let mut out = csv_row(&["topic_id", "count", "label", "description", "keywords", "product_label"]);
    for t in topics {
        out.push_str(&csv_row(&[
            t.topic_id.to_string().as_str(),
            t.doc_count.to_string().as_str(),
            t.label.as_str(),
            t.description.as_str(),
            t.keywords.join(" ").as_str(),
            t.product_label.as_deref().unwrap_or(""),
        ]));
    }
    out
}

fn document_topics_csv(documents: &[DocumentRecord]) -> String {
    let mut out = csv_row(&["doc_index", "ticket_id", "topic_id", "probability", "product_label", "text"]);
    for d in documents {
        out.push_str(&csv_row(&[
            d.doc_index.to_string().as_str(),
            d.ticket_id.as_str(),
            d.topic_id.to_string().as_str(),
            format!("{:.4}", d.probability).as_str(),
            d.product_label.as_deref().unwrap_or(""),
            d.text.as_str(),
        ]));
    }
    out
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn topic_sizes_html(run: &RunRecord, topics: &[TopicRecord]) -> String {
    let largest = topics.iter().map(|t| t.doc_count).max().unwrap_or(0).max(1);
    let mut bars = String::new();
    for t in topics {
        let width = (t.doc_count as f64 / largest as f64 * 100.0).round();
        let _ = writeln!(
            bars,
            "<div class=\"row\"><span class=\"name\">{} {}</span>\
             <span class=\"bar\" style=\"width:{}%\"></span><span class=\"n\">{}</span></div>",
            t.topic_id,
            html_escape(&t.label),
            width,
            t.doc_count
        );
    }
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Topics {id}</title>\n\
         <style>body{{font-family:sans-serif}}.row{{display:flex;align-items:center;margin:2px 0}}\
         .name{{width:22em}}.bar{{display:inline-block;height:1em;background:#4a7ebb;margin-right:.5em}}</style>\n\
         </head><body>\n<h1>Run {id}</h1>\n<p>{docs} documents, {count} topics, {outliers} outliers</p>\n{bars}</body></html>\n",
        id = html_escape(&run.run_id),
        docs = run.doc_count,
        count = run.topic_count,
        outliers = run.outlier_count,
        bars = bars,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ticketscope_store::RunStatus;

    fn run(run_id: &str) -> RunRecord {
        RunRecord {
            run_id: run_id.into(),
            created_at: Utc::now(),
            doc_count: 3,
            topic_count: 1,
            outlier_count: 1,
            embedding_model: "hashing-512".into(),
            reduction_params: serde_json::json!({"n_components": 5}),
            cluster_params: serde_json::json!({}),
            product_label: None,
            status: RunStatus::Completed,
        }
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_write_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ArtifactWriter::new(dir.path());
        let topics = vec![TopicRecord {
            run_id: "r1".into(),
            topic_id: 0,
            label: "Export <PDF>".into(),
            description: "Exports, crashing".into(),
            keywords: vec!["pdf".into(), "export".into()],
            doc_count: 2,
            product_label: None,
        }];
        let documents = vec![DocumentRecord {
            run_id: "r1".into(),
            doc_index: 0,
            ticket_id: "T-1".into(),
            probability: 0.5,
            text: "crash, again".into(),
            ..DocumentRecord::default()
        }];

        let out = writer.write(&run("r1"), &topics, &documents).unwrap();
        assert_eq!(out, dir.path().join("r1"));

        let info = std::fs::read_to_string(out.join("topic_info.csv")).unwrap();
        assert_eq!(
            info,
            "topic_id,count,label,description,keywords,product_label\n0,2,Export <PDF>,\"Exports, crashing\",pdf export,\n"
        );
        let docs = std::fs::read_to_string(out.join("document_topics.csv")).unwrap();
        assert!(docs.ends_with("0,T-1,0,0.5000,,\"crash, again\"\n"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("topics.json")).unwrap()).unwrap();
        assert_eq!(json["run"]["run_id"], "r1");
        assert_eq!(json["topics"][0]["label"], "Export <PDF>");

        let html = std::fs::read_to_string(out.join("topic_sizes.html")).unwrap();
        assert!(html.contains("Export &lt;PDF&gt;"));
        assert!(html.contains("width:100%"));
    }

    #[test]
    fn test_zero_topic_run_writes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let out = ArtifactWriter::new(dir.path()).write(&run("empty"), &[], &[]).unwrap();
        let info = std::fs::read_to_string(out.join("topic_info.csv")).unwrap();
        assert_eq!(info.lines().count(), 1);
    }

    #[test]
    fn test_rejects_path_like_run_id() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ArtifactWriter::new(dir.path()).write(&run("../x"), &[], &[]).is_err());
    }
}
