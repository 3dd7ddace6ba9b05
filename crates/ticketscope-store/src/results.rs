//! Idempotent relational persistence of topic runs.
//!
//! Every write is an upsert keyed as follows:
//! - `topic_runs` by `run_id`
//! - `topics` by `(run_id, topic_id)`
//! - `topic_documents` by `(run_id, doc_index)`
//! - `topic_representative_docs` by `(run_id, topic_id, rep_index)`
//!
//! Rows of the run whose key is absent from a new persist call are removed,
//! so re-applying a run id fully replaces its children.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::migrate::{ensure_columns, schema_version, set_schema_version};
use crate::schema::{DOCUMENT_COLUMNS, RESULTS_SCHEMA_SQL, SCHEMA_VERSION};
use crate::sqlite::{create_connection, db_err};
use crate::types::*;
use ticketscope_core::{Error, Result};

pub struct ResultStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl ResultStore {
    /// Open or create the store. The file will be `db_dir/ticketscope.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_dir.as_ref().join("ticketscope.db");
        let conn = create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };
        let stats = store.stats()?;
        info!(
            "ResultStore initialized: {} runs, {} topics, {} documents, path={}",
            stats.runs,
            stats.topics,
            stats.documents,
            store.db_path.display()
        );
        Ok(store)
    }

    /// Create missing tables, then bring `topic_documents` up to the current
    /// column set. Runs once per open.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(RESULTS_SCHEMA_SQL)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        let from = schema_version(conn)?;
        ensure_columns(conn, "topic_documents", DOCUMENT_COLUMNS)?;
        if from < SCHEMA_VERSION {
            set_schema_version(conn, SCHEMA_VERSION)?;
            debug!("Result schema version {} -> {}", from, SCHEMA_VERSION);
        }
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Persist one run with all of its children in a single transaction.
    pub fn persist(
        &self,
        run: &RunRecord,
        topics: &[TopicRecord],
        documents: &[DocumentRecord],
        representative_docs: &[RepresentativeDocRecord],
    ) -> Result<()> {
        let run_id = run.run_id.as_str();
        let stray = topics
            .iter()
            .map(|t| ("Topic", &t.run_id))
            .chain(documents.iter().map(|d| ("Document", &d.run_id)))
            .chain(representative_docs.iter().map(|r| ("Representative doc", &r.run_id)))
            .find(|(_, id)| *id != run_id);
        if let Some((kind, stray)) = stray {
            return Err(Error::Internal(format!("{} for run {} passed to run {}", kind, stray, run_id)));
        }

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO topic_runs (run_id, created_at, doc_count, topic_count, \
             outlier_count, embedding_model, reduction_params, cluster_params, product_label, status) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run_id,
                run.created_at.to_rfc3339(),
                run.doc_count,
                run.topic_count,
                run.outlier_count,
                run.embedding_model,
                serde_json::to_string(&run.reduction_params)?,
                serde_json::to_string(&run.cluster_params)?,
                run.product_label,
                run.status.as_str(),
            ],
        )
        .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR REPLACE INTO topics (run_id, topic_id, label, description, \
                     keywords, doc_count, product_label) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(db_err)?;
            for t in topics {
                stmt.execute(params![
                    run_id,
                    t.topic_id,
                    truncate_chars(&t.label, MAX_TEXT_CHARS),
                    truncate_chars(&t.description, MAX_TEXT_CHARS),
                    serde_json::to_string(&t.keywords)?,
                    t.doc_count,
                    t.product_label,
                ])
                .map_err(db_err)?;
            }
        }

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR REPLACE INTO topic_documents (run_id, doc_index, ticket_id, topic_id, \
                     probability, text, created_at, region, status, subject, body, translated_body, \
                     preprocessed_body, product_context, product_label) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                )
                .map_err(db_err)?;
            for d in documents {
                stmt.execute(params![
                    run_id,
                    d.doc_index,
                    d.ticket_id,
                    d.topic_id,
                    d.probability,
                    truncate_chars(&d.text, MAX_TEXT_CHARS),
                    d.created_at,
                    d.region,
                    d.status,
                    d.subject.as_deref().map(|s| truncate_chars(s, MAX_TEXT_CHARS)),
                    d.body.as_deref().map(|s| truncate_chars(s, MAX_TEXT_CHARS)),
                    d.translated_body.as_deref().map(|s| truncate_chars(s, MAX_TEXT_CHARS)),
                    d.preprocessed_body.as_deref().map(|s| truncate_chars(s, MAX_TEXT_CHARS)),
                    d.product_context,
                    d.product_label,
                ])
                .map_err(db_err)?;
            }
        }

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT OR REPLACE INTO topic_representative_docs (run_id, topic_id, rep_index, \
                     ticket_id, text) VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .map_err(db_err)?;
            for r in representative_docs {
                stmt.execute(params![
                    run_id,
                    r.topic_id,
                    r.rep_index,
                    r.ticket_id,
                    truncate_chars(&r.text, MAX_TEXT_CHARS),
                ])
                .map_err(db_err)?;
            }
        }

        // Drop children the new input no longer has.
        let topic_keys: Vec<i64> = topics.iter().map(|t| t.topic_id).collect();
        let doc_keys: Vec<i64> = documents.iter().map(|d| d.doc_index).collect();
        let rep_keys: Vec<String> = representative_docs
            .iter()
            .map(|r| format!("{}:{}", r.topic_id, r.rep_index))
            .collect();
        let pruned = tx
            .execute(
                "DELETE FROM topics WHERE run_id = ?1 \
                 AND topic_id NOT IN (SELECT value FROM json_each(?2))",
                params![run_id, serde_json::to_string(&topic_keys)?],
            )
            .map_err(db_err)?
            + tx.execute(
                "DELETE FROM topic_documents WHERE run_id = ?1 \
                 AND doc_index NOT IN (SELECT value FROM json_each(?2))",
                params![run_id, serde_json::to_string(&doc_keys)?],
            )
            .map_err(db_err)?
            + tx.execute(
                "DELETE FROM topic_representative_docs WHERE run_id = ?1 \
                 AND (topic_id || ':' || rep_index) NOT IN (SELECT value FROM json_each(?2))",
                params![run_id, serde_json::to_string(&rep_keys)?],
            )
            .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        info!(
            "Persisted run {}: {} topics, {} documents, {} representative docs ({} stale rows removed)",
            run_id,
            topics.len(),
            documents.len(),
            representative_docs.len(),
            pruned
        );
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT run_id, created_at, doc_count, topic_count, outlier_count, embedding_model, \
                 reduction_params, cluster_params, product_label, status FROM topic_runs WHERE run_id = ?1",
            )
            .map_err(db_err)?;
        let run = stmt
            .query_row(params![run_id], Self::row_to_run)
            .optional()
            .map_err(db_err)?;
        Ok(run)
    }

    /// All runs, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT run_id, created_at, doc_count, topic_count, outlier_count, embedding_model, \
                 reduction_params, cluster_params, product_label, status FROM topic_runs \
                 ORDER BY created_at DESC, run_id",
            )
            .map_err(db_err)?;
        let rows = stmt.query_map([], Self::row_to_run).map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    pub fn get_topics(&self, run_id: &str) -> Result<Vec<TopicRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT run_id, topic_id, label, description, keywords, doc_count, product_label \
                 FROM topics WHERE run_id = ?1 ORDER BY topic_id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                let keywords: String = row.get(4)?;
                Ok(TopicRecord {
                    run_id: row.get(0)?,
                    topic_id: row.get(1)?,
                    label: row.get(2)?,
                    description: row.get(3)?,
                    keywords: serde_json::from_str(&keywords).unwrap_or_default(),
                    doc_count: row.get(5)?,
                    product_label: row.get(6)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    pub fn get_documents(&self, run_id: &str) -> Result<Vec<DocumentRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT run_id, doc_index, ticket_id, topic_id, probability, text, created_at, region, \
                 status, subject, body, translated_body, preprocessed_body, product_context, product_label \
                 FROM topic_documents WHERE run_id = ?1 ORDER BY doc_index",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(DocumentRecord {
                    run_id: row.get(0)?,
                    doc_index: row.get(1)?,
                    ticket_id: row.get(2)?,
                    topic_id: row.get(3)?,
                    probability: row.get(4)?,
                    text: row.get(5)?,
                    created_at: row.get(6)?,
                    region: row.get(7)?,
                    status: row.get(8)?,
                    subject: row.get(9)?,
                    body: row.get(10)?,
                    translated_body: row.get(11)?,
                    preprocessed_body: row.get(12)?,
                    product_context: row.get(13)?,
                    product_label: row.get(14)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    pub fn get_representative_docs(&self, run_id: &str) -> Result<Vec<RepresentativeDocRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached(
                "SELECT run_id, topic_id, rep_index, ticket_id, text FROM topic_representative_docs \
                 WHERE run_id = ?1 ORDER BY topic_id, rep_index",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok(RepresentativeDocRecord {
                    run_id: row.get(0)?,
                    topic_id: row.get(1)?,
                    rep_index: row.get(2)?,
                    ticket_id: row.get(3)?,
                    text: row.get(4)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_err)
    }

    pub fn stats(&self) -> Result<ResultStats> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .map_err(db_err)
        };
        Ok(ResultStats {
            runs: count("topic_runs")?,
            topics: count("topics")?,
            documents: count("topic_documents")?,
            representative_docs: count("topic_representative_docs")?,
        })
    }

    fn row_to_run(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
        let created_at: String = row.get(1)?;
        let reduction: String = row.get(6)?;
        let cluster: String = row.get(7)?;
        let status: String = row.get(9)?;
        Ok(RunRecord {
            run_id: row.get(0)?,
            created_at: DateTime::parse_from_rfc3339(&created_at)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_default(),
            doc_count: row.get(2)?,
            topic_count: row.get(3)?,
            outlier_count: row.get(4)?,
            embedding_model: row.get(5)?,
            reduction_params: serde_json::from_str(&reduction).unwrap_or_default(),
            cluster_params: serde_json::from_str(&cluster).unwrap_or_default(),
            product_label: row.get(8)?,
            status: RunStatus::parse(&status),
        })
    }
}
