//! Database schema SQL for the ticket cache and the result store.

/// Bumped whenever a column is appended to a versioned column list below.
pub const SCHEMA_VERSION: i64 = 3;

/// Per-ticket translation/cleaning cache. One row per ticket, updated in place.
pub const TICKET_CACHE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS ticket_cache (
    ticket_id TEXT PRIMARY KEY,
    translated_body TEXT,
    preprocessed_body TEXT,
    updated_at INTEGER NOT NULL
);
"#;

/// Columns appended to `ticket_cache` after its first release.
pub const TICKET_CACHE_COLUMNS: &[(&str, &str)] = &[
    ("cleaning_attempted", "INTEGER NOT NULL DEFAULT 0"),
    ("translation_fallback", "INTEGER NOT NULL DEFAULT 0"),
    ("cleaning_fallback", "INTEGER NOT NULL DEFAULT 0"),
];

/// Result tables. `topic_documents` is created with its key columns only;
/// the descriptive columns come from [`DOCUMENT_COLUMNS`].
pub const RESULTS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS topic_runs (
    run_id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    doc_count INTEGER NOT NULL,
    topic_count INTEGER NOT NULL,
    outlier_count INTEGER NOT NULL,
    embedding_model TEXT NOT NULL,
    reduction_params TEXT NOT NULL,
    cluster_params TEXT NOT NULL,
    product_label TEXT,
    status TEXT NOT NULL DEFAULT 'completed'
);

CREATE TABLE IF NOT EXISTS topics (
    run_id TEXT NOT NULL,
    topic_id INTEGER NOT NULL,
    label TEXT NOT NULL,
    description TEXT NOT NULL,
    keywords TEXT NOT NULL,
    doc_count INTEGER NOT NULL,
    product_label TEXT,
    PRIMARY KEY (run_id, topic_id)
);

CREATE TABLE IF NOT EXISTS topic_documents (
    run_id TEXT NOT NULL,
    doc_index INTEGER NOT NULL,
    ticket_id TEXT NOT NULL,
    topic_id INTEGER NOT NULL,
    probability REAL NOT NULL,
    text TEXT NOT NULL,
    PRIMARY KEY (run_id, doc_index)
);

CREATE TABLE IF NOT EXISTS topic_representative_docs (
    run_id TEXT NOT NULL,
    topic_id INTEGER NOT NULL,
    rep_index INTEGER NOT NULL,
    ticket_id TEXT,
    text TEXT NOT NULL,
    PRIMARY KEY (run_id, topic_id, rep_index)
);

CREATE INDEX IF NOT EXISTS idx_topic_documents_topic ON topic_documents(run_id, topic_id);
CREATE INDEX IF NOT EXISTS idx_topic_documents_ticket ON topic_documents(ticket_id);
"#;

/// Descriptive document columns, in the order they were introduced.
/// Older databases are brought forward by adding whatever is missing.
pub const DOCUMENT_COLUMNS: &[(&str, &str)] = &[
    ("created_at", "TEXT"),
    ("region", "TEXT"),
    ("status", "TEXT"),
    ("subject", "TEXT"),
    ("body", "TEXT"),
    ("translated_body", "TEXT"),
    ("preprocessed_body", "TEXT"),
    ("product_context", "TEXT"),
    ("product_label", "TEXT"),
];

/// Tables a result database must contain to be usable.
pub const RESULT_TABLES: &[&str] = &[
    "topic_runs",
    "topics",
    "topic_documents",
    "topic_representative_docs",
];
