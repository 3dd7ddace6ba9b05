//! Data directory validation: checks the source view, result store,
//! ticket cache and raw snapshot before a run.
//!
//! Everything is opened read-only; nothing is created or migrated here.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use ticketscope_core::{DataPaths, PipelineConfig};
use ticketscope_llm::LLMConfig;
use ticketscope_store::migrate::{column_names, schema_version, table_exists};
use ticketscope_store::schema::{DOCUMENT_COLUMNS, SCHEMA_VERSION};
use ticketscope_store::{RawFetchCache, SOURCE_COLUMNS};

const RESULT_TABLES: &[&str] = &["topic_runs", "topics", "topic_documents", "topic_representative_docs"];

/// Outcome of validating one data directory.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub source_valid: bool,
    pub source_tickets: i64,
    pub runs: i64,
    pub topics: i64,
    pub documents: i64,
    pub schema_version: Option<i64>,
    pub cache_entries: i64,
    pub snapshot: Option<(DateTime<Utc>, usize)>,
    pub translation_configured: bool,
    pub chat_configured: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.source_valid && self.errors.is_empty()
    }
}

/// Validate `data_dir` against the pipeline configuration found in it.
pub fn validate(data_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    let config_file = data_dir.join("pipeline-config.json");
    let config = match std::fs::read_to_string(&config_file) {
        Ok(s) => match serde_json::from_str::<PipelineConfig>(&s) {
            Ok(c) => c,
            Err(e) => {
                report.errors.push(format!("Invalid {}: {}", config_file.display(), e));
                return report;
            }
        },
        Err(_) => {
            report.warnings.push("No pipeline-config.json found; using defaults".to_string());
            PipelineConfig::default()
        }
    };
    let paths = layout(data_dir);

    check_source(&config.source_db_path(&paths), &config.source_view, &mut report);
    check_results(&paths.results.join("ticketscope.db"), &mut report);
    check_cache(&paths.cache.join("ticket_cache.db"), &mut report);

    match RawFetchCache::new(&paths.raw_snapshot).load() {
        Some(snapshot) => report.snapshot = Some((snapshot.fetched_at, snapshot.tickets.len())),
        None => report.warnings.push("No raw snapshot; the next run will fetch".to_string()),
    }

    if paths.llm_config_file.exists() {
        let llm = LLMConfig::load(&paths.llm_config_file);
        report.translation_configured = llm.deepl_api_key.is_some();
        report.chat_configured = llm.resolve_provider().is_some();
    } else {
        report.warnings.push("No llm-config.json found".to_string());
    }

    report
}

/// `DataPaths` layout without creating any directory.
fn layout(root: &Path) -> DataPaths {
    let cache = root.join("cache");
    DataPaths {
        raw_snapshot: cache.join("raw_tickets.json"),
        cache,
        results: root.join("results"),
        output: root.join("output"),
        models: root.join("models"),
        pipeline_config_file: root.join("pipeline-config.json"),
        llm_config_file: root.join("llm-config.json"),
        root: root.to_path_buf(),
    }
}

fn open_read_only(path: &Path) -> Result<Connection, String> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| format!("Failed to open {}: {}", path.display(), e))
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        .unwrap_or(0)
}

fn check_source(db_path: &Path, view: &str, report: &mut ValidationReport) {
    if !db_path.exists() {
        report.errors.push(format!("Source database not found: {}", db_path.display()));
        return;
    }
    let conn = match open_read_only(db_path) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(e);
            return;
        }
    };
    let columns = match column_names(&conn, view) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(format!("Cannot inspect source view {}: {}", view, e));
            return;
        }
    };
    if columns.is_empty() {
        report.errors.push(format!("Source view not found: {}", view));
        return;
    }
    for col in SOURCE_COLUMNS {
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(col)) {
            report.errors.push(format!("{} missing column: {}", view, col));
        }
    }
    if report.errors.is_empty() {
        report.source_valid = true;
        report.source_tickets = count_rows(&conn, view);
    }
}

fn check_results(db_path: &Path, report: &mut ValidationReport) {
    if !db_path.exists() {
        report.warnings.push("No result database yet; it is created on the first run".to_string());
        return;
    }
    let conn = match open_read_only(db_path) {
        Ok(c) => c,
        Err(e) => {
            report.errors.push(e);
            return;
        }
    };
    for table in RESULT_TABLES {
        match table_exists(&conn, table) {
            Ok(true) => {}
            Ok(false) => report.errors.push(format!("Missing result table: {}", table)),
            Err(e) => report.errors.push(format!("Error checking table {}: {}", table, e)),
        }
    }
    if !report.errors.is_empty() {
        return;
    }

    let version = schema_version(&conn).unwrap_or(0);
    report.schema_version = Some(version);
    if version < SCHEMA_VERSION {
        report.warnings.push(format!(
            "Result schema version {} is older than {}; it is upgraded on the next run",
            version, SCHEMA_VERSION
        ));
    }
    let columns = column_names(&conn, "topic_documents").unwrap_or_default();
    let missing: Vec<&str> = DOCUMENT_COLUMNS
        .iter()
        .map(|(name, _)| *name)
        .filter(|name| !columns.iter().any(|c| c.eq_ignore_ascii_case(name)))
        .collect();
    if !missing.is_empty() {
        report.warnings.push(format!("topic_documents lacks columns: {}", missing.join(", ")));
    }

    report.runs = count_rows(&conn, "topic_runs");
    report.topics = count_rows(&conn, "topics");
    report.documents = count_rows(&conn, "topic_documents");
    debug!("Validated result store {}", db_path.display());
}

fn check_cache(db_path: &Path, report: &mut ValidationReport) {
    if !db_path.exists() {
        return;
    }
    match open_read_only(db_path) {
        Ok(conn) => report.cache_entries = count_rows(&conn, "ticket_cache"),
        Err(e) => report.warnings.push(e),
    }
}

pub fn print_report(report: &ValidationReport) {
    println!("=== ticketscope Validation Report ===");
    println!();
    println!("Source valid:       {}", if report.source_valid { "YES" } else { "NO" });
    println!("Source tickets:     {}", report.source_tickets);
    match report.snapshot {
        Some((at, n)) => println!("Raw snapshot:       {} tickets from {}", n, at.to_rfc3339()),
        None => println!("Raw snapshot:       none"),
    }
    println!("Cached tickets:     {}", report.cache_entries);
    println!(
        "Result schema:      {}",
        report.schema_version.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
    );
    println!("Runs:               {}", report.runs);
    println!("Topics:             {}", report.topics);
    println!("Documents:          {}", report.documents);
    println!("Translation:        {}", if report.translation_configured { "configured" } else { "disabled" });
    println!("Chat model:         {}", if report.chat_configured { "configured" } else { "disabled" });

    if !report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &report.warnings {
            println!("  - {}", w);
        }
    }

    if !report.errors.is_empty() {
        println!();
        println!("Errors:");
        for e in &report.errors {
            println!("  - {}", e);
        }
    }

    println!();
    if report.is_ok() {
        println!("Status: READY");
    } else {
        println!("Status: INVALID");
    }
}
