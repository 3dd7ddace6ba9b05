//! Configuration and data directory management.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::params::ModelParams;

/// Paths to all ticketscope data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Cache directory (`data/cache/`): raw snapshot and ticket cache.
    pub cache: PathBuf,
    /// Raw fetch snapshot (`data/cache/raw_tickets.json`).
    pub raw_snapshot: PathBuf,
    /// Result database directory (`data/results/`).
    pub results: PathBuf,
    /// Artifact output directory (`data/output/`).
    pub output: PathBuf,
    /// Embedding model directory (`data/models/`).
    pub models: PathBuf,
    /// Pipeline configuration (`data/pipeline-config.json`).
    pub pipeline_config_file: PathBuf,
    /// LLM configuration (`data/llm-config.json`).
    pub llm_config_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let cache = root.join("cache");
        let paths = Self {
            raw_snapshot: cache.join("raw_tickets.json"),
            cache,
            results: root.join("results"),
            output: root.join("output"),
            models: root.join("models"),
            pipeline_config_file: root.join("pipeline-config.json"),
            llm_config_file: root.join("llm-config.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.cache)?;
        std::fs::create_dir_all(&self.results)?;
        std::fs::create_dir_all(&self.output)?;
        Ok(())
    }
}

/// Operational toggles and tuning for one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// SQLite database holding the source view. Defaults to `data/source.db`.
    pub source_db: Option<PathBuf>,
    /// View (or table) the tickets are read from.
    pub source_view: String,
    /// Raw snapshot time-to-live in seconds.
    pub cache_ttl_secs: u64,
    /// Model each product group separately.
    pub per_product: bool,
    /// Ask the chat model for topic labels.
    pub labeling_enabled: bool,
    /// Run the LLM cleaning pass before the deterministic rules.
    pub cleaning_llm_enabled: bool,
    /// Most recent tickets kept for the global corpus.
    pub max_docs: Option<usize>,
    /// Most recent tickets kept per product group.
    pub max_docs_per_product: Option<usize>,
    /// Product groups smaller than this are dropped.
    pub min_product_group_size: usize,
    /// Only tickets created after this instant; overrides both caps.
    pub created_after: Option<DateTime<Utc>>,
    /// Concurrent product group runs.
    pub product_workers: usize,
    /// Concurrent per-ticket translation/cleaning calls.
    pub remote_concurrency: usize,
    /// Treat cached translation/cleaning fallbacks as misses.
    pub retry_fallbacks: bool,
    /// Tokens removed from every cleaned body, matched case-insensitively.
    pub strip_tokens: Vec<String>,
    /// Translation target language code.
    pub target_language: String,
    /// Fixed run id; generated from the clock when absent.
    pub run_id: Option<String>,
    /// Per-call timeout for remote adapters.
    pub request_timeout_secs: u64,
    /// Keywords passed to the labeler.
    pub label_keywords: usize,
    /// Representative snippets passed to the labeler.
    pub label_snippets: usize,
    pub model: ModelParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_db: None,
            source_view: "support_tickets_view".into(),
            cache_ttl_secs: 24 * 3600,
            per_product: false,
            labeling_enabled: true,
            cleaning_llm_enabled: true,
            max_docs: Some(5000),
            max_docs_per_product: Some(2000),
            min_product_group_size: 30,
            created_after: None,
            product_workers: 1,
            remote_concurrency: 4,
            retry_fallbacks: false,
            strip_tokens: vec![
                "sent from my iphone".into(),
                "this email originated from outside of the organization".into(),
                "[cid:image001.png]".into(),
            ],
            target_language: "EN-US".into(),
            run_id: None,
            request_timeout_secs: 60,
            label_keywords: 12,
            label_snippets: 10,
            model: ModelParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Load config from file, then apply `TICKETSCOPE_*` environment overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s).map_err(|e| {
                Error::Config(format!("{}: {}", config_path.display(), e))
            })?,
            Err(_) => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        info!(
            "Pipeline config: per_product={}, labeling={}, ttl={}s",
            config.per_product, config.labeling_enabled, config.cache_ttl_secs
        );
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<PathBuf>("TICKETSCOPE_SOURCE_DB")? {
            self.source_db = Some(v);
        }
        if let Ok(v) = std::env::var("TICKETSCOPE_SOURCE_VIEW") {
            self.source_view = v;
        }
        if let Some(v) = env_parse("TICKETSCOPE_CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = env_flag("TICKETSCOPE_PER_PRODUCT")? {
            self.per_product = v;
        }
        if let Some(v) = env_flag("TICKETSCOPE_LABELING")? {
            self.labeling_enabled = v;
        }
        if let Some(v) = env_flag("TICKETSCOPE_CLEANING_LLM")? {
            self.cleaning_llm_enabled = v;
        }
        if let Some(v) = env_parse("TICKETSCOPE_MAX_DOCS")? {
            self.max_docs = Some(v);
        }
        if let Some(v) = env_parse("TICKETSCOPE_MAX_DOCS_PER_PRODUCT")? {
            self.max_docs_per_product = Some(v);
        }
        if let Some(v) = env_parse("TICKETSCOPE_MIN_PRODUCT_GROUP_SIZE")? {
            self.min_product_group_size = v;
        }
        if let Some(v) = env_parse("TICKETSCOPE_TARGET_TOPICS")? {
            self.model.target_topics = Some(v);
        }
        if let Ok(v) = std::env::var("TICKETSCOPE_CREATED_AFTER") {
            self.created_after = Some(parse_created_after(&v)?);
        }
        if let Some(v) = env_parse("TICKETSCOPE_PRODUCT_WORKERS")? {
            self.product_workers = v;
        }
        if let Some(v) = env_parse("TICKETSCOPE_REMOTE_CONCURRENCY")? {
            self.remote_concurrency = v;
        }
        if let Some(v) = env_flag("TICKETSCOPE_RETRY_FALLBACKS")? {
            self.retry_fallbacks = v;
        }
        if let Ok(v) = std::env::var("TICKETSCOPE_RUN_ID") {
            self.run_id = Some(v);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.product_workers == 0 {
            return Err(Error::Config("product_workers must be > 0".into()));
        }
        if self.remote_concurrency == 0 {
            return Err(Error::Config("remote_concurrency must be > 0".into()));
        }
        if self.model.min_documents == 0 {
            return Err(Error::Config("model.min_documents must be > 0".into()));
        }
        if self.model.target_topics == Some(0) {
            warn!("target_topics=0 ignored");
        }
        Ok(())
    }

    /// Source database path, defaulting under the data root.
    pub fn source_db_path(&self, paths: &DataPaths) -> PathBuf {
        self.source_db
            .clone()
            .unwrap_or_else(|| paths.root.join("source.db"))
    }
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_created_after(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::Config(format!("Invalid created_after: {}", value)))
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("Invalid value for {}: {}", name, v))),
        Err(_) => Ok(None),
    }
}

fn env_flag(name: &str) -> Result<Option<bool>> {
    match std::env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(Error::Config(format!("Invalid flag for {}: {}", name, v))),
        },
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path()).unwrap();
        assert!(paths.cache.is_dir());
        assert!(paths.results.is_dir());
        assert!(paths.output.is_dir());
        assert_eq!(paths.raw_snapshot, dir.path().join("cache/raw_tickets.json"));
    }

    #[test]
    fn test_partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline-config.json");
        std::fs::write(&path, r#"{"per_product": true, "min_product_group_size": 5}"#).unwrap();

        let config: PipelineConfig =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(config.per_product);
        assert_eq!(config.min_product_group_size, 5);
        assert_eq!(config.source_view, "support_tickets_view");
        assert_eq!(config.model.min_documents, 5);
    }

    #[test]
    fn test_parse_created_after() {
        let day = parse_created_after("2024-03-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        let ts = parse_created_after("2024-03-01T12:30:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:00+00:00");
        assert!(parse_created_after("yesterday").is_err());
    }
}
