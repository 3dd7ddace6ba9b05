//! Orchestrator: runs one pipeline invocation from fetch to persistence.
//!
//! Stage order is fixed: fetch → select → translate → clean → group →
//! model per group → label per topic → persist + artifacts. Only a fetch
//! with no snapshot to fall back on, and a failing store, abort a run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::artifacts::ArtifactWriter;
use crate::types::*;
use crate::writer::ResultWriter;
use ticketscope_core::{DataPaths, Error, ModelParams, PipelineConfig, Result, Ticket};
use ticketscope_infer::{create_embedder, LocalTopicBackend, TopicBackend};
use ticketscope_ingest::{Cleanser, ProductGrouper, TokenStripper, Translator};
use ticketscope_llm::{ChatCompletion, DeepLClient, HttpChatClient, LLMConfig, TranslationService};
use ticketscope_store::{
    DocumentRecord, RawFetchCache, RepresentativeDocRecord, ResultStore, RunRecord, RunStatus, SqliteTicketSource,
    TicketCache, TicketSource, TopicRecord,
};
use ticketscope_topics::{Corpus, ModelStatus, TopicLabeler, TopicModelOutput, TopicModelRunner};

/// External collaborators of a pipeline. Remote adapters are optional;
/// `None` routes every call of that kind to its fallback.
pub struct Services {
    pub source: Arc<dyn TicketSource>,
    pub translation: Option<Arc<dyn TranslationService>>,
    pub chat: Option<Arc<dyn ChatCompletion>>,
    pub backend: Arc<dyn TopicBackend>,
}

impl Services {
    /// Production wiring: SQLite source view, DeepL, the configured chat
    /// provider and the local topic backend.
    pub fn from_config(config: &PipelineConfig, llm: &LLMConfig, paths: &DataPaths) -> Result<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let source = SqliteTicketSource::new(config.source_db_path(paths), config.source_view.clone())?;

        let translation = DeepLClient::from_config(llm, timeout)?.map(|c| Arc::new(c) as Arc<dyn TranslationService>);
        if translation.is_none() {
            info!("No translation key configured; translation disabled");
        }
        let chat = HttpChatClient::from_config(llm, timeout)?.map(|c| Arc::new(c) as Arc<dyn ChatCompletion>);
        if chat.is_none() {
            info!("No chat provider configured; cleaning and labeling use fallbacks");
        }

        Ok(Self {
            source: Arc::new(source),
            translation,
            chat,
            backend: Arc::new(LocalTopicBackend::new(create_embedder(&paths.models))),
        })
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    paths: DataPaths,
    services: Services,
    label_base_delay: Duration,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, paths: DataPaths, services: Services) -> Self {
        Self {
            config,
            paths,
            services,
            label_base_delay: Duration::from_secs(1),
        }
    }

    /// Base delay of the labeling backoff.
    pub fn with_label_base_delay(mut self, delay: Duration) -> Self {
        self.label_base_delay = delay;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline once. `refresh` discards the raw snapshot first.
    pub async fn run(&self, refresh: bool) -> Result<PipelineReport> {
        let raw_cache = RawFetchCache::new(&self.paths.raw_snapshot);
        if refresh && raw_cache.invalidate()? {
            info!("Raw snapshot discarded: {}", self.paths.raw_snapshot.display());
        }
        let ticket_cache = Arc::new(TicketCache::open(&self.paths.cache)?);
        let store = ResultStore::open(&self.paths.results)?;

        let source = Arc::clone(&self.services.source);
        let ttl = Duration::from_secs(self.config.cache_ttl_secs);
        let (tickets, fetched_at) = tokio::task::spawn_blocking(move || raw_cache.get_or_fetch(source.as_ref(), ttl))
            .await
            .map_err(|e| Error::Internal(format!("Fetch task failed: {}", e)))??;
        let fetched = tickets.len();

        let mut tickets = select(tickets, &self.config);
        let selected = tickets.len();
        info!(
            "Selected {} of {} tickets (snapshot from {})",
            selected, fetched, fetched_at
        );

        let translator = Arc::new(
            Translator::new(
                self.services.translation.clone(),
                Arc::clone(&ticket_cache),
                self.config.target_language.clone(),
            )
            .with_retry_fallbacks(self.config.retry_fallbacks)
            .with_workers(self.config.remote_concurrency),
        );
        let translation = translator.translate_all(&mut tickets).await?;

        let cleaning_chat = if self.config.cleaning_llm_enabled {
            self.services.chat.clone()
        } else {
            None
        };
        let cleanser = Arc::new(
            Cleanser::new(
                cleaning_chat,
                ticket_cache,
                TokenStripper::new(self.config.strip_tokens.as_slice()),
            )
            .with_retry_fallbacks(self.config.retry_fallbacks)
            .with_workers(self.config.remote_concurrency),
        );
        let cleaning = cleanser.clean_all(&mut tickets).await?;

        let groups = self.partition(tickets);
        let base_run_id = self
            .config
            .run_id
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y%m%d_%H%M%S").to_string());

        let (writer, writer_task) = ResultWriter::spawn(store);
        let labeling_chat = if self.config.labeling_enabled {
            self.services.chat.clone()
        } else {
            None
        };
        let ctx = Arc::new(GroupContext {
            runner: Arc::new(TopicModelRunner::new(Arc::clone(&self.services.backend))),
            labeler: TopicLabeler::new(labeling_chat)
                .with_base_delay(self.label_base_delay)
                .with_prompt_sizes(self.config.label_keywords, self.config.label_snippets),
            writer,
            artifacts: ArtifactWriter::new(&self.paths.output),
            params: self.config.model.clone(),
            base_run_id,
        });

        let runs = run_groups(ctx, groups, self.config.product_workers).await;
        let committed = writer_task.join().await?;
        let runs = runs?;
        info!("Pipeline finished: {} runs persisted", committed);

        Ok(PipelineReport {
            fetched,
            selected,
            translation,
            cleaning,
            runs,
        })
    }

    /// One unlabeled group in global mode, one group per kept product otherwise.
    fn partition(&self, tickets: Vec<Ticket>) -> Vec<(Option<String>, Vec<Ticket>)> {
        if !self.config.per_product {
            return vec![(None, tickets)];
        }
        let groups: Vec<_> = ProductGrouper::new(self.config.min_product_group_size)
            .group(tickets)
            .into_iter()
            .map(|(label, members)| (Some(label), members))
            .collect();
        if groups.is_empty() {
            warn!("No product group reached {} tickets", self.config.min_product_group_size);
            // Still leave a run record behind.
            return vec![(None, Vec::new())];
        }
        groups
    }
}

/// Apply the date filter or the document caps to a fetched snapshot.
///
/// Newest tickets are kept. With `created_after` set, every ticket newer
/// than the cutoff is kept and the caps do not apply. In per-product mode
/// the cap applies per product label instead of globally.
pub fn select(mut tickets: Vec<Ticket>, config: &PipelineConfig) -> Vec<Ticket> {
    // Newest first, undated last.
    tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    if config.per_product {
        ProductGrouper::assign_labels(&mut tickets);
    }

    if let Some(cutoff) = config.created_after {
        tickets.retain(|t| t.created_at.is_some_and(|c| c > cutoff));
        return tickets;
    }

    if config.per_product {
        if let Some(cap) = config.max_docs_per_product {
            let mut kept: HashMap<String, usize> = HashMap::new();
            tickets.retain(|t| {
                let n = kept.entry(t.product_label.clone().unwrap_or_default()).or_default();
                *n += 1;
                *n <= cap
            });
        }
    } else if let Some(cap) = config.max_docs {
        tickets.truncate(cap);
    }
    tickets
}

/// Run id suffix for a product label.
pub fn product_slug(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

struct GroupContext {
    runner: Arc<TopicModelRunner>,
    labeler: TopicLabeler,
    writer: ResultWriter,
    artifacts: ArtifactWriter,
    params: ModelParams,
    base_run_id: String,
}

/// Run every group on a pool of `workers` tasks. Groups write disjoint run
/// ids, so one failing group does not stop its siblings; the first error is
/// returned once all have finished.
async fn run_groups(
    ctx: Arc<GroupContext>,
    groups: Vec<(Option<String>, Vec<Ticket>)>,
    workers: usize,
) -> Result<Vec<RunReport>> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for (idx, (product, tickets)) in groups.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        let permits = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            ctx.run_group(product, tickets).await.map(|report| (idx, report))
        });
    }
    // The writer stops once the last context is gone.
    drop(ctx);

    let mut reports = Vec::new();
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let result = joined
            .map_err(|e| Error::Internal(format!("Group task failed: {}", e)))
            .and_then(|r| r);
        match result {
            Ok(item) => reports.push(item),
            Err(e) => {
                error!("Group run failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
    }
    if let Some(e) = first_error {
        return Err(e);
    }
    reports.sort_by_key(|(idx, _)| *idx);
    Ok(reports.into_iter().map(|(_, report)| report).collect())
}

impl GroupContext {
    async fn run_group(&self, product: Option<String>, tickets: Vec<Ticket>) -> Result<RunReport> {
        let run_id = match &product {
            Some(label) => format!("{}_{}", self.base_run_id, product_slug(label)),
            None => self.base_run_id.clone(),
        };
        let embedding_model = self.runner.embedding_model();

        let runner = Arc::clone(&self.runner);
        let params = self.params.clone();
        let (tickets, modeled) = tokio::task::spawn_blocking(move || {
            let modeled = runner.run(&tickets, &params);
            (tickets, modeled)
        })
        .await
        .map_err(|e| Error::Internal(format!("Modeling task failed: {}", e)))?;

        let (status, output) = match modeled {
            Ok(out) => {
                let status = match out.status {
                    ModelStatus::Completed => RunStatus::Completed,
                    ModelStatus::SkippedSmallCorpus => RunStatus::SkippedSmallCorpus,
                };
                (status, Some(out))
            }
            Err(e) => {
                error!("Topic model failed for run {}: {}", run_id, e);
                (RunStatus::ModelFailed, None)
            }
        };

        let mut topics = Vec::new();
        let mut representative_docs = Vec::new();
        let mut label_fallbacks = 0;
        if let Some(out) = &output {
            for topic in &out.topics {
                let reps: Vec<usize> = topic
                    .representative_docs
                    .iter()
                    .copied()
                    .filter(|i| *i < out.corpus.len())
                    .collect();
                let snippets: Vec<&str> = reps.iter().map(|i| out.corpus.docs[*i].as_str()).collect();

                let outcome = self.labeler.label(topic.topic_id, &topic.keywords, &snippets).await;
                if outcome.is_fallback() && !topic.is_outlier() {
                    label_fallbacks += 1;
                }
                let label = outcome.into_value();

                for (rep_index, doc) in reps.iter().enumerate() {
                    representative_docs.push(RepresentativeDocRecord {
                        run_id: run_id.clone(),
                        topic_id: topic.topic_id,
                        rep_index: rep_index as i64,
                        ticket_id: Some(tickets[out.corpus.ticket_indices[*doc]].ticket_id.clone()),
                        text: out.corpus.docs[*doc].clone(),
                    });
                }
                topics.push(TopicRecord {
                    run_id: run_id.clone(),
                    topic_id: topic.topic_id,
                    label: label.label,
                    description: label.description,
                    keywords: topic.keywords.clone(),
                    doc_count: topic.size as i64,
                    product_label: product.clone(),
                });
            }
        }

        let (doc_count, topic_count, outlier_count) = match &output {
            Some(out) => (out.corpus.len(), out.topic_count(), out.outlier_count()),
            None => (Corpus::build(&tickets).len(), 0, 0),
        };
        let documents = match &output {
            Some(out) => document_records(&run_id, &tickets, out),
            None => Vec::new(),
        };
        let batch = RunBatch {
            run: RunRecord {
                run_id: run_id.clone(),
                created_at: Utc::now(),
                doc_count: doc_count as i64,
                topic_count: topic_count as i64,
                outlier_count: outlier_count as i64,
                embedding_model,
                reduction_params: serde_json::to_value(&self.params.reduction)?,
                cluster_params: serde_json::to_value(&self.params.clustering)?,
                product_label: product.clone(),
                status,
            },
            topics,
            documents,
            representative_docs,
        };

        let output_dir = match self.artifacts.write(&batch.run, &batch.topics, &batch.documents) {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!("Writing artifacts for run {} failed: {}", run_id, e);
                None
            }
        };
        self.writer.persist(batch).await?;

        info!(
            "Run {} {}: {} documents, {} topics, {} outliers, {} label fallbacks",
            run_id, status, doc_count, topic_count, outlier_count, label_fallbacks
        );
        Ok(RunReport {
            run_id,
            product_label: product,
            status,
            doc_count,
            topic_count,
            outlier_count,
            label_fallbacks,
            output_dir,
        })
    }
}

fn document_records(run_id: &str, tickets: &[Ticket], out: &TopicModelOutput) -> Vec<DocumentRecord> {
    out.corpus
        .docs
        .iter()
        .zip(&out.corpus.ticket_indices)
        .enumerate()
        .filter_map(|(doc_index, (text, ticket_idx))| {
            let topic_id = *out.assignments.get(doc_index)?;
            let ticket = &tickets[*ticket_idx];
            Some(DocumentRecord {
                run_id: run_id.to_string(),
                doc_index: doc_index as i64,
                ticket_id: ticket.ticket_id.clone(),
                topic_id,
                probability: out.probabilities.get(doc_index).copied().unwrap_or(0.0),
                text: text.clone(),
                created_at: ticket.created_at.map(|c| c.to_rfc3339()),
                region: ticket.region.clone(),
                status: ticket.status.clone(),
                subject: ticket.subject.clone(),
                body: Some(ticket.body.clone()),
                translated_body: ticket.translated_body.clone(),
                preprocessed_body: ticket.preprocessed_body.clone(),
                product_context: ticket.product_context.clone(),
                product_label: ticket.product_label.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use ndarray::Array2;
    use ticketscope_infer::{FittedTopic, TopicFit};
    use ticketscope_llm::{ChatMessage, CompletionOptions};
    use ticketscope_core::OUTLIER_TOPIC;

    struct VecSource {
        tickets: Vec<Ticket>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl TicketSource for VecSource {
        fn fetch_all(&self) -> Result<Vec<Ticket>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Fetch("connection refused".into()));
            }
            Ok(self.tickets.clone())
        }

        fn describe(&self) -> String {
            "memory".into()
        }
    }

    #[derive(Default)]
    struct EchoTranslation {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranslationService for EchoTranslation {
        async fn translate(&self, text: &str, _target_lang: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.to_string())
        }
    }

    /// Echoes cleaning requests; answers labeling requests with fixed JSON.
    #[derive(Default)]
    struct StubChat {
        cleaning: AtomicUsize,
        labeling: AtomicUsize,
    }

    #[async_trait]
    impl ChatCompletion for StubChat {
        async fn complete(&self, messages: &[ChatMessage], options: CompletionOptions) -> Result<String> {
            if options.temperature > 0.0 {
                self.labeling.fetch_add(1, Ordering::SeqCst);
                return Ok("```json\n{\"label\": \"Stub topic\", \"description\": \"Stub.\"}\n```".into());
            }
            self.cleaning.fetch_add(1, Ordering::SeqCst);
            Ok(messages.last().map(|m| m.content.clone()).unwrap_or_default())
        }

        fn model(&self) -> String {
            "stub".into()
        }
    }

    /// Topic 0 for documents mentioning pdf, 1 for license, outlier otherwise.
    struct KeywordBackend {
        fail: bool,
    }

    impl TopicBackend for KeywordBackend {
        fn fit(&self, docs: &[String], _params: &ModelParams) -> Result<TopicFit> {
            if self.fail {
                return Err(Error::Inference("embedding model crashed".into()));
            }
            let assignments: Vec<i64> = docs
                .iter()
                .map(|d| match (d.contains("pdf"), d.contains("license")) {
                    (true, _) => 0,
                    (_, true) => 1,
                    _ => OUTLIER_TOPIC,
                })
                .collect();
            let mut topics = Vec::new();
            for (id, word) in [(OUTLIER_TOPIC, "misc"), (0, "pdf"), (1, "license")] {
                let members: Vec<usize> = (0..docs.len()).filter(|i| assignments[*i] == id).collect();
                if members.is_empty() {
                    continue;
                }
                topics.push(FittedTopic {
                    topic_id: id,
                    size: members.len(),
                    keywords: vec![(word.to_string(), 1.0)],
                    representative_docs: members.into_iter().take(3).collect(),
                });
            }
            Ok(TopicFit {
                probabilities: vec![0.9; docs.len()],
                assignments,
                topics,
                reduced: Array2::zeros((docs.len(), 2)),
            })
        }

        fn reduce_topics(&self, _docs: &[String], fit: TopicFit, _target: usize, _params: &ModelParams) -> Result<TopicFit> {
            Ok(fit)
        }

        fn model_name(&self) -> String {
            "keyword-test".into()
        }
    }

    fn corpus_tickets(product: &str, n: usize, offset: usize) -> Vec<Ticket> {
        (0..n)
            .map(|i| {
                let body = match i % 2 {
                    0 => format!("pdf export crashes on page {}", i),
                    _ => format!("license activation fails with code {}", i),
                };
                Ticket::new(format!("T-{}", offset + i), body)
                    .with_product_context(product)
                    .with_created_at(Utc.timestamp_opt(1_700_000_000 + (offset + i) as i64, 0).unwrap())
            })
            .collect()
    }

    struct Harness {
        _dir: tempfile::TempDir,
        paths: DataPaths,
        source: Arc<VecSource>,
        translation: Arc<EchoTranslation>,
        chat: Arc<StubChat>,
    }

    impl Harness {
        fn new(tickets: Vec<Ticket>, fail_fetch: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let paths = DataPaths::new(dir.path()).unwrap();
            Self {
                _dir: dir,
                paths,
                source: Arc::new(VecSource {
                    tickets,
                    fail: fail_fetch,
                    calls: AtomicUsize::new(0),
                }),
                translation: Arc::new(EchoTranslation::default()),
                chat: Arc::new(StubChat::default()),
            }
        }

        fn pipeline(&self, config: PipelineConfig, fail_model: bool) -> Pipeline {
            let services = Services {
                source: self.source.clone() as Arc<dyn TicketSource>,
                translation: Some(self.translation.clone() as Arc<dyn TranslationService>),
                chat: Some(self.chat.clone() as Arc<dyn ChatCompletion>),
                backend: Arc::new(KeywordBackend { fail: fail_model }),
            };
            Pipeline::new(config, self.paths.clone(), services).with_label_base_delay(Duration::ZERO)
        }

        fn store(&self) -> ResultStore {
            ResultStore::open(&self.paths.results).unwrap()
        }
    }

    fn config(run_id: &str) -> PipelineConfig {
        PipelineConfig {
            run_id: Some(run_id.into()),
            ..PipelineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rerun_is_cached_and_idempotent() {
        let mut tickets = corpus_tickets("desktop", 12, 0);
        tickets.push(Ticket::new("T-blank", "   "));
        let h = Harness::new(tickets, false);

        let first = h.pipeline(config("run1"), false).run(false).await.unwrap();
        assert_eq!(first.fetched, 13);
        assert_eq!(first.runs.len(), 1);
        let run = &first.runs[0];
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.doc_count, 12);
        assert_eq!(run.topic_count, 2);
        assert_eq!(run.label_fallbacks, 0);
        assert_eq!(h.translation.calls.load(Ordering::SeqCst), 12);
        assert_eq!(h.chat.labeling.load(Ordering::SeqCst), 2);
        let stats = h.store().stats().unwrap();

        let second = h.pipeline(config("run1"), false).run(false).await.unwrap();
        assert_eq!(h.source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.translation.calls.load(Ordering::SeqCst), 12);
        assert_eq!(second.translation.remote, 0);
        assert_eq!(second.cleaning.remote, 0);
        assert_eq!(h.chat.cleaning.load(Ordering::SeqCst), 12);
        assert_eq!(h.store().stats().unwrap(), stats);

        let store = h.store();
        let topics = store.get_topics("run1").unwrap();
        assert_eq!(topics.iter().map(|t| t.label.as_str()).collect::<Vec<_>>(), ["Stub topic", "Stub topic"]);
        assert_eq!(store.get_documents("run1").unwrap().len(), 12);
        assert!(h.paths.output.join("run1").join("topic_info.csv").is_file());
    }

    #[tokio::test]
    async fn test_per_product_runs_are_independent() {
        let mut tickets = corpus_tickets("AI_Plugin_v2", 6, 0);
        tickets.extend(corpus_tickets("figma web", 6, 100));
        tickets.extend(corpus_tickets("billing portal", 2, 200));
        let h = Harness::new(tickets, false);

        let config = PipelineConfig {
            per_product: true,
            min_product_group_size: 3,
            product_workers: 2,
            labeling_enabled: false,
            ..config("run2")
        };
        let report = h.pipeline(config, false).run(false).await.unwrap();

        let ids: Vec<&str> = report.runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, ["run2_figmaplugin", "run2_illustratorplugin"]);
        assert_eq!(h.chat.labeling.load(Ordering::SeqCst), 0);

        let store = h.store();
        assert_eq!(store.list_runs().unwrap().len(), 2);
        let topics = store.get_topics("run2_illustratorplugin").unwrap();
        assert!(topics.iter().all(|t| t.product_label.as_deref() == Some("IllustratorPlugin")));
        assert_eq!(topics[0].label, "pdf");
        assert!(store.get_run("run2_billing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enabling_cleaning_model_reprocesses_tickets() {
        let h = Harness::new(corpus_tickets("desktop", 8, 0), false);
        let disabled = PipelineConfig {
            cleaning_llm_enabled: false,
            labeling_enabled: false,
            ..config("run6")
        };
        let first = h.pipeline(disabled.clone(), false).run(false).await.unwrap();
        assert_eq!(first.cleaning.fallback, 8);
        assert_eq!(h.chat.cleaning.load(Ordering::SeqCst), 0);

        let enabled = PipelineConfig {
            cleaning_llm_enabled: true,
            ..disabled
        };
        let second = h.pipeline(enabled, false).run(false).await.unwrap();
        assert_eq!(second.cleaning.remote, 8);
        assert_eq!(h.chat.cleaning.load(Ordering::SeqCst), 8);
        assert_eq!(h.chat.labeling.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_failure_still_records_run() {
        let h = Harness::new(corpus_tickets("desktop", 8, 0), false);
        let report = h.pipeline(config("run3"), true).run(false).await.unwrap();
        assert_eq!(report.runs[0].status, RunStatus::ModelFailed);

        let run = h.store().get_run("run3").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::ModelFailed);
        assert_eq!(run.topic_count, 0);
        assert_eq!(run.doc_count, 8);
    }

    #[tokio::test]
    async fn test_small_corpus_records_zero_topic_run() {
        let h = Harness::new(corpus_tickets("desktop", 3, 0), false);
        let report = h.pipeline(config("run4"), false).run(false).await.unwrap();
        assert_eq!(report.runs[0].status, RunStatus::SkippedSmallCorpus);
        assert_eq!(h.store().get_run("run4").unwrap().unwrap().topic_count, 0);
        assert_eq!(h.chat.labeling.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_snapshot_is_fatal() {
        let h = Harness::new(Vec::new(), true);
        let err = h.pipeline(config("run5"), false).run(false).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[test]
    fn test_created_after_overrides_cap() {
        let tickets = corpus_tickets("desktop", 10, 0);
        let capped = select(
            tickets.clone(),
            &PipelineConfig {
                max_docs: Some(3),
                ..PipelineConfig::default()
            },
        );
        assert_eq!(
            capped.iter().map(|t| t.ticket_id.as_str()).collect::<Vec<_>>(),
            ["T-9", "T-8", "T-7"]
        );

        let cutoff = Utc.timestamp_opt(1_700_000_001, 0).unwrap();
        let filtered = select(
            tickets,
            &PipelineConfig {
                max_docs: Some(3),
                created_after: Some(cutoff),
                ..PipelineConfig::default()
            },
        );
        assert_eq!(filtered.len(), 8);
    }

    #[test]
    fn test_per_product_cap() {
        let mut tickets = corpus_tickets("ai_plugin", 5, 0);
        tickets.extend(corpus_tickets("figma", 2, 10));
        let selected = select(
            tickets,
            &PipelineConfig {
                per_product: true,
                max_docs_per_product: Some(3),
                ..PipelineConfig::default()
            },
        );
        let illustrator = selected
            .iter()
            .filter(|t| t.product_label.as_deref() == Some("IllustratorPlugin"))
            .count();
        assert_eq!(illustrator, 3);
        assert_eq!(selected.len(), 5);
    }

    #[test]
    fn test_product_slug() {
        assert_eq!(product_slug("Unclear Product"), "unclear_product");
        assert_eq!(product_slug("IllustratorPlugin"), "illustratorplugin");
    }
}
