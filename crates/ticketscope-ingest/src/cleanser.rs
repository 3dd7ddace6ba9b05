//! Cache-first cleaning of translated ticket bodies.
//!
//! A miss goes to the cleaning model; any model error falls back to
//! [`deterministic_clean`]. Both paths end with token stripping. A hit only
//! re-applies token stripping, so the strip list can change without
//! invalidating the cache.

use std::sync::Arc;

use tracing::{info, warn};

use crate::rules::{deterministic_clean, TokenStripper};
use crate::stage::{for_each_ticket, StageReport};
use ticketscope_core::{Outcome, Result, Ticket};
use ticketscope_llm::{ChatCompletion, ChatMessage, CompletionOptions};
use ticketscope_store::TicketCache;

const CLEANING_PROMPT: &str = "You clean customer support tickets for topic analysis. \
Remove greetings, sign-offs, signatures, quoted replies, legal disclaimers and any \
personal data (names, emails, phone numbers, URLs, credentials). Keep the product \
names and the technical description of the problem. Reply with the cleaned text only.";

pub struct Cleanser {
    chat: Option<Arc<dyn ChatCompletion>>,
    cache: Arc<TicketCache>,
    stripper: TokenStripper,
    retry_fallbacks: bool,
    workers: usize,
}

impl Cleanser {
    /// `chat = None` runs the deterministic cleaner for every miss without
    /// caching the result.
    pub fn new(chat: Option<Arc<dyn ChatCompletion>>, cache: Arc<TicketCache>, stripper: TokenStripper) -> Self {
        Self {
            chat,
            cache,
            stripper,
            retry_fallbacks: false,
            workers: 1,
        }
    }

    pub fn with_retry_fallbacks(mut self, retry: bool) -> Self {
        self.retry_fallbacks = retry;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Preprocessed body for one ticket. Errors only come from the cache.
    pub async fn clean(&self, ticket: &Ticket) -> Result<Outcome<String>> {
        let _guard = self.cache.lock_ticket(&ticket.ticket_id).await;

        if let Some(entry) = self.cache.get(&ticket.ticket_id)? {
            if let Some(cached) = entry.preprocessed_body {
                if !(self.retry_fallbacks && entry.cleaning_fallback) {
                    return Ok(Outcome::Cached(self.stripper.strip(&cached)));
                }
            }
        }

        let input = ticket.cleaning_input();
        let outcome = match &self.chat {
            // Not cached: enabling the model later must reach these tickets.
            None => {
                let cleaned = self.stripper.strip(&deterministic_clean(input));
                return Ok(Outcome::fallback(cleaned, "cleaning llm disabled"));
            }
            Some(_) if input.trim().is_empty() => Outcome::fallback(String::new(), "empty body"),
            Some(chat) => {
                let messages = [ChatMessage::system(CLEANING_PROMPT), ChatMessage::user(input)];
                let options = CompletionOptions {
                    temperature: 0.0,
                    max_tokens: 2048,
                };
                match chat.complete(&messages, options).await {
                    Ok(text) => Outcome::Remote(text),
                    Err(e) => {
                        warn!("Cleaning model failed for {}: {}", ticket.ticket_id, e);
                        Outcome::fallback(deterministic_clean(input), e.to_string())
                    }
                }
            }
        };
        let outcome = outcome.map(|text| self.stripper.strip(&text));

        self.cache
            .put_preprocessed(&ticket.ticket_id, outcome.value(), outcome.is_fallback())?;
        Ok(outcome)
    }

    /// Clean every ticket in place, filling `preprocessed_body`.
    pub async fn clean_all(self: &Arc<Self>, tickets: &mut [Ticket]) -> Result<StageReport> {
        let results = for_each_ticket(tickets, self.workers, |ticket| {
            let this = Arc::clone(self);
            async move { this.clean(&ticket).await }
        })
        .await?;

        let mut report = StageReport::default();
        for (idx, outcome) in results {
            report.record(&outcome);
            tickets[idx].preprocessed_body = Some(outcome.into_value());
        }
        info!(
            "Cleaning: {} tickets ({} model, {} cached, {} fallback)",
            report.total(),
            report.remote,
            report.cached,
            report.fallback
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use ticketscope_core::Error;

    struct MockChat {
        calls: AtomicUsize,
        reply: Option<&'static str>,
    }

    impl MockChat {
        fn replying(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: Some(reply),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                reply: None,
            })
        }
    }

    #[async_trait]
    impl ChatCompletion for MockChat {
        async fn complete(&self, _messages: &[ChatMessage], _options: CompletionOptions) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| Error::Http("400 content_filter".into()))
        }

        fn model(&self) -> String {
            "mock".into()
        }
    }

    fn cache() -> (Arc<TicketCache>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Arc::new(TicketCache::open(dir.path()).unwrap()), dir)
    }

    #[tokio::test]
    async fn test_model_failure_uses_deterministic_cleaner() {
        let (cache, _dir) = cache();
        let chat = MockChat::failing();
        let cleanser = Cleanser::new(Some(chat.clone()), cache.clone(), TokenStripper::new(&["sent from my iphone"]));
        let ticket = Ticket::new("T-1", "<b>Crash</b> mail a@b.com see https://x.io Sent from my iPhone");

        let outcome = cleanser.clean(&ticket).await.unwrap();
        assert!(outcome.is_fallback());
        assert_eq!(outcome.value(), "Crash mail [REDACTED] see [REDACTED]");

        let entry = cache.get("T-1").unwrap().unwrap();
        assert!(entry.cleaning_attempted);
        assert!(entry.cleaning_fallback);
    }

    #[tokio::test]
    async fn test_cache_hit_only_restrips() {
        let (cache, _dir) = cache();
        cache.put_preprocessed("T-1", "export broken CONFIDENTIAL", false).unwrap();
        let chat = MockChat::replying("unused");
        let cleanser = Cleanser::new(Some(chat.clone()), cache, TokenStripper::new(&["confidential"]));

        let outcome = cleanser.clean(&Ticket::new("T-1", "whatever")).await.unwrap();
        assert_eq!(outcome, Outcome::Cached("export broken".to_string()));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_output_cleans_translation() {
        let (cache, _dir) = cache();
        let chat = MockChat::replying("license activation fails");
        let empty: [&str; 0] = [];
        let cleanser = Cleanser::new(Some(chat.clone()), cache, TokenStripper::new(&empty));
        let mut ticket = Ticket::new("T-1", "Lizenz Aktivierung");
        ticket.translated_body = Some("License activation fails".into());

        let outcome = cleanser.clean(&ticket).await.unwrap();
        assert_eq!(outcome, Outcome::Remote("license activation fails".to_string()));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_model_never_called() {
        let (cache, _dir) = cache();
        let empty: [&str; 0] = [];
        let cleanser = Arc::new(Cleanser::new(None, cache, TokenStripper::new(&empty)));
        let mut tickets = vec![Ticket::new("A", "Hello, <i>sync</i> stalls"), Ticket::new("B", "ok")];

        let report = cleanser.clean_all(&mut tickets).await.unwrap();
        assert_eq!(report.fallback, 2);
        assert_eq!(tickets[0].preprocessed_body.as_deref(), Some("sync stalls"));
    }

    #[tokio::test]
    async fn test_enabling_model_reaches_seen_tickets() {
        let (cache, _dir) = cache();
        let empty: [&str; 0] = [];
        let ticket = Ticket::new("T-1", "Hi team, export to pdf crashes");

        let disabled = Cleanser::new(None, cache.clone(), TokenStripper::new(&empty));
        assert!(disabled.clean(&ticket).await.unwrap().is_fallback());
        assert!(cache.get("T-1").unwrap().is_none());

        let chat = MockChat::replying("export to pdf crashes");
        let enabled = Cleanser::new(Some(chat.clone()), cache, TokenStripper::new(&empty));
        let outcome = enabled.clean(&ticket).await.unwrap();
        assert_eq!(outcome, Outcome::Remote("export to pdf crashes".to_string()));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }
}
