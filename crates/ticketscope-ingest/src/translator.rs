//! Cache-first translation of ticket bodies.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::stage::{for_each_ticket, StageReport};
use ticketscope_core::{Outcome, Result, Ticket};
use ticketscope_llm::TranslationService;
use ticketscope_store::TicketCache;

pub struct Translator {
    service: Option<Arc<dyn TranslationService>>,
    cache: Arc<TicketCache>,
    target_lang: String,
    retry_fallbacks: bool,
    workers: usize,
}

impl Translator {
    /// `service = None` disables remote translation; every miss then keeps
    /// the original body and nothing is written to the cache.
    pub fn new(
        service: Option<Arc<dyn TranslationService>>,
        cache: Arc<TicketCache>,
        target_lang: impl Into<String>,
    ) -> Self {
        Self {
            service,
            cache,
            target_lang: target_lang.into(),
            retry_fallbacks: false,
            workers: 1,
        }
    }

    /// Treat cached fallback values as misses.
    pub fn with_retry_fallbacks(mut self, retry: bool) -> Self {
        self.retry_fallbacks = retry;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Translated body for one ticket. Errors only come from the cache.
    pub async fn translate(&self, ticket: &Ticket) -> Result<Outcome<String>> {
        let _guard = self.cache.lock_ticket(&ticket.ticket_id).await;

        if let Some(entry) = self.cache.get(&ticket.ticket_id)? {
            if let Some(cached) = entry.translated_body {
                if !(self.retry_fallbacks && entry.translation_fallback) {
                    return Ok(Outcome::Cached(cached));
                }
                debug!("Retrying translation fallback for {}", ticket.ticket_id);
            }
        }

        let outcome = if ticket.body.trim().is_empty() {
            Outcome::fallback(ticket.body.clone(), "empty body")
        } else {
            match &self.service {
                // Not cached: enabling translation later must reach these tickets.
                None => return Ok(Outcome::fallback(ticket.body.clone(), "translation disabled")),
                Some(service) => match service.translate(&ticket.body, &self.target_lang).await {
                    Ok(text) => Outcome::Remote(text),
                    Err(e) => {
                        warn!("Translation failed for {}: {}", ticket.ticket_id, e);
                        Outcome::fallback(ticket.body.clone(), e.to_string())
                    }
                },
            }
        };

        self.cache
            .put_translation(&ticket.ticket_id, outcome.value(), outcome.is_fallback())?;
        Ok(outcome)
    }

    /// Translate every ticket in place, filling `translated_body`.
    pub async fn translate_all(self: &Arc<Self>, tickets: &mut [Ticket]) -> Result<StageReport> {
        let results = for_each_ticket(tickets, self.workers, |ticket| {
            let this = Arc::clone(self);
            async move { this.translate(&ticket).await }
        })
        .await?;

        let mut report = StageReport::default();
        for (idx, outcome) in results {
            report.record(&outcome);
            tickets[idx].translated_body = Some(outcome.into_value());
        }
        info!(
            "Translation: {} tickets ({} remote, {} cached, {} fallback)",
            report.total(),
            report.remote,
            report.cached,
            report.fallback
        );
        Ok(report)
    }
}
