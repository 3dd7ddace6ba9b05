//! Bounded fan-out of one per-ticket stage.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use ticketscope_core::{Error, Outcome, Result, Ticket};

/// How the values of one stage were obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub remote: usize,
    pub cached: usize,
    pub fallback: usize,
}

impl StageReport {
    pub fn record<T>(&mut self, outcome: &Outcome<T>) {
        match outcome {
            Outcome::Remote(_) => self.remote += 1,
            Outcome::Cached(_) => self.cached += 1,
            Outcome::Fallback { .. } => self.fallback += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.remote + self.cached + self.fallback
    }
}

/// Run `step` for every ticket with at most `workers` in flight and hand each
/// result back with its ticket index. Any `Err` aborts the remaining tasks.
pub(crate) async fn for_each_ticket<F, Fut>(
    tickets: &[Ticket],
    workers: usize,
    step: F,
) -> Result<Vec<(usize, Outcome<String>)>>
where
    F: Fn(Ticket) -> Fut,
    Fut: Future<Output = Result<Outcome<String>>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    for (idx, ticket) in tickets.iter().enumerate() {
        let permits = Arc::clone(&semaphore);
        let fut = step(ticket.clone());
        set.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| Error::Internal(e.to_string()))?;
            fut.await.map(|outcome| (idx, outcome))
        });
    }

    let mut results = Vec::with_capacity(tickets.len());
    while let Some(joined) = set.join_next().await {
        let item = joined.map_err(|e| Error::Internal(format!("Ticket task failed: {}", e)))??;
        results.push(item);
    }
    results.sort_by_key(|(idx, _)| *idx);
    Ok(results)
}
