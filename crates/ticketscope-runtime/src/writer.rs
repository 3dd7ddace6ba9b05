//! Single-writer queue in front of the [`ResultStore`].
//!
//! Product groups finish concurrently, but only one task ever writes to the
//! result database. Each request carries a oneshot so the sender learns
//! whether its run was committed.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::types::RunBatch;
use ticketscope_core::{Error, Result};
use ticketscope_store::ResultStore;

const CHANNEL_CAPACITY: usize = 16;

struct WriteRequest {
    batch: RunBatch,
    ack: oneshot::Sender<Result<()>>,
}

/// Cloneable handle for submitting runs.
#[derive(Clone)]
pub struct ResultWriter {
    tx: mpsc::Sender<WriteRequest>,
}

/// The writer thread; finishes once every [`ResultWriter`] is dropped.
pub struct WriterTask {
    handle: JoinHandle<usize>,
}

impl ResultWriter {
    /// Move `store` onto a blocking thread that drains the queue.
    pub fn spawn(store: ResultStore) -> (Self, WriterTask) {
        let (tx, mut rx) = mpsc::channel::<WriteRequest>(CHANNEL_CAPACITY);
        let handle = tokio::task::spawn_blocking(move || {
            let mut committed = 0;
            while let Some(WriteRequest { batch, ack }) = rx.blocking_recv() {
                let result = store.persist(&batch.run, &batch.topics, &batch.documents, &batch.representative_docs);
                match &result {
                    Ok(()) => {
                        committed += 1;
                        debug!(
                            "Persisted run {}: {} topics, {} documents",
                            batch.run.run_id,
                            batch.topics.len(),
                            batch.documents.len()
                        );
                    }
                    Err(e) => error!("Persisting run {} failed: {}", batch.run.run_id, e),
                }
                if ack.send(result).is_err() {
                    debug!("Submitter of run {} went away before the ack", batch.run.run_id);
                }
            }
            info!("Result writer stopped after {} runs", committed);
            committed
        });
        (Self { tx }, WriterTask { handle })
    }

    /// Queue one run and wait until it is committed.
    pub async fn persist(&self, batch: RunBatch) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(WriteRequest { batch, ack })
            .await
            .map_err(|_| Error::Storage("result writer closed".into()))?;
        done.await
            .map_err(|_| Error::Storage("result writer dropped the request".into()))?
    }
}

impl WriterTask {
    /// Wait for the queue to drain. Returns the number of committed runs.
    pub async fn join(self) -> Result<usize> {
        self.handle
            .await
            .map_err(|e| Error::Internal(format!("Result writer panicked: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ticketscope_store::{RunRecord, RunStatus, TopicRecord};

    fn batch(run_id: &str, topics: usize) -> RunBatch {
        RunBatch {
            run: RunRecord {
                run_id: run_id.into(),
                created_at: Utc::now(),
                doc_count: 0,
                topic_count: topics as i64,
                outlier_count: 0,
                embedding_model: "test".into(),
                reduction_params: serde_json::json!({}),
                cluster_params: serde_json::json!({}),
                product_label: None,
                status: RunStatus::Completed,
            },
            topics: (0..topics as i64)
                .map(|topic_id| TopicRecord {
                    run_id: run_id.into(),
                    topic_id,
                    label: format!("t{}", topic_id),
                    description: String::new(),
                    keywords: vec![],
                    doc_count: 1,
                    product_label: None,
                })
                .collect(),
            documents: vec![],
            representative_docs: vec![],
        }
    }

    #[tokio::test]
    async fn test_concurrent_submitters_share_one_writer() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, task) = ResultWriter::spawn(ResultStore::open(dir.path()).unwrap());

        let mut handles = Vec::new();
        for i in 0..4 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move { writer.persist(batch(&format!("run-{}", i), 2)).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        drop(writer);
        assert_eq!(task.join().await.unwrap(), 4);

        let store = ResultStore::open(dir.path()).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.runs, 4);
        assert_eq!(stats.topics, 8);
    }

    #[tokio::test]
    async fn test_write_stands_when_submitter_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, task) = ResultWriter::spawn(ResultStore::open(dir.path()).unwrap());

        // Drop the submitting future right after its request is queued.
        let submitter = writer.clone();
        let mut pending = Box::pin(async move { submitter.persist(batch("run-a", 1)).await });
        let _ = poll_once(pending.as_mut()).await;
        drop(pending);

        drop(writer);
        assert_eq!(task.join().await.unwrap(), 1);
        assert!(ResultStore::open(dir.path()).unwrap().get_run("run-a").unwrap().is_some());
    }

    /// Poll a future once; `None` if it is still pending.
    async fn poll_once<F: std::future::Future + Unpin>(mut fut: F) -> Option<F::Output> {
        std::future::poll_fn(|cx| match std::pin::Pin::new(&mut fut).poll(cx) {
            std::task::Poll::Ready(out) => std::task::Poll::Ready(Some(out)),
            std::task::Poll::Pending => std::task::Poll::Ready(None),
        })
        .await
    }

    #[tokio::test]
    async fn test_rejected_write_is_reported_to_sender() {
        let dir = tempfile::tempdir().unwrap();
        let (writer, task) = ResultWriter::spawn(ResultStore::open(dir.path()).unwrap());

        let mut bad = batch("run-a", 1);
        bad.topics[0].run_id = "run-b".into();
        assert!(writer.persist(bad).await.is_err());
        writer.persist(batch("run-a", 1)).await.unwrap();

        drop(writer);
        assert_eq!(task.join().await.unwrap(), 1);
    }
}
