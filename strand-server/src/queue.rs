//! Bounded work queue drained by a single worker
//!
//! Connection readers enqueue one item per query. When the queue is full
//! `enqueue` waits for space, so a slow worker stalls the readers instead
//! of dropping work. The worker runs items one at a time, in order.

use futures::future::BoxFuture;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a work item can fail
#[derive(Error, Debug)]
pub enum WorkError {
    #[error("Work item cancelled")]
    Cancelled,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Why an item could not be enqueued
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue shut down")]
    Cancelled,

    #[error("Worker has stopped")]
    Closed,
}

type WorkItem = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), WorkError>> + Send>;

/// Producer side; clones share one queue
#[derive(Clone)]
pub struct WorkQueue {
    tx: mpsc::Sender<WorkItem>,
    cancel: CancellationToken,
}

impl WorkQueue {
    /// Create a queue holding at most `capacity` items and its worker
    pub fn new(capacity: usize, cancel: CancellationToken) -> (Self, Worker) {
        let (tx, rx) = mpsc::channel(capacity);
        let worker = Worker {
            rx,
            cancel: cancel.clone(),
        };
        (Self { tx, cancel }, worker)
    }

    /// Add an item, waiting while the queue is full
    ///
    /// The item receives a token that fires when the server shuts down.
    pub async fn enqueue<F, Fut>(&self, item: F) -> Result<(), QueueError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), WorkError>> + Send + 'static,
    {
        let item: WorkItem = Box::new(move |token| Box::pin(item(token)));
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(QueueError::Cancelled),
            sent = self.tx.send(item) => sent.map_err(|_| QueueError::Closed),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// What the worker did before it stopped
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
    pub cancelled: u64,
}

/// Consumer side
pub struct Worker {
    rx: mpsc::Receiver<WorkItem>,
    cancel: CancellationToken,
}

impl Worker {
    /// Run items until shutdown or until every producer is gone
    ///
    /// Each item runs in its own task and is awaited before the next one
    /// starts. Failures and panics are logged and the loop moves on. An
    /// item already running when shutdown begins is allowed to finish.
    pub async fn run(mut self) -> WorkerStats {
        let mut stats = WorkerStats::default();
        debug!("Worker started");

        loop {
            let item = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                item = self.rx.recv() => match item {
                    Some(item) => item,
                    None => break,
                },
            };

            match tokio::spawn(item(self.cancel.child_token())).await {
                Ok(Ok(())) => stats.completed += 1,
                Ok(Err(WorkError::Cancelled)) => {
                    debug!("Work item cancelled");
                    stats.cancelled += 1;
                }
                Ok(Err(WorkError::Failed(e))) => {
                    warn!(error = %e, "Work item failed");
                    stats.failed += 1;
                }
                Err(e) if e.is_panic() => {
                    error!("Work item panicked");
                    stats.panicked += 1;
                }
                Err(_) => {
                    debug!("Work item task aborted");
                    stats.cancelled += 1;
                }
            }
        }

        info!(
            completed = stats.completed,
            failed = stats.failed,
            panicked = stats.panicked,
            cancelled = stats.cancelled,
            "Worker stopped"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_items_run_in_order() {
        let cancel = CancellationToken::new();
        let (queue, worker) = WorkQueue::new(4, cancel.clone());
        let worker = tokio::spawn(worker.run());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        for i in 0..10 {
            let seen = seen_tx.clone();
            queue
                .enqueue(move |_| async move {
                    seen.send(i).map_err(|e| anyhow::anyhow!("{}", e))?;
                    Ok::<_, WorkError>(())
                })
                .await
                .unwrap();
        }

        let mut order = Vec::new();
        for _ in 0..10 {
            order.push(seen_rx.recv().await.unwrap());
        }
        assert_eq!(order, (0..10).collect::<Vec<_>>());

        drop(queue);
        let stats = worker.await.unwrap();
        assert_eq!(stats.completed, 10);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let cancel = CancellationToken::new();
        let (queue, worker) = WorkQueue::new(8, cancel);

        queue
            .enqueue(|_| async { Err::<(), _>(WorkError::Failed(anyhow::anyhow!("disk on fire"))) })
            .await
            .unwrap();
        queue
            .enqueue(|_| async {
                if true {
                    panic!("item panicked");
                }
                Ok::<_, WorkError>(())
            })
            .await
            .unwrap();
        queue
            .enqueue(|_| async { Err::<(), _>(WorkError::Cancelled) })
            .await
            .unwrap();
        queue
            .enqueue(|_| async { Ok::<_, WorkError>(()) })
            .await
            .unwrap();
        drop(queue);

        let stats = worker.run().await;
        assert_eq!(
            stats,
            WorkerStats {
                completed: 1,
                failed: 1,
                panicked: 1,
                cancelled: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_full_queue_waits_for_worker() {
        let cancel = CancellationToken::new();
        let (queue, worker) = WorkQueue::new(1, cancel.clone());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let seen = seen_tx.clone();
        queue
            .enqueue(move |_| async move {
                let _ = seen.send(1);
                Ok::<_, WorkError>(())
            })
            .await
            .unwrap();
        assert_eq!(queue.available(), 0);

        let blocked = {
            let queue = queue.clone();
            let seen = seen_tx.clone();
            tokio::spawn(async move {
                queue
                    .enqueue(move |_| async move {
                        let _ = seen.send(2);
                        Ok::<_, WorkError>(())
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished(), "enqueue should wait for space");

        let worker = tokio::spawn(worker.run());
        blocked.await.unwrap().unwrap();
        assert_eq!(seen_rx.recv().await, Some(1));
        assert_eq!(seen_rx.recv().await, Some(2));

        cancel.cancel();
        assert_eq!(worker.await.unwrap().completed, 2);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown() {
        let cancel = CancellationToken::new();
        let (queue, worker) = WorkQueue::new(1, cancel.clone());
        assert_eq!(queue.capacity(), 1);

        cancel.cancel();
        let stats = worker.run().await;
        assert_eq!(stats, WorkerStats::default());

        let result = queue.enqueue(|_| async { Ok::<_, WorkError>(()) }).await;
        assert_eq!(result, Err(QueueError::Cancelled));
    }

    #[tokio::test]
    async fn test_items_see_shutdown() {
        let cancel = CancellationToken::new();
        let (queue, worker) = WorkQueue::new(1, cancel.clone());
        let worker = tokio::spawn(worker.run());
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();

        queue
            .enqueue(move |token| async move {
                let _ = started_tx.send(());
                token.cancelled().await;
                Err::<(), _>(WorkError::Cancelled)
            })
            .await
            .unwrap();

        started_rx.await.unwrap();
        cancel.cancel();
        assert_eq!(worker.await.unwrap().cancelled, 1);
    }
}
