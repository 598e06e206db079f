// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-id ordered index mirror dispatch.
//!
//! Every id with pending work owns one FIFO queue and one worker task.
//! Jobs for the same id run strictly in dispatch order; different ids run in
//! parallel.
//!
//! ```text
//! dispatch(op) ──permit──→ queues[id] ──→ worker(id) ──retry──→ SearchIndex
//!                                              │
//!                                              └─ gave up → IndexSyncFailure (log, metric, broadcast)
//! ```
//!
//! # Worker retirement
//!
//! Enqueueing happens while holding the map entry for the id. A worker that
//! finds its queue empty removes its own entry under that same lock, and only
//! if the queue is still empty. So a job either lands in a queue whose worker
//! will see it, or finds no entry and starts a fresh worker after the old
//! one has finished everything it owned.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot, Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::metrics;
use crate::record::Record;
use crate::resilience::retry::{retry, RetryConfig};
use crate::search::{IndexError, SearchIndex};
use crate::storage::traits::{RecordStore, StorageError};

const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// One index mutation.
#[derive(Debug, Clone)]
pub enum IndexOp {
    /// Index this exact copy of a freshly stored record.
    Upsert(Record),
    /// Re-read the record from the store; index it, or delete the document
    /// if the record is gone.
    Reindex(String),
    Delete(String),
}

impl IndexOp {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            IndexOp::Upsert(record) => record.id().unwrap_or_default(),
            IndexOp::Reindex(id) | IndexOp::Delete(id) => id,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            IndexOp::Upsert(_) => "upsert",
            IndexOp::Reindex(_) => "reindex",
            IndexOp::Delete(_) => "delete",
        }
    }
}

/// Why one mirror attempt failed.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("could not reload record: {0}")]
    Store(#[from] StorageError),
}

/// An index mirror job that exhausted its retry budget.
///
/// Observable only: the authoritative operation that queued the job has
/// already succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("index {operation} for '{id}' failed after {attempts} attempt(s): {error}")]
pub struct IndexSyncFailure {
    pub id: String,
    pub operation: &'static str,
    pub attempts: usize,
    pub error: String,
}

struct Job {
    op: IndexOp,
    done: Option<oneshot::Sender<Result<(), IndexSyncFailure>>>,
    _permit: OwnedSemaphorePermit,
}

struct KeyQueue {
    tx: mpsc::UnboundedSender<Job>,
    generation: u64,
}

struct Inner {
    index: Arc<dyn SearchIndex>,
    store: Arc<dyn RecordStore>,
    retry: RetryConfig,
    queues: DashMap<String, KeyQueue>,
    next_generation: AtomicU64,
    permits: Arc<Semaphore>,
    pending: AtomicUsize,
    idle: Notify,
    failures: broadcast::Sender<IndexSyncFailure>,
    closed: AtomicBool,
}

/// Dispatches index mutations onto per-id ordered workers.
#[derive(Clone)]
pub struct IndexDispatcher {
    inner: Arc<Inner>,
}

impl IndexDispatcher {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        store: Arc<dyn RecordStore>,
        retry: RetryConfig,
        max_pending: usize,
    ) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                index,
                store,
                retry,
                queues: DashMap::new(),
                next_generation: AtomicU64::new(0),
                permits: Arc::new(Semaphore::new(max_pending.max(1))),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
                failures,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Queue a job and return once it is queued.
    ///
    /// Waits for a slot when `max_pending` jobs are already queued.
    pub async fn dispatch(&self, op: IndexOp) {
        self.submit(op, None).await;
    }

    /// Queue a job and wait for its final outcome.
    pub async fn dispatch_and_wait(&self, op: IndexOp) -> Result<(), IndexSyncFailure> {
        let (tx, rx) = oneshot::channel();
        let id = op.id().to_string();
        let operation = op.name();
        self.submit(op, Some(tx)).await;

        rx.await.unwrap_or_else(|_| {
            Err(IndexSyncFailure {
                id,
                operation,
                attempts: 0,
                error: "dispatcher stopped before the job ran".to_string(),
            })
        })
    }

    /// Receive every [`IndexSyncFailure`] from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexSyncFailure> {
        self.inner.failures.subscribe()
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Ids with a live worker.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        self.inner.queues.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Wait until every queued job has finished.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and drain the ones already queued.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(pending = self.pending(), "Index dispatcher draining");
        self.inner.permits.close();
        self.flush().await;
        debug!("Index dispatcher stopped");
    }

    async fn submit(&self, op: IndexOp, done: Option<oneshot::Sender<Result<(), IndexSyncFailure>>>) {
        if self.is_closed() {
            warn!(id = %op.id(), op = op.name(), "Index dispatcher closed, dropping mirror job");
            metrics::record_index_mirror(op.name(), "dropped");
            return;
        }
        let permit = match self.inner.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(id = %op.id(), op = op.name(), "Index dispatcher closed, dropping mirror job");
                metrics::record_index_mirror(op.name(), "dropped");
                return;
            }
        };
        self.enqueue(Job {
            op,
            done,
            _permit: permit,
        });
    }

    fn enqueue(&self, job: Job) {
        let inner = &self.inner;
        let id = job.op.id().to_string();
        let depth = inner.pending.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_index_queue_depth(depth);

        match inner.queues.entry(id.clone()) {
            Entry::Occupied(mut entry) => {
                if let Err(mpsc::error::SendError(job)) = entry.get().tx.send(job) {
                    // Worker died without retiring; replace it.
                    warn!(id = %id, "Index worker vanished, starting a new one");
                    let (queue, rx) = inner.new_queue();
                    let generation = queue.generation;
                    let _ = queue.tx.send(job);
                    entry.insert(queue);
                    self.spawn_worker(id, rx, generation);
                }
            }
            Entry::Vacant(entry) => {
                let (queue, rx) = inner.new_queue();
                let generation = queue.generation;
                let _ = queue.tx.send(job);
                entry.insert(queue);
                self.spawn_worker(id, rx, generation);
            }
        }
        metrics::set_index_active_keys(inner.queues.len());
    }

    fn spawn_worker(&self, id: String, rx: mpsc::UnboundedReceiver<Job>, generation: u64) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_worker(id, rx, generation).await;
        });
    }
}

impl Inner {
    fn new_queue(&self) -> (KeyQueue, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        (KeyQueue { tx, generation }, rx)
    }

    async fn run_worker(&self, id: String, mut rx: mpsc::UnboundedReceiver<Job>, generation: u64) {
        loop {
            match rx.try_recv() {
                Ok(job) => {
                    self.process(job).await;
                    continue;
                }
                Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            let retired = self
                .queues
                .remove_if(&id, |_, queue| queue.generation == generation && rx.is_empty())
                .is_some();
            if retired {
                metrics::set_index_active_keys(self.queues.len());
                break;
            }

            let still_owner = self
                .queues
                .get(&id)
                .is_some_and(|queue| queue.generation == generation);
            if !still_owner {
                // Replaced: finish what was already sent to us.
                while let Some(job) = rx.recv().await {
                    self.process(job).await;
                }
                break;
            }
        }
    }

    async fn process(&self, job: Job) {
        let Job { op, done, _permit } = job;
        let operation = op.name();
        let id = op.id().to_string();

        let result = self.mirror_with_retry(&op).await;
        match &result {
            Ok(()) => {
                debug!(id = %id, op = operation, "Index mirror applied");
                metrics::record_index_mirror(operation, "success");
            }
            Err(failure) => {
                warn!(
                    id = %failure.id,
                    op = failure.operation,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Index sync failure; index may be stale for this record"
                );
                metrics::record_index_mirror(operation, "failure");
                metrics::record_index_sync_failure(operation);
                let _ = self.failures.send(failure.clone());
            }
        }

        if let Some(done) = done {
            let _ = done.send(result);
        }
        drop(_permit);

        let remaining = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_index_queue_depth(remaining);
        if remaining == 0 {
            self.idle.notify_waiters();
        }
    }

    async fn mirror_with_retry(&self, op: &IndexOp) -> Result<(), IndexSyncFailure> {
        let attempts = AtomicUsize::new(0);
        let label = format!("index_{}", op.name());

        retry(&label, &self.retry, || {
            attempts.fetch_add(1, Ordering::Relaxed);
            self.mirror_once(op)
        })
        .await
        .map_err(|e| IndexSyncFailure {
            id: op.id().to_string(),
            operation: op.name(),
            attempts: attempts.load(Ordering::Relaxed),
            error: e.to_string(),
        })
    }

    async fn mirror_once(&self, op: &IndexOp) -> Result<(), MirrorError> {
        match op {
            IndexOp::Upsert(record) => self.index.index_document(record).await?,
            IndexOp::Reindex(id) => match self.store.get(id).await? {
                Some(record) => self.index.index_document(&record).await?,
                None => {
                    debug!(id = %id, "Record gone before reindex, removing document");
                    self.index.delete_document(id).await?
                }
            },
            IndexOp::Delete(id) => self.index.delete_document(id).await?,
        }
        Ok(())
    }
}
