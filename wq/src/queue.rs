//! Tokio-backed work queue with dependency ordering

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, warn};

use crate::instance::{TaskInstance, Ticket};

/// The sink work is submitted into.
///
/// Implementations run submitted instances concurrently or serially per their
/// own policy. Dependency links only constrain start order; they say nothing
/// about what happens between unrelated instances.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Enqueue an independent unit of work.
    async fn submit(&self, instance: TaskInstance) -> Ticket;

    /// Enqueue a unit of work that must not start until `after` completes.
    async fn submit_after(&self, instance: TaskInstance, after: &Ticket) -> Ticket;

    /// True iff no submitted instance is pending or running.
    async fn is_idle(&self) -> bool;
}

/// Running statistics, exposed for diagnostics
#[derive(Debug, Default, Clone)]
pub struct QueueStats {
    pub total_submitted: u64,
    pub total_completed: u64,
    pub peak_pending: usize,
}

/// Internal state protected by mutex
struct QueueInner {
    /// Instances submitted but not yet finished, including ones blocked on a
    /// dependency or waiting for a concurrency permit
    pending: usize,

    /// Statistics
    stats: QueueStats,
}

struct QueueShared {
    inner: Mutex<QueueInner>,
    idle: Notify,
    limit: Option<Arc<Semaphore>>,
}

/// Dependency-aware work queue on top of tokio tasks.
///
/// Every submitted instance gets its own task. An instance waiting on a
/// dependency or a concurrency permit still counts as pending, so
/// [`WorkQueue::is_idle`] only reports true once the queue has fully drained.
/// A panicking instance is logged and counted as completed; failure policy
/// for individual instances is not this queue's concern.
///
/// Handles are cheap to clone and share one underlying queue.
#[derive(Clone)]
pub struct WorkQueue {
    shared: Arc<QueueShared>,
}

impl WorkQueue {
    /// Create an unbounded queue.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a queue that runs at most `max_concurrent` instances at once.
    pub fn with_concurrency(max_concurrent: usize) -> Self {
        debug!(max_concurrent, "WorkQueue::with_concurrency");
        Self::build(Some(Arc::new(Semaphore::new(max_concurrent))))
    }

    fn build(limit: Option<Arc<Semaphore>>) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                inner: Mutex::new(QueueInner {
                    pending: 0,
                    stats: QueueStats::default(),
                }),
                idle: Notify::new(),
                limit,
            }),
        }
    }

    /// Number of instances submitted but not yet finished
    pub async fn pending(&self) -> usize {
        self.shared.inner.lock().await.pending
    }

    /// Snapshot of the queue statistics
    pub async fn stats(&self) -> QueueStats {
        self.shared.inner.lock().await.stats.clone()
    }

    /// Wait until the queue has fully drained.
    ///
    /// Returns immediately if nothing is pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a drain between the check and the
            // await is not missed
            notified.as_mut().enable();
            if self.shared.inner.lock().await.pending == 0 {
                return;
            }
            notified.as_mut().await;
        }
    }

    async fn enqueue(&self, instance: TaskInstance, after: Option<Ticket>) -> Ticket {
        let (ticket, done_tx) = Ticket::channel(instance.id());

        {
            let mut inner = self.shared.inner.lock().await;
            inner.pending += 1;
            inner.stats.total_submitted += 1;
            inner.stats.peak_pending = inner.stats.peak_pending.max(inner.pending);
        }

        debug!(
            id = %instance.id(),
            label = instance.label(),
            dependent = after.is_some(),
            "WorkQueue: instance submitted"
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            if let Some(dependency) = after {
                dependency.wait().await;
            }

            let _permit = if let Some(semaphore) = &shared.limit {
                semaphore.clone().acquire_owned().await.ok()
            } else {
                None
            };

            let label = instance.label().to_string();
            // Run the instance on a child task so bookkeeping survives a
            // panicking body
            if tokio::spawn(instance.run()).await.is_err() {
                warn!(%label, "WorkQueue: instance panicked");
            }
            drop(_permit);

            let drained = {
                let mut inner = shared.inner.lock().await;
                inner.pending -= 1;
                inner.stats.total_completed += 1;
                inner.pending == 0
            };

            let _ = done_tx.send(true);
            if drained {
                shared.idle.notify_waiters();
            }
        });

        ticket
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for WorkQueue {
    async fn submit(&self, instance: TaskInstance) -> Ticket {
        self.enqueue(instance, None).await
    }

    async fn submit_after(&self, instance: TaskInstance, after: &Ticket) -> Ticket {
        self.enqueue(instance, Some(after.clone())).await
    }

    async fn is_idle(&self) -> bool {
        self.shared.inner.lock().await.pending == 0
    }
}
