//! Task instances and completion tickets

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::watch;
use uuid::Uuid;

/// A single schedulable unit of work.
///
/// Instances are consumed on submission and run exactly once. The label is
/// carried for log correlation only; all real state lives inside the boxed
/// future.
pub struct TaskInstance {
    id: Uuid,
    label: String,
    work: BoxFuture<'static, ()>,
}

impl TaskInstance {
    /// Create an instance from a future.
    pub fn new<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: Uuid::now_v7(),
            label: label.into(),
            work: Box::pin(work),
        }
    }

    /// Create an instance from a closure producing the work future.
    pub fn from_fn<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::new(label, async move { f().await })
    }

    /// Unique id of this instance
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable label for logs
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the instance to completion, consuming it.
    pub async fn run(self) {
        self.work.await;
    }
}

impl fmt::Debug for TaskInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInstance")
            .field("id", &self.id)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Completion handle for a submitted instance.
///
/// Tickets are cheap to clone. They serve two purposes: other submissions can
/// be ordered after them ([`crate::Executor::submit_after`]), and callers can
/// wait for the underlying instance to finish. Completion is latched, so a
/// ticket observed late still reports done.
#[derive(Clone)]
pub struct Ticket {
    id: Uuid,
    done: watch::Receiver<bool>,
}

impl Ticket {
    /// Create a ticket plus the sender half used to resolve it.
    pub(crate) fn channel(id: Uuid) -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { id, done: rx }, tx)
    }

    /// Id of the instance this ticket tracks
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the underlying instance has finished
    pub fn is_complete(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the underlying instance has finished.
    pub async fn wait(&self) {
        let mut done = self.done.clone();
        // Err means the sender is gone, which can only happen once the
        // instance can no longer complete; treat that as done.
        let _ = done.wait_for(|finished| *finished).await;
    }
}

impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticket")
            .field("id", &self.id)
            .field("complete", &self.is_complete())
            .finish()
    }
}
