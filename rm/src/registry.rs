//! Prototype registry with an explicit mutation API and change events
//!
//! The registry replaces the implicit freely-mutable array of the usual
//! "list of jobs" design with named mutation operations, each of which emits
//! a [`RegistryEvent`] on a broadcast channel. Consumers that care about
//! membership changes subscribe; nobody reaches into the container directly.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

use crate::error::{RecurrenceError, Result};
use crate::task::RecurringTask;

/// Default change-event channel capacity
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Structural change to the registry
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RegistryEvent {
    /// A prototype now occupies `index`
    Added { index: usize, name: String },
    /// The prototype at `index` was removed
    Removed { index: usize, name: String },
    /// A prototype moved from `from` to `to`
    Moved { from: usize, to: usize, name: String },
}

/// Ordered collection of task prototypes.
///
/// Order is insertion order unless explicitly rearranged, and determines
/// submission order within a recurrence cycle. Identity is the slot, not the
/// value; duplicates are permitted. Every structural mutation emits a
/// [`RegistryEvent`] to subscribers (fire-and-forget, in the manner of a
/// broadcast bus: no subscribers means the event is simply dropped).
pub struct PrototypeRegistry {
    prototypes: Mutex<Vec<Arc<dyn RecurringTask>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl PrototypeRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            prototypes: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Append a prototype. Registration order is submission order.
    pub async fn push(&self, prototype: Arc<dyn RecurringTask>) {
        let mut prototypes = self.prototypes.lock().await;
        let index = prototypes.len();
        let name = prototype.name().to_string();
        prototypes.push(prototype);
        debug!(index, %name, "registry: prototype added");
        let _ = self.events.send(RegistryEvent::Added { index, name });
    }

    /// Insert a prototype at `index`, shifting later entries.
    pub async fn insert(&self, index: usize, prototype: Arc<dyn RecurringTask>) -> Result<()> {
        let mut prototypes = self.prototypes.lock().await;
        let len = prototypes.len();
        if index > len {
            return Err(RecurrenceError::IndexOutOfBounds { index, len });
        }
        let name = prototype.name().to_string();
        prototypes.insert(index, prototype);
        debug!(index, %name, "registry: prototype inserted");
        let _ = self.events.send(RegistryEvent::Added { index, name });
        Ok(())
    }

    /// Remove and return the prototype at `index`.
    pub async fn remove(&self, index: usize) -> Result<Arc<dyn RecurringTask>> {
        let mut prototypes = self.prototypes.lock().await;
        let len = prototypes.len();
        if index >= len {
            return Err(RecurrenceError::IndexOutOfBounds { index, len });
        }
        let prototype = prototypes.remove(index);
        let name = prototype.name().to_string();
        debug!(index, %name, "registry: prototype removed");
        let _ = self.events.send(RegistryEvent::Removed { index, name });
        Ok(prototype)
    }

    /// Move the prototype at `from` so it ends up at `to`.
    pub async fn move_task(&self, from: usize, to: usize) -> Result<()> {
        let mut prototypes = self.prototypes.lock().await;
        let len = prototypes.len();
        if from >= len {
            return Err(RecurrenceError::IndexOutOfBounds { index: from, len });
        }
        if to >= len {
            return Err(RecurrenceError::IndexOutOfBounds { index: to, len });
        }
        let prototype = prototypes.remove(from);
        let name = prototype.name().to_string();
        prototypes.insert(to, prototype);
        debug!(from, to, %name, "registry: prototype moved");
        let _ = self.events.send(RegistryEvent::Moved { from, to, name });
        Ok(())
    }

    /// Snapshot of the current prototypes in order.
    pub async fn snapshot(&self) -> Vec<Arc<dyn RecurringTask>> {
        self.prototypes.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.prototypes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.prototypes.lock().await.is_empty()
    }

    /// Subscribe to structural change events.
    ///
    /// Only events emitted after subscription are received.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}

impl Default for PrototypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
