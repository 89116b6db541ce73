//! Recurrence machine implementation

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use workqueue::{Executor, TaskInstance, Ticket, WorkQueue};

use crate::error::{RecurrenceError, Result};
use crate::registry::PrototypeRegistry;
use crate::task::RecurringTask;

use super::bracket;
use super::config::RecurrenceConfig;
use super::postpone::PostponeCounter;

/// Timer and counter state protected by mutex
struct MachineState {
    /// Delay between recurrence cycles
    interval: Duration,

    /// Postponement counter; while it is nonzero no timer exists
    postpone: PostponeCounter,

    /// The single live timer, if armed
    timer: Option<JoinHandle<()>>,

    /// Bumped on every arm so a fire from an already-replaced timer is
    /// recognized as stale and ignored
    timer_generation: u64,
}

pub(super) struct Shared {
    queue: Arc<dyn Executor>,
    registry: PrototypeRegistry,
    state: Mutex<MachineState>,
}

/// The RecurrenceMachine submits fresh instances of every registered task
/// prototype to its work queue once per interval, provided the queue has
/// drained since the last cycle, then re-arms itself.
///
/// Postponement suspends future cycles without touching in-flight work:
/// while the postpone count is nonzero the timer is destroyed, and when the
/// count returns to zero a new timer is armed one full interval out. Callers
/// that need an immediate cycle use [`RecurrenceMachine::schedule_operations_now`].
///
/// Handles are cheap to clone and share one underlying machine. The machine
/// arms its timer at construction, so it must be created inside a tokio
/// runtime.
#[derive(Clone)]
pub struct RecurrenceMachine {
    shared: Arc<Shared>,
}

impl RecurrenceMachine {
    /// Create a machine that owns its work queue.
    ///
    /// Letting the machine use its own queue is the recommended setup; it
    /// probes the queue for idleness every cycle, and a queue shared with
    /// unrelated work changes what "idle" means.
    pub fn new(config: RecurrenceConfig) -> Result<Self> {
        let queue: Arc<dyn Executor> = if config.max_concurrent > 0 {
            Arc::new(WorkQueue::with_concurrency(config.max_concurrent))
        } else {
            Arc::new(WorkQueue::new())
        };
        Self::with_queue(config, queue)
    }

    /// Create a machine on top of a caller-supplied executor.
    pub fn with_queue(config: RecurrenceConfig, queue: Arc<dyn Executor>) -> Result<Self> {
        let interval = config.interval();
        if interval.is_zero() {
            return Err(RecurrenceError::InvalidInterval);
        }

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let timer = spawn_timer(weak.clone(), interval, 1);
            Shared {
                queue,
                registry: PrototypeRegistry::new(),
                state: Mutex::new(MachineState {
                    interval,
                    postpone: PostponeCounter::default(),
                    timer: Some(timer),
                    timer_generation: 1,
                }),
            }
        });

        info!(?interval, "recurrence machine started");
        Ok(Self { shared })
    }

    pub(super) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Read-only handle to the executor this machine submits into
    pub fn queue(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.shared.queue)
    }

    /// Append a prototype to the registry.
    ///
    /// Has no effect on the timer; the prototype is picked up by the next
    /// cycle.
    pub async fn add_recurring_task(&self, prototype: Arc<dyn RecurringTask>) {
        self.shared.registry.push(prototype).await;
    }

    /// Snapshot of the registered prototypes in submission order.
    ///
    /// Reflects all structural mutation performed through [`Self::registry`].
    pub async fn recurring_tasks(&self) -> Vec<Arc<dyn RecurringTask>> {
        self.shared.registry.snapshot().await
    }

    /// The registry's mutation surface (insert, remove, move, subscribe).
    pub fn registry(&self) -> &PrototypeRegistry {
        &self.shared.registry
    }

    /// Current recurrence interval
    pub async fn recurrence_interval(&self) -> Duration {
        self.shared.state.lock().await.interval
    }

    /// Replace the recurrence interval.
    ///
    /// An armed timer is invalidated and recreated with the new value, so a
    /// timer already counting down never fires on the old schedule. While
    /// postponed there is no timer to rebuild; the new value takes effect at
    /// the next arming.
    pub async fn set_recurrence_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(RecurrenceError::InvalidInterval);
        }
        let mut state = self.shared.state.lock().await;
        debug!(old = ?state.interval, new = ?interval, "recurrence interval changed");
        state.interval = interval;
        if !state.postpone.is_postponed() {
            arm_locked(&self.shared, &mut state);
        }
        Ok(())
    }

    /// Attempt an immediate recurrence cycle, bypassing the timer.
    ///
    /// Returns false, submitting nothing, when the executor still has
    /// outstanding work; that is a no-op, not an error. Otherwise every
    /// registered prototype is instantiated and submitted in order (an empty
    /// registry still counts as success), the timer is reset, and the call
    /// returns true.
    ///
    /// Postponement is deliberately not consulted: this is the explicit
    /// escape hatch for forcing a cycle while postponed. In that case the
    /// cycle runs but no timer is armed, since no timer may exist while the
    /// machine is postponed.
    pub async fn schedule_operations_now(&self) -> bool {
        let mut state = self.shared.state.lock().await;
        if !self.shared.queue.is_idle().await {
            debug!("schedule_operations_now: executor busy, nothing scheduled");
            return false;
        }

        let submitted = self.run_cycle().await;
        info!(submitted, "immediate recurrence cycle submitted");

        if !state.postpone.is_postponed() {
            arm_locked(&self.shared, &mut state);
        }
        true
    }

    /// Suspend future recurrence cycles.
    ///
    /// On the first begin the timer is destroyed; further begins only deepen
    /// the count. In-flight work is never recalled.
    pub async fn begin_postponing_operations(&self) {
        let mut state = self.shared.state.lock().await;
        if state.postpone.begin() {
            info!("postponing operations; recurrence timer destroyed");
            disarm_locked(&mut state);
        } else {
            debug!(count = state.postpone.count(), "postpone depth increased");
        }
    }

    /// Release one postponing request.
    ///
    /// Fails with [`RecurrenceError::NotPostponed`] when the count is
    /// already zero. When the count returns to zero a fresh timer is armed a
    /// full interval out; nothing is scheduled immediately. Callers that
    /// want an immediate cycle follow up with
    /// [`Self::schedule_operations_now`].
    pub async fn end_postponing_operations(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.postpone.end()? {
            info!(interval = ?state.interval, "postponement over; timer armed for a full interval");
            arm_locked(&self.shared, &mut state);
        } else {
            debug!(count = state.postpone.count(), "postpone depth decreased");
        }
        Ok(())
    }

    /// True while at least one postponing request is outstanding
    pub async fn is_postponing_operations(&self) -> bool {
        self.shared.state.lock().await.postpone.is_postponed()
    }

    /// Current postpone depth. Diagnostic only; do not branch on it.
    pub async fn postponing_request_count(&self) -> u64 {
        self.shared.state.lock().await.postpone.count()
    }

    /// Build a fresh prefix instance that begins postponing when executed.
    ///
    /// See [`Self::submit_bracketed`] for the wiring contract.
    pub fn postponing_wrapper_prefix(&self) -> TaskInstance {
        bracket::prefix(Arc::downgrade(&self.shared))
    }

    /// Build a fresh suffix instance that ends postponing when executed.
    pub fn postponing_wrapper_suffix(&self) -> TaskInstance {
        bracket::suffix(Arc::downgrade(&self.shared))
    }

    /// Submit `work` bracketed by a postponing prefix/suffix pair.
    ///
    /// The work is made dependent on the prefix and the suffix dependent on
    /// the work, so under the executor's dependency semantics postponement
    /// is active from prefix completion through suffix start and no
    /// recurrence cycle fires mid-flight. Returns the suffix ticket, which
    /// completes once the whole bracket has drained.
    ///
    /// Callers wiring their own multi-instance brackets use
    /// [`Self::postponing_wrapper_prefix`] and
    /// [`Self::postponing_wrapper_suffix`] directly, in exactly this shape.
    pub async fn submit_bracketed(&self, work: TaskInstance) -> Ticket {
        let prefix = self
            .shared
            .queue
            .submit(self.postponing_wrapper_prefix())
            .await;
        let work = self.shared.queue.submit_after(work, &prefix).await;
        self.shared
            .queue
            .submit_after(self.postponing_wrapper_suffix(), &work)
            .await
    }

    /// One timer expiry.
    async fn timer_fired(&self, generation: u64) {
        let mut state = self.shared.state.lock().await;
        if generation != state.timer_generation {
            debug!(
                generation,
                current = state.timer_generation,
                "stale timer fire ignored"
            );
            return;
        }
        state.timer = None;

        if state.postpone.is_postponed() {
            // No timer should exist in this state; ignore defensively
            warn!("timer fired while postponed; ignoring");
            return;
        }

        if !self.shared.queue.is_idle().await {
            debug!("executor busy at recurrence tick; probing again next interval");
            arm_locked(&self.shared, &mut state);
            return;
        }

        let submitted = self.run_cycle().await;
        info!(submitted, "recurrence cycle submitted");
        arm_locked(&self.shared, &mut state);
    }

    /// Instantiate and submit every registered prototype, in order.
    async fn run_cycle(&self) -> usize {
        let prototypes = self.shared.registry.snapshot().await;
        let count = prototypes.len();
        for prototype in prototypes {
            let instance = prototype.instantiate();
            debug!(
                task = prototype.name(),
                id = %instance.id(),
                "submitting recurring instance"
            );
            self.shared.queue.submit(instance).await;
        }
        count
    }
}

/// Arm the timer. Invalidating the old one first is mandatory; at most one
/// live timer may exist or cycles double-fire.
fn arm_locked(shared: &Arc<Shared>, state: &mut MachineState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    state.timer_generation += 1;
    debug!(
        interval = ?state.interval,
        generation = state.timer_generation,
        "recurrence timer armed"
    );
    state.timer = Some(spawn_timer(
        Arc::downgrade(shared),
        state.interval,
        state.timer_generation,
    ));
}

/// Destroy the timer if armed.
fn disarm_locked(state: &mut MachineState) {
    if let Some(timer) = state.timer.take() {
        debug!("recurrence timer invalidated");
        timer.abort();
    }
}

/// A timer is one sleeping task. It holds the machine weakly so an orphaned
/// timer lapses instead of keeping the machine alive.
fn spawn_timer(shared: Weak<Shared>, interval: Duration, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(interval).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        RecurrenceMachine::from_shared(shared)
            .timer_fired(generation)
            .await;
    })
}
