//! Postponing wrapper construction
//!
//! The prefix/suffix pair expresses the postponement counter as two
//! schedulable units instead of a lexical scope. The critical section spans
//! executor-scheduled work rather than a single call stack, so a guard
//! object cannot bracket it; two operations wired into the executor's
//! dependency graph can. Submission order is
//! { prefix } - { real work } - { suffix }, with the real work dependent on
//! the prefix and the suffix dependent on the real work.

use std::sync::Weak;

use tracing::{debug, error};
use workqueue::TaskInstance;

use super::core::{RecurrenceMachine, Shared};

/// Build a fresh prefix instance. On execution it begins postponing on the
/// owning machine; if the machine is already gone it does nothing.
pub(super) fn prefix(shared: Weak<Shared>) -> TaskInstance {
    TaskInstance::new("postponing-wrapper-prefix", async move {
        let Some(shared) = shared.upgrade() else {
            debug!("postponing prefix ran after machine shutdown; skipping");
            return;
        };
        RecurrenceMachine::from_shared(shared)
            .begin_postponing_operations()
            .await;
    })
}

/// Build a fresh suffix instance. On execution it ends postponing on the
/// owning machine; if the machine is already gone it does nothing.
pub(super) fn suffix(shared: Weak<Shared>) -> TaskInstance {
    TaskInstance::new("postponing-wrapper-suffix", async move {
        let Some(shared) = shared.upgrade() else {
            debug!("postponing suffix ran after machine shutdown; skipping");
            return;
        };
        let result = RecurrenceMachine::from_shared(shared)
            .end_postponing_operations()
            .await;
        if let Err(e) = result {
            // A task body has no return channel; an unmatched suffix is a
            // wiring bug on the submitting side
            error!(error = %e, "postponing suffix executed without a matching prefix");
        }
    })
}
