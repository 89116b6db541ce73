//! Recurrence - interval-driven prototype task scheduling
//!
//! A recurrence machine holds an ordered set of reusable task templates
//! (prototypes) and, once per interval, submits fresh instances of all of
//! them to a work queue, provided the queue has drained since the last
//! cycle. Recurrence can be suspended with a reference-counted
//! postponement, and arbitrary external work can be bracketed with
//! postponement state through executor-level dependency ordering.
//!
//! # Core Concepts
//!
//! - **Prototypes, not tasks**: registered work is a template; every cycle
//!   runs a brand-new instance, so no stale state survives between cycles
//!   and nothing needs resetting
//! - **Postponement counts, never cancels**: in-flight work is untouched;
//!   only future scheduling decisions are suspended
//! - **One timer**: at most one live timer exists at any moment; it is
//!   destroyed while postponed and recreated, a full interval out, when
//!   postponement ends
//!
//! # Modules
//!
//! - [`machine`] - the recurrence machine and its configuration
//! - [`registry`] - ordered prototype storage with change events
//! - [`task`] - the prototype trait and a closure adapter
//! - [`error`] - error types

pub mod error;
pub mod machine;
pub mod registry;
pub mod task;

pub use error::{RecurrenceError, Result};
pub use machine::{RecurrenceConfig, RecurrenceMachine};
pub use registry::{PrototypeRegistry, RegistryEvent};
pub use task::{FnTask, RecurringTask};

// Re-export the executor boundary so downstream code rarely needs to depend
// on workqueue directly
pub use workqueue::{Executor, TaskInstance, Ticket, WorkQueue};
