//! WorkQueue - dependency-aware async task execution
//!
//! A small executor abstraction: callers hand in [`TaskInstance`]s, get back
//! [`Ticket`]s, and can order one submission after another. The [`Executor`]
//! trait is the boundary consumers program against; [`WorkQueue`] is the
//! tokio-backed implementation.
//!
//! The queue makes exactly three promises:
//!
//! - `submit` enqueues an independent unit of work
//! - `submit_after` enqueues work that will not start until its dependency
//!   has completed
//! - `is_idle` is true only when nothing submitted is pending or running
//!
//! Everything else (ordering among independent instances, concurrency,
//! failure handling of individual instances) is queue policy, not contract.

pub mod instance;
pub mod queue;

pub use instance::{TaskInstance, Ticket};
pub use queue::{Executor, QueueStats, WorkQueue};
