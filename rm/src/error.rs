//! Recurrence error types

use thiserror::Error;

/// Errors surfaced by the recurrence machine's control surface.
///
/// All of these are usage errors: they indicate a caller bug, are reported
/// synchronously to the immediate caller, and leave the machine state
/// untouched. There is no background error channel; failures inside
/// submitted task instances are the executor's concern, not this crate's.
#[derive(Debug, Error)]
pub enum RecurrenceError {
    /// `end_postponing_operations` was called with the counter already at
    /// zero. Silently clamping would mask unbalanced begin/end pairs, so
    /// this fails loudly instead.
    #[error("postponing request count is already zero")]
    NotPostponed,

    /// The recurrence interval must be a positive duration.
    #[error("recurrence interval must be greater than zero")]
    InvalidInterval,

    /// A registry mutation referenced a slot that does not exist.
    #[error("registry index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Convenience result alias for recurrence operations
pub type Result<T> = std::result::Result<T, RecurrenceError>;
