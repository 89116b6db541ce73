//! Postponement counter state machine

use crate::error::RecurrenceError;

/// Reference-counted suspension of recurrence.
///
/// Two states: Active (count == 0) and Postponed (count > 0). The counter is
/// pure state; the machine reacts to the edges it reports by destroying or
/// recreating its timer.
#[derive(Debug, Default)]
pub(super) struct PostponeCounter {
    count: u64,
}

impl PostponeCounter {
    /// Increment the counter. Returns true on the Active to Postponed edge.
    pub fn begin(&mut self) -> bool {
        self.count += 1;
        self.count == 1
    }

    /// Decrement the counter. Returns true on the Postponed to Active edge.
    ///
    /// Decrementing past zero is a caller bug and fails loudly rather than
    /// clamping, since clamping would mask unbalanced begin/end pairs.
    pub fn end(&mut self) -> Result<bool, RecurrenceError> {
        if self.count == 0 {
            return Err(RecurrenceError::NotPostponed);
        }
        self.count -= 1;
        Ok(self.count == 0)
    }

    pub fn is_postponed(&self) -> bool {
        self.count > 0
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}
