//! Recurrence machine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Recurrence machine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    /// Seconds between recurrence cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Concurrency cap for the machine-owned work queue; 0 means unbounded.
    /// Ignored when the machine is built on a caller-supplied executor.
    #[serde(default)]
    pub max_concurrent: usize,
}

fn default_interval_secs() -> u64 {
    30
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_concurrent: 0,
        }
    }
}

impl RecurrenceConfig {
    /// Get the recurrence interval as a Duration
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
