//! Timeline configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for an editing timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Ignore leading/trailing whitespace when computing line diffs
    pub ignore_trim_whitespace: bool,

    /// Time budget for a single diff computation; past it the diff returns a
    /// partial, quit-early result instead of being aborted
    #[serde(with = "humantime_serde")]
    pub diff_time_budget: Duration,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            ignore_trim_whitespace: true,
            diff_time_budget: Duration::from_secs(3),
        }
    }
}

impl TimelineConfig {
    /// Create a config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Respect whitespace-only line changes in diffs
    pub fn with_exact_whitespace(mut self) -> Self {
        self.ignore_trim_whitespace = false;
        self
    }

    /// Set the diff computation time budget
    pub fn with_diff_time_budget(mut self, budget: Duration) -> Self {
        self.diff_time_budget = budget;
        self
    }
}
