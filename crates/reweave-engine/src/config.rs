//! Replay engine configuration.

use std::time::Duration;

/// Tunables for a replay run.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Repair attempts allowed per step before the run fails.
    pub max_retries: u32,
    /// Pause before each step attempt, letting the page settle.
    pub settle_delay: Duration,
    /// Hard bound on a single step attempt.
    pub step_timeout: Duration,
    /// How long to wait for a step's target element to appear.
    pub element_timeout: Duration,
    /// Interactive elements included in a repair snapshot.
    pub snapshot_max_elements: usize,
    /// Page text fed to an extraction prompt, in characters.
    pub extract_max_chars: usize,
    /// Scroll attempts when scrolling a target element into view.
    pub scroll_attempts: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            settle_delay: Duration::from_secs(1),
            step_timeout: Duration::from_secs(60),
            element_timeout: Duration::from_secs(10),
            snapshot_max_elements: 40,
            extract_max_chars: 8_000,
            scroll_attempts: 8,
        }
    }
}
