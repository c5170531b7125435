use serde::{Deserialize, Serialize};

/// Knobs governing job transitions, retries, and the timer sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LifecycleConfig {
    /// Per-attempt deadline armed on assignment and renewed by heartbeats.
    pub attempt_timeout_ms: u64,
    /// Maximum attempts (assignments) a job may consume before failing.
    pub max_attempts: u32,
    /// How often the timer sweep runs.
    pub timer_scan_interval_ms: u64,
    /// Maximum jobs touched per sweep pass, so a single pass never starves
    /// foreground API load.
    pub timer_batch_max: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 120_000,
            max_attempts: 3,
            timer_scan_interval_ms: 1_000,
            timer_batch_max: 500,
        }
    }
}
