use serde::{Deserialize, Serialize};

/// Admission-time knobs for [`crate::JobQueue::submit_job`].
///
/// Dispatch-time knobs (`attempt_timeout_ms`, `miner_liveness_timeout_ms`)
/// are passed explicitly to [`crate::JobQueue::poll`] instead of stored
/// here, since they are shared with `coordinator-lifecycle`'s sweepers and
/// `coordinator-node` is the single place that owns `CoordinatorConfig`:
/// no module-level singletons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QueueConfig {
    /// Default TTL applied when a submission omits one.
    pub job_default_ttl_ms: u64,
    /// Maximum accepted job payload size, in bytes.
    pub max_job_payload_bytes: usize,
    /// Maximum non-terminal jobs a single tenant may have open at once.
    pub tenant_open_jobs_max: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { job_default_ttl_ms: 900_000, max_job_payload_bytes: 65_536, tenant_open_jobs_max: 1_000 }
    }
}
