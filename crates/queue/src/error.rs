use coordinator_primitives::{JobId, MinerId};

/// Errors raised by [`crate::JobQueue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The submitted payload exceeds `max_job_payload_bytes`.
    #[error("payload of {actual} bytes exceeds the {max} byte limit")]
    PayloadTooLarge {
        /// The payload size that was rejected.
        actual: usize,
        /// The configured limit.
        max: usize,
    },
    /// The tenant already has `tenant_open_jobs_max` non-terminal jobs.
    #[error("tenant {0} has reached its open-job quota")]
    QuotaExceeded(coordinator_primitives::TenantId),
    /// No job exists with the given id.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    /// No miner exists with the given id.
    #[error("unknown miner {0}")]
    UnknownMiner(MinerId),
    /// The miner is not eligible to receive new assignments (not `ACTIVE`,
    /// or its heartbeat has gone stale).
    #[error("miner {0} is not active")]
    MinerNotActive(MinerId),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] coordinator_store::StoreError),
    /// Underlying payment-hold failure.
    #[error(transparent)]
    Payment(#[from] coordinator_payments::PaymentError),
}
