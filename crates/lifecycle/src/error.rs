use coordinator_primitives::JobId;

/// Errors raised by [`crate::Lifecycle`].
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// No job exists with the given id.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    /// No miner exists with the given id.
    #[error("unknown miner {0}")]
    UnknownMiner(coordinator_primitives::MinerId),
    /// The job is not `RUNNING` under the caller's assignment, or the
    /// attempt number has moved on (a prior timeout/retry superseded it).
    /// The caller must discard whatever it was about to report.
    #[error("stale assignment for job {0}")]
    StaleAssignment(JobId),
    /// The job was cancelled while the caller held the assignment; the
    /// caller should stop computing.
    #[error("job {0} was cancelled")]
    JobCancelled(JobId),
    /// The job is not visible to the calling tenant.
    #[error("job {0} not found")]
    NotFound(JobId),
    /// The receipt signer was unavailable while sealing; the job failed and
    /// its payment was refunded.
    #[error("signer unavailable while sealing job {0}")]
    SignerUnavailable(JobId),
    /// Underlying store failure unrelated to a lost race.
    #[error(transparent)]
    Store(#[from] coordinator_store::StoreError),
    /// Underlying queue failure (admission, dispatch).
    #[error(transparent)]
    Queue(#[from] coordinator_queue::QueueError),
    /// Underlying payment failure.
    #[error(transparent)]
    Payment(#[from] coordinator_payments::PaymentError),
}
