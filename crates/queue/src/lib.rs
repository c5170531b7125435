//! Job admission, the pending-job index, and at-most-once miner dispatch.
//!
//! The job state machine splits into two collaborators:
//! `JobQueue` (this crate) owns admission and the miner-poll contract;
//! `coordinator-lifecycle` owns every transition that follows. `JobQueue`
//! keeps no separate index — `Store::scan_jobs_by_state` plus
//! `Miner::satisfies` is enough at the scale this reference implementation
//! targets, and it means the "index" never drifts from Store.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod config;
mod error;

use std::sync::Arc;

use coordinator_clock::{Clock, IdGen};
use coordinator_payments::PaymentEngine;
use coordinator_primitives::{
    Amount, CapabilityRequirement, Job, JobId, JobState, MinerId, MinerStatus, PaymentId, SubmitterId, TenantId,
    TimestampMs,
};
use coordinator_store::Store;

pub use config::QueueConfig;
pub use error::QueueError;

/// Owns job admission and dispatches jobs to polling miners.
#[derive(Debug)]
pub struct JobQueue {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    payments: Arc<PaymentEngine>,
    config: QueueConfig,
}

impl JobQueue {
    /// Creates a queue backed by `store`, using `clock` for timestamps and
    /// `payments` to create the job's payment hold at admission.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, payments: Arc<PaymentEngine>, config: QueueConfig) -> Self {
        Self { store, clock, payments, config }
    }

    /// Admits a new job: validates payload size and the tenant's open-job
    /// quota, creates the payment hold, then the job row itself, both
    /// `QUEUED` with `attempt_count = 0`.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_job(
        &self,
        id_gen: &dyn IdGen,
        tenant_id: TenantId,
        submitter_id: SubmitterId,
        capability_requirement: CapabilityRequirement,
        payload: Vec<u8>,
        max_price: Amount,
        ttl_ms: Option<u64>,
    ) -> Result<(JobId, PaymentId), QueueError> {
        if payload.len() > self.config.max_job_payload_bytes {
            return Err(QueueError::PayloadTooLarge { actual: payload.len(), max: self.config.max_job_payload_bytes });
        }
        if self.store.count_open_jobs_for_tenant(&tenant_id)? >= self.config.tenant_open_jobs_max {
            return Err(QueueError::QuotaExceeded(tenant_id));
        }

        let now = self.clock.now_ms();
        let ttl_ms = ttl_ms.unwrap_or(self.config.job_default_ttl_ms);
        let job_id = JobId::from(id_gen.generate());
        let payment_id = PaymentId::from(id_gen.generate());

        let job = Job {
            id: job_id.clone(),
            tenant_id,
            submitter_id: submitter_id.clone(),
            capability_requirement,
            payload,
            max_price,
            deadline_ms: now.plus_ms(ttl_ms),
            ttl_ms,
            created_ms: now,
            state: JobState::Queued,
            assigned_miner_id: None,
            assigned_ms: None,
            last_heartbeat_ms: None,
            attempt_deadline_ms: None,
            attempt_count: 0,
            result_payload: None,
            error_kind: None,
            receipt_id: None,
            payment_id: payment_id.clone(),
            exclude_miners: Default::default(),
            cancel_requested: false,
            transitions: Default::default(),
        };
        self.store.create_job(job)?;
        self.payments.hold(payment_id.clone(), job_id.clone(), submitter_id, max_price)?;
        tracing::info!(job_id = %job_id, %payment_id, "queue: job admitted");
        Ok((job_id, payment_id))
    }

    /// One non-blocking dispatch attempt for `miner_id`: selects up to
    /// `max_jobs` FIFO-ordered `QUEUED` jobs the miner can satisfy, not in
    /// the job's `exclude_miners`, and attempts the atomic QUEUED→RUNNING
    /// transition for each. A `StaleState` loss (another poller won) just
    /// skips the job: no retry budget is consumed and the candidate list
    /// is not re-fetched. Long-polling (`wait_ms`) is implemented by the
    /// RPC layer re-calling this until it yields a non-empty result or its
    /// timeout elapses; this method never blocks.
    pub fn poll(
        &self,
        miner_id: &MinerId,
        capability_filter: Option<&CapabilityRequirement>,
        max_jobs: u32,
        attempt_timeout_ms: u64,
        miner_liveness_timeout_ms: u64,
    ) -> Result<Vec<Job>, QueueError> {
        let miner = self.store.get_miner(miner_id)?.ok_or_else(|| QueueError::UnknownMiner(miner_id.clone()))?;
        if miner.status != MinerStatus::Active {
            return Err(QueueError::MinerNotActive(miner_id.clone()));
        }
        let now = self.clock.now_ms();
        if now.0.saturating_sub(miner.last_heartbeat_ms.0) > miner_liveness_timeout_ms {
            return Err(QueueError::MinerNotActive(miner_id.clone()));
        }

        let capacity = miner.available_slots().min(max_jobs);
        if capacity == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.store.scan_jobs_by_state(JobState::Queued, 0)?;
        let mut assigned = Vec::new();
        for job in candidates {
            if assigned.len() as u32 >= capacity {
                break;
            }
            if !miner.satisfies(&job.capability_requirement) {
                continue;
            }
            if job.exclude_miners.contains(miner_id) {
                continue;
            }
            if let Some(filter) = capability_filter {
                if filter.model != job.capability_requirement.model {
                    continue;
                }
            }
            match self.store.assign_job(&job.id, miner_id, now, attempt_timeout_ms) {
                Ok(assigned_job) => assigned.push(assigned_job),
                Err(coordinator_store::StoreError::StaleState { .. }) => {
                    metrics::counter!("assignment_races_total").increment(1);
                    continue;
                }
                Err(other) => return Err(other.into()),
            }
        }
        if !assigned.is_empty() {
            metrics::counter!("miner_assignments_total").increment(assigned.len() as u64);
        }
        Ok(assigned)
    }

    /// Renews a running job's per-attempt deadline and heartbeat timestamp.
    /// Returns the updated row; callers must check
    /// [`Job::cancel_requested`](coordinator_primitives::Job) on the result
    /// and hand it to `coordinator-lifecycle`'s cancel-observation path if
    /// set.
    pub fn job_heartbeat(&self, job_id: &JobId, miner_id: &MinerId, attempt_timeout_ms: u64) -> Result<Job, QueueError> {
        let now = self.clock.now_ms();
        let job = self.store.update_job_atomic(job_id, JobState::Running, &mut |job| {
            if job.assigned_miner_id.as_ref() == Some(miner_id) {
                job.last_heartbeat_ms = Some(now);
                job.attempt_deadline_ms = Some(now.plus_ms(attempt_timeout_ms));
            }
        })?;
        if job.assigned_miner_id.as_ref() != Some(miner_id) {
            return Err(QueueError::UnknownMiner(miner_id.clone()));
        }
        Ok(job)
    }
}
