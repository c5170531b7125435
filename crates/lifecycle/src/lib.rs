//! The job state machine: transitions, timers, expirations, and retries.
//!
//! Dispatch (`coordinator-queue`) is kept separate from everything that
//! follows an assignment (this crate): result submission, error handling,
//! cancellation, and the timer sweep that drives attempt timeouts and
//! absolute expiry. [`Lifecycle`] is the only component that calls
//! `Store::transition_job` with a payment settlement attached, keeping the
//! "payment and job transition happen in one atomic Store transaction"
//! invariant in a single place.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod config;
mod error;

use std::sync::Arc;
use std::time::Instant;

use coordinator_clock::Clock;
use coordinator_payments::PaymentEngine;
use coordinator_primitives::{ErrorKind, Job, JobId, JobState, MinerId, Receipt, TimestampMs};
use coordinator_queue::JobQueue;
use coordinator_receipts::{deterministic_receipt_id, PriceClampPolicy, ReceiptService};
use coordinator_store::Store;

pub use config::LifecycleConfig;
pub use error::LifecycleError;

/// What a timer sweep pass did, for logging/metrics at the call site.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    /// Jobs moved to `EXPIRED` by the absolute deadline.
    pub expired: u32,
    /// Jobs returned to `QUEUED` by an attempt timeout.
    pub retried: u32,
    /// Jobs moved to `FAILED` by an attempt timeout with no attempts left.
    pub attempt_timed_out_failed: u32,
    /// Rows touched that had already moved on: a duplicate or late timer
    /// fire, which is always a no-op.
    pub already_settled: u32,
}

/// Owns every job transition past assignment: result/error submission,
/// cooperative cancellation, and the background timer sweep.
#[derive(Debug)]
pub struct Lifecycle {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    queue: Arc<JobQueue>,
    payments: Arc<PaymentEngine>,
    receipts: Arc<ReceiptService>,
    config: LifecycleConfig,
}

impl Lifecycle {
    /// Creates a lifecycle handler wired to its collaborators.
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        queue: Arc<JobQueue>,
        payments: Arc<PaymentEngine>,
        receipts: Arc<ReceiptService>,
        config: LifecycleConfig,
    ) -> Self {
        Self { store, clock, queue, payments, receipts, config }
    }

    /// Renews a running job's per-attempt deadline, then observes a pending
    /// client cancellation. Returns [`LifecycleError::JobCancelled`] if the
    /// job was cancelled while the miner held it; the miner must discard
    /// its in-progress work in that case.
    pub fn job_heartbeat(&self, job_id: &JobId, miner_id: &MinerId) -> Result<Job, LifecycleError> {
        let job = self.queue.job_heartbeat(job_id, miner_id, self.config.attempt_timeout_ms)?;
        if job.cancel_requested {
            self.finalize_cancellation(&job, miner_id)?;
            return Err(LifecycleError::JobCancelled(job_id.clone()));
        }
        Ok(job)
    }

    /// A miner's result for `(job_id, attempt)`. Idempotent: replaying the
    /// same `(job_id, attempt)` any number of times returns the identical
    /// receipt with no additional state change.
    pub fn submit_result(
        &self,
        job_id: &JobId,
        miner_id: &MinerId,
        attempt: u32,
        units_consumed: u64,
        result_payload: Vec<u8>,
    ) -> Result<Receipt, LifecycleError> {
        let receipt_id = deterministic_receipt_id(job_id, attempt);
        if let Some(existing) = self.store.get_receipt(&receipt_id)? {
            return Ok(existing);
        }

        let job = self.store.get_job(job_id)?.ok_or_else(|| LifecycleError::UnknownJob(job_id.clone()))?;
        if job.state != JobState::Running || job.assigned_miner_id.as_ref() != Some(miner_id) || job.attempt_count != attempt
        {
            return Err(LifecycleError::StaleAssignment(job_id.clone()));
        }
        if job.cancel_requested {
            self.finalize_cancellation(&job, miner_id)?;
            return Err(LifecycleError::JobCancelled(job_id.clone()));
        }

        let miner = self.store.get_miner(miner_id)?.ok_or_else(|| LifecycleError::UnknownMiner(miner_id.clone()))?;
        let now = self.clock.now_ms();

        let finalizing = self.store.update_job_atomic(job_id, JobState::Running, &mut |j| {
            j.record_transition(JobState::Running, JobState::Finalizing, "result_ok", now);
            j.state = JobState::Finalizing;
        })?;

        let seal_started = Instant::now();
        let sealed = self.receipts.build_and_seal(&finalizing, &miner, units_consumed, &result_payload, now);
        metrics::histogram!("receipt_seal_duration_ms").record(seal_started.elapsed().as_secs_f64() * 1000.0);

        match sealed {
            Ok(sealed) => {
                self.store.create_receipt(sealed.receipt.clone())?;
                let settlement =
                    self.payments.settlement_for_release(job.payment_id.clone(), sealed.receipt.amount_charged, miner_id.clone());
                let receipt_id = sealed.receipt.receipt_id.clone();
                let (updated, payment) = self.store.transition_job(
                    job_id,
                    JobState::Finalizing,
                    &mut |j| {
                        j.record_transition(JobState::Finalizing, JobState::Succeeded, "seal", now);
                        j.state = JobState::Succeeded;
                        j.receipt_id = Some(receipt_id.clone());
                        j.result_payload = Some(result_payload.clone());
                        if sealed.was_clamped {
                            j.error_kind = Some(ErrorKind::PriceClamped);
                        }
                    },
                    Some(miner_id),
                    Some(settlement),
                    now,
                )?;
                if let Some(payment) = payment {
                    self.payments.queue_event(&payment, now)?;
                }
                self.record_attempt_duration(&updated, now);
                metrics::counter!("jobs_by_terminal_state_total", "state" => "succeeded").increment(1);
                Ok(sealed.receipt)
            }
            Err(_) => {
                let settlement = self.payments.settlement_for_refund(job.payment_id.clone());
                let (updated, payment) = self.store.transition_job(
                    job_id,
                    JobState::Finalizing,
                    &mut |j| {
                        j.record_transition(JobState::Finalizing, JobState::Failed, "seal_fail", now);
                        j.state = JobState::Failed;
                        j.error_kind = Some(ErrorKind::SignerUnavailable);
                    },
                    Some(miner_id),
                    Some(settlement),
                    now,
                )?;
                if let Some(payment) = payment {
                    self.payments.queue_event(&payment, now)?;
                }
                self.record_attempt_duration(&updated, now);
                metrics::counter!("jobs_by_terminal_state_total", "state" => "failed").increment(1);
                Err(LifecycleError::SignerUnavailable(job_id.clone()))
            }
        }
    }

    /// A miner's application-level failure for `(job_id, attempt)`. Retries
    /// if attempts remain, else fails the job and refunds its payment.
    pub fn submit_error(&self, job_id: &JobId, miner_id: &MinerId, attempt: u32) -> Result<(), LifecycleError> {
        let job = self.store.get_job(job_id)?.ok_or_else(|| LifecycleError::UnknownJob(job_id.clone()))?;
        if job.state != JobState::Running || job.assigned_miner_id.as_ref() != Some(miner_id) || job.attempt_count != attempt
        {
            return Err(LifecycleError::StaleAssignment(job_id.clone()));
        }
        self.retry_or_fail(job_id, miner_id, ErrorKind::MinerReported)?;
        Ok(())
    }

    /// Invoked for a job in-flight on a miner that the liveness scan just
    /// marked `OFFLINE`. Retries while attempts remain, else fails and
    /// refunds with `error_kind = MinerLost`.
    pub fn on_miner_lost(&self, job_id: &JobId) -> Result<(), LifecycleError> {
        self.retry_or_fail_in_flight(job_id, ErrorKind::MinerLost)
    }

    /// Invoked by the timer sweep for a job whose per-attempt deadline
    /// elapsed without a heartbeat, result, or error from its miner.
    /// Distinct from [`Self::on_miner_lost`]: the miner's own liveness is
    /// not itself in question here, only this one attempt. Retries while
    /// attempts remain, else fails and refunds with
    /// `error_kind = AttemptTimeout`.
    fn on_attempt_timeout(&self, job_id: &JobId) -> Result<(), LifecycleError> {
        self.retry_or_fail_in_flight(job_id, ErrorKind::AttemptTimeout)
    }

    /// Shared guard for `on_miner_lost`/`on_attempt_timeout`: both observe
    /// an in-progress attempt from the outside (not from the miner's own
    /// `submit_error`), so both must re-check the job is still `RUNNING`
    /// with an assigned miner before handing off to `retry_or_fail`.
    fn retry_or_fail_in_flight(&self, job_id: &JobId, reason: ErrorKind) -> Result<(), LifecycleError> {
        let job = self.store.get_job(job_id)?.ok_or_else(|| LifecycleError::UnknownJob(job_id.clone()))?;
        if job.state != JobState::Running {
            return Ok(());
        }
        let Some(miner_id) = job.assigned_miner_id.clone() else { return Ok(()) };
        self.retry_or_fail(job_id, &miner_id, reason)?;
        Ok(())
    }

    /// Shared retry/fail path for an in-progress attempt that did not
    /// complete: miner lost, application error, or attempt timeout.
    fn retry_or_fail(&self, job_id: &JobId, miner_id: &MinerId, reason: ErrorKind) -> Result<(), LifecycleError> {
        let now = self.clock.now_ms();
        let job = self.store.get_job(job_id)?.ok_or_else(|| LifecycleError::UnknownJob(job_id.clone()))?;
        let retriable = job.attempt_count < self.config.max_attempts;

        if retriable {
            let miner_id_owned = miner_id.clone();
            let (updated, _) = self.store.transition_job(
                job_id,
                JobState::Running,
                &mut |j| {
                    j.record_transition(JobState::Running, JobState::Queued, "retry", now);
                    j.state = JobState::Queued;
                    j.assigned_miner_id = None;
                    j.assigned_ms = None;
                    j.last_heartbeat_ms = None;
                    j.attempt_deadline_ms = None;
                    j.exclude_miner(miner_id_owned.clone());
                },
                Some(miner_id),
                None,
                now,
            )?;
            metrics::counter!("retries_total").increment(1);
            self.record_attempt_duration(&updated, now);
            Ok(())
        } else {
            let settlement = self.payments.settlement_for_refund(job.payment_id.clone());
            let (updated, payment) = self.store.transition_job(
                job_id,
                JobState::Running,
                &mut |j| {
                    j.record_transition(JobState::Running, JobState::Failed, "attempts_exhausted", now);
                    j.state = JobState::Failed;
                    j.error_kind = Some(reason);
                },
                Some(miner_id),
                Some(settlement),
                now,
            )?;
            if let Some(payment) = payment {
                self.payments.queue_event(&payment, now)?;
            }
            self.record_attempt_duration(&updated, now);
            metrics::counter!("jobs_by_terminal_state_total", "state" => "failed").increment(1);
            Ok(())
        }
    }

    /// Client-initiated cancellation. Immediate in `QUEUED`; cooperative
    /// (flagged, observed at the next miner interaction) in `RUNNING`.
    /// A no-op on a terminal job, returning its current state unchanged.
    pub fn cancel_job(&self, job_id: &JobId) -> Result<Job, LifecycleError> {
        let job = self.store.get_job(job_id)?.ok_or_else(|| LifecycleError::UnknownJob(job_id.clone()))?;
        let now = self.clock.now_ms();
        match job.state {
            JobState::Queued => {
                let settlement = self.payments.settlement_for_refund(job.payment_id.clone());
                let (updated, payment) = self.store.transition_job(
                    job_id,
                    JobState::Queued,
                    &mut |j| {
                        j.record_transition(JobState::Queued, JobState::Cancelled, "client_cancel", now);
                        j.state = JobState::Cancelled;
                    },
                    None,
                    Some(settlement),
                    now,
                )?;
                if let Some(payment) = payment {
                    self.payments.queue_event(&payment, now)?;
                }
                metrics::counter!("jobs_by_terminal_state_total", "state" => "cancelled").increment(1);
                Ok(updated)
            }
            JobState::Running => {
                let updated = self.store.update_job_atomic(job_id, JobState::Running, &mut |j| {
                    j.cancel_requested = true;
                })?;
                Ok(updated)
            }
            _ => Ok(job),
        }
    }

    /// Transitions a `RUNNING` job whose client already requested
    /// cancellation, once the miner next interacts with it.
    fn finalize_cancellation(&self, job: &Job, miner_id: &MinerId) -> Result<(), LifecycleError> {
        let now = self.clock.now_ms();
        let settlement = self.payments.settlement_for_refund(job.payment_id.clone());
        let result = self.store.transition_job(
            &job.id,
            JobState::Running,
            &mut |j| {
                j.record_transition(JobState::Running, JobState::Cancelled, "client_cancel", now);
                j.state = JobState::Cancelled;
            },
            Some(miner_id),
            Some(settlement),
            now,
        );
        match result {
            Ok((_, Some(payment))) => {
                self.payments.queue_event(&payment, now)?;
                metrics::counter!("jobs_by_terminal_state_total", "state" => "cancelled").increment(1);
                Ok(())
            }
            Ok((_, None)) => Ok(()),
            // Another caller already observed the cancellation; idempotent.
            Err(coordinator_store::StoreError::StaleState { .. }) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// One pass of the background timer sweep: finds non-terminal jobs
    /// whose absolute or per-attempt deadline has elapsed and fires the
    /// matching handler. Bounded by `timer_batch_max` so a single pass
    /// cannot starve foreground API load.
    pub fn run_timer_sweep(&self) -> Result<SweepOutcome, LifecycleError> {
        let now = self.clock.now_ms();
        let candidates = self.store.scan_jobs_expiring_before(now, self.config.timer_batch_max)?;
        let mut outcome = SweepOutcome::default();

        for job in candidates {
            if job.state.is_terminal() {
                outcome.already_settled += 1;
                continue;
            }
            if job.deadline_ms.0 <= now.0 {
                match self.expire(&job, now) {
                    Ok(true) => outcome.expired += 1,
                    Ok(false) => outcome.already_settled += 1,
                    Err(err) => return Err(err),
                }
                continue;
            }
            if job.state == JobState::Running && job.attempt_deadline_ms.is_some_and(|d| d.0 <= now.0) {
                metrics::counter!("heartbeat_expiries_total").increment(1);
                let before = job.attempt_count;
                self.on_attempt_timeout(&job.id)?;
                match self.store.get_job(&job.id)? {
                    Some(j) if j.state == JobState::Queued && j.attempt_count == before => outcome.retried += 1,
                    Some(j) if j.state == JobState::Failed => outcome.attempt_timed_out_failed += 1,
                    _ => outcome.already_settled += 1,
                }
            }
        }
        Ok(outcome)
    }

    /// Expires one job past its absolute deadline. Returns `Ok(false)` if
    /// another caller already moved it: at-least-once timer firing is a
    /// no-op on replay.
    fn expire(&self, job: &Job, now: TimestampMs) -> Result<bool, LifecycleError> {
        let settlement = self.payments.settlement_for_refund(job.payment_id.clone());
        let miner_to_clear = job.assigned_miner_id.as_ref();
        let result = self.store.transition_job(
            &job.id,
            job.state,
            &mut |j| {
                j.record_transition(job.state, JobState::Expired, "deadline", now);
                j.state = JobState::Expired;
                j.error_kind = None;
            },
            miner_to_clear,
            Some(settlement),
            now,
        );
        match result {
            Ok((_, Some(payment))) => {
                self.payments.queue_event(&payment, now)?;
                metrics::counter!("jobs_by_terminal_state_total", "state" => "expired").increment(1);
                Ok(true)
            }
            Ok((_, None)) => Ok(true),
            Err(coordinator_store::StoreError::StaleState { .. }) => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    fn record_attempt_duration(&self, job: &Job, now: TimestampMs) {
        if let Some(assigned_ms) = job.assigned_ms {
            metrics::histogram!("job_attempt_duration_ms").record(now.0.saturating_sub(assigned_ms.0) as f64);
        }
    }
}

/// Never succeeds against [`PriceClampPolicy::Fail`] with a friendlier name
/// at this crate's boundary; kept private since `Lifecycle` only needs the
/// default clamp-and-succeed policy wired by `coordinator-node`.
#[allow(dead_code)]
const fn _default_policy() -> PriceClampPolicy {
    PriceClampPolicy::ClampAndSucceed
}
