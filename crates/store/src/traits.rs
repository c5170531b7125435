use coordinator_primitives::{
    Amount, Job, JobId, JobState, Miner, MinerId, MinerStatus, Payment, PaymentEvent, PaymentId,
    PaymentState, Receipt, ReceiptId, TenantId, TimestampMs,
};

use crate::StoreError;

/// A payment transition to apply atomically alongside a job transition.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    /// Payment to transition.
    pub payment_id: PaymentId,
    /// Expected current state; a mismatch is `StoreError::StaleState`.
    pub expected: PaymentState,
    /// Target state.
    pub new: PaymentState,
    /// Settled amount, required for `Released`.
    pub settled_amount: Option<Amount>,
    /// Payee, required for `Released`.
    pub payee_id: Option<MinerId>,
}

/// Snapshot counters for the operator `get_stats` surface.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of jobs per state.
    pub jobs_by_state: Vec<(JobState, usize)>,
    /// Number of registered miners per status.
    pub miners_by_status: Vec<(MinerStatus, usize)>,
    /// Number of payment events not yet acknowledged by the `LedgerSink`.
    pub pending_payment_events: usize,
}

/// Durable persistence of jobs, miners, receipts, and payments with atomic,
/// serializable multi-row transitions.
///
/// This is a typed contract: no raw queries are exposed, every write
/// names the entity, its expected prior state, and
/// (where more than one entity must move together) the other entities
/// involved, so a single call is the unit of atomicity.
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Inserts a new job. Fails with `AlreadyExists` if `job.id` is taken.
    fn create_job(&self, job: Job) -> Result<(), StoreError>;

    /// Fetches a job by id.
    fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError>;

    /// Applies `mutator` to the job if its current state is `expected_state`,
    /// atomically. Returns the updated row, or `StaleState` if the
    /// precondition failed.
    fn update_job_atomic(
        &self,
        id: &JobId,
        expected_state: JobState,
        mutator: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, StoreError>;

    /// Atomically assigns a `Queued` job to a miner: transitions the job to
    /// `Running`, sets `assigned_miner_id`/`assigned_ms`/`last_heartbeat_ms`,
    /// arms `attempt_deadline_ms` at `now_ms + attempt_timeout_ms`,
    /// increments `attempt_count`, and adds the job to the miner's
    /// `in_flight_jobs` — all in one transaction. Fails `StaleState` if the
    /// job is no longer `Queued` (another poller won) or the miner has no
    /// spare capacity.
    fn assign_job(
        &self,
        job_id: &JobId,
        miner_id: &MinerId,
        now_ms: TimestampMs,
        attempt_timeout_ms: u64,
    ) -> Result<Job, StoreError>;

    /// Atomically transitions a job out of `expected_state` via `mutator`,
    /// optionally removing it from a miner's `in_flight_jobs` and/or
    /// transitioning its payment, in a single transaction. Used for every
    /// transition that leaves `Running`/`Finalizing` (retry, timeout,
    /// completion, cancellation, expiry).
    #[allow(clippy::too_many_arguments)]
    fn transition_job(
        &self,
        job_id: &JobId,
        expected_state: JobState,
        mutator: &mut dyn FnMut(&mut Job),
        miner_inflight_remove: Option<&MinerId>,
        payment: Option<PaymentSettlement>,
        now_ms: TimestampMs,
    ) -> Result<(Job, Option<Payment>), StoreError>;

    /// Registers a new miner, or re-registers (idempotent on
    /// `(public_key, tenant_id)`): updates capabilities and resets the
    /// heartbeat if a row already matches.
    fn register_miner(&self, miner: Miner) -> Result<MinerId, StoreError>;

    /// Fetches a miner by id.
    fn get_miner(&self, id: &MinerId) -> Result<Option<Miner>, StoreError>;

    /// Updates a miner's `last_heartbeat_ms`.
    fn touch_miner_heartbeat(&self, id: &MinerId, ms: TimestampMs) -> Result<(), StoreError>;

    /// Lists miners, optionally filtered to a single status, up to `limit`
    /// (0 means unbounded). Backs both capability search and the liveness
    /// sweep, neither of which is indexed beyond this full scan — the
    /// coordinator is not expected to run more than a few thousand miners.
    fn scan_miners(&self, status: Option<MinerStatus>, limit: usize) -> Result<Vec<Miner>, StoreError>;

    /// Transitions a miner's status, atomically checked against
    /// `expected_prev`.
    fn set_miner_status(
        &self,
        id: &MinerId,
        status: MinerStatus,
        expected_prev: MinerStatus,
    ) -> Result<(), StoreError>;

    /// Adds and/or removes a job from a miner's `in_flight_jobs` set,
    /// outside of a job transition (used by the liveness sweep when marking
    /// a miner offline before its jobs have individually transitioned).
    fn mutate_miner_in_flight(
        &self,
        id: &MinerId,
        add: Option<&JobId>,
        remove: Option<&JobId>,
    ) -> Result<(), StoreError>;

    /// Creates a payment hold.
    fn create_payment(&self, payment: Payment) -> Result<(), StoreError>;

    /// Fetches a payment by id.
    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError>;

    /// Transitions a payment in isolation (used only when no job transition
    /// accompanies it, e.g. an administrative void).
    fn transition_payment(
        &self,
        id: &PaymentId,
        expected: PaymentState,
        new: PaymentState,
        settled_amount: Option<Amount>,
        payee_id: Option<MinerId>,
        now_ms: TimestampMs,
    ) -> Result<Payment, StoreError>;

    /// Inserts a receipt. Idempotent on `receipt_id`: returns `Ok(false)`
    /// without modification if one already exists, `Ok(true)` if newly
    /// created.
    fn create_receipt(&self, receipt: Receipt) -> Result<bool, StoreError>;

    /// Fetches a receipt by id.
    fn get_receipt(&self, id: &ReceiptId) -> Result<Option<Receipt>, StoreError>;

    /// Lists receipts for a tenant, ordered by `completed_ms` ascending.
    fn list_receipts_for_tenant(
        &self,
        tenant_id: &TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Receipt>, StoreError>;

    /// Returns up to `limit` jobs in `state`, ordered by `created_ms`
    /// ascending, ties broken by job id ascending (0 means unbounded).
    fn scan_jobs_by_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Returns up to `limit` non-terminal jobs whose absolute deadline or
    /// current per-attempt deadline is at or before `ts` (0 means
    /// unbounded).
    fn scan_jobs_expiring_before(&self, ts: TimestampMs, limit: usize) -> Result<Vec<Job>, StoreError>;

    /// Counts a tenant's non-terminal jobs, backing the `tenant_open_jobs_max`
    /// admission check.
    fn count_open_jobs_for_tenant(&self, tenant_id: &TenantId) -> Result<usize, StoreError>;

    /// Appends a payment event to the at-least-once outbox.
    fn push_payment_event(&self, event: PaymentEvent) -> Result<(), StoreError>;

    /// Returns up to `limit` outbox events without removing them.
    fn peek_payment_events(&self, limit: usize) -> Result<Vec<PaymentEvent>, StoreError>;

    /// Removes an acknowledged event from the outbox.
    fn ack_payment_event(&self, payment_id: &PaymentId) -> Result<(), StoreError>;

    /// Aggregate counters for the operator stats surface.
    fn stats(&self) -> Result<StoreStats, StoreError>;
}
