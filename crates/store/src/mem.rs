use std::collections::{HashMap, VecDeque};

use coordinator_primitives::{
    Amount, Job, JobId, JobState, Miner, MinerId, MinerStatus, Payment, PaymentEvent, PaymentId,
    PaymentState, Receipt, ReceiptId, TenantId, TimestampMs,
};
use parking_lot::RwLock;

use crate::traits::{PaymentSettlement, Store, StoreStats};
use crate::StoreError;

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    miners: HashMap<MinerId, Miner>,
    payments: HashMap<PaymentId, Payment>,
    receipts: HashMap<ReceiptId, Receipt>,
    payment_events: VecDeque<PaymentEvent>,
}

/// An in-process, in-memory [`Store`] implementation.
///
/// Guards all five logical tables behind a single `parking_lot::RwLock`,
/// which trivially gives the serializable, cross-entity-transaction
/// semantics the rest of the coordinator relies on: every write that must
/// move more than one entity (assigning a job while updating a miner's
/// in-flight set, releasing a payment while transitioning a job) takes the
/// write guard
/// once and performs every mutation before releasing it. This is adequate
/// for the reference implementation; a production deployment would swap
/// this crate's `Store` implementation for one backed by a real database
/// without changing any caller.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound { kind, id: id.to_string() }
}

fn stale(kind: &'static str, id: impl ToString) -> StoreError {
    StoreError::StaleState { kind, id: id.to_string() }
}

impl Store for MemStore {
    fn create_job(&self, job: Job) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists { kind: "job", id: job.id.to_string() });
        }
        inner.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    fn get_job(&self, id: &JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.read().jobs.get(id).cloned())
    }

    fn update_job_atomic(
        &self,
        id: &JobId,
        expected_state: JobState,
        mutator: &mut dyn FnMut(&mut Job),
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.write();
        let job = inner.jobs.get_mut(id).ok_or_else(|| not_found("job", id))?;
        if job.state != expected_state {
            return Err(stale("job", id));
        }
        mutator(job);
        Ok(job.clone())
    }

    fn assign_job(
        &self,
        job_id: &JobId,
        miner_id: &MinerId,
        now_ms: TimestampMs,
        attempt_timeout_ms: u64,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.write();

        {
            let miner = inner.miners.get(miner_id).ok_or_else(|| not_found("miner", miner_id))?;
            if miner.status != MinerStatus::Active || miner.available_slots() == 0 {
                return Err(stale("miner", miner_id));
            }
        }

        let job = inner.jobs.get_mut(job_id).ok_or_else(|| not_found("job", job_id))?;
        if job.state != JobState::Queued {
            return Err(stale("job", job_id));
        }
        let from = job.state;
        job.state = JobState::Running;
        job.assigned_miner_id = Some(miner_id.clone());
        job.assigned_ms = Some(now_ms);
        job.last_heartbeat_ms = Some(now_ms);
        job.attempt_deadline_ms = Some(now_ms.plus_ms(attempt_timeout_ms));
        job.attempt_count += 1;
        job.record_transition(from, JobState::Running, "assign", now_ms);
        let updated = job.clone();

        let miner = inner.miners.get_mut(miner_id).expect("checked present above");
        miner.in_flight_jobs.insert(job_id.clone());

        Ok(updated)
    }

    fn transition_job(
        &self,
        job_id: &JobId,
        expected_state: JobState,
        mutator: &mut dyn FnMut(&mut Job),
        miner_inflight_remove: Option<&MinerId>,
        payment: Option<PaymentSettlement>,
        now_ms: TimestampMs,
    ) -> Result<(Job, Option<Payment>), StoreError> {
        let mut inner = self.inner.write();

        let job = inner.jobs.get_mut(job_id).ok_or_else(|| not_found("job", job_id))?;
        if job.state != expected_state {
            return Err(stale("job", job_id));
        }

        if let Some(settlement) = &payment {
            let current =
                inner.payments.get(&settlement.payment_id).ok_or_else(|| not_found("payment", &settlement.payment_id))?;
            if current.state != settlement.expected {
                return Err(stale("payment", &settlement.payment_id));
            }
        }

        let job = inner.jobs.get_mut(job_id).expect("checked present above");
        mutator(job);
        let updated_job = job.clone();

        if let Some(miner_id) = miner_inflight_remove {
            if let Some(miner) = inner.miners.get_mut(miner_id) {
                miner.in_flight_jobs.remove(job_id);
            }
        }

        let updated_payment = match payment {
            Some(settlement) => {
                let payment = inner.payments.get_mut(&settlement.payment_id).expect("checked present above");
                payment.state = settlement.new;
                payment.amount_settled = settlement.settled_amount;
                payment.payee_id = settlement.payee_id;
                payment.settled_ms = Some(now_ms);
                Some(payment.clone())
            }
            None => None,
        };

        Ok((updated_job, updated_payment))
    }

    fn register_miner(&self, miner: Miner) -> Result<MinerId, StoreError> {
        let mut inner = self.inner.write();
        let existing_id = inner
            .miners
            .values()
            .find(|m| m.public_key == miner.public_key && m.tenant_id == miner.tenant_id)
            .map(|m| m.id.clone());

        if let Some(id) = existing_id {
            let existing = inner.miners.get_mut(&id).expect("found above");
            existing.capabilities = miner.capabilities;
            existing.price_per_unit = miner.price_per_unit;
            existing.max_concurrency = miner.max_concurrency;
            existing.last_heartbeat_ms = miner.registered_ms;
            existing.status = MinerStatus::Active;
            return Ok(id);
        }

        let id = miner.id.clone();
        inner.miners.insert(id.clone(), miner);
        Ok(id)
    }

    fn get_miner(&self, id: &MinerId) -> Result<Option<Miner>, StoreError> {
        Ok(self.inner.read().miners.get(id).cloned())
    }

    fn touch_miner_heartbeat(&self, id: &MinerId, ms: TimestampMs) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let miner = inner.miners.get_mut(id).ok_or_else(|| not_found("miner", id))?;
        miner.last_heartbeat_ms = ms;
        Ok(())
    }

    fn scan_miners(&self, status: Option<MinerStatus>, limit: usize) -> Result<Vec<Miner>, StoreError> {
        let inner = self.inner.read();
        let mut matching: Vec<Miner> = inner
            .miners
            .values()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        if limit > 0 {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    fn set_miner_status(
        &self,
        id: &MinerId,
        status: MinerStatus,
        expected_prev: MinerStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let miner = inner.miners.get_mut(id).ok_or_else(|| not_found("miner", id))?;
        if miner.status != expected_prev {
            return Err(stale("miner", id));
        }
        miner.status = status;
        Ok(())
    }

    fn mutate_miner_in_flight(
        &self,
        id: &MinerId,
        add: Option<&JobId>,
        remove: Option<&JobId>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let miner = inner.miners.get_mut(id).ok_or_else(|| not_found("miner", id))?;
        if let Some(job_id) = add {
            miner.in_flight_jobs.insert(job_id.clone());
        }
        if let Some(job_id) = remove {
            miner.in_flight_jobs.remove(job_id);
        }
        Ok(())
    }

    fn create_payment(&self, payment: Payment) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.payments.contains_key(&payment.id) {
            return Err(StoreError::AlreadyExists { kind: "payment", id: payment.id.to_string() });
        }
        inner.payments.insert(payment.id.clone(), payment);
        Ok(())
    }

    fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        Ok(self.inner.read().payments.get(id).cloned())
    }

    fn transition_payment(
        &self,
        id: &PaymentId,
        expected: PaymentState,
        new: PaymentState,
        settled_amount: Option<Amount>,
        payee_id: Option<MinerId>,
        now_ms: TimestampMs,
    ) -> Result<Payment, StoreError> {
        let mut inner = self.inner.write();
        let payment = inner.payments.get_mut(id).ok_or_else(|| not_found("payment", id))?;
        if payment.state != expected {
            return Err(stale("payment", id));
        }
        payment.state = new;
        payment.amount_settled = settled_amount;
        payment.payee_id = payee_id;
        payment.settled_ms = Some(now_ms);
        Ok(payment.clone())
    }

    fn create_receipt(&self, receipt: Receipt) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        if inner.receipts.contains_key(&receipt.receipt_id) {
            return Ok(false);
        }
        inner.receipts.insert(receipt.receipt_id.clone(), receipt);
        Ok(true)
    }

    fn get_receipt(&self, id: &ReceiptId) -> Result<Option<Receipt>, StoreError> {
        Ok(self.inner.read().receipts.get(id).cloned())
    }

    fn list_receipts_for_tenant(
        &self,
        tenant_id: &TenantId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Receipt>, StoreError> {
        let inner = self.inner.read();
        let mut matching: Vec<Receipt> = inner
            .receipts
            .values()
            .filter(|r| inner.jobs.get(&r.job_id).map(|j| &j.tenant_id) == Some(tenant_id))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.completed_ms.cmp(&b.completed_ms).then(a.receipt_id.cmp(&b.receipt_id)));
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    fn scan_jobs_by_state(&self, state: JobState, limit: usize) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read();
        let mut matching: Vec<Job> = inner.jobs.values().filter(|j| j.state == state).cloned().collect();
        matching.sort_by(|a, b| a.created_ms.cmp(&b.created_ms).then(a.id.cmp(&b.id)));
        if limit > 0 {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    fn scan_jobs_expiring_before(&self, ts: TimestampMs, limit: usize) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.read();
        let mut matching: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| {
                !j.state.is_terminal()
                    && (j.deadline_ms.0 <= ts.0 || j.attempt_deadline_ms.is_some_and(|d| d.0 <= ts.0))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.deadline_ms.cmp(&b.deadline_ms).then(a.id.cmp(&b.id)));
        if limit > 0 {
            matching.truncate(limit);
        }
        Ok(matching)
    }

    fn count_open_jobs_for_tenant(&self, tenant_id: &TenantId) -> Result<usize, StoreError> {
        let inner = self.inner.read();
        Ok(inner.jobs.values().filter(|j| &j.tenant_id == tenant_id && !j.state.is_terminal()).count())
    }

    fn push_payment_event(&self, event: PaymentEvent) -> Result<(), StoreError> {
        self.inner.write().payment_events.push_back(event);
        Ok(())
    }

    fn peek_payment_events(&self, limit: usize) -> Result<Vec<PaymentEvent>, StoreError> {
        Ok(self.inner.read().payment_events.iter().take(limit).cloned().collect())
    }

    fn ack_payment_event(&self, payment_id: &PaymentId) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if let Some(pos) = inner.payment_events.iter().position(|e| &e.payment_id == payment_id) {
            inner.payment_events.remove(pos);
        }
        Ok(())
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let inner = self.inner.read();
        let mut jobs_by_state: HashMap<JobState, usize> = HashMap::new();
        for job in inner.jobs.values() {
            *jobs_by_state.entry(job.state).or_default() += 1;
        }
        let mut miners_by_status: HashMap<MinerStatus, usize> = HashMap::new();
        for miner in inner.miners.values() {
            *miners_by_status.entry(miner.status).or_default() += 1;
        }
        Ok(StoreStats {
            jobs_by_state: jobs_by_state.into_iter().collect(),
            miners_by_status: miners_by_status.into_iter().collect(),
            pending_payment_events: inner.payment_events.len(),
        })
    }
}
