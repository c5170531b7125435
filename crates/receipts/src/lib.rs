//! Construction of signed job-completion receipts.
//!
//! [`ReceiptService::build_and_seal`] computes the result hash, prices the
//! attempt, clamps or fails against `max_price` per the configured
//! [`PriceClampPolicy`], derives a deterministic receipt id so retried
//! submissions are idempotent, and hands the unsealed receipt to
//! [`coordinator_signer::Signer`].

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod error;

use std::sync::Arc;

use async_trait::async_trait;
use coordinator_primitives::{Amount, Job, Miner, Receipt, ReceiptId, TimestampMs};
use coordinator_signer::Signer;

pub use error::ReceiptError;

/// The policy governing `units_consumed * unit_rate` exceeding `max_price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceClampPolicy {
    /// Clamp `amount_charged` to `max_price` and still succeed, marking
    /// `ErrorKind::PriceClamped` on the job. The default.
    #[default]
    ClampAndSucceed,
    /// Fail the attempt instead of under-paying the miner relative to its
    /// quoted rate.
    Fail,
}

/// Optional, pluggable attestation step invoked after a receipt is sealed.
/// The core stores whatever bytes this returns without interpreting them.
#[async_trait]
pub trait AttestationPlugin: Send + Sync + std::fmt::Debug {
    /// Produces an attestation for `receipt`, or `None` to skip.
    async fn attest(&self, receipt: &Receipt) -> Option<Vec<u8>>;
}

/// Derives the deterministic `receipt_id` for `(job_id, attempt)`, the same
/// id [`ReceiptService::build_and_seal`] assigns. Exposed so callers (the
/// lifecycle's `submit_result` idempotency check, where a replayed call
/// must return the first receipt) can look up an already-sealed receipt
/// without re-running the pricing/signing path.
#[must_use]
pub fn deterministic_receipt_id(job_id: &coordinator_primitives::JobId, attempt_count: u32) -> ReceiptId {
    ReceiptId::from(Signer::result_hash(format!("{job_id}:{attempt_count}").as_bytes()))
}

/// The outcome of [`ReceiptService::build_and_seal`].
#[derive(Debug, Clone)]
pub struct SealedReceipt {
    /// The signed receipt.
    pub receipt: Receipt,
    /// Whether `amount_charged` was clamped down from the raw computation.
    pub was_clamped: bool,
}

/// Builds and signs job-completion receipts.
#[derive(Debug)]
pub struct ReceiptService {
    signer: Arc<Signer>,
    clamp_policy: PriceClampPolicy,
}

impl ReceiptService {
    /// Creates a receipt service backed by `signer`, applying `clamp_policy`
    /// when a computed charge exceeds the job's `max_price`.
    pub fn new(signer: Arc<Signer>, clamp_policy: PriceClampPolicy) -> Self {
        Self { signer, clamp_policy }
    }

    /// Builds, prices, and seals a receipt for `job` completed by `miner`.
    ///
    /// Fails with [`ReceiptError::AmountExceedsMaxPrice`] only under
    /// [`PriceClampPolicy::Fail`]; under the default policy an over-quote is
    /// clamped and `was_clamped` is reported instead of an error.
    pub fn build_and_seal(
        &self,
        job: &Job,
        miner: &Miner,
        units_consumed: u64,
        result_payload: &[u8],
        now_ms: TimestampMs,
    ) -> Result<SealedReceipt, ReceiptError> {
        let result_hash = Signer::result_hash(result_payload);
        let raw_amount = Amount((units_consumed as u128 * miner.price_per_unit.0 as u128 / 1000) as u64);

        let (amount_charged, was_clamped) = if raw_amount.0 > job.max_price.0 {
            match self.clamp_policy {
                PriceClampPolicy::ClampAndSucceed => (job.max_price, true),
                PriceClampPolicy::Fail => return Err(ReceiptError::AmountExceedsMaxPrice),
            }
        } else {
            (raw_amount, false)
        };

        let receipt_id = deterministic_receipt_id(&job.id, job.attempt_count);

        let mut receipt = Receipt {
            receipt_id,
            job_id: job.id.clone(),
            miner_id: miner.id.clone(),
            submitter_id: job.submitter_id.clone(),
            units_consumed,
            unit_rate: miner.price_per_unit,
            amount_charged,
            started_ms: job.assigned_ms.unwrap_or(job.created_ms),
            completed_ms: now_ms,
            result_hash,
            model: job.capability_requirement.model.clone(),
            key_id: String::new(),
            signature: String::new(),
        };

        self.signer.seal(&mut receipt)?;
        Ok(SealedReceipt { receipt, was_clamped })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, VecDeque};

    use coordinator_primitives::{
        CapabilityRequirement, JobId, JobState, MinerId, MinerStatus, SubmitterId, TenantId,
    };
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;

    use super::*;

    fn signer_ready() -> Arc<Signer> {
        let signer = Signer::empty();
        let mut csprng = OsRng;
        signer.rotate(SigningKey::generate(&mut csprng), "key-1");
        Arc::new(signer)
    }

    fn sample_job(max_price: u64, attempt_count: u32) -> Job {
        Job {
            id: JobId::from("j1"),
            tenant_id: TenantId::from("t1"),
            submitter_id: SubmitterId::from("s1"),
            capability_requirement: CapabilityRequirement {
                model: "m1".into(),
                min_mem_bytes: 0,
                region: None,
                required_features: vec![],
            },
            payload: vec![],
            max_price: Amount(max_price),
            deadline_ms: TimestampMs(100_000),
            ttl_ms: 60_000,
            created_ms: TimestampMs(0),
            state: JobState::Running,
            assigned_miner_id: Some(MinerId::from("m1")),
            assigned_ms: Some(TimestampMs(1_000)),
            last_heartbeat_ms: Some(TimestampMs(1_000)),
            attempt_deadline_ms: None,
            attempt_count,
            result_payload: None,
            error_kind: None,
            receipt_id: None,
            payment_id: coordinator_primitives::PaymentId::from("pay-1"),
            exclude_miners: VecDeque::new(),
            cancel_requested: false,
            transitions: VecDeque::new(),
        }
    }

    fn sample_miner(price_per_unit: u64) -> Miner {
        Miner {
            id: MinerId::from("m1"),
            tenant_id: TenantId::from("t1"),
            public_key: "pk".into(),
            capabilities: vec![],
            price_per_unit: Amount(price_per_unit),
            status: MinerStatus::Active,
            registered_ms: TimestampMs(0),
            last_heartbeat_ms: TimestampMs(0),
            in_flight_jobs: BTreeSet::new(),
            max_concurrency: 1,
        }
    }

    #[test]
    fn charges_floor_of_units_times_rate_over_a_thousand() {
        let service = ReceiptService::new(signer_ready(), PriceClampPolicy::ClampAndSucceed);
        let job = sample_job(1_000, 1);
        let miner = sample_miner(10);
        let sealed = service.build_and_seal(&job, &miner, 500, b"r", TimestampMs(2_000)).unwrap();
        assert_eq!(sealed.receipt.amount_charged, Amount(5));
        assert!(!sealed.was_clamped);
    }

    #[test]
    fn clamps_to_max_price_by_default() {
        let service = ReceiptService::new(signer_ready(), PriceClampPolicy::ClampAndSucceed);
        let job = sample_job(3, 1);
        let miner = sample_miner(10);
        let sealed = service.build_and_seal(&job, &miner, 500, b"r", TimestampMs(2_000)).unwrap();
        assert_eq!(sealed.receipt.amount_charged, Amount(3));
        assert!(sealed.was_clamped);
    }

    #[test]
    fn fail_policy_rejects_an_over_quote_instead_of_clamping() {
        let service = ReceiptService::new(signer_ready(), PriceClampPolicy::Fail);
        let job = sample_job(3, 1);
        let miner = sample_miner(10);
        assert!(matches!(
            service.build_and_seal(&job, &miner, 500, b"r", TimestampMs(2_000)),
            Err(ReceiptError::AmountExceedsMaxPrice)
        ));
    }

    #[test]
    fn receipt_id_is_deterministic_on_job_id_and_attempt() {
        let service = ReceiptService::new(signer_ready(), PriceClampPolicy::ClampAndSucceed);
        let job = sample_job(1_000, 2);
        let miner = sample_miner(10);
        let first = service.build_and_seal(&job, &miner, 100, b"r", TimestampMs(2_000)).unwrap();
        let second = service.build_and_seal(&job, &miner, 100, b"r", TimestampMs(3_000)).unwrap();
        assert_eq!(first.receipt.receipt_id, second.receipt.receipt_id);
    }

    #[test]
    fn zero_units_consumed_charges_zero() {
        let service = ReceiptService::new(signer_ready(), PriceClampPolicy::ClampAndSucceed);
        let job = sample_job(1_000, 1);
        let miner = sample_miner(10);
        let sealed = service.build_and_seal(&job, &miner, 0, b"r", TimestampMs(2_000)).unwrap();
        assert_eq!(sealed.receipt.amount_charged, Amount::ZERO);
    }
}
