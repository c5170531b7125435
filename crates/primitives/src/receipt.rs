use serde::{Deserialize, Serialize};

use crate::{Amount, JobId, MinerId, ReceiptId, SubmitterId, TimestampMs};

/// Evidence that a job completed, signed by the coordinator's active key.
///
/// Field order here mirrors the canonical signing order, but
/// [`coordinator_signer`] re-derives that order independently of struct
/// declaration order (Rust does not guarantee field order is preserved
/// through `serde_json`), so this order is documentation, not the source
/// of truth for the signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Unique id, deterministic from `(job_id, attempt_count)`.
    pub receipt_id: ReceiptId,
    /// Job this receipt attests to.
    pub job_id: JobId,
    /// Miner that completed the job.
    pub miner_id: MinerId,
    /// Client that submitted the job.
    pub submitter_id: SubmitterId,
    /// Units of compute consumed, gpu-seconds times 1000.
    pub units_consumed: u64,
    /// Rate applied, in the smallest token unit per unit consumed.
    pub unit_rate: Amount,
    /// `floor(units_consumed * unit_rate / 1000)`, clamped to `max_price`.
    pub amount_charged: Amount,
    /// Time the attempt started (assignment time).
    pub started_ms: TimestampMs,
    /// Time the result was submitted.
    pub completed_ms: TimestampMs,
    /// Lowercase hex SHA-256 of the result payload.
    pub result_hash: String,
    /// Model requested by the job (not the miner's capability).
    pub model: String,
    /// Key id identifying the signing key used.
    pub key_id: String,
    /// Base64url (no padding) Ed25519 signature over the canonical form.
    pub signature: String,
}
