use serde::{Deserialize, Serialize};

use crate::{Amount, JobId, MinerId, PaymentId, SubmitterId, TimestampMs};

/// State of a per-job monetary hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    /// Held against the submitter; no payee yet.
    Held,
    /// Settled to the completing miner.
    Released,
    /// Returned to the submitter.
    Refunded,
    /// Administratively voided.
    Voided,
}

/// A monetary hold/settlement tied to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Unique id.
    pub id: PaymentId,
    /// Job this payment is exclusively owned by.
    pub job_id: JobId,
    /// Client paying for the job.
    pub payer_id: SubmitterId,
    /// Miner being paid, set only once `Released`.
    pub payee_id: Option<MinerId>,
    /// Amount held at creation.
    pub amount_held: Amount,
    /// Amount actually settled, set only once terminal.
    pub amount_settled: Option<Amount>,
    /// Current state.
    pub state: PaymentState,
    /// Time the hold was created.
    pub created_ms: TimestampMs,
    /// Time the payment reached a terminal state.
    pub settled_ms: Option<TimestampMs>,
}

/// An outbox record destined for the external `LedgerSink`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// The payment this event reports on.
    pub payment_id: PaymentId,
    /// The job the payment is tied to.
    pub job_id: JobId,
    /// Terminal state the payment reached.
    pub state: PaymentState,
    /// Amount settled (zero for refunds/voids).
    pub amount_settled: Amount,
    /// Payee, if the event is a release.
    pub payee_id: Option<MinerId>,
    /// Time the event was recorded.
    pub at_ms: TimestampMs,
}
