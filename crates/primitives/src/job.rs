use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{
    CapabilityRequirement, JobId, MinerId, PaymentId, ReceiptId, SubmitterId, TenantId, TimestampMs,
};
use crate::Amount;

/// Soft cap on the `exclude_miners` set; FIFO eviction once exceeded.
pub const EXCLUDE_MINERS_MAX: usize = 8;

/// Bound on the retained per-job transition history.
pub const TRANSITION_HISTORY_MAX: usize = 32;

/// The job state machine's states. Terminal states carry no further
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Admitted, waiting to be assigned to a miner.
    Queued,
    /// Assigned to a miner and being worked on.
    Running,
    /// Miner reported success; receipt is being sealed.
    Finalizing,
    /// Terminal: receipt sealed, payment released.
    Succeeded,
    /// Terminal: exhausted retries, signer outage, or explicit failure.
    Failed,
    /// Terminal: absolute deadline elapsed before completion.
    Expired,
    /// Terminal: cancelled by the submitter.
    Cancelled,
}

impl JobState {
    /// Whether this state has no further transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Expired | Self::Cancelled)
    }
}

/// Why a job ended up in `Failed` (or why `Succeeded` was clamped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The miner reported an application-level error.
    MinerReported,
    /// The per-attempt deadline elapsed with no result.
    AttemptTimeout,
    /// The assigned miner went offline (liveness scan).
    MinerLost,
    /// The receipt signer was unavailable while sealing.
    SignerUnavailable,
    /// `amount_charged` exceeded `max_price` and was clamped (non-fatal).
    PriceClamped,
}

/// One row of a job's retained transition history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State the job transitioned from.
    pub from: JobState,
    /// State the job transitioned to.
    pub to: JobState,
    /// Short machine-readable reason, e.g. `"assign"`, `"deadline"`.
    pub reason: String,
    /// Wall-clock time the transition was recorded.
    pub at_ms: TimestampMs,
}

/// One unit of compute work submitted by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique id.
    pub id: JobId,
    /// Tenant that owns this job.
    pub tenant_id: TenantId,
    /// Client that submitted the job.
    pub submitter_id: SubmitterId,
    /// Structured compute requirement.
    pub capability_requirement: CapabilityRequirement,
    /// Opaque request payload, size-capped by policy at admission.
    pub payload: Vec<u8>,
    /// Maximum the submitter is willing to pay.
    pub max_price: Amount,
    /// Absolute deadline; never extended across attempts.
    pub deadline_ms: TimestampMs,
    /// Time-to-live the job was submitted with.
    pub ttl_ms: u64,
    /// Time the job was admitted.
    pub created_ms: TimestampMs,
    /// Current state.
    pub state: JobState,
    /// Miner currently assigned, if any (set only in `Running`/`Finalizing`).
    pub assigned_miner_id: Option<MinerId>,
    /// Time of the current assignment, if any.
    pub assigned_ms: Option<TimestampMs>,
    /// Last heartbeat seen for the current attempt.
    pub last_heartbeat_ms: Option<TimestampMs>,
    /// Deadline for the current attempt; re-armed by `job_heartbeat`. Unset
    /// outside `Running`. Distinct from `deadline_ms`, which never moves.
    pub attempt_deadline_ms: Option<TimestampMs>,
    /// Number of attempts consumed so far (incremented only on successful
    /// atomic assignment, never on a `StaleState` skip).
    pub attempt_count: u32,
    /// Opaque result payload once submitted successfully.
    pub result_payload: Option<Vec<u8>>,
    /// Populated once the job reaches a terminal or clamped state.
    pub error_kind: Option<ErrorKind>,
    /// Receipt id, once sealed.
    pub receipt_id: Option<ReceiptId>,
    /// The job's payment hold/settlement.
    pub payment_id: PaymentId,
    /// Miners excluded from future assignment of this job (bounded, FIFO).
    pub exclude_miners: VecDeque<MinerId>,
    /// Set by `cancel_job` while the job is `Running`; observed at the next
    /// miner interaction.
    pub cancel_requested: bool,
    /// Bounded transition history for admin/debug queries.
    pub transitions: VecDeque<TransitionRecord>,
}

impl Job {
    /// Appends a miner to `exclude_miners`, evicting the oldest entry once
    /// [`EXCLUDE_MINERS_MAX`] is exceeded.
    pub fn exclude_miner(&mut self, miner_id: MinerId) {
        if self.exclude_miners.contains(&miner_id) {
            return;
        }
        if self.exclude_miners.len() >= EXCLUDE_MINERS_MAX {
            self.exclude_miners.pop_front();
        }
        self.exclude_miners.push_back(miner_id);
    }

    /// Records a transition in the bounded history.
    pub fn record_transition(&mut self, from: JobState, to: JobState, reason: &str, at_ms: TimestampMs) {
        if self.transitions.len() >= TRANSITION_HISTORY_MAX {
            self.transitions.pop_front();
        }
        self.transitions.push_back(TransitionRecord { from, to, reason: reason.to_owned(), at_ms });
    }
}
