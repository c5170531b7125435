use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Amount, Capability, JobId, MinerId, TenantId, TimestampMs};

/// Liveness/availability status of a registered miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MinerStatus {
    /// Eligible for new assignments.
    Active,
    /// Ineligible for new assignments; finishes in-flight jobs.
    Draining,
    /// Liveness expired or administratively taken down.
    Offline,
}

/// A registered compute provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Miner {
    /// Unique id.
    pub id: MinerId,
    /// Tenant that owns this miner registration.
    pub tenant_id: TenantId,
    /// Ed25519 public key used to verify heartbeat nonces, hex-encoded.
    pub public_key: String,
    /// Capabilities this miner advertises.
    pub capabilities: Vec<Capability>,
    /// Price per gpu-second, in the smallest token unit.
    pub price_per_unit: Amount,
    /// Current status.
    pub status: MinerStatus,
    /// Time of first registration.
    pub registered_ms: TimestampMs,
    /// Time of the most recent heartbeat.
    pub last_heartbeat_ms: TimestampMs,
    /// Jobs this miner is currently assigned (weak back-reference,
    /// rebuildable from job rows).
    pub in_flight_jobs: BTreeSet<JobId>,
    /// Maximum number of concurrent in-flight jobs.
    pub max_concurrency: u32,
}

impl Miner {
    /// Whether a capability requirement is met by any advertised capability.
    #[must_use]
    pub fn satisfies(&self, requirement: &crate::CapabilityRequirement) -> bool {
        self.capabilities.iter().any(|c| requirement.is_satisfied_by(c))
    }

    /// Remaining assignment headroom under `max_concurrency`.
    #[must_use]
    pub fn available_slots(&self) -> u32 {
        self.max_concurrency.saturating_sub(self.in_flight_jobs.len() as u32)
    }
}
