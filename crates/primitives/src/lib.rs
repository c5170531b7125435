//! Core entity types shared across the compute coordinator.
//!
//! This crate carries no I/O: it defines the `Job`, `Miner`, `Receipt` and
//! `Payment` records from the data model, their state enums, and the small
//! value types (`Amount`, `TimestampMs`, id newtypes) used to keep units from
//! being mixed up at call sites. Every type here is plain data; behavior
//! lives in the crates that own the corresponding component.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

mod capability;
mod ids;
mod job;
mod miner;
mod payment;
mod receipt;
mod tenant;
mod time;

pub use capability::{Capability, CapabilityRequirement};
pub use ids::{JobId, MinerId, PaymentId, ReceiptId, SubmitterId, TenantId};
pub use job::{ErrorKind, Job, JobState, TransitionRecord};
pub use miner::{Miner, MinerStatus};
pub use payment::{Payment, PaymentEvent, PaymentState};
pub use receipt::Receipt;
pub use tenant::TenantContext;
pub use time::TimestampMs;

/// Monetary amount in the smallest token unit. Always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Amount(pub u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Saturating subtraction, never underflows.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
