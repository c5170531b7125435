use thiserror::Error;

/// Errors raised by a [`crate::Store`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A multi-row operation's `expected_state` no longer matched; the
    /// caller lost a race and should reload and retry or give up.
    #[error("stale state for {kind} {id}")]
    StaleState {
        /// Entity kind, e.g. `"job"` or `"payment"`.
        kind: &'static str,
        /// Entity id, for diagnostics.
        id: String,
    },

    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `"job"` or `"miner"`.
        kind: &'static str,
        /// Entity id, for diagnostics.
        id: String,
    },

    /// The entity already exists and the operation is not idempotent for it.
    #[error("{kind} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        kind: &'static str,
        /// Entity id.
        id: String,
    },

    /// A mutator callback rejected the transition for a domain reason.
    #[error("transition rejected: {0}")]
    Rejected(String),

    /// The backing storage failed in a way unrelated to application logic.
    #[error("store I/O failure: {0}")]
    Io(String),
}
