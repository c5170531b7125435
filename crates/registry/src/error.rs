use coordinator_primitives::MinerId;

/// Errors raised by [`crate::MinerRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No miner exists with the given id.
    #[error("unknown miner {0}")]
    UnknownMiner(MinerId),
    /// The miner exists but is not `ACTIVE`.
    #[error("miner {0} is not active")]
    MinerNotActive(MinerId),
    /// Heartbeat nonce signature failed to verify against the miner's key.
    #[error("heartbeat signature verification failed for miner {0}")]
    AuthFailed(MinerId),
    /// The miner's stored public key is not valid Ed25519 key material.
    #[error("miner {0} has invalid key material")]
    InvalidKeyMaterial(MinerId),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] coordinator_store::StoreError),
}
