use thiserror::Error;

/// Errors raised by [`crate::Signer`].
#[derive(Debug, Error)]
pub enum SignerError {
    /// No active signing key is configured.
    #[error("signer unavailable: no active key configured")]
    SignerUnavailable,

    /// A required receipt field was absent or malformed before sealing.
    #[error("canonicalization error: {0}")]
    CanonicalizationError(String),

    /// The requested `key_id` is neither the active key nor a retired one.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),

    /// Signature verification failed.
    #[error("signature verification failed")]
    VerificationFailed,

    /// The key material on disk was malformed.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// I/O failure loading key material.
    #[error("failed to read key file: {0}")]
    Io(#[from] std::io::Error),
}
