/// Errors raised by [`crate::ReceiptService`].
#[derive(Debug, thiserror::Error)]
pub enum ReceiptError {
    /// The active signing key was unavailable while sealing.
    #[error("signer unavailable")]
    SignerUnavailable,
    /// The computed charge exceeded `max_price` under `PriceClampPolicy::Fail`.
    #[error("computed charge exceeds job max_price")]
    AmountExceedsMaxPrice,
}

impl From<coordinator_signer::SignerError> for ReceiptError {
    fn from(err: coordinator_signer::SignerError) -> Self {
        match err {
            coordinator_signer::SignerError::SignerUnavailable => Self::SignerUnavailable,
            other => {
                tracing::warn!(error = %other, "receipts: signer failure treated as unavailable");
                Self::SignerUnavailable
            }
        }
    }
}
