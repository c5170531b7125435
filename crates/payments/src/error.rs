use coordinator_primitives::PaymentId;

/// Errors raised by [`crate::PaymentEngine`] and [`crate::LedgerSink`] impls.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// No payment exists with the given id.
    #[error("unknown payment {0}")]
    UnknownPayment(PaymentId),
    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] coordinator_store::StoreError),
}

/// A transient failure reported by a [`crate::LedgerSink`]; the event stays
/// in the outbox and is retried on the next flush pass.
#[derive(Debug, thiserror::Error)]
#[error("ledger sink rejected event: {0}")]
pub struct LedgerSinkError(pub String);
