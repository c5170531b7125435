//! Translates every domain error into one of the coordinator's stable wire
//! error codes. The code is part of the public contract; the human
//! `message` is not and may change freely.

use jsonrpsee_types::ErrorObjectOwned;

use crate::identity::AuthError;

/// A stable, machine-matchable error code returned to every caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    AuthRequired,
    AuthFailed,
    Forbidden,
    NotFound,
    InvalidRequest,
    PayloadTooLarge,
    QuotaExceeded,
    RateLimited,
    StaleState,
    StaleAssignment,
    MinerNotActive,
    CapabilityUnavailable,
    InsufficientFunds,
    SignerUnavailable,
    Internal,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::RateLimited => "RATE_LIMITED",
            Self::StaleState => "STALE_STATE",
            Self::StaleAssignment => "STALE_ASSIGNMENT",
            Self::MinerNotActive => "MINER_NOT_ACTIVE",
            Self::CapabilityUnavailable => "CAPABILITY_UNAVAILABLE",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::SignerUnavailable => "SIGNER_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    /// The JSON-RPC 2.0 integer code jsonrpsee requires on the wire. The
    /// stable string code above (surfaced in `data.code`) is what callers
    /// are expected to match on.
    fn rpc_code(self) -> i32 {
        match self {
            Self::AuthRequired | Self::AuthFailed => -32001,
            Self::Forbidden => -32002,
            Self::NotFound => -32003,
            Self::InvalidRequest => -32004,
            Self::PayloadTooLarge => -32005,
            Self::QuotaExceeded => -32006,
            Self::RateLimited => -32007,
            Self::StaleState | Self::StaleAssignment => -32008,
            Self::MinerNotActive => -32009,
            Self::CapabilityUnavailable => -32010,
            Self::InsufficientFunds => -32011,
            Self::SignerUnavailable => -32012,
            Self::Internal => -32000,
        }
    }
}

/// An error surfaced to an RPC caller: a stable [`ErrorCode`] plus a
/// human-readable message for logs and debugging.
#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl From<ApiError> for ErrorObjectOwned {
    fn from(err: ApiError) -> Self {
        let data = serde_json::json!({ "code": err.code.as_str(), "message": err.message });
        ErrorObjectOwned::owned(err.code.rpc_code(), err.code.as_str(), Some(data))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredential => Self::new(ErrorCode::AuthRequired, "no api_key supplied"),
            AuthError::UnknownCredential => Self::new(ErrorCode::AuthFailed, "api_key not recognized"),
        }
    }
}

impl From<coordinator_store::StoreError> for ApiError {
    fn from(err: coordinator_store::StoreError) -> Self {
        use coordinator_store::StoreError as E;
        match err {
            E::StaleState { .. } => Self::new(ErrorCode::StaleState, err.to_string()),
            E::NotFound { .. } => Self::new(ErrorCode::NotFound, err.to_string()),
            E::AlreadyExists { .. } | E::Rejected(_) => Self::new(ErrorCode::InvalidRequest, err.to_string()),
            E::Io(_) => Self::new(ErrorCode::Internal, err.to_string()),
        }
    }
}

impl From<coordinator_queue::QueueError> for ApiError {
    fn from(err: coordinator_queue::QueueError) -> Self {
        use coordinator_queue::QueueError as E;
        match err {
            E::PayloadTooLarge { .. } => Self::new(ErrorCode::PayloadTooLarge, err.to_string()),
            E::QuotaExceeded(_) => Self::new(ErrorCode::QuotaExceeded, err.to_string()),
            E::UnknownJob(_) | E::UnknownMiner(_) => Self::new(ErrorCode::NotFound, err.to_string()),
            E::MinerNotActive(_) => Self::new(ErrorCode::MinerNotActive, err.to_string()),
            E::Store(inner) => inner.into(),
            E::Payment(inner) => inner.into(),
        }
    }
}

impl From<coordinator_registry::RegistryError> for ApiError {
    fn from(err: coordinator_registry::RegistryError) -> Self {
        use coordinator_registry::RegistryError as E;
        match err {
            E::UnknownMiner(_) => Self::new(ErrorCode::NotFound, err.to_string()),
            E::MinerNotActive(_) => Self::new(ErrorCode::MinerNotActive, err.to_string()),
            E::AuthFailed(_) | E::InvalidKeyMaterial(_) => Self::new(ErrorCode::AuthFailed, err.to_string()),
            E::Store(inner) => inner.into(),
        }
    }
}

impl From<coordinator_lifecycle::LifecycleError> for ApiError {
    fn from(err: coordinator_lifecycle::LifecycleError) -> Self {
        use coordinator_lifecycle::LifecycleError as E;
        match err {
            E::UnknownJob(_) | E::UnknownMiner(_) | E::NotFound(_) => Self::new(ErrorCode::NotFound, err.to_string()),
            // A cancellation invalidates the caller's claim on the job the same
            // way a lost assignment race does: stop computing, nothing to retry.
            E::StaleAssignment(_) | E::JobCancelled(_) => Self::new(ErrorCode::StaleAssignment, err.to_string()),
            E::SignerUnavailable(_) => Self::new(ErrorCode::SignerUnavailable, err.to_string()),
            E::Store(inner) => inner.into(),
            E::Queue(inner) => inner.into(),
            E::Payment(inner) => inner.into(),
        }
    }
}

impl From<coordinator_receipts::ReceiptError> for ApiError {
    fn from(err: coordinator_receipts::ReceiptError) -> Self {
        use coordinator_receipts::ReceiptError as E;
        match err {
            E::SignerUnavailable => Self::new(ErrorCode::SignerUnavailable, err.to_string()),
            E::AmountExceedsMaxPrice => Self::new(ErrorCode::InsufficientFunds, err.to_string()),
        }
    }
}

impl From<coordinator_payments::PaymentError> for ApiError {
    fn from(err: coordinator_payments::PaymentError) -> Self {
        use coordinator_payments::PaymentError as E;
        match err {
            E::UnknownPayment(_) => Self::new(ErrorCode::NotFound, err.to_string()),
            E::Store(inner) => inner.into(),
        }
    }
}
