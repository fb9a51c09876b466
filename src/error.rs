use crate::domain::payment_order::{PaymentOrderId, PaymentStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by a storage collaborator.
///
/// The core never retries these; they are propagated as-is.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An unexpired record already holds the key.
    #[error("Conflicting record for key: {key}")]
    Conflict { key: String },
    /// The stored snapshot no longer matches the one a write was based on.
    #[error("Payment order {id} was modified concurrently")]
    Stale { id: PaymentOrderId },
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Backend(error.into())
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for StoreError {
    fn from(error: rocksdb::Error) -> Self {
        Self::Backend(Box::new(error))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Backend(Box::new(error))
    }
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Invalid IBAN: {0}")]
    InvalidIban(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Cannot compare amounts with different currencies: {left} vs {right}")]
    CurrencyMismatch { left: String, right: String },
    #[error("Invalid payment order: {0}")]
    InvalidPaymentOrder(String),
    #[error("Cannot transition payment order from {from} to {to}")]
    InvalidStateTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error(
        "Duplicate payment order detected. Idempotency key: {key}, existing order: {existing_order_id}"
    )]
    DuplicatePaymentOrder {
        key: String,
        existing_order_id: PaymentOrderId,
    },
    #[error("Payment order not found: {0}")]
    PaymentOrderNotFound(PaymentOrderId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PaymentError {
    /// Returns true when the caller must change its request (or reconcile
    /// with an existing order) rather than retry it unchanged.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidIban(_)
                | Self::InvalidAmount(_)
                | Self::CurrencyMismatch { .. }
                | Self::InvalidPaymentOrder(_)
                | Self::InvalidStateTransition { .. }
                | Self::DuplicatePaymentOrder { .. }
                | Self::PaymentOrderNotFound(_)
        )
    }
}
