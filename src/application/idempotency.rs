use crate::domain::idempotency::effective_key;
use crate::domain::payment_order::PaymentOrderId;
use crate::domain::ports::IdempotencyStoreBox;
use crate::error::{PaymentError, Result, StoreError};
use tracing::{debug, warn};

/// Suppresses duplicate initiations that share an idempotency key.
///
/// The guard holds no state of its own. Two concurrent callers with the same
/// key can both pass `check`; only the store's atomic insert in `save` decides
/// which of them keeps the key.
pub struct IdempotencyGuard {
    store: IdempotencyStoreBox,
}

impl IdempotencyGuard {
    pub fn new(store: IdempotencyStoreBox) -> Self {
        Self { store }
    }

    /// Fails with `DuplicatePaymentOrder` if the key is already bound.
    /// Absent or blank keys always pass.
    pub async fn check(&self, key: Option<&str>) -> Result<()> {
        let Some(key) = effective_key(key) else {
            debug!("No idempotency key supplied, skipping duplicate check");
            return Ok(());
        };

        if !self.store.exists(key).await? {
            debug!(key, "Idempotency check passed");
            return Ok(());
        }

        match self.store.find_order_id(key).await? {
            Some(existing_order_id) => {
                warn!(key, %existing_order_id, "Duplicate payment order detected");
                Err(PaymentError::DuplicatePaymentOrder {
                    key: key.to_string(),
                    existing_order_id,
                })
            }
            // Expired between the two lookups.
            None => Ok(()),
        }
    }

    /// Binds the key to the order it created. Absent or blank keys are a no-op.
    pub async fn save(&self, key: Option<&str>, order_id: &PaymentOrderId) -> Result<()> {
        let Some(key) = effective_key(key) else {
            return Ok(());
        };

        match self.store.save(key, order_id).await {
            Ok(record) => {
                debug!(key, %order_id, expires_at = %record.expires_at, "Saved idempotency key");
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => {
                let existing = self.store.find_order_id(key).await?;
                warn!(
                    key,
                    %order_id,
                    existing_order_id = ?existing,
                    "Lost idempotency race, order is persisted but not bound to the key"
                );
                match existing {
                    Some(existing_order_id) => Err(PaymentError::DuplicatePaymentOrder {
                        key: key.to_string(),
                        existing_order_id,
                    }),
                    None => Err(StoreError::Conflict {
                        key: key.to_string(),
                    }
                    .into()),
                }
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Failed to save idempotency key");
                Err(e.into())
            }
        }
    }
}
