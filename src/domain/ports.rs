use super::idempotency::IdempotencyRecord;
use super::payment_order::{PaymentOrder, PaymentOrderId};
use crate::error::StoreResult;
use async_trait::async_trait;

/// Durable storage for payment order snapshots.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts or replaces the snapshot with the same id and returns what was stored.
    async fn save(&self, order: PaymentOrder) -> StoreResult<PaymentOrder>;
    /// Replaces `current` with `next` in one atomic step, provided the stored
    /// snapshot is still the same revision as `current`. Fails with
    /// `StoreError::Stale` otherwise, including when the order is gone.
    async fn replace(
        &self,
        current: &PaymentOrder,
        next: PaymentOrder,
    ) -> StoreResult<PaymentOrder>;
    async fn find_by_id(&self, id: &PaymentOrderId) -> StoreResult<Option<PaymentOrder>>;
    /// Most recently saved order carrying this client reference.
    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentOrder>>;
    async fn exists_by_id(&self, id: &PaymentOrderId) -> StoreResult<bool>;
}

/// Durable storage for idempotency keys.
///
/// Implementations own the expiry window: `exists` and `find_order_id` only
/// report unexpired records, and `save` must be one atomic "insert if the key
/// is absent or expired" step that fails with `StoreError::Conflict`
/// otherwise. Concurrent initiations sharing a key rely on that atomicity.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    async fn save(&self, key: &str, order_id: &PaymentOrderId) -> StoreResult<IdempotencyRecord>;
    async fn find_order_id(&self, key: &str) -> StoreResult<Option<PaymentOrderId>>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;
pub type IdempotencyStoreBox = Box<dyn IdempotencyStore>;
