use crate::domain::clock::{Clock, SystemClock};
use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::payment_order::{PaymentOrder, PaymentOrderId};
use crate::domain::ports::{IdempotencyStore, OrderStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct OrderTable {
    orders: HashMap<PaymentOrderId, PaymentOrder>,
    by_reference: HashMap<String, PaymentOrderId>,
}

/// A thread-safe in-memory store for payment orders.
///
/// Clones share the same underlying table, so a test can keep one handle
/// while the service owns another.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    table: Arc<RwLock<OrderTable>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct orders held.
    pub async fn count(&self) -> usize {
        self.table.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: PaymentOrder) -> StoreResult<PaymentOrder> {
        let mut table = self.table.write().await;
        table
            .by_reference
            .insert(order.reference().to_string(), order.id().clone());
        table.orders.insert(order.id().clone(), order.clone());
        Ok(order)
    }

    async fn replace(
        &self,
        current: &PaymentOrder,
        next: PaymentOrder,
    ) -> StoreResult<PaymentOrder> {
        let mut table = self.table.write().await;
        match table.orders.get(current.id()) {
            Some(stored) if stored.is_same_revision(current) => {}
            _ => {
                return Err(StoreError::Stale {
                    id: current.id().clone(),
                });
            }
        }
        table.orders.insert(next.id().clone(), next.clone());
        Ok(next)
    }

    async fn find_by_id(&self, id: &PaymentOrderId) -> StoreResult<Option<PaymentOrder>> {
        let table = self.table.read().await;
        Ok(table.orders.get(id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentOrder>> {
        let table = self.table.read().await;
        Ok(table
            .by_reference
            .get(reference)
            .and_then(|id| table.orders.get(id))
            .cloned())
    }

    async fn exists_by_id(&self, id: &PaymentOrderId) -> StoreResult<bool> {
        let table = self.table.read().await;
        Ok(table.orders.contains_key(id))
    }
}

/// A thread-safe in-memory store for idempotency keys.
///
/// `save` checks and inserts under one write lock, which makes it the atomic
/// conditional insert the idempotency guard relies on. Expired records are
/// invisible to lookups, and every `save` drops them from the map.
#[derive(Clone)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<String, IdempotencyRecord>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new, empty store that expires records by wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Deletes every expired record and returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired_at(now));
        before - records.len()
    }

    /// Number of records held, expired ones included.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    async fn live_record(&self, key: &str) -> Option<IdempotencyRecord> {
        let now = self.clock.now();
        let records = self.records.read().await;
        records
            .get(key)
            .filter(|record| !record.is_expired_at(now))
            .cloned()
    }
}

impl Default for InMemoryIdempotencyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live_record(key).await.is_some())
    }

    async fn save(&self, key: &str, order_id: &PaymentOrderId) -> StoreResult<IdempotencyRecord> {
        let now = self.clock.now();
        let mut records = self.records.write().await;
        records.retain(|_, record| !record.is_expired_at(now));

        if records.contains_key(key) {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        let record = IdempotencyRecord::new(key, order_id.clone(), now);
        records.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn find_order_id(&self, key: &str) -> StoreResult<Option<PaymentOrderId>> {
        Ok(self.live_record(key).await.map(|record| record.order_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::amount::Amount;
    use crate::domain::clock::FixedClock;
    use crate::domain::iban::Iban;
    use crate::domain::payment_order::PaymentStatus;
    use chrono::{TimeDelta, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn order(reference: &str, clock: &dyn Clock) -> PaymentOrder {
        PaymentOrder::create(
            reference,
            Iban::of("ES7921000813610123456789").unwrap(),
            Iban::of("ES1420805801101234567891").unwrap(),
            Amount::of(dec!(42.50), "EUR").unwrap(),
            None,
            clock.today(),
            clock,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_order_store() {
        let store = InMemoryOrderStore::new();
        let order = order("REF-1", &SystemClock);

        let saved = store.save(order.clone()).await.unwrap();
        assert_eq!(saved, order);

        let retrieved = store.find_by_id(order.id()).await.unwrap().unwrap();
        assert_eq!(retrieved.reference(), "REF-1");
        assert!(store.exists_by_id(order.id()).await.unwrap());

        let missing = PaymentOrderId::generate();
        assert!(store.find_by_id(&missing).await.unwrap().is_none());
        assert!(!store.exists_by_id(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_order_store_replaces_snapshots() {
        let store = InMemoryOrderStore::new();
        let pending = order("REF-1", &SystemClock);
        store.save(pending.clone()).await.unwrap();

        let processing = pending.mark_as_processing(&SystemClock).unwrap();
        store.save(processing).await.unwrap();

        assert_eq!(store.count().await, 1);
        let current = store.find_by_reference("REF-1").await.unwrap().unwrap();
        assert_eq!(current.status(), PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_in_memory_replace_requires_current_revision() {
        let store = InMemoryOrderStore::new();
        let pending = order("REF-1", &SystemClock);
        store.save(pending.clone()).await.unwrap();

        let cancelled = pending.cancel(&SystemClock).unwrap();
        store.replace(&pending, cancelled.clone()).await.unwrap();

        // A second writer still holding the PENDING snapshot loses.
        let processing = pending.mark_as_processing(&SystemClock).unwrap();
        let err = store.replace(&pending, processing).await.unwrap_err();
        assert!(matches!(err, StoreError::Stale { id } if id == *pending.id()));

        let stored = store.find_by_id(pending.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), PaymentStatus::Cancelled);
        assert!(stored.is_same_revision(&cancelled));

        let unknown = order("REF-2", &SystemClock);
        let next = unknown.mark_as_processing(&SystemClock).unwrap();
        assert!(matches!(
            store.replace(&unknown, next).await,
            Err(StoreError::Stale { .. })
        ));
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_in_memory_idempotency_store_conditional_insert() {
        let store = InMemoryIdempotencyStore::new();
        let first = PaymentOrderId::generate();

        assert!(!store.exists("k1").await.unwrap());
        store.save("k1", &first).await.unwrap();
        assert!(store.exists("k1").await.unwrap());
        assert_eq!(store.find_order_id("k1").await.unwrap(), Some(first.clone()));

        let err = store.save("k1", &PaymentOrderId::generate()).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { key } if key == "k1"));
        assert_eq!(store.find_order_id("k1").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_in_memory_idempotency_store_expiry() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
        ));
        let store = InMemoryIdempotencyStore::with_clock(clock.clone());
        let first = PaymentOrderId::generate();
        store.save("k1", &first).await.unwrap();

        clock.advance(TimeDelta::hours(24));
        assert!(!store.exists("k1").await.unwrap());
        assert!(store.find_order_id("k1").await.unwrap().is_none());

        let second = PaymentOrderId::generate();
        let record = store.save("k1", &second).await.unwrap();
        assert_eq!(record.order_id, second);
        assert_eq!(store.find_order_id("k1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_in_memory_idempotency_store_drops_expired_records() {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
        ));
        let store = InMemoryIdempotencyStore::with_clock(clock.clone());
        store.save("old-1", &PaymentOrderId::generate()).await.unwrap();
        store.save("old-2", &PaymentOrderId::generate()).await.unwrap();
        assert_eq!(store.count().await, 2);

        // Saving an unrelated key sweeps records past their expiry.
        clock.advance(TimeDelta::hours(24));
        store.save("fresh", &PaymentOrderId::generate()).await.unwrap();
        assert_eq!(store.count().await, 1);

        clock.advance(TimeDelta::hours(23));
        assert_eq!(store.purge_expired().await, 0);
        clock.advance(TimeDelta::hours(1));
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.count().await, 0);
    }
}
