use crate::domain::clock::{Clock, SystemClock};
use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::payment_order::{PaymentOrder, PaymentOrderId};
use crate::domain::ports::{IdempotencyStore, OrderStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Column Family for payment order snapshots, keyed by order id.
pub const CF_ORDERS: &str = "payment_orders";
/// Column Family mapping a client reference to its latest order id.
pub const CF_REFERENCES: &str = "order_references";
/// Column Family for idempotency records, keyed by idempotency key.
pub const CF_IDEMPOTENCY: &str = "idempotency_keys";

/// A persistent store implementation using RocksDB.
///
/// Implements both `OrderStore` and `IdempotencyStore` on separate Column
/// Families. Values are JSON-encoded.
///
/// Order writes and the conditional insert for idempotency keys are each
/// serialized by a mutex shared by this handle and its clones. That makes
/// them atomic for every caller in this process, which is the only writer
/// RocksDB allows on a database path.
///
/// Expired idempotency records are swept when the store is opened and on
/// every `purge_expired` call.
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    clock: Arc<dyn Clock>,
    order_write_lock: Arc<Mutex<()>>,
    key_insert_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::open_with_clock(path, Arc::new(SystemClock))
    }

    pub fn open_with_clock<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ORDERS, CF_REFERENCES, CF_IDEMPOTENCY]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            clock,
            order_write_lock: Arc::new(Mutex::new(())),
            key_insert_lock: Arc::new(Mutex::new(())),
        };
        let purged = store.sweep_expired()?;
        if purged > 0 {
            debug!(purged, "Removed expired idempotency records");
        }
        Ok(store)
    }

    /// Deletes every expired idempotency record and returns how many were removed.
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        let _guard = self.key_insert_lock.lock().await;
        self.sweep_expired()
    }

    fn sweep_expired(&self) -> StoreResult<usize> {
        let handle = self.cf(CF_IDEMPOTENCY)?;
        let now = self.clock.now();

        let mut batch = WriteBatch::default();
        let mut purged = 0;
        for entry in self.db.iterator_cf(handle, IteratorMode::Start) {
            let (key, value) = entry?;
            let record: IdempotencyRecord = serde_json::from_slice(&value)?;
            if record.is_expired_at(now) {
                batch.delete_cf(handle, key);
                purged += 1;
            }
        }
        if purged > 0 {
            self.db.write(batch)?;
        }
        Ok(purged)
    }

    fn write_order(&self, order: &PaymentOrder) -> StoreResult<()> {
        let orders = self.cf(CF_ORDERS)?;
        let references = self.cf(CF_REFERENCES)?;

        let value = serde_json::to_vec(order)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(orders, order.id().as_str(), value);
        batch.put_cf(references, order.reference(), order.id().as_str());
        self.db.write(batch)?;
        Ok(())
    }

    fn cf(&self, name: &str) -> StoreResult<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::backend(format!("{name} column family not found")))
    }

    fn get_json<T>(&self, cf: &str, key: &[u8]) -> StoreResult<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let handle = self.cf(cf)?;
        match self.db.get_pinned_cf(handle, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn live_record(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        let now = self.clock.now();
        let record: Option<IdempotencyRecord> = self.get_json(CF_IDEMPOTENCY, key.as_bytes())?;
        Ok(record.filter(|record| !record.is_expired_at(now)))
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn save(&self, order: PaymentOrder) -> StoreResult<PaymentOrder> {
        let _guard = self.order_write_lock.lock().await;
        self.write_order(&order)?;
        Ok(order)
    }

    async fn replace(
        &self,
        current: &PaymentOrder,
        next: PaymentOrder,
    ) -> StoreResult<PaymentOrder> {
        let _guard = self.order_write_lock.lock().await;

        let stored: Option<PaymentOrder> =
            self.get_json(CF_ORDERS, current.id().as_str().as_bytes())?;
        if !stored.is_some_and(|stored| stored.is_same_revision(current)) {
            return Err(StoreError::Stale {
                id: current.id().clone(),
            });
        }

        self.write_order(&next)?;
        Ok(next)
    }

    async fn find_by_id(&self, id: &PaymentOrderId) -> StoreResult<Option<PaymentOrder>> {
        self.get_json(CF_ORDERS, id.as_str().as_bytes())
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<PaymentOrder>> {
        let references = self.cf(CF_REFERENCES)?;
        let Some(id) = self.db.get_pinned_cf(references, reference)? else {
            return Ok(None);
        };
        self.get_json(CF_ORDERS, &id)
    }

    async fn exists_by_id(&self, id: &PaymentOrderId) -> StoreResult<bool> {
        let orders = self.cf(CF_ORDERS)?;
        // Just check if the key exists without decoding the value
        Ok(self.db.get_pinned_cf(orders, id.as_str())?.is_some())
    }
}

#[async_trait]
impl IdempotencyStore for RocksDBStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live_record(key)?.is_some())
    }

    async fn save(&self, key: &str, order_id: &PaymentOrderId) -> StoreResult<IdempotencyRecord> {
        let _guard = self.key_insert_lock.lock().await;

        if self.live_record(key)?.is_some() {
            return Err(StoreError::Conflict {
                key: key.to_string(),
            });
        }

        let record = IdempotencyRecord::new(key, order_id.clone(), self.clock.now());
        let value = serde_json::to_vec(&record)?;
        self.db.put_cf(self.cf(CF_IDEMPOTENCY)?, key, value)?;
        Ok(record)
    }

    async fn find_order_id(&self, key: &str) -> StoreResult<Option<PaymentOrderId>> {
        Ok(self.live_record(key)?.map(|record| record.order_id))
    }
}
