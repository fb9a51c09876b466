use super::payment_order::PaymentOrderId;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// How long a key stays bound to the order it created.
pub const IDEMPOTENCY_TTL_HOURS: i64 = 24;

pub fn idempotency_ttl() -> TimeDelta {
    TimeDelta::hours(IDEMPOTENCY_TTL_HOURS)
}

/// Returns the key if it carries a value, `None` for absent or blank keys.
pub fn effective_key(key: Option<&str>) -> Option<&str> {
    key.filter(|k| !k.trim().is_empty())
}

/// Binding of a client-supplied idempotency key to the order it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub order_id: PaymentOrderId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(key: impl Into<String>, order_id: PaymentOrderId, now: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            order_id,
            created_at: now,
            expires_at: now + idempotency_ttl(),
        }
    }

    /// An expired record no longer blocks reuse of its key.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
