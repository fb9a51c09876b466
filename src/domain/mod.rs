//! Domain layer: self-validating value objects, the payment order aggregate
//! and the storage ports the application layer depends on.

pub mod amount;
pub mod clock;
pub mod currency;
pub mod iban;
pub mod idempotency;
pub mod payment_order;
pub mod ports;
