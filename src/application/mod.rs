//! Application layer orchestrating the payment order use cases.
//!
//! `PaymentOrderService` is the entry point for inbound adapters. It composes
//! command validation, the `IdempotencyGuard` and the storage ports into the
//! initiation workflow, and serves order and status lookups.

pub mod idempotency;
pub mod service;
