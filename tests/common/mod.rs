#![allow(dead_code)]

use chrono::{Days, Local, NaiveDate};
use payment_initiation::application::service::{InitiatePaymentOrderCommand, PaymentOrderService};
use payment_initiation::infrastructure::in_memory::{InMemoryIdempotencyStore, InMemoryOrderStore};
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Error;
use std::path::Path;

pub const DEBTOR: &str = "ES7921000813610123456789";
pub const CREDITOR: &str = "ES1420805801101234567891";

pub const BATCH_HEADER: [&str; 8] = [
    "reference",
    "debtor",
    "creditor",
    "amount",
    "currency",
    "remittance",
    "execution_date",
    "idempotency_key",
];

pub fn tomorrow() -> NaiveDate {
    Local::now().date_naive() + Days::new(1)
}

/// A command that passes every validation, executed tomorrow.
pub fn valid_command(reference: &str, idempotency_key: Option<&str>) -> InitiatePaymentOrderCommand {
    InitiatePaymentOrderCommand {
        reference: Some(reference.to_string()),
        debtor_account: Some(DEBTOR.to_string()),
        creditor_account: Some(CREDITOR.to_string()),
        amount: Some(dec!(1500.00)),
        currency: Some("EUR".to_string()),
        remittance_information: Some("Invoice 2026-001".to_string()),
        requested_execution_date: Some(tomorrow()),
        idempotency_key: idempotency_key.map(str::to_string),
    }
}

/// A service over fresh in-memory stores, with handles kept for inspection.
pub fn in_memory_service() -> (PaymentOrderService, InMemoryOrderStore, InMemoryIdempotencyStore) {
    let orders = InMemoryOrderStore::new();
    let keys = InMemoryIdempotencyStore::new();
    let service = PaymentOrderService::new(Box::new(orders.clone()), Box::new(keys.clone()));
    (service, orders, keys)
}

pub fn write_batch_csv(path: &Path, rows: &[[&str; 8]]) -> Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(BATCH_HEADER)?;
    for row in rows {
        wtr.write_record(row)?;
    }

    wtr.flush()?;
    Ok(())
}
