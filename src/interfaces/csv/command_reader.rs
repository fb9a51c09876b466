use crate::application::service::InitiatePaymentOrderCommand;
use crate::error::{PaymentError, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One initiation request as laid out in a CSV file. Empty cells are absent values.
#[derive(Debug, Deserialize, PartialEq)]
pub struct InitiationRecord {
    pub reference: Option<String>,
    pub debtor: Option<String>,
    pub creditor: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub remittance: Option<String>,
    pub execution_date: Option<NaiveDate>,
    pub idempotency_key: Option<String>,
}

impl From<InitiationRecord> for InitiatePaymentOrderCommand {
    fn from(record: InitiationRecord) -> Self {
        Self {
            reference: record.reference,
            debtor_account: record.debtor,
            creditor_account: record.creditor,
            amount: record.amount,
            currency: record.currency,
            remittance_information: record.remittance,
            requested_execution_date: record.execution_date,
            idempotency_key: record.idempotency_key,
        }
    }
}

/// Reads payment order initiation commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<InitiatePaymentOrderCommand>`.
/// It handles whitespace trimming and flexible record lengths automatically.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes commands.
    ///
    /// A malformed row yields an error for that row only; iteration continues
    /// with the next one.
    pub fn commands(self) -> impl Iterator<Item = Result<InitiatePaymentOrderCommand>> {
        self.reader.into_deserialize::<InitiationRecord>().map(|result| {
            result
                .map(InitiatePaymentOrderCommand::from)
                .map_err(PaymentError::from)
        })
    }
}
