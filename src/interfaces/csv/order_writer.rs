use crate::application::service::PaymentOrderStatusInfo;
use crate::domain::payment_order::{PaymentOrder, PaymentStatus};
use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    order_id: &'a str,
    reference: &'a str,
    debtor: &'a str,
    creditor: &'a str,
    amount: Decimal,
    currency: &'a str,
    remittance: Option<&'a str>,
    execution_date: NaiveDate,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl<'a> From<&'a PaymentOrder> for OrderRow<'a> {
    fn from(order: &'a PaymentOrder) -> Self {
        Self {
            order_id: order.id().as_str(),
            reference: order.reference(),
            debtor: order.debtor_account().as_str(),
            creditor: order.creditor_account().as_str(),
            amount: order.instructed_amount().value(),
            currency: order.instructed_amount().currency_code(),
            remittance: order.remittance_information(),
            execution_date: order.requested_execution_date(),
            status: order.status(),
            created_at: order.created_at(),
            last_updated_at: order.last_updated_at(),
        }
    }
}

/// Writes payment orders, or their status projections, as CSV with a header row.
pub struct OrderWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> OrderWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_order(&mut self, order: &PaymentOrder) -> Result<()> {
        self.writer.serialize(OrderRow::from(order))?;
        Ok(())
    }

    pub fn write_orders<'a>(
        &mut self,
        orders: impl IntoIterator<Item = &'a PaymentOrder>,
    ) -> Result<()> {
        for order in orders {
            self.write_order(order)?;
        }
        self.flush()
    }

    pub fn write_status(&mut self, status: &PaymentOrderStatusInfo) -> Result<()> {
        self.writer.serialize(status)?;
        self.flush()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
