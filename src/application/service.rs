use super::idempotency::IdempotencyGuard;
use crate::domain::amount::Amount;
use crate::domain::clock::{Clock, SystemClock};
use crate::domain::iban::Iban;
use crate::domain::payment_order::{PaymentOrder, PaymentOrderId, PaymentStatus, StatusTransition};
use crate::domain::ports::{IdempotencyStoreBox, OrderStoreBox};
use crate::error::{PaymentError, Result, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reads of a concurrently modified order before `transition` gives up.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Request to initiate a payment order.
///
/// Every field is optional here so that missing input is reported as
/// `InvalidPaymentOrder` instead of being unrepresentable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitiatePaymentOrderCommand {
    pub reference: Option<String>,
    pub debtor_account: Option<String>,
    pub creditor_account: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub remittance_information: Option<String>,
    pub requested_execution_date: Option<NaiveDate>,
    pub idempotency_key: Option<String>,
}

/// A command whose required fields are all present and well-formed.
struct ValidatedCommand<'a> {
    reference: &'a str,
    debtor_account: &'a str,
    creditor_account: &'a str,
    amount: Decimal,
    currency: &'a str,
    remittance_information: Option<&'a str>,
    requested_execution_date: NaiveDate,
}

impl InitiatePaymentOrderCommand {
    /// Checks field presence in declaration order and reports the first violation.
    fn validate(&self) -> Result<ValidatedCommand<'_>> {
        let reference = required(self.reference.as_deref(), "Payment order reference")?;
        let debtor_account = required(self.debtor_account.as_deref(), "Debtor account")?;
        let creditor_account = required(self.creditor_account.as_deref(), "Creditor account")?;
        let amount = self
            .amount
            .ok_or_else(|| invalid("Amount is required"))?;
        if amount <= Decimal::ZERO {
            return Err(invalid("Amount must be positive"));
        }
        let currency = required(self.currency.as_deref(), "Currency")?;
        let requested_execution_date = self
            .requested_execution_date
            .ok_or_else(|| invalid("Execution date is required"))?;

        Ok(ValidatedCommand {
            reference,
            debtor_account,
            creditor_account,
            amount,
            currency,
            remittance_information: self.remittance_information.as_deref(),
            requested_execution_date,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        None => Err(invalid(&format!("{field} is required"))),
        Some(v) if v.trim().is_empty() => Err(invalid(&format!("{field} cannot be blank"))),
        Some(v) => Ok(v),
    }
}

fn invalid(message: &str) -> PaymentError {
    PaymentError::InvalidPaymentOrder(message.to_string())
}

/// Status projection of a payment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOrderStatusInfo {
    pub order_id: PaymentOrderId,
    pub status: PaymentStatus,
    pub last_updated_at: DateTime<Utc>,
}

impl From<&PaymentOrder> for PaymentOrderStatusInfo {
    fn from(order: &PaymentOrder) -> Self {
        Self {
            order_id: order.id().clone(),
            status: order.status(),
            last_updated_at: order.last_updated_at(),
        }
    }
}

/// Use cases for initiating and tracking payment orders.
///
/// The service keeps no mutable state of its own and can be shared behind an
/// `Arc` between any number of concurrent tasks.
pub struct PaymentOrderService {
    order_store: OrderStoreBox,
    idempotency: IdempotencyGuard,
    clock: Arc<dyn Clock>,
}

impl PaymentOrderService {
    pub fn new(order_store: OrderStoreBox, idempotency_store: IdempotencyStoreBox) -> Self {
        Self::with_clock(order_store, idempotency_store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        order_store: OrderStoreBox,
        idempotency_store: IdempotencyStoreBox,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            order_store,
            idempotency: IdempotencyGuard::new(idempotency_store),
            clock,
        }
    }

    /// Creates, persists and returns a new `PENDING` order.
    ///
    /// Nothing is written unless every validation passes. The idempotency
    /// key is bound only after the order itself is saved, so a key never
    /// points at an order that failed to persist.
    pub async fn initiate(&self, command: InitiatePaymentOrderCommand) -> Result<PaymentOrder> {
        info!(
            reference = command.reference.as_deref().unwrap_or_default(),
            idempotency_key = command.idempotency_key.as_deref().unwrap_or_default(),
            "Initiating payment order"
        );

        let result = self.try_initiate(&command).await;
        match &result {
            Ok(order) => info!(order_id = %order.id(), "Payment order initiated"),
            Err(e) if e.is_client_error() => warn!(
                reference = command.reference.as_deref().unwrap_or_default(),
                error = %e,
                "Payment order rejected"
            ),
            Err(e) => tracing::error!(
                reference = command.reference.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to initiate payment order"
            ),
        }
        result
    }

    async fn try_initiate(&self, command: &InitiatePaymentOrderCommand) -> Result<PaymentOrder> {
        let validated = command.validate()?;
        let key = command.idempotency_key.as_deref();

        self.idempotency.check(key).await?;

        let order = PaymentOrder::create(
            validated.reference,
            Iban::of(validated.debtor_account)?,
            Iban::of(validated.creditor_account)?,
            Amount::of(validated.amount, validated.currency)?,
            validated.remittance_information.map(str::to_string),
            validated.requested_execution_date,
            self.clock.as_ref(),
        )?;

        let saved = self.order_store.save(order).await?;
        self.idempotency.save(key, saved.id()).await?;
        Ok(saved)
    }

    pub async fn retrieve(&self, id: &PaymentOrderId) -> Result<PaymentOrder> {
        debug!(order_id = %id, "Retrieving payment order");
        match self.order_store.find_by_id(id).await? {
            Some(order) => Ok(order),
            None => {
                warn!(order_id = %id, "Payment order not found");
                Err(PaymentError::PaymentOrderNotFound(id.clone()))
            }
        }
    }

    pub async fn retrieve_status(&self, id: &PaymentOrderId) -> Result<PaymentOrderStatusInfo> {
        let order = self.retrieve(id).await?;
        let info = PaymentOrderStatusInfo::from(&order);
        debug!(order_id = %id, status = %info.status, "Payment order status retrieved");
        Ok(info)
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<PaymentOrder>> {
        Ok(self.order_store.find_by_reference(reference).await?)
    }

    /// Applies a status transition and persists the resulting snapshot.
    ///
    /// The write only lands if the order is unchanged since it was read. When
    /// another transition got there first, the transition is re-applied to
    /// the fresh snapshot, so a status that became terminal in the meantime
    /// fails with `InvalidStateTransition` instead of being overwritten.
    pub async fn transition(
        &self,
        id: &PaymentOrderId,
        transition: StatusTransition,
    ) -> Result<PaymentOrder> {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self.retrieve(id).await?;
            let next = current.apply(transition, self.clock.as_ref())?;
            match self.order_store.replace(&current, next).await {
                Ok(saved) => {
                    info!(
                        order_id = %id,
                        from = %current.status(),
                        to = %saved.status(),
                        "Payment order status changed"
                    );
                    return Ok(saved);
                }
                Err(StoreError::Stale { .. }) => {
                    debug!(
                        order_id = %id,
                        attempt,
                        "Payment order changed concurrently, retrying"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(order_id = %id, "Gave up on transition after repeated concurrent updates");
        Err(StoreError::Stale { id: id.clone() }.into())
    }
}
