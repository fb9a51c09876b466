use super::amount::Amount;
use super::clock::Clock;
use super::iban::Iban;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Opaque payment order identifier, rendered as `PO-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentOrderId(String);

impl PaymentOrderId {
    pub fn generate() -> Self {
        Self(format!("PO-{}", uuid::Uuid::new_v4()))
    }

    /// Wraps an existing identifier, e.g. one supplied by a caller.
    pub fn of(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Err(PaymentError::InvalidPaymentOrder(
                "Payment order id cannot be blank".to_string(),
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaymentOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PaymentOrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a payment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Created, not yet picked up for processing.
    Pending,
    Processing,
    Settled,
    Rejected,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Settled,
        Self::Rejected,
        Self::Cancelled,
    ];

    /// Status the order may move to next. Terminal statuses allow nothing.
    pub const fn allowed_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            Self::Pending => &[
                Self::Processing,
                Self::Settled,
                Self::Rejected,
                Self::Cancelled,
            ],
            Self::Processing => &[Self::Processing, Self::Settled, Self::Rejected],
            Self::Settled | Self::Rejected | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Rejected | Self::Cancelled)
    }

    pub const fn can_be_cancelled(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Settled => "SETTLED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status change requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    MarkAsProcessing,
    MarkAsSettled,
    MarkAsRejected,
    Cancel,
}

impl StatusTransition {
    pub const fn target(&self) -> PaymentStatus {
        match self {
            Self::MarkAsProcessing => PaymentStatus::Processing,
            Self::MarkAsSettled => PaymentStatus::Settled,
            Self::MarkAsRejected => PaymentStatus::Rejected,
            Self::Cancel => PaymentStatus::Cancelled,
        }
    }
}

impl FromStr for StatusTransition {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing" => Ok(Self::MarkAsProcessing),
            "settled" => Ok(Self::MarkAsSettled),
            "rejected" => Ok(Self::MarkAsRejected),
            "cancel" | "cancelled" => Ok(Self::Cancel),
            other => Err(format!(
                "unknown transition '{other}', expected one of: processing, settled, rejected, cancel"
            )),
        }
    }
}

/// Aggregate root for a payment order.
///
/// Snapshots are immutable: every transition returns a new `PaymentOrder` and
/// leaves the receiver untouched. Two snapshots are equal when they share an
/// id, whatever their status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    id: PaymentOrderId,
    reference: String,
    debtor_account: Iban,
    creditor_account: Iban,
    instructed_amount: Amount,
    remittance_information: Option<String>,
    requested_execution_date: NaiveDate,
    status: PaymentStatus,
    created_at: DateTime<Utc>,
    last_updated_at: DateTime<Utc>,
}

impl PaymentOrder {
    /// Creates a new order in `PENDING` with a fresh id.
    pub fn create(
        reference: impl Into<String>,
        debtor_account: Iban,
        creditor_account: Iban,
        instructed_amount: Amount,
        remittance_information: Option<String>,
        requested_execution_date: NaiveDate,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let reference = reference.into();
        if reference.trim().is_empty() {
            return Err(PaymentError::InvalidPaymentOrder(
                "Payment order reference cannot be blank".to_string(),
            ));
        }
        if debtor_account == creditor_account {
            return Err(PaymentError::InvalidPaymentOrder(
                "Debtor and creditor accounts cannot be the same".to_string(),
            ));
        }
        if requested_execution_date < clock.today() {
            return Err(PaymentError::InvalidPaymentOrder(format!(
                "Execution date {requested_execution_date} cannot be in the past"
            )));
        }

        let now = clock.now();
        Ok(Self {
            id: PaymentOrderId::generate(),
            reference,
            debtor_account,
            creditor_account,
            instructed_amount,
            remittance_information,
            requested_execution_date,
            status: PaymentStatus::Pending,
            created_at: now,
            last_updated_at: now,
        })
    }

    pub fn mark_as_processing(&self, clock: &dyn Clock) -> Result<Self> {
        self.transition_to(PaymentStatus::Processing, clock)
    }

    pub fn mark_as_settled(&self, clock: &dyn Clock) -> Result<Self> {
        self.transition_to(PaymentStatus::Settled, clock)
    }

    pub fn mark_as_rejected(&self, clock: &dyn Clock) -> Result<Self> {
        self.transition_to(PaymentStatus::Rejected, clock)
    }

    /// Only a `PENDING` order can be cancelled.
    pub fn cancel(&self, clock: &dyn Clock) -> Result<Self> {
        self.transition_to(PaymentStatus::Cancelled, clock)
    }

    pub fn apply(&self, transition: StatusTransition, clock: &dyn Clock) -> Result<Self> {
        match transition {
            StatusTransition::MarkAsProcessing => self.mark_as_processing(clock),
            StatusTransition::MarkAsSettled => self.mark_as_settled(clock),
            StatusTransition::MarkAsRejected => self.mark_as_rejected(clock),
            StatusTransition::Cancel => self.cancel(clock),
        }
    }

    fn transition_to(&self, next: PaymentStatus, clock: &dyn Clock) -> Result<Self> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }

        // last_updated_at strictly increases on every transition, even when
        // the clock stalls or moves backwards.
        let now = clock.now();
        let last_updated_at = if now > self.last_updated_at {
            now
        } else {
            self.last_updated_at + TimeDelta::microseconds(1)
        };
        Ok(Self {
            status: next,
            last_updated_at,
            ..self.clone()
        })
    }

    pub fn id(&self) -> &PaymentOrderId {
        &self.id
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn debtor_account(&self) -> &Iban {
        &self.debtor_account
    }

    pub fn creditor_account(&self) -> &Iban {
        &self.creditor_account
    }

    pub fn instructed_amount(&self) -> &Amount {
        &self.instructed_amount
    }

    pub fn remittance_information(&self) -> Option<&str> {
        self.remittance_information.as_deref()
    }

    pub fn requested_execution_date(&self) -> NaiveDate {
        self.requested_execution_date
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    /// True when both snapshots are the same version of the same order.
    ///
    /// `PartialEq` compares identity only; this also compares the status and
    /// `last_updated_at`, which changes on every transition.
    pub fn is_same_revision(&self, other: &PaymentOrder) -> bool {
        self.id == other.id
            && self.status == other.status
            && self.last_updated_at == other.last_updated_at
    }
}

impl PartialEq for PaymentOrder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PaymentOrder {}

impl Hash for PaymentOrder {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::FixedClock;
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal_macros::dec;

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap())
    }

    fn tomorrow(clock: &FixedClock) -> NaiveDate {
        clock.today().succ_opt().unwrap()
    }

    fn pending_order(clock: &FixedClock) -> PaymentOrder {
        PaymentOrder::create(
            "REF-1",
            Iban::of("ES7921000813610123456789").unwrap(),
            Iban::of("ES1420805801101234567891").unwrap(),
            Amount::of(dec!(1500.00), "EUR").unwrap(),
            Some("Invoice 42".to_string()),
            tomorrow(clock),
            clock,
        )
        .unwrap()
    }

    #[test]
    fn test_create_starts_pending() {
        let clock = clock();
        let order = pending_order(&clock);

        assert_eq!(order.status(), PaymentStatus::Pending);
        assert_eq!(order.created_at(), order.last_updated_at());
        assert_eq!(order.created_at(), clock.now());
        assert!(order.id().as_str().starts_with("PO-"));
        assert_eq!(order.reference(), "REF-1");
        assert_eq!(order.remittance_information(), Some("Invoice 42"));
    }

    #[test]
    fn test_create_accepts_execution_today() {
        let clock = clock();
        let order = PaymentOrder::create(
            "REF-TODAY",
            Iban::of("ES7921000813610123456789").unwrap(),
            Iban::of("ES1420805801101234567891").unwrap(),
            Amount::of(dec!(1), "EUR").unwrap(),
            None,
            clock.today(),
            &clock,
        );
        assert!(order.is_ok());
    }

    #[test]
    fn test_create_rejects_same_accounts() {
        let clock = clock();
        let result = PaymentOrder::create(
            "REF-1",
            Iban::of("ES7921000813610123456789").unwrap(),
            Iban::of("es79 2100 0813 6101 2345 6789").unwrap(),
            Amount::of(dec!(10), "EUR").unwrap(),
            None,
            tomorrow(&clock),
            &clock,
        );
        assert!(matches!(result, Err(PaymentError::InvalidPaymentOrder(_))));
    }

    #[test]
    fn test_create_rejects_past_execution_date() {
        let clock = clock();
        let result = PaymentOrder::create(
            "REF-1",
            Iban::of("ES7921000813610123456789").unwrap(),
            Iban::of("ES1420805801101234567891").unwrap(),
            Amount::of(dec!(10), "EUR").unwrap(),
            None,
            clock.today().pred_opt().unwrap(),
            &clock,
        );
        assert!(matches!(result, Err(PaymentError::InvalidPaymentOrder(_))));
    }

    #[test]
    fn test_create_rejects_blank_reference() {
        let clock = clock();
        let result = PaymentOrder::create(
            "  ",
            Iban::of("ES7921000813610123456789").unwrap(),
            Iban::of("ES1420805801101234567891").unwrap(),
            Amount::of(dec!(10), "EUR").unwrap(),
            None,
            tomorrow(&clock),
            &clock,
        );
        assert!(matches!(result, Err(PaymentError::InvalidPaymentOrder(_))));
    }

    #[test]
    fn test_transitions_return_new_snapshots() {
        let clock = clock();
        let pending = pending_order(&clock);

        clock.advance(TimeDelta::minutes(5));
        let processing = pending.mark_as_processing(&clock).unwrap();
        assert_eq!(pending.status(), PaymentStatus::Pending);
        assert_eq!(processing.status(), PaymentStatus::Processing);
        assert_eq!(processing.created_at(), pending.created_at());
        assert!(processing.last_updated_at() > pending.last_updated_at());
        // Identity survives the transition.
        assert_eq!(processing, pending);

        clock.advance(TimeDelta::minutes(5));
        let settled = processing.mark_as_settled(&clock).unwrap();
        assert_eq!(settled.status(), PaymentStatus::Settled);
        assert!(settled.last_updated_at() > processing.last_updated_at());
    }

    #[test]
    fn test_terminal_statuses_are_absorbing() {
        let clock = clock();
        let pending = pending_order(&clock);
        let settled = pending
            .mark_as_processing(&clock)
            .and_then(|o| o.mark_as_settled(&clock))
            .unwrap();

        assert!(matches!(
            settled.mark_as_processing(&clock),
            Err(PaymentError::InvalidStateTransition {
                from: PaymentStatus::Settled,
                to: PaymentStatus::Processing,
            })
        ));

        let rejected = pending.mark_as_rejected(&clock).unwrap();
        let cancelled = pending.cancel(&clock).unwrap();
        for terminal in [settled, rejected, cancelled] {
            for transition in [
                StatusTransition::MarkAsProcessing,
                StatusTransition::MarkAsSettled,
                StatusTransition::MarkAsRejected,
                StatusTransition::Cancel,
            ] {
                assert!(terminal.apply(transition, &clock).is_err());
            }
        }
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let clock = clock();
        let pending = pending_order(&clock);
        assert_eq!(
            pending.cancel(&clock).unwrap().status(),
            PaymentStatus::Cancelled
        );

        let processing = pending.mark_as_processing(&clock).unwrap();
        assert!(matches!(
            processing.cancel(&clock),
            Err(PaymentError::InvalidStateTransition {
                from: PaymentStatus::Processing,
                to: PaymentStatus::Cancelled,
            })
        ));
    }

    #[test]
    fn test_pending_may_settle_directly() {
        let clock = clock();
        let settled = pending_order(&clock).mark_as_settled(&clock).unwrap();
        assert_eq!(settled.status(), PaymentStatus::Settled);
    }

    #[test]
    fn test_transition_table_matches_status_predicates() {
        for from in PaymentStatus::ALL {
            for to in PaymentStatus::ALL {
                let expected = !from.is_terminal()
                    && (to != PaymentStatus::Pending)
                    && (to != PaymentStatus::Cancelled || from.can_be_cancelled());
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn test_last_updated_never_moves_backwards() {
        let clock = clock();
        let pending = pending_order(&clock);
        clock.advance(TimeDelta::hours(-1));
        let processing = pending.mark_as_processing(&clock).unwrap();
        assert_eq!(
            processing.last_updated_at(),
            pending.last_updated_at() + TimeDelta::microseconds(1)
        );
    }

    #[test]
    fn test_last_updated_advances_when_clock_stalls() {
        let clock = clock();
        let pending = pending_order(&clock);
        let first = pending.mark_as_processing(&clock).unwrap();
        let second = first.mark_as_processing(&clock).unwrap();

        assert!(first.last_updated_at() > pending.last_updated_at());
        assert!(second.last_updated_at() > first.last_updated_at());
        assert_eq!(second.created_at(), clock.now());
    }

    #[test]
    fn test_snapshot_survives_json_round_trip() {
        let clock = clock();
        let order = pending_order(&clock);
        clock.advance(TimeDelta::seconds(30));
        let processing = order.mark_as_processing(&clock).unwrap();

        let json = serde_json::to_string(&processing).unwrap();
        let restored: PaymentOrder = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.id(), processing.id());
        assert_eq!(restored.reference(), "REF-1");
        assert_eq!(restored.debtor_account(), processing.debtor_account());
        assert_eq!(restored.creditor_account(), processing.creditor_account());
        assert_eq!(restored.instructed_amount(), processing.instructed_amount());
        assert_eq!(restored.instructed_amount().value().to_string(), "1500.00");
        assert_eq!(restored.remittance_information(), Some("Invoice 42"));
        assert_eq!(
            restored.requested_execution_date(),
            processing.requested_execution_date()
        );
        assert_eq!(restored.status(), PaymentStatus::Processing);
        assert_eq!(restored.created_at(), processing.created_at());
        assert_eq!(restored.last_updated_at(), processing.last_updated_at());
    }

    #[test]
    fn test_snapshot_with_unknown_currency_is_rejected() {
        let clock = clock();
        let json = serde_json::to_string(&pending_order(&clock))
            .unwrap()
            .replace("\"EUR\"", "\"ABC\"");
        assert!(serde_json::from_str::<PaymentOrder>(&json).is_err());
    }

    #[test]
    fn test_status_transition_parsing() {
        assert_eq!(
            "processing".parse::<StatusTransition>().unwrap(),
            StatusTransition::MarkAsProcessing
        );
        assert_eq!(
            "CANCEL".parse::<StatusTransition>().unwrap(),
            StatusTransition::Cancel
        );
        assert!("refund".parse::<StatusTransition>().is_err());
    }

    #[test]
    fn test_order_id_rejects_blank() {
        assert!(PaymentOrderId::of("").is_err());
        assert_eq!(PaymentOrderId::of("PO-1").unwrap().as_str(), "PO-1");
        assert_ne!(PaymentOrderId::generate(), PaymentOrderId::generate());
    }
}
