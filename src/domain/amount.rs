use super::currency::Currency;
use crate::error::{PaymentError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of fractional digits every instructed amount is normalized to.
pub const AMOUNT_SCALE: u32 = 2;

/// A strictly positive monetary amount in a given currency.
///
/// The value is rounded half-up to two decimal places on construction, so
/// `1500.12345 EUR` and `1500.12 EUR` are the same amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    value: Decimal,
    currency: Currency,
}

impl Amount {
    pub fn of(value: Decimal, currency_code: &str) -> Result<Self> {
        let currency = Currency::of(currency_code)?;
        Self::new(value, currency)
    }

    pub fn new(value: Decimal, currency: Currency) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(PaymentError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }

        let mut value =
            value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);
        if value.is_zero() {
            return Err(PaymentError::InvalidAmount(format!(
                "Amount rounds to zero at {AMOUNT_SCALE} decimal places"
            )));
        }
        value.rescale(AMOUNT_SCALE);

        Ok(Self { value, currency })
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn currency_code(&self) -> &'static str {
        self.currency.code()
    }

    /// Compares two amounts of the same currency.
    pub fn is_greater_than(&self, other: &Amount) -> Result<bool> {
        self.ensure_same_currency(other)?;
        Ok(self.value > other.value)
    }

    fn ensure_same_currency(&self, other: &Amount) -> Result<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(PaymentError::CurrencyMismatch {
                left: self.currency.to_string(),
                right: other.currency.to_string(),
            })
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value
    }
}
