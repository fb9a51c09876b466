use crate::error::{PaymentError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static IBAN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z0-9]{1,30}$").expect("IBAN pattern is a valid regex")
});

/// An International Bank Account Number in canonical form.
///
/// Canonical form has no whitespace and is upper-case; equality is defined
/// on that form, so `"es79 2100 ..."` and `"ES792100..."` are the same account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Iban(String);

impl Iban {
    pub fn of(raw: &str) -> Result<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();

        if IBAN_PATTERN.is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(PaymentError::InvalidIban(format!(
                "Invalid IBAN format: {raw}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form, with a space every four characters.
    pub fn formatted(&self) -> String {
        self.0
            .as_bytes()
            .chunks(4)
            .map(|chunk| String::from_utf8_lossy(chunk))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for Iban {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Iban {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Iban {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self> {
        Self::of(&value)
    }
}

impl From<Iban> for String {
    fn from(iban: Iban) -> Self {
        iban.0
    }
}
