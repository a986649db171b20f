//! Card number handling at the pipeline boundary.
//!
//! RULE: The raw card number never leaves this module except through
//! `digits()`, which only the card-pattern heuristic reads.
//! Everything persisted or logged uses the SHA-256 fingerprint.

use crate::error::{FraudError, FraudResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest PAN accepted (ISO/IEC 7812).
const MAX_CARD_DIGITS: usize = 19;

/// Leading digits that identify the issuer.
pub const BIN_LENGTH: usize = 6;

/// A normalized card number held only for the duration of one check.
#[derive(Clone, PartialEq, Eq)]
pub struct CardNumber {
    digits: String,
}

impl CardNumber {
    /// Normalize a caller-supplied card number.
    /// Spaces and dashes are accepted as separators; anything else must be a digit.
    pub fn parse(raw: &str) -> FraudResult<Self> {
        let digits: String = raw
            .chars()
            .filter(|c| *c != ' ' && *c != '-')
            .collect();

        if digits.is_empty() {
            return Err(FraudError::invalid_request("card_number is empty"));
        }
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(FraudError::invalid_request("card_number must contain only digits"));
        }
        if digits.len() > MAX_CARD_DIGITS {
            return Err(FraudError::invalid_request(format!(
                "card_number has {} digits, at most {MAX_CARD_DIGITS} allowed",
                digits.len()
            )));
        }
        Ok(Self { digits })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Issuer prefix. Shorter numbers return what they have.
    pub fn bin(&self) -> &str {
        &self.digits[..self.digits.len().min(BIN_LENGTH)]
    }

    pub fn last4(&self) -> &str {
        &self.digits[self.digits.len().saturating_sub(4)..]
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.digits)
    }
}

impl fmt::Debug for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardNumber(****{})", self.last4())
    }
}

/// One-way SHA-256 fingerprint, lowercase hex.
pub fn fingerprint(digits: &str) -> String {
    hex::encode(Sha256::digest(digits.as_bytes()))
}
