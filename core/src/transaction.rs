//! Transaction records and the check request/response shapes.

use crate::{
    card::CardNumber,
    error::{FraudError, FraudResult},
    types::{Decision, Location, RiskLevel, TransactionId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "USD".to_string()
}

/// Inbound fraud-check request, as received from the caller.
/// `card_number` is raw here and is hashed by `into_transaction`.
#[derive(Clone, Deserialize)]
pub struct CheckRequest {
    pub transaction_id: TransactionId,
    pub card_number: String,
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub user_id: UserId,
    pub ip_address: String,
    #[serde(default)]
    pub location: Option<Location>,
    /// Creation instant. Defaults to the time the request is validated.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CheckRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckRequest")
            .field("transaction_id", &self.transaction_id)
            .field("card_number", &"<redacted>")
            .field("amount", &self.amount)
            .field("currency", &self.currency)
            .field("user_id", &self.user_id)
            .field("ip_address", &self.ip_address)
            .field("location", &self.location)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl CheckRequest {
    /// Validate the request and split it into the persistable transaction
    /// and the transient card number.
    pub fn into_transaction(self) -> FraudResult<(Transaction, CardNumber)> {
        if self.transaction_id.trim().is_empty() {
            return Err(FraudError::invalid_request("transaction_id is empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(FraudError::invalid_request(format!(
                "amount must be a non-negative number, got {}",
                self.amount
            )));
        }
        let currency = self.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FraudError::invalid_request(format!(
                "currency '{}' is not a three-letter code",
                self.currency
            )));
        }
        let card = CardNumber::parse(&self.card_number)?;

        // Blank location fields carry no signal.
        let location = self.location.map(|loc| Location {
            country: loc.country.filter(|c| !c.trim().is_empty()),
            city: loc.city.filter(|c| !c.trim().is_empty()),
        });

        let transaction = Transaction {
            transaction_id: self.transaction_id,
            card_fingerprint: card.fingerprint(),
            amount: self.amount,
            currency,
            user_id: self.user_id,
            ip_address: self.ip_address,
            location,
            created_at: self.timestamp.unwrap_or_else(Utc::now),
            outcome: None,
        };
        Ok((transaction, card))
    }
}

/// The scoring outcome. Either all of it is present or none of it is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreOutcome {
    pub fraud_score: f64,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    /// Set when the outcome is a fail-open allow after the pipeline deadline.
    pub timeout_review: bool,
}

/// A transaction as persisted in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub card_fingerprint: String,
    pub amount: f64,
    pub currency: String,
    pub user_id: UserId,
    pub ip_address: String,
    pub location: Option<Location>,
    pub created_at: DateTime<Utc>,
    pub outcome: Option<ScoreOutcome>,
}

impl Transaction {
    pub fn country(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.country.as_deref())
    }

    pub fn is_scored(&self) -> bool {
        self.outcome.is_some()
    }
}

/// What the caller gets back from a fraud check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudCheckResult {
    pub fraud_score: f64,
    pub risk_level: RiskLevel,
    pub decision: Decision,
    pub reason: String,
    #[serde(default)]
    pub timeout_review: bool,
}

impl FraudCheckResult {
    pub fn outcome(&self) -> ScoreOutcome {
        ScoreOutcome {
            fraud_score: self.fraud_score,
            risk_level: self.risk_level,
            decision: self.decision,
            timeout_review: self.timeout_review,
        }
    }
}

/// Status view of a stored transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionStatus {
    pub transaction_id: TransactionId,
    pub fraud_score: Option<f64>,
    pub risk_level: Option<RiskLevel>,
    pub decision: Option<Decision>,
    pub created_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionStatus {
    fn from(t: &Transaction) -> Self {
        Self {
            transaction_id: t.transaction_id.clone(),
            fraud_score: t.outcome.as_ref().map(|o| o.fraud_score),
            risk_level: t.outcome.as_ref().map(|o| o.risk_level),
            decision: t.outcome.as_ref().map(|o| o.decision),
            created_at: t.created_at,
        }
    }
}
