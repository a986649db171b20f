//! Audit trail records.
//!
//! RULE: Every scored transaction owns exactly one `HeuristicCheck` event
//! per heuristic that ran, followed by one `FinalDecision` event.
//! Events are written in the same store transaction as the score.

use crate::{
    heuristic::Evidence,
    types::{Decision, RiskLevel, TransactionId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name recorded on the final decision event.
pub const DECISION_ENGINE: &str = "decision_engine";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FraudEventType {
    HeuristicCheck,
    FinalDecision,
}

impl FraudEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeuristicCheck => "heuristic_check",
            Self::FinalDecision  => "final_decision",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "heuristic_check" => Some(Self::HeuristicCheck),
            "final_decision"  => Some(Self::FinalDecision),
            _ => None,
        }
    }
}

/// How a heuristic run ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HeuristicStatus {
    Completed,
    Failed,
    TimedOut,
}

/// Details payload of a heuristic_check event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HeuristicAudit {
    pub status: HeuristicStatus,
    pub reason: String,
    pub weight: f64,
    pub weighted_score: f64,
    pub evidence: Evidence,
}

/// Details payload of the final_decision event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionAudit {
    pub decision: Decision,
    pub risk_level: RiskLevel,
    pub reason: String,
    pub timeout_review: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetails {
    Heuristic(HeuristicAudit),
    Decision(DecisionAudit),
}

/// One audit row as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudEvent {
    pub event_id: String,
    pub transaction_id: TransactionId,
    pub event_type: FraudEventType,
    pub heuristic_name: String,
    /// Raw heuristic score, or the final score for the decision event.
    pub score_contribution: f64,
    pub details: EventDetails,
    pub created_at: DateTime<Utc>,
}

impl FraudEvent {
    pub fn heuristic_check(
        transaction_id: &str,
        heuristic_name: &str,
        raw_score: f64,
        audit: HeuristicAudit,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            event_type: FraudEventType::HeuristicCheck,
            heuristic_name: heuristic_name.to_string(),
            score_contribution: raw_score,
            details: EventDetails::Heuristic(audit),
            created_at,
        }
    }

    pub fn final_decision(
        transaction_id: &str,
        fraud_score: f64,
        audit: DecisionAudit,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            transaction_id: transaction_id.to_string(),
            event_type: FraudEventType::FinalDecision,
            heuristic_name: DECISION_ENGINE.to_string(),
            score_contribution: fraud_score,
            details: EventDetails::Decision(audit),
            created_at,
        }
    }
}
