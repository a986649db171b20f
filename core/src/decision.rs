//! Decision engine: maps a fraud score to a risk tier and an action.
//!
//! Pure function of (score, thresholds). It does not look at the
//! transaction, and calling it twice gives identical output.

use crate::{
    config::RiskThresholds,
    types::{Decision, RiskLevel},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub risk_level: RiskLevel,
    pub reason: String,
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    thresholds: RiskThresholds,
}

impl DecisionEngine {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.thresholds
    }

    pub fn make_decision(&self, score: f64) -> DecisionOutcome {
        let risk_level = self.thresholds.risk_level(score);
        let reason = match risk_level {
            RiskLevel::High => format!("High fraud risk detected (score: {score:.2})"),
            RiskLevel::Medium => {
                format!("Medium fraud risk detected (score: {score:.2}), requires review")
            }
            RiskLevel::Low => format!("Low fraud risk (score: {score:.2})"),
        };
        DecisionOutcome {
            decision: risk_level.action(),
            risk_level,
            reason,
        }
    }
}
