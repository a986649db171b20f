//! Scoring configuration: heuristic weights, risk thresholds, velocity
//! parameters and time budgets.
//!
//! A `FraudConfig` is immutable once it is handed out. Changes go through
//! `ConfigManager`, which validates a new value and swaps it in whole.

use crate::{
    error::{FraudError, FraudResult},
    heuristic::{AMOUNT, CARD_PATTERN, GEOGRAPHIC, VELOCITY},
    types::{HeuristicName, RiskLevel},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HeuristicSettings {
    pub enabled: bool,
    pub weight: f64,
}

impl HeuristicSettings {
    pub fn enabled(weight: f64) -> Self {
        Self { enabled: true, weight }
    }

    pub fn disabled(weight: f64) -> Self {
        Self { enabled: false, weight }
    }
}

/// Inclusive lower bounds of each risk tier, ascending.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { low: 30.0, medium: 60.0, high: 80.0 }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> FraudResult<()> {
        let all = [self.low, self.medium, self.high];
        if all.iter().any(|t| !t.is_finite() || *t < 0.0 || *t > 100.0) {
            return Err(FraudError::invalid_config(format!(
                "risk thresholds must lie within [0, 100], got {}/{}/{}",
                self.low, self.medium, self.high
            )));
        }
        if !(self.low < self.medium && self.medium < self.high) {
            return Err(FraudError::invalid_config(format!(
                "risk thresholds must be strictly ascending, got {}/{}/{}",
                self.low, self.medium, self.high
            )));
        }
        Ok(())
    }

    /// Step function from score to tier. Never decreases as score grows.
    pub fn risk_level(&self, score: f64) -> RiskLevel {
        if score >= self.high {
            RiskLevel::High
        } else if score >= self.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VelocityParams {
    pub window_minutes: u32,
    pub max_transactions: u32,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self { window_minutes: 5, max_transactions: 3 }
    }
}

fn default_heuristic_timeout_ms() -> u64 {
    50
}

fn default_deadline_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FraudConfig {
    pub heuristics: BTreeMap<HeuristicName, HeuristicSettings>,
    #[serde(default)]
    pub risk_thresholds: RiskThresholds,
    #[serde(default)]
    pub velocity: VelocityParams,
    /// Budget for a single heuristic before it is treated as failed.
    #[serde(default = "default_heuristic_timeout_ms")]
    pub heuristic_timeout_ms: u64,
    /// Budget for scoring plus decisioning before the check fails open.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for FraudConfig {
    fn default() -> Self {
        let heuristics = [
            (VELOCITY, 0.25),
            (GEOGRAPHIC, 0.20),
            (AMOUNT, 0.20),
            (CARD_PATTERN, 0.35),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), HeuristicSettings::enabled(weight)))
        .collect();

        Self {
            heuristics,
            risk_thresholds: RiskThresholds::default(),
            velocity: VelocityParams::default(),
            heuristic_timeout_ms: default_heuristic_timeout_ms(),
            deadline_ms: default_deadline_ms(),
        }
    }
}

impl FraudConfig {
    /// Load and validate a config file.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: FraudConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent settings before they can reach a scoring run.
    pub fn validate(&self) -> FraudResult<()> {
        for (name, settings) in &self.heuristics {
            if !settings.weight.is_finite() || settings.weight < 0.0 {
                return Err(FraudError::invalid_config(format!(
                    "weight for '{name}' must be a non-negative number, got {}",
                    settings.weight
                )));
            }
        }
        self.risk_thresholds.validate()?;
        if self.velocity.window_minutes == 0 {
            return Err(FraudError::invalid_config("velocity.window_minutes must be at least 1"));
        }
        if self.velocity.max_transactions == 0 {
            return Err(FraudError::invalid_config("velocity.max_transactions must be at least 1"));
        }
        if self.heuristic_timeout_ms == 0 || self.deadline_ms == 0 {
            return Err(FraudError::invalid_config("timeouts must be greater than zero"));
        }
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.heuristics.get(name).is_some_and(|h| h.enabled)
    }

    /// Weight of an enabled heuristic; disabled or unknown ones weigh nothing.
    pub fn weight(&self, name: &str) -> f64 {
        match self.heuristics.get(name) {
            Some(h) if h.enabled => h.weight,
            _ => 0.0,
        }
    }

    pub fn enabled_heuristics(&self) -> impl Iterator<Item = &str> {
        self.heuristics
            .iter()
            .filter(|(_, h)| h.enabled)
            .map(|(name, _)| name.as_str())
    }

    pub fn total_weight(&self) -> f64 {
        self.enabled_heuristics().map(|n| self.weight(n)).sum()
    }
}
