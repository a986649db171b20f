//! Heuristic trait and registry.
//!
//! RULE: Every fraud signal implements `Heuristic`.
//! Heuristics are independent of each other: they read the transaction
//! and history, never the results of other heuristics, and never write.
//! The scorer runs every enabled heuristic concurrently.

use crate::{
    card::CardNumber,
    config::FraudConfig,
    error::FraudResult,
    history::HistoryLookup,
    transaction::Transaction,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

mod amount;
mod card_pattern;
mod geographic;
mod velocity;

pub use amount::{AmountCheck, AmountStats};
pub use card_pattern::CardPatternCheck;
pub use geographic::GeographicCheck;
pub use velocity::VelocityCheck;

pub const VELOCITY: &str = "velocity";
pub const GEOGRAPHIC: &str = "geographic";
pub const AMOUNT: &str = "amount";
pub const CARD_PATTERN: &str = "card_pattern";

/// Everything a heuristic may look at for one check.
pub struct CheckContext<'a> {
    pub transaction: &'a Transaction,
    pub card: &'a CardNumber,
    pub config: &'a FraudConfig,
    pub history: &'a dyn HistoryLookup,
}

/// Supporting numbers recorded with a heuristic result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    None,
    Velocity {
        card_transactions: u64,
        ip_transactions: u64,
        user_transactions: u64,
        window_minutes: u32,
        max_transactions: u32,
    },
    Amount {
        current_amount: f64,
        average_amount: f64,
        median_amount: f64,
        std_dev: f64,
        sample_size: usize,
    },
    Geographic {
        last_country: Option<String>,
        current_country: String,
        hours_since_last: Option<f64>,
    },
    CardBin {
        card_bin: String,
    },
    CardPattern {
        pattern: String,
    },
    Failure {
        error: String,
    },
}

/// What a heuristic returns: a risk contribution in [0, 100] and why.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicOutcome {
    pub score: f64,
    pub reason: String,
    pub evidence: Evidence,
}

impl HeuristicOutcome {
    pub fn new(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score,
            reason: reason.into(),
            evidence: Evidence::None,
        }
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence = evidence;
        self
    }
}

/// The contract every heuristic must fulfill.
#[async_trait]
pub trait Heuristic: Send + Sync {
    /// Unique stable name; matches the key in `FraudConfig::heuristics`.
    fn name(&self) -> &'static str;

    /// Score one transaction. Missing inputs yield a neutral score with
    /// a reason; only lookup failures are returned as errors.
    async fn check(&self, ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome>;
}

/// Heuristics available to the scorer, keyed by name.
/// Which of them run is decided per check by the config's enabled set.
#[derive(Clone, Default)]
pub struct HeuristicRegistry {
    heuristics: Vec<Arc<dyn Heuristic>>,
}

impl HeuristicRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The four built-in heuristics.
    pub fn standard() -> FraudResult<Self> {
        let mut registry = Self::empty();
        registry.register(Arc::new(VelocityCheck));
        registry.register(Arc::new(GeographicCheck::default()));
        registry.register(Arc::new(AmountCheck));
        registry.register(Arc::new(CardPatternCheck::standard()?));
        Ok(registry)
    }

    /// Add a heuristic, replacing any registered under the same name.
    pub fn register(&mut self, heuristic: Arc<dyn Heuristic>) {
        self.heuristics.retain(|h| h.name() != heuristic.name());
        self.heuristics.push(heuristic);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Heuristic>> {
        self.heuristics.iter().find(|h| h.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.heuristics.iter().map(|h| h.name()).collect()
    }

    /// Registered heuristics that the config enables, in config order.
    pub fn enabled(&self, config: &FraudConfig) -> Vec<&Arc<dyn Heuristic>> {
        config
            .enabled_heuristics()
            .filter_map(|name| {
                let found = self.get(name);
                if found.is_none() {
                    log::warn!("Heuristic '{name}' is enabled but not registered; skipping");
                }
                found
            })
            .collect()
    }
}
