//! Fraud scorer: runs the enabled heuristics and aggregates their scores.
//!
//! The aggregate is the literal weighted sum `Σ score_i × weight_i`,
//! clamped to [0, 100]. It is not divided by the total weight.
//!
//! A heuristic that errors or overruns its time budget contributes 0
//! and is recorded as failed or timed out. It never aborts the score.
//! A pipeline deadline, when given, caps every heuristic's budget;
//! heuristics that finished before it keep their results.

use crate::{
    error::FraudResult,
    event::HeuristicStatus,
    heuristic::{CheckContext, Evidence, HeuristicRegistry},
};
use futures::future::join_all;
use log::{debug, warn};
use std::time::Duration;
use tokio::time::Instant;

/// Clamp into [0, 100]; NaN counts as no risk.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// Outcome of one heuristic within a scoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct HeuristicResult {
    pub name: &'static str,
    pub status: HeuristicStatus,
    pub raw_score: f64,
    pub weight: f64,
    pub weighted_score: f64,
    pub reason: String,
    pub evidence: Evidence,
}

impl HeuristicResult {
    /// Stopped by the pipeline deadline rather than its own budget.
    pub fn timed_out(name: &'static str, weight: f64, error: String) -> Self {
        Self {
            name,
            status: HeuristicStatus::TimedOut,
            raw_score: 0.0,
            weight,
            weighted_score: 0.0,
            reason: "timeout".into(),
            evidence: Evidence::Failure { error },
        }
    }

    fn degraded(name: &'static str, status: HeuristicStatus, weight: f64, reason: String) -> Self {
        Self {
            name,
            status,
            raw_score: 0.0,
            weight,
            weighted_score: 0.0,
            evidence: Evidence::Failure { error: reason.clone() },
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub fraud_score: f64,
    pub results: Vec<HeuristicResult>,
    /// The pipeline deadline cut at least one heuristic short.
    pub deadline_exceeded: bool,
}

impl ScoreBreakdown {
    pub fn result(&self, name: &str) -> Option<&HeuristicResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

pub fn deadline_error(deadline_ms: u64) -> String {
    format!("pipeline deadline of {deadline_ms}ms exceeded")
}

/// Weighted sum of results, clamped.
pub fn aggregate(results: &[HeuristicResult]) -> f64 {
    clamp_score(results.iter().map(|r| r.weighted_score).sum())
}

pub struct FraudScorer {
    registry: HeuristicRegistry,
}

impl FraudScorer {
    pub fn new(registry: HeuristicRegistry) -> Self {
        Self { registry }
    }

    pub fn standard() -> FraudResult<Self> {
        Ok(Self::new(HeuristicRegistry::standard()?))
    }

    /// Names of the heuristics a check under `ctx.config` will run.
    pub fn active_names(&self, ctx: &CheckContext<'_>) -> Vec<&'static str> {
        self.registry.enabled(ctx.config).iter().map(|h| h.name()).collect()
    }

    /// Run every enabled heuristic concurrently and aggregate.
    pub async fn calculate_score(&self, ctx: &CheckContext<'_>) -> ScoreBreakdown {
        self.run(ctx, None).await
    }

    /// As `calculate_score`, but nothing runs past `deadline`.
    pub async fn calculate_score_by(&self, ctx: &CheckContext<'_>, deadline: Instant) -> ScoreBreakdown {
        self.run(ctx, Some(deadline)).await
    }

    async fn run(&self, ctx: &CheckContext<'_>, deadline: Option<Instant>) -> ScoreBreakdown {
        let budget = Duration::from_millis(ctx.config.heuristic_timeout_ms);
        let own_cutoff = Instant::now() + budget;
        let (cutoff, deadline_bound) = match deadline {
            Some(deadline) if deadline <= own_cutoff => (deadline, true),
            _ => (own_cutoff, false),
        };
        let active = self.registry.enabled(ctx.config);

        let runs = active.iter().map(|heuristic| async move {
            let outcome = tokio::time::timeout_at(cutoff, heuristic.check(ctx)).await;
            (heuristic.name(), outcome)
        });

        let results: Vec<HeuristicResult> = join_all(runs)
            .await
            .into_iter()
            .map(|(name, outcome)| {
                let weight = ctx.config.weight(name);
                match outcome {
                    Ok(Ok(outcome)) => {
                        let raw_score = clamp_score(outcome.score);
                        HeuristicResult {
                            name,
                            status: HeuristicStatus::Completed,
                            raw_score,
                            weight,
                            weighted_score: raw_score * weight,
                            reason: outcome.reason,
                            evidence: outcome.evidence,
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(
                            "Heuristic '{name}' failed for {}: {e}",
                            ctx.transaction.transaction_id
                        );
                        HeuristicResult::degraded(name, HeuristicStatus::Failed, weight, e.to_string())
                    }
                    Err(_) if deadline_bound => {
                        warn!(
                            "Heuristic '{name}' cut off by the {}ms deadline for {}",
                            ctx.config.deadline_ms, ctx.transaction.transaction_id
                        );
                        HeuristicResult::timed_out(name, weight, deadline_error(ctx.config.deadline_ms))
                    }
                    Err(_) => {
                        warn!(
                            "Heuristic '{name}' timed out after {}ms for {}",
                            budget.as_millis(),
                            ctx.transaction.transaction_id
                        );
                        HeuristicResult::degraded(name, HeuristicStatus::TimedOut, weight, "timeout".into())
                    }
                }
            })
            .collect();

        let fraud_score = aggregate(&results);
        debug!(
            "Heuristic breakdown for {}: {}",
            ctx.transaction.transaction_id,
            results
                .iter()
                .map(|r| format!("{}={:.2}x{:.2}", r.name, r.raw_score, r.weight))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let deadline_exceeded =
            deadline_bound && results.iter().any(|r| r.status == HeuristicStatus::TimedOut);
        ScoreBreakdown { fraud_score, results, deadline_exceeded }
    }
}
