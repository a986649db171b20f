//! Amount anomalies against the user's own allowed history.

use super::{CheckContext, Evidence, Heuristic, HeuristicOutcome, AMOUNT};
use crate::error::FraudResult;
use async_trait::async_trait;

const MIN_HISTORY: u64 = 3;
const HISTORY_LIMIT: usize = 50;
const INSUFFICIENT_HISTORY_SCORE: f64 = 5.0;
const TEST_TRANSACTION_SCORE: f64 = 40.0;

pub struct AmountCheck;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub sample_size: usize,
}

impl AmountStats {
    /// Mean, median and sample standard deviation. A single value has no
    /// spread to measure, so its deviation falls back to half the mean.
    pub fn from_amounts(amounts: &[f64]) -> Option<Self> {
        if amounts.is_empty() {
            return None;
        }
        let n = amounts.len();
        let mean = amounts.iter().sum::<f64>() / n as f64;

        let mut sorted = amounts.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let std_dev = if n > 1 {
            let var = amounts.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            mean * 0.5
        };

        Some(Self { mean, median, std_dev, sample_size: n })
    }

    /// Score for `amount` against these stats, with a reason.
    pub fn score(&self, amount: f64) -> (f64, String) {
        if amount > self.mean + 3.0 * self.std_dev {
            let deviation_pct = if self.mean > 0.0 {
                (amount - self.mean) / self.mean * 100.0
            } else {
                f64::INFINITY
            };
            let score = (50.0 + deviation_pct / 2.0).min(100.0);
            return (score, format!("Amount {deviation_pct:.1}% above average"));
        }
        if amount < self.mean * 0.1 && amount < 1.0 {
            return (
                TEST_TRANSACTION_SCORE,
                "Unusually low amount, possible test transaction".to_string(),
            );
        }
        (0.0, "Amount check passed".to_string())
    }
}

#[async_trait]
impl Heuristic for AmountCheck {
    fn name(&self) -> &'static str {
        AMOUNT
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome> {
        let tx = ctx.transaction;
        if tx.user_id.trim().is_empty() {
            return Ok(HeuristicOutcome::new(0.0, "No user ID provided"));
        }

        let insufficient =
            || HeuristicOutcome::new(INSUFFICIENT_HISTORY_SCORE, "Insufficient transaction history");

        if ctx.history.allowed_count(&tx.user_id).await? < MIN_HISTORY {
            return Ok(insufficient());
        }
        let amounts = ctx.history.allowed_amounts(&tx.user_id, HISTORY_LIMIT).await?;
        let stats = match AmountStats::from_amounts(&amounts) {
            Some(stats) if stats.sample_size as u64 >= MIN_HISTORY => stats,
            _ => return Ok(insufficient()),
        };

        let (score, reason) = stats.score(tx.amount);
        Ok(HeuristicOutcome::new(score, reason).with_evidence(Evidence::Amount {
            current_amount: tx.amount,
            average_amount: stats.mean,
            median_amount: stats.median,
            std_dev: stats.std_dev,
            sample_size: stats.sample_size,
        }))
    }
}
