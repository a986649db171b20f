//! Transaction frequency per card, IP and user in a trailing window.

use super::{CheckContext, Evidence, Heuristic, HeuristicOutcome, VELOCITY};
use crate::{error::FraudResult, history::HistoryKey};
use async_trait::async_trait;
use chrono::Duration;

/// Penalty per transaction at or beyond the limit.
const STEP_PENALTY: f64 = 30.0;

pub struct VelocityCheck;

/// `max_count` includes the transaction under check.
pub fn velocity_score(max_count: u64, max_transactions: u32) -> f64 {
    let limit = u64::from(max_transactions);
    if max_count < limit {
        return 0.0;
    }
    ((max_count - limit + 1) as f64 * STEP_PENALTY).min(100.0)
}

#[async_trait]
impl Heuristic for VelocityCheck {
    fn name(&self) -> &'static str {
        VELOCITY
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome> {
        let params = ctx.config.velocity;
        let tx = ctx.transaction;
        let until = tx.created_at;
        let since = until - Duration::minutes(i64::from(params.window_minutes));

        let card_key = HistoryKey::Card(tx.card_fingerprint.clone());
        let ip_key = HistoryKey::Ip(tx.ip_address.clone());
        let user_key = HistoryKey::User(tx.user_id.clone());

        // Anonymous transactions share no user to count against.
        let user_count = async {
            if tx.user_id.trim().is_empty() {
                Ok(0)
            } else {
                ctx.history.count_since(&user_key, since, until, &tx.transaction_id).await
            }
        };

        // Each dimension counts independently; any one tripping is enough.
        let (card, ip, user) = futures::try_join!(
            ctx.history.count_since(&card_key, since, until, &tx.transaction_id),
            ctx.history.count_since(&ip_key, since, until, &tx.transaction_id),
            user_count,
        )?;
        let (card, ip, user) = (card + 1, ip + 1, user + 1);
        let max_count = card.max(ip).max(user);

        let evidence = Evidence::Velocity {
            card_transactions: card,
            ip_transactions: ip,
            user_transactions: user,
            window_minutes: params.window_minutes,
            max_transactions: params.max_transactions,
        };

        let score = velocity_score(max_count, params.max_transactions);
        let outcome = if score > 0.0 {
            HeuristicOutcome::new(
                score,
                format!(
                    "High velocity detected: {max_count} transactions in {} minutes",
                    params.window_minutes
                ),
            )
        } else {
            HeuristicOutcome::new(0.0, "Velocity check passed")
        };
        Ok(outcome.with_evidence(evidence))
    }
}
