//! Heuristic and scorer behavior against scripted history.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use fraudscore_core::{
    card::CardNumber,
    config::{FraudConfig, HeuristicSettings},
    error::{FraudError, FraudResult},
    event::HeuristicStatus,
    heuristic::{
        AmountCheck, CardPatternCheck, CheckContext, Evidence, GeographicCheck, Heuristic,
        HeuristicOutcome, HeuristicRegistry, VelocityCheck, AMOUNT, CARD_PATTERN, GEOGRAPHIC,
        VELOCITY,
    },
    history::{HistoryKey, HistoryLookup},
    scorer::FraudScorer,
    transaction::{CheckRequest, Transaction},
    types::Location,
};
use std::sync::Arc;

/// History with fixed answers per query.
#[derive(Default)]
struct ScriptedHistory {
    card_count: u64,
    ip_count: u64,
    user_count: u64,
    recent: Vec<Transaction>,
    allowed_amounts: Vec<f64>,
    fail_recent: bool,
}

#[async_trait]
impl HistoryLookup for ScriptedHistory {
    async fn count_since(
        &self,
        key: &HistoryKey,
        _since: DateTime<Utc>,
        _until: DateTime<Utc>,
        _excluding: &str,
    ) -> FraudResult<u64> {
        Ok(match key {
            HistoryKey::Card(_) => self.card_count,
            HistoryKey::Ip(_) => self.ip_count,
            HistoryKey::User(_) => self.user_count,
        })
    }

    async fn recent_for_user(
        &self,
        _user_id: &str,
        _until: DateTime<Utc>,
        limit: usize,
        _excluding: &str,
    ) -> FraudResult<Vec<Transaction>> {
        if self.fail_recent {
            return Err(FraudError::lookup("location history unavailable"));
        }
        Ok(self.recent.iter().take(limit).cloned().collect())
    }

    async fn allowed_count(&self, _user_id: &str) -> FraudResult<u64> {
        Ok(self.allowed_amounts.len() as u64)
    }

    async fn allowed_amounts(&self, _user_id: &str, limit: usize) -> FraudResult<Vec<f64>> {
        Ok(self.allowed_amounts.iter().take(limit).copied().collect())
    }
}

fn checked(card: &str, amount: f64, user: &str, country: Option<&str>) -> (Transaction, CardNumber) {
    CheckRequest {
        transaction_id: format!("tx-{}", uuid::Uuid::new_v4()),
        card_number: card.into(),
        amount,
        currency: "USD".into(),
        user_id: user.into(),
        ip_address: "203.0.113.7".into(),
        location: country.map(|c| Location { country: Some(c.into()), city: None }),
        timestamp: None,
    }
    .into_transaction()
    .unwrap()
}

fn prior(country: &str, ago: Duration) -> Transaction {
    let (mut tx, _) = checked("5555555555554444", 50.0, "user-1", Some(country));
    tx.created_at = Utc::now() - ago;
    tx
}

async fn run(
    heuristic: &dyn Heuristic,
    tx: &Transaction,
    card: &CardNumber,
    history: &dyn HistoryLookup,
) -> HeuristicOutcome {
    let config = FraudConfig::default();
    let ctx = CheckContext { transaction: tx, card, config: &config, history };
    heuristic.check(&ctx).await.unwrap()
}

// ── Velocity ──────────────────────────────────────────────────

#[tokio::test]
async fn velocity_fourth_card_use_in_window_scores_sixty() {
    let (tx, card) = checked("5555555555554444", 20.0, "user-1", None);
    let history = ScriptedHistory { card_count: 3, ip_count: 1, user_count: 0, ..Default::default() };

    let out = run(&VelocityCheck, &tx, &card, &history).await;
    assert_eq!(out.score, 60.0);
    assert_eq!(out.reason, "High velocity detected: 4 transactions in 5 minutes");
    match out.evidence {
        Evidence::Velocity { card_transactions, ip_transactions, user_transactions, .. } => {
            assert_eq!((card_transactions, ip_transactions, user_transactions), (4, 2, 1));
        }
        other => panic!("unexpected evidence {other:?}"),
    }
}

#[tokio::test]
async fn velocity_below_limit_passes() {
    let (tx, card) = checked("5555555555554444", 20.0, "user-1", None);
    let history = ScriptedHistory { card_count: 1, ip_count: 1, user_count: 1, ..Default::default() };

    let out = run(&VelocityCheck, &tx, &card, &history).await;
    assert_eq!(out.score, 0.0);
    assert_eq!(out.reason, "Velocity check passed");
}

#[tokio::test]
async fn velocity_any_single_dimension_trips() {
    let (tx, card) = checked("5555555555554444", 20.0, "user-1", None);
    let history = ScriptedHistory { ip_count: 9, ..Default::default() };

    assert_eq!(run(&VelocityCheck, &tx, &card, &history).await.score, 100.0);
}

// ── Amount ────────────────────────────────────────────────────

#[tokio::test]
async fn amount_outlier_scores_from_deviation() {
    let (tx, card) = checked("5555555555554444", 140.0, "user-1", None);
    let history = ScriptedHistory { allowed_amounts: vec![90.0, 100.0, 110.0], ..Default::default() };

    let out = run(&AmountCheck, &tx, &card, &history).await;
    assert!((out.score - 70.0).abs() < 1e-9);
    assert_eq!(out.reason, "Amount 40.0% above average");
    assert!(matches!(out.evidence, Evidence::Amount { sample_size: 3, .. }));
}

#[tokio::test]
async fn amount_with_short_history_scores_five() {
    let (tx, card) = checked("5555555555554444", 5_000.0, "user-1", None);
    let history = ScriptedHistory { allowed_amounts: vec![10.0, 12.0], ..Default::default() };

    let out = run(&AmountCheck, &tx, &card, &history).await;
    assert_eq!(out.score, 5.0);
    assert_eq!(out.reason, "Insufficient transaction history");
}

#[tokio::test]
async fn amount_without_user_is_neutral() {
    let (tx, card) = checked("5555555555554444", 5_000.0, "", None);
    let out = run(&AmountCheck, &tx, &card, &ScriptedHistory::default()).await;
    assert_eq!(out.score, 0.0);
    assert_eq!(out.reason, "No user ID provided");
}

#[tokio::test]
async fn amount_within_range_passes() {
    let (tx, card) = checked("5555555555554444", 105.0, "user-1", None);
    let history = ScriptedHistory { allowed_amounts: vec![90.0, 100.0, 110.0], ..Default::default() };
    assert_eq!(run(&AmountCheck, &tx, &card, &history).await.score, 0.0);
}

// ── Geographic ────────────────────────────────────────────────

#[tokio::test]
async fn geographic_without_country_is_neutral() {
    let (tx, card) = checked("5555555555554444", 10.0, "user-1", None);
    let out = run(&GeographicCheck::default(), &tx, &card, &ScriptedHistory::default()).await;
    assert_eq!(out.score, 0.0);
    assert_eq!(out.reason, "Insufficient location data");
}

#[tokio::test]
async fn geographic_new_user_scores_ten() {
    let (tx, card) = checked("5555555555554444", 10.0, "user-1", Some("US"));
    let out = run(&GeographicCheck::default(), &tx, &card, &ScriptedHistory::default()).await;
    assert_eq!(out.score, 10.0);
}

#[tokio::test]
async fn geographic_rapid_country_change_scores_eighty() {
    let (tx, card) = checked("5555555555554444", 10.0, "user-1", Some("GB"));
    let history = ScriptedHistory { recent: vec![prior("US", Duration::minutes(30))], ..Default::default() };

    let out = run(&GeographicCheck::default(), &tx, &card, &history).await;
    assert_eq!(out.score, 80.0);
    assert!(out.reason.starts_with("Rapid location change: US to GB"));
}

#[tokio::test]
async fn geographic_same_country_ignores_case() {
    let (tx, card) = checked("5555555555554444", 10.0, "user-1", Some("us"));
    let history = ScriptedHistory { recent: vec![prior("US", Duration::minutes(5))], ..Default::default() };
    assert_eq!(run(&GeographicCheck::default(), &tx, &card, &history).await.score, 0.0);
}

#[tokio::test]
async fn geographic_slow_change_is_not_rapid() {
    let (tx, card) = checked("5555555555554444", 10.0, "user-1", Some("GB"));
    let history = ScriptedHistory { recent: vec![prior("US", Duration::hours(3))], ..Default::default() };
    assert_eq!(run(&GeographicCheck::default(), &tx, &card, &history).await.score, 0.0);
}

#[tokio::test]
async fn geographic_high_risk_origin_scores_sixty() {
    let (tx, card) = checked("5555555555554444", 10.0, "user-1", Some("KP"));
    let history = ScriptedHistory { recent: vec![prior("KP", Duration::hours(5))], ..Default::default() };

    let out = run(&GeographicCheck::default(), &tx, &card, &history).await;
    assert_eq!(out.score, 60.0);
    assert_eq!(out.reason, "Transaction from high-risk country: KP");
}

// ── Card pattern ──────────────────────────────────────────────

#[tokio::test]
async fn blocked_bin_scores_hundred_through_trait() {
    let (tx, card) = checked("4111 1111 1111 1111", 10.0, "user-1", None);
    let check = CardPatternCheck::standard().unwrap();
    let out = run(&check, &tx, &card, &ScriptedHistory::default()).await;
    assert_eq!(out.score, 100.0);
    assert_eq!(out.reason, "Card BIN 411111 is in blocked list");
}

// ── Scorer ────────────────────────────────────────────────────

struct Fixed(&'static str, f64);

#[async_trait]
impl Heuristic for Fixed {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn check(&self, _ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome> {
        Ok(HeuristicOutcome::new(self.1, "fixed"))
    }
}

struct Slow(&'static str);

#[async_trait]
impl Heuristic for Slow {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn check(&self, _ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome> {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        Ok(HeuristicOutcome::new(100.0, "too late"))
    }
}

#[tokio::test]
async fn new_user_ordinary_card_scores_three() {
    let (tx, card) = checked("5555555555554444", 100.0, "user-1", Some("US"));
    let config = FraudConfig::default();
    let history = ScriptedHistory::default();
    let ctx = CheckContext { transaction: &tx, card: &card, config: &config, history: &history };

    let breakdown = FraudScorer::standard().unwrap().calculate_score(&ctx).await;
    assert!((breakdown.fraud_score - 3.0).abs() < 1e-9);
    assert_eq!(breakdown.results.len(), 4);
    assert_eq!(breakdown.result(GEOGRAPHIC).unwrap().raw_score, 10.0);
    assert_eq!(breakdown.result(AMOUNT).unwrap().raw_score, 5.0);
}

#[tokio::test]
async fn failed_lookup_only_zeroes_its_own_heuristic() {
    let (tx, card) = checked("5555555555554444", 100.0, "user-1", Some("US"));
    let config = FraudConfig::default();
    let history = ScriptedHistory { fail_recent: true, ..Default::default() };
    let ctx = CheckContext { transaction: &tx, card: &card, config: &config, history: &history };

    let breakdown = FraudScorer::standard().unwrap().calculate_score(&ctx).await;
    let geo = breakdown.result(GEOGRAPHIC).unwrap();
    assert_eq!(geo.status, HeuristicStatus::Failed);
    assert_eq!(geo.weighted_score, 0.0);
    assert!(geo.reason.contains("location history unavailable"));

    assert_eq!(breakdown.result(AMOUNT).unwrap().raw_score, 5.0);
    assert_eq!(breakdown.result(VELOCITY).unwrap().status, HeuristicStatus::Completed);
    assert!((breakdown.fraud_score - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn slow_heuristic_times_out_and_contributes_nothing() {
    let (tx, card) = checked("5555555555554444", 100.0, "user-1", None);
    let mut config = FraudConfig::default();
    config.heuristic_timeout_ms = 20;

    let mut registry = HeuristicRegistry::empty();
    registry.register(Arc::new(Slow(VELOCITY)));
    registry.register(Arc::new(Fixed(CARD_PATTERN, 100.0)));
    let history = ScriptedHistory::default();
    let ctx = CheckContext { transaction: &tx, card: &card, config: &config, history: &history };

    let breakdown = FraudScorer::new(registry).calculate_score(&ctx).await;
    let slow = breakdown.result(VELOCITY).unwrap();
    assert_eq!(slow.status, HeuristicStatus::TimedOut);
    assert_eq!(slow.reason, "timeout");
    assert!((breakdown.fraud_score - 35.0).abs() < 1e-9);
    assert!(!breakdown.deadline_exceeded);
}

#[tokio::test]
async fn deadline_keeps_heuristics_that_finished() {
    let (tx, card) = checked("5555555555554444", 100.0, "user-1", None);
    let mut config = FraudConfig::default();
    config.heuristic_timeout_ms = 5_000;
    config.deadline_ms = 30;

    let mut registry = HeuristicRegistry::empty();
    registry.register(Arc::new(Slow(VELOCITY)));
    registry.register(Arc::new(Fixed(CARD_PATTERN, 100.0)));
    let history = ScriptedHistory::default();
    let ctx = CheckContext { transaction: &tx, card: &card, config: &config, history: &history };

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(30);
    let breakdown = FraudScorer::new(registry).calculate_score_by(&ctx, deadline).await;
    assert!(breakdown.deadline_exceeded);

    let finished = breakdown.result(CARD_PATTERN).unwrap();
    assert_eq!(finished.status, HeuristicStatus::Completed);
    assert_eq!(finished.raw_score, 100.0);

    let cut = breakdown.result(VELOCITY).unwrap();
    assert_eq!(cut.status, HeuristicStatus::TimedOut);
    assert_eq!(cut.evidence, Evidence::Failure { error: "pipeline deadline of 30ms exceeded".into() });
}

#[tokio::test]
async fn disabled_heuristics_do_not_run() {
    let (tx, card) = checked("4111111111111111", 100.0, "user-1", None);
    let mut config = FraudConfig::default();
    config.heuristics.insert(CARD_PATTERN.into(), HeuristicSettings::disabled(0.35));
    let history = ScriptedHistory::default();
    let ctx = CheckContext { transaction: &tx, card: &card, config: &config, history: &history };

    let breakdown = FraudScorer::standard().unwrap().calculate_score(&ctx).await;
    assert!(breakdown.result(CARD_PATTERN).is_none());
    assert_eq!(breakdown.results.len(), 3);
}

#[tokio::test]
async fn weights_above_one_clamp_to_hundred() {
    let (tx, card) = checked("5555555555554444", 100.0, "user-1", None);
    let mut config = FraudConfig::default();
    config.heuristics.clear();
    config.heuristics.insert(VELOCITY.into(), HeuristicSettings::enabled(1.5));
    config.heuristics.insert(CARD_PATTERN.into(), HeuristicSettings::enabled(1.5));

    let mut registry = HeuristicRegistry::empty();
    registry.register(Arc::new(Fixed(VELOCITY, 80.0)));
    registry.register(Arc::new(Fixed(CARD_PATTERN, 80.0)));
    let history = ScriptedHistory::default();
    let ctx = CheckContext { transaction: &tx, card: &card, config: &config, history: &history };

    let breakdown = FraudScorer::new(registry).calculate_score(&ctx).await;
    assert_eq!(breakdown.fraud_score, 100.0);
}
