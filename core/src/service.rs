//! Fraud detection service: the full check pipeline.
//!
//! PIPELINE (per request):
//!   1. Validate the request and fingerprint the card.
//!   2. Take one config snapshot; the whole check uses it.
//!   3. Insert the unscored transaction.
//!   4. Score and decide. The config's deadline runs from step 1.
//!   5. Persist outcome + audit events in one store transaction.
//!   6. Record metrics.
//!
//! If the deadline passes before a decision exists, the check fails open:
//! allow, flagged `timeout_review`. Heuristics that finished in time are
//! still audited with their scores. Caller-facing errors are limited to
//! bad input, duplicate ids and an unreachable store.

use crate::{
    config_manager::ConfigManager,
    decision::DecisionEngine,
    error::{FraudError, FraudResult},
    event::{DecisionAudit, FraudEvent, HeuristicAudit},
    heuristic::CheckContext,
    history::{HistoryLookup, SqliteHistory},
    metrics::{MetricsCollector, MetricsSnapshot},
    scorer::{deadline_error, FraudScorer, HeuristicResult},
    store::FraudStore,
    transaction::{CheckRequest, FraudCheckResult, Transaction, TransactionStatus},
    types::{Decision, RiskLevel},
};
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub struct FraudDetectionService {
    store: Arc<FraudStore>,
    config: Arc<ConfigManager>,
    scorer: FraudScorer,
    history: Arc<dyn HistoryLookup>,
    metrics: MetricsCollector,
}

impl FraudDetectionService {
    /// Service with the built-in heuristics reading history from `store`.
    pub fn new(store: Arc<FraudStore>, config: Arc<ConfigManager>) -> FraudResult<Self> {
        let history = Arc::new(SqliteHistory::new(Arc::clone(&store)));
        Ok(Self::with_parts(store, config, FraudScorer::standard()?, history))
    }

    /// Service with a custom scorer or history source.
    pub fn with_parts(
        store: Arc<FraudStore>,
        config: Arc<ConfigManager>,
        scorer: FraudScorer,
        history: Arc<dyn HistoryLookup>,
    ) -> Self {
        Self {
            store,
            config,
            scorer,
            history,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &ConfigManager {
        &self.config
    }

    pub fn store(&self) -> &FraudStore {
        &self.store
    }

    /// Run the full check for one transaction.
    pub async fn analyze_transaction(&self, request: CheckRequest) -> FraudResult<FraudCheckResult> {
        let started = Instant::now();
        let (transaction, card) = request.into_transaction()?;
        let config = self.config.snapshot();
        let deadline = started + Duration::from_millis(config.deadline_ms);
        info!("Analyzing transaction: {}", transaction.transaction_id);

        let pending = transaction.clone();
        self.with_store(move |store| store.insert_pending(&pending)).await?;

        let ctx = CheckContext {
            transaction: &transaction,
            card: &card,
            config: &config,
            history: self.history.as_ref(),
        };

        // A slow insert spends the same budget scoring would.
        let breakdown = if Instant::now() >= deadline {
            warn!(
                "Storing {} used the whole {}ms deadline",
                transaction.transaction_id, config.deadline_ms
            );
            None
        } else {
            Some(self.scorer.calculate_score_by(&ctx, deadline).await)
        };

        let (result, results) = match breakdown {
            Some(breakdown) if !breakdown.deadline_exceeded => {
                let decided = DecisionEngine::new(config.risk_thresholds).make_decision(breakdown.fraud_score);
                let result = FraudCheckResult {
                    fraud_score: breakdown.fraud_score,
                    risk_level: decided.risk_level,
                    decision: decided.decision,
                    reason: decided.reason,
                    timeout_review: false,
                };
                (result, breakdown.results)
            }
            breakdown => {
                warn!(
                    "Fraud check for {} exceeded {}ms deadline; failing open",
                    transaction.transaction_id, config.deadline_ms
                );
                let result = FraudCheckResult {
                    fraud_score: 0.0,
                    risk_level: RiskLevel::Low,
                    decision: Decision::Allow,
                    reason: format!(
                        "Fraud check exceeded {}ms deadline, allowed pending review (timeout_review)",
                        config.deadline_ms
                    ),
                    timeout_review: true,
                };
                // Heuristics that finished keep their results.
                let results = match breakdown {
                    Some(breakdown) => breakdown.results,
                    None => self
                        .scorer
                        .active_names(&ctx)
                        .into_iter()
                        .map(|name| {
                            HeuristicResult::timed_out(name, config.weight(name), deadline_error(config.deadline_ms))
                        })
                        .collect(),
                };
                (result, results)
            }
        };

        let events = audit_events(&transaction, &results, &result);
        let transaction_id = transaction.transaction_id.clone();
        let outcome = result.outcome();
        self.with_store(move |store| store.record_outcome(&transaction_id, &outcome, &events))
            .await?;

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_check(&result, latency_ms);
        info!(
            "Decision: {} for transaction {} (score {:.2}, {:.1}ms)",
            result.decision, transaction.transaction_id, result.fraud_score, latency_ms
        );
        Ok(result)
    }

    /// Current status of a stored transaction.
    pub async fn transaction_status(&self, transaction_id: &str) -> FraudResult<TransactionStatus> {
        let id = transaction_id.to_string();
        let found = self.with_store(move |store| store.get_transaction(&id)).await?;
        found
            .as_ref()
            .map(TransactionStatus::from)
            .ok_or_else(|| FraudError::TransactionNotFound {
                transaction_id: transaction_id.to_string(),
            })
    }

    /// The audit trail of a transaction, in the order it was written.
    pub async fn audit_trail(&self, transaction_id: &str) -> FraudResult<Vec<FraudEvent>> {
        let id = transaction_id.to_string();
        self.with_store(move |store| {
            if store.get_transaction(&id)?.is_none() {
                return Err(FraudError::TransactionNotFound { transaction_id: id });
            }
            store.events_for_transaction(&id)
        })
        .await
    }

    /// A user's most recent scored transactions.
    pub async fn user_history(&self, user_id: &str, limit: usize) -> FraudResult<Vec<TransactionStatus>> {
        let user_id = user_id.to_string();
        let rows = self
            .with_store(move |store| store.recent_scored_for_user(&user_id, limit))
            .await?;
        Ok(rows.iter().map(TransactionStatus::from).collect())
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    async fn with_store<T, F>(&self, f: F) -> FraudResult<T>
    where
        F: FnOnce(&FraudStore) -> FraudResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| FraudError::Other(anyhow::anyhow!("store task aborted: {e}")))?
    }
}

/// One event per heuristic that ran, then the final decision.
fn audit_events(
    transaction: &Transaction,
    results: &[HeuristicResult],
    result: &FraudCheckResult,
) -> Vec<FraudEvent> {
    let now = Utc::now();
    let mut events: Vec<FraudEvent> = results
        .iter()
        .map(|r| {
            FraudEvent::heuristic_check(
                &transaction.transaction_id,
                r.name,
                r.raw_score,
                HeuristicAudit {
                    status: r.status,
                    reason: r.reason.clone(),
                    weight: r.weight,
                    weighted_score: r.weighted_score,
                    evidence: r.evidence.clone(),
                },
                now,
            )
        })
        .collect();
    events.push(final_event(transaction, result));
    events
}

fn final_event(transaction: &Transaction, result: &FraudCheckResult) -> FraudEvent {
    FraudEvent::final_decision(
        &transaction.transaction_id,
        result.fraud_score,
        DecisionAudit {
            decision: result.decision,
            risk_level: result.risk_level,
            reason: result.reason.clone(),
            timeout_review: result.timeout_review,
        },
        Utc::now(),
    )
}
