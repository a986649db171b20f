//! Running counters for fraud checks handled by one service instance.

use crate::{transaction::FraudCheckResult, types::Decision};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub total_checks: u64,
    pub blocked: u64,
    pub flagged: u64,
    pub allowed: u64,
    pub timeouts: u64,
    pub avg_score: f64,
    pub avg_latency_ms: f64,
}

#[derive(Default)]
pub struct MetricsCollector {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_check(&self, result: &FraudCheckResult, latency_ms: f64) {
        let mut m = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        m.total_checks += 1;
        match result.decision {
            Decision::Block => m.blocked += 1,
            Decision::Flag => m.flagged += 1,
            Decision::Allow => m.allowed += 1,
        }
        if result.timeout_review {
            m.timeouts += 1;
        }

        // Incremental means.
        let n = m.total_checks as f64;
        m.avg_score += (result.fraud_score - m.avg_score) / n;
        m.avg_latency_ms += (latency_ms - m.avg_latency_ms) / n;
        log::debug!("Metrics updated: {:?}", *m);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn reset(&self) {
        match self.inner.lock() {
            Ok(mut guard) => *guard = MetricsSnapshot::default(),
            Err(poisoned) => *poisoned.into_inner() = MetricsSnapshot::default(),
        }
    }
}
