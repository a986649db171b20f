//! Read-only view of transaction history handed to heuristics.
//!
//! Heuristics never see the store itself, only this capability.
//! Tests substitute in-memory or failing implementations.

use crate::{
    error::{FraudError, FraudResult},
    store::FraudStore,
    transaction::Transaction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Dimension a velocity count is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryKey {
    Card(String), // fingerprint
    Ip(String),
    User(String),
}

impl HistoryKey {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            Self::Card(_) => "card_fingerprint",
            Self::Ip(_)   => "ip_address",
            Self::User(_) => "user_id",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Card(v) | Self::Ip(v) | Self::User(v) => v,
        }
    }
}

#[async_trait]
pub trait HistoryLookup: Send + Sync {
    /// Transactions matching `key` created within `[since, until]`,
    /// not counting the transaction `excluding`.
    async fn count_since(
        &self,
        key: &HistoryKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        excluding: &str,
    ) -> FraudResult<u64>;

    /// A user's transactions created at or before `until`, most recent
    /// first, at most `limit`.
    async fn recent_for_user(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        limit: usize,
        excluding: &str,
    ) -> FraudResult<Vec<Transaction>>;

    /// Number of allow-decision transactions for a user.
    async fn allowed_count(&self, user_id: &str) -> FraudResult<u64>;

    /// Amounts of the user's most recent allowed transactions.
    async fn allowed_amounts(&self, user_id: &str, limit: usize) -> FraudResult<Vec<f64>>;
}

/// `HistoryLookup` over the SQLite store. Queries run on the blocking
/// pool so a heuristic timeout can fire while one is in progress.
#[derive(Clone)]
pub struct SqliteHistory {
    store: Arc<FraudStore>,
}

impl SqliteHistory {
    pub fn new(store: Arc<FraudStore>) -> Self {
        Self { store }
    }
}

async fn blocking<T, F>(f: F) -> FraudResult<T>
where
    F: FnOnce() -> FraudResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FraudError::lookup(format!("lookup task aborted: {e}")))?
}

#[async_trait]
impl HistoryLookup for SqliteHistory {
    async fn count_since(
        &self,
        key: &HistoryKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        excluding: &str,
    ) -> FraudResult<u64> {
        let store = Arc::clone(&self.store);
        let key = key.clone();
        let excluding = excluding.to_string();
        blocking(move || store.count_since(&key, since, until, &excluding)).await
    }

    async fn recent_for_user(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        limit: usize,
        excluding: &str,
    ) -> FraudResult<Vec<Transaction>> {
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        let excluding = excluding.to_string();
        blocking(move || store.recent_for_user(&user_id, until, limit, &excluding)).await
    }

    async fn allowed_count(&self, user_id: &str) -> FraudResult<u64> {
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        blocking(move || store.allowed_count(&user_id)).await
    }

    async fn allowed_amounts(&self, user_id: &str, limit: usize) -> FraudResult<Vec<f64>> {
        let store = Arc::clone(&self.store);
        let user_id = user_id.to_string();
        blocking(move || store.allowed_amounts(&user_id, limit)).await
    }
}
