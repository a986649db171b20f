use super::{transaction_from_row, FraudStore, TRANSACTION_COLUMNS};
use crate::{error::FraudResult, history::HistoryKey, transaction::Transaction};
use chrono::{DateTime, Utc};
use rusqlite::params;

impl FraudStore {
    // ── History queries (read-only, used by heuristics) ────────────

    /// Transactions matching `key` created within `[since, until]`,
    /// not counting `excluding`.
    pub fn count_since(
        &self,
        key: &HistoryKey,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        excluding: &str,
    ) -> FraudResult<u64> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT COUNT(*) FROM transactions
             WHERE {} = ?1 AND created_at >= ?2 AND created_at <= ?3
               AND transaction_id != ?4",
            key.column()
        );
        let n: i64 = conn.query_row(
            &sql,
            params![
                key.value(),
                since.timestamp_millis(),
                until.timestamp_millis(),
                excluding
            ],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    /// A user's transactions created at or before `until`, newest first,
    /// not counting `excluding`.
    pub fn recent_for_user(
        &self,
        user_id: &str,
        until: DateTime<Utc>,
        limit: usize,
        excluding: &str,
    ) -> FraudResult<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE user_id = ?1 AND created_at <= ?2 AND transaction_id != ?3
             ORDER BY created_at DESC, id DESC LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![user_id, until.timestamp_millis(), excluding, limit as i64],
            transaction_from_row,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Allowed transactions for a user. Fail-open timeout allows are not
    /// a trustworthy baseline and are left out.
    pub fn allowed_count(&self, user_id: &str) -> FraudResult<u64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions
             WHERE user_id = ?1 AND decision = 'allow' AND timeout_review = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    /// Amounts of a user's most recent allowed transactions.
    pub fn allowed_amounts(&self, user_id: &str, limit: usize) -> FraudResult<Vec<f64>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT amount FROM transactions
             WHERE user_id = ?1 AND decision = 'allow' AND timeout_review = 0
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| row.get(0))?;
        rows.collect::<Result<Vec<f64>, _>>().map_err(Into::into)
    }
}
