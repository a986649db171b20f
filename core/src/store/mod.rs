//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Heuristics read through `HistoryLookup`; the service writes through
//! `insert_pending` and `record_outcome`. Nothing else executes SQL.
//!
//! One connection sits behind a mutex, so every read and write is
//! serialized. A check inserts its transaction before scoring starts,
//! which lets concurrent bursts from the same card, IP or user count
//! each other in the velocity window.

use crate::{
    error::{FraudError, FraudResult},
    transaction::{ScoreOutcome, Transaction},
    types::{Decision, Location, RiskLevel},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Mutex, MutexGuard};

mod audit;
mod history;

const TRANSACTION_COLUMNS: &str =
    "transaction_id, card_fingerprint, amount, currency, user_id, ip_address,
     country, city, created_at, fraud_score, risk_level, decision, timeout_review";

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

pub struct FraudStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl FraudStore {
    pub fn open(path: &str) -> FraudResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // Another writer holding the file makes us wait, not fail.
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> FraudResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> FraudResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../../migrations/001_transactions.sql"))?;
        conn.execute_batch(include_str!("../../../migrations/002_fraud_events.sql"))?;
        Ok(())
    }

    fn conn(&self) -> FraudResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| FraudError::Other(anyhow::anyhow!("store connection lock poisoned")))
    }

    // ── Transactions ───────────────────────────────────────────

    /// Insert an unscored transaction. Ids are unique.
    pub fn insert_pending(&self, t: &Transaction) -> FraudResult<()> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM transactions WHERE transaction_id = ?1)",
            params![t.transaction_id],
            |row| row.get(0),
        )?;
        if exists {
            return Err(FraudError::DuplicateTransaction {
                transaction_id: t.transaction_id.clone(),
            });
        }
        let location = t.location.clone().unwrap_or_default();
        conn.execute(
            "INSERT INTO transactions (
                transaction_id, card_fingerprint, amount, currency, user_id,
                ip_address, country, city, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                t.transaction_id,
                t.card_fingerprint,
                t.amount,
                t.currency,
                t.user_id,
                t.ip_address,
                location.country,
                location.city,
                t.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    pub fn get_transaction(&self, transaction_id: &str) -> FraudResult<Option<Transaction>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE transaction_id = ?1");
        let row = conn
            .query_row(&sql, params![transaction_id], transaction_from_row)
            .optional()?;
        Ok(row)
    }

    /// Scored transactions for a user, newest first.
    pub fn recent_scored_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> FraudResult<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions
             WHERE user_id = ?1 AND fraud_score IS NOT NULL
             ORDER BY created_at DESC, id DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, limit as i64], transaction_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Delete a transaction together with its audit events.
    pub fn delete_transaction(&self, transaction_id: &str) -> FraudResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM transactions WHERE transaction_id = ?1",
            params![transaction_id],
        )?;
        Ok(removed > 0)
    }

    pub fn transaction_count(&self) -> FraudResult<i64> {
        let conn = self.conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn scored_count(&self, decision: Decision) -> FraudResult<i64> {
        let conn = self.conn()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE decision = ?1",
            params![decision.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    /// Write the outcome exactly once. Fails if already scored.
    pub(crate) fn write_outcome(
        conn: &Connection,
        transaction_id: &str,
        outcome: &ScoreOutcome,
    ) -> FraudResult<i64> {
        let updated = conn.execute(
            "UPDATE transactions
             SET fraud_score = ?1, risk_level = ?2, decision = ?3, timeout_review = ?4
             WHERE transaction_id = ?5 AND fraud_score IS NULL",
            params![
                outcome.fraud_score,
                outcome.risk_level.as_str(),
                outcome.decision.as_str(),
                if outcome.timeout_review { 1 } else { 0 },
                transaction_id,
            ],
        )?;
        if updated == 0 {
            let row_id: Option<i64> = conn
                .query_row(
                    "SELECT id FROM transactions WHERE transaction_id = ?1",
                    params![transaction_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match row_id {
                Some(_) => FraudError::AlreadyScored { transaction_id: transaction_id.to_string() },
                None => FraudError::TransactionNotFound { transaction_id: transaction_id.to_string() },
            });
        }
        let row_id = conn.query_row(
            "SELECT id FROM transactions WHERE transaction_id = ?1",
            params![transaction_id],
            |row| row.get(0),
        )?;
        Ok(row_id)
    }
}

pub(crate) fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let country: Option<String> = row.get(6)?;
    let city: Option<String> = row.get(7)?;
    let location = if country.is_some() || city.is_some() {
        Some(Location { country, city })
    } else {
        None
    };

    let fraud_score: Option<f64> = row.get(9)?;
    let risk_level: Option<String> = row.get(10)?;
    let decision: Option<String> = row.get(11)?;
    let outcome = match (
        fraud_score,
        risk_level.as_deref().and_then(RiskLevel::parse),
        decision.as_deref().and_then(Decision::parse),
    ) {
        (Some(fraud_score), Some(risk_level), Some(decision)) => Some(ScoreOutcome {
            fraud_score,
            risk_level,
            decision,
            timeout_review: row.get::<_, i32>(12)? != 0,
        }),
        _ => None,
    };

    Ok(Transaction {
        transaction_id: row.get(0)?,
        card_fingerprint: row.get(1)?,
        amount: row.get(2)?,
        currency: row.get(3)?,
        user_id: row.get(4)?,
        ip_address: row.get(5)?,
        location,
        created_at: millis_to_utc(row.get(8)?),
        outcome,
    })
}
