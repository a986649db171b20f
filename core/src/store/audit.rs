use super::{millis_to_utc, FraudStore};
use crate::{
    error::{FraudError, FraudResult},
    event::{FraudEvent, FraudEventType},
    transaction::ScoreOutcome,
};
use rusqlite::params;

impl FraudStore {
    // ── Audit trail ───────────────────────────────────────────────

    /// Persist the outcome and its audit events in one SQLite transaction.
    /// Events are inserted in the order given; callers put the final
    /// decision event last.
    pub fn record_outcome(
        &self,
        transaction_id: &str,
        outcome: &ScoreOutcome,
        events: &[FraudEvent],
    ) -> FraudResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let row_id = FraudStore::write_outcome(&tx, transaction_id, outcome)?;
        for event in events {
            let details = serde_json::to_string(&event.details)?;
            tx.execute(
                "INSERT INTO fraud_events (
                    event_id, transaction_ref, event_type, heuristic_name,
                    score_contribution, details, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event.event_id,
                    row_id,
                    event.event_type.as_str(),
                    event.heuristic_name,
                    event.score_contribution,
                    details,
                    event.created_at.timestamp_millis(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Audit events for a transaction in insertion order.
    pub fn events_for_transaction(&self, transaction_id: &str) -> FraudResult<Vec<FraudEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT e.event_id, e.event_type, e.heuristic_name, e.score_contribution,
                    e.details, e.created_at
             FROM fraud_events e
             JOIN transactions t ON t.id = e.transaction_ref
             WHERE t.transaction_id = ?1
             ORDER BY e.seq ASC",
        )?;
        let raw = stmt
            .query_map(params![transaction_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(event_id, event_type, heuristic_name, score, details, created_at)| {
                let event_type = FraudEventType::parse(&event_type).ok_or_else(|| {
                    FraudError::Other(anyhow::anyhow!("unknown event type '{event_type}'"))
                })?;
                Ok(FraudEvent {
                    event_id,
                    transaction_id: transaction_id.to_string(),
                    event_type,
                    heuristic_name,
                    score_contribution: score,
                    details: serde_json::from_str(&details)?,
                    created_at: millis_to_utc(created_at),
                })
            })
            .collect()
    }

    pub fn event_count(&self) -> FraudResult<i64> {
        let conn = self.conn()?;
        let n = conn.query_row("SELECT COUNT(*) FROM fraud_events", [], |row| row.get(0))?;
        Ok(n)
    }
}
