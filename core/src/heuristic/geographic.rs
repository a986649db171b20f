//! Location anomalies: rapid country changes and high-risk origins.
//!
//! Only the single most recent prior transaction is compared against.

use super::{CheckContext, Evidence, Heuristic, HeuristicOutcome, GEOGRAPHIC};
use crate::error::FraudResult;
use async_trait::async_trait;

const NEW_USER_SCORE: f64 = 10.0;
const RAPID_CHANGE_SCORE: f64 = 80.0;
const HIGH_RISK_COUNTRY_SCORE: f64 = 60.0;
const RAPID_CHANGE_HOURS: f64 = 2.0;

/// FATF "call for action" jurisdictions (ISO 3166-1 alpha-2).
pub const DEFAULT_HIGH_RISK_COUNTRIES: [&str; 3] = ["KP", "IR", "MM"];

pub struct GeographicCheck {
    high_risk_countries: Vec<String>,
}

impl Default for GeographicCheck {
    fn default() -> Self {
        Self::with_high_risk_countries(DEFAULT_HIGH_RISK_COUNTRIES)
    }
}

impl GeographicCheck {
    pub fn with_high_risk_countries<I, S>(countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            high_risk_countries: countries
                .into_iter()
                .map(|c| c.as_ref().trim().to_ascii_uppercase())
                .collect(),
        }
    }

    fn is_high_risk(&self, country: &str) -> bool {
        self.high_risk_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(country))
    }
}

#[async_trait]
impl Heuristic for GeographicCheck {
    fn name(&self) -> &'static str {
        GEOGRAPHIC
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome> {
        let tx = ctx.transaction;
        let current_country = match tx.country() {
            Some(c) if !tx.user_id.trim().is_empty() => c,
            _ => return Ok(HeuristicOutcome::new(0.0, "Insufficient location data")),
        };

        let recent = ctx
            .history
            .recent_for_user(&tx.user_id, tx.created_at, 1, &tx.transaction_id)
            .await?;
        let Some(last) = recent.first() else {
            return Ok(HeuristicOutcome::new(NEW_USER_SCORE, "New user, no location history"));
        };

        let last_country = last.country().map(str::to_string);
        let hours_since_last =
            (tx.created_at - last.created_at).num_milliseconds() as f64 / 3_600_000.0;
        let evidence = Evidence::Geographic {
            last_country: last_country.clone(),
            current_country: current_country.to_string(),
            hours_since_last: Some(hours_since_last),
        };

        if let Some(last_country) = &last_country {
            if !last_country.eq_ignore_ascii_case(current_country)
                && hours_since_last < RAPID_CHANGE_HOURS
            {
                return Ok(HeuristicOutcome::new(
                    RAPID_CHANGE_SCORE,
                    format!(
                        "Rapid location change: {last_country} to {current_country} in {hours_since_last:.1} hours"
                    ),
                )
                .with_evidence(evidence));
            }
        }

        if self.is_high_risk(current_country) {
            return Ok(HeuristicOutcome::new(
                HIGH_RISK_COUNTRY_SCORE,
                format!("Transaction from high-risk country: {current_country}"),
            )
            .with_evidence(evidence));
        }

        Ok(HeuristicOutcome::new(0.0, "Geographic check passed").with_evidence(evidence))
    }
}
