//! Card number denylists and test-card shapes. Needs no history.

use super::{CheckContext, Evidence, Heuristic, HeuristicOutcome, CARD_PATTERN};
use crate::{
    card::CardNumber,
    error::{FraudError, FraudResult},
};
use async_trait::async_trait;
use regex::Regex;

const BLOCKED_BIN_SCORE: f64 = 100.0;
const BLOCKED_PATTERN_SCORE: f64 = 90.0;
const SEQUENTIAL_SCORE: f64 = 70.0;
const MIN_SEQUENTIAL_DIGITS: usize = 4;

/// Well-known test card issuer prefixes.
pub const DEFAULT_BLOCKED_BINS: [&str; 2] = ["411111", "424242"];

/// Processor decline test cards and all-zero numbers.
pub const DEFAULT_BLOCKED_PATTERNS: [&str; 3] = [
    r"^4000000000000(002|069|119|127)$",
    r"^5105105105105100$",
    r"^0{12,19}$",
];

pub struct CardPatternCheck {
    blocked_bins: Vec<String>,
    blocked_patterns: Vec<Regex>,
}

impl CardPatternCheck {
    pub fn new<B, P>(blocked_bins: B, blocked_patterns: P) -> FraudResult<Self>
    where
        B: IntoIterator,
        B::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let blocked_patterns = blocked_patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|e| {
                    FraudError::invalid_config(format!("bad card pattern '{}': {e}", p.as_ref()))
                })
            })
            .collect::<FraudResult<Vec<_>>>()?;
        Ok(Self {
            blocked_bins: blocked_bins.into_iter().map(Into::into).collect(),
            blocked_patterns,
        })
    }

    pub fn standard() -> FraudResult<Self> {
        Self::new(DEFAULT_BLOCKED_BINS, DEFAULT_BLOCKED_PATTERNS)
    }

    /// First match wins: blocked BIN, then pattern, then sequential digits.
    pub fn evaluate(&self, card: &CardNumber) -> HeuristicOutcome {
        let bin = card.bin();
        if self.blocked_bins.iter().any(|b| b == bin) {
            return HeuristicOutcome::new(
                BLOCKED_BIN_SCORE,
                format!("Card BIN {bin} is in blocked list"),
            )
            .with_evidence(Evidence::CardBin { card_bin: bin.to_string() });
        }

        if let Some(pattern) = self.blocked_patterns.iter().find(|p| p.is_match(card.digits())) {
            return HeuristicOutcome::new(BLOCKED_PATTERN_SCORE, "Card matches known fraud pattern")
                .with_evidence(Evidence::CardPattern { pattern: pattern.as_str().to_string() });
        }

        if is_sequential(card.digits()) {
            return HeuristicOutcome::new(SEQUENTIAL_SCORE, "Card number appears sequential");
        }

        HeuristicOutcome::new(0.0, "Card pattern check passed")
    }
}

/// Digits step by exactly +1 or exactly -1 throughout.
pub fn is_sequential(digits: &str) -> bool {
    let digits: Vec<i32> = digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| d as i32)
        .collect();
    if digits.len() < MIN_SEQUENTIAL_DIGITS {
        return false;
    }
    let step = digits[1] - digits[0];
    step.abs() == 1 && digits.windows(2).all(|w| w[1] - w[0] == step)
}

#[async_trait]
impl Heuristic for CardPatternCheck {
    fn name(&self) -> &'static str {
        CARD_PATTERN
    }

    async fn check(&self, ctx: &CheckContext<'_>) -> FraudResult<HeuristicOutcome> {
        Ok(self.evaluate(ctx.card))
    }
}
