//! Shared primitive types used across the scoring pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-supplied transaction identifier. Opaque and unique.
pub type TransactionId = String;

/// Opaque user identifier.
pub type UserId = String;

/// Stable heuristic name, e.g. `"velocity"`.
pub type HeuristicName = String;

/// Risk tier derived from a fraud score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low    => "low",
            Self::Medium => "medium",
            Self::High   => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low"    => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high"   => Some(Self::High),
            _ => None,
        }
    }

    /// The action taken for a transaction in this tier.
    pub fn action(&self) -> Decision {
        match self {
            Self::Low    => Decision::Allow,
            Self::Medium => Decision::Flag,
            Self::High   => Decision::Block,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The action taken on a scored transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Flag,   // manual review
    Block,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Flag  => "flag",
            Self::Block => "block",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "allow" => Some(Self::Allow),
            "flag"  => Some(Self::Flag),
            "block" => Some(Self::Block),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a transaction originated, as reported by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Location {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
}
