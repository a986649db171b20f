//! Real-time fraud scoring for card payments.
//!
//! A check validates the request, runs the enabled heuristics concurrently,
//! folds their weighted scores into one fraud score, maps it to a decision
//! and persists the outcome together with its audit trail.

pub mod card;
pub mod config;
pub mod config_manager;
pub mod decision;
pub mod error;
pub mod event;
pub mod heuristic;
pub mod history;
pub mod metrics;
pub mod scorer;
pub mod service;
pub mod store;
pub mod transaction;
pub mod types;

pub use config::FraudConfig;
pub use config_manager::ConfigManager;
pub use error::{FraudError, FraudResult};
pub use service::FraudDetectionService;
pub use store::FraudStore;
pub use transaction::{CheckRequest, FraudCheckResult};
