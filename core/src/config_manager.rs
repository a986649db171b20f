//! Hot-reloadable holder of the current `FraudConfig`.
//!
//! RULE: Readers take an `Arc` snapshot and keep it for the whole check.
//! Writers build a complete new config, validate it, and replace the
//! snapshot in a single assignment. Nobody ever sees a half-applied update.
//! Writers are serialized from reading the current config through to the
//! swap, so concurrent edits never drop one another.

use crate::{
    config::{FraudConfig, HeuristicSettings, RiskThresholds, VelocityParams},
    error::{FraudError, FraudResult},
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

pub struct ConfigManager {
    current: RwLock<Arc<FraudConfig>>,
    writer: Mutex<()>,
    path: Option<PathBuf>, // None when running on in-memory defaults
}

impl ConfigManager {
    /// Manager over a fixed config with no backing file.
    pub fn new(config: FraudConfig) -> FraudResult<Self> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            writer: Mutex::new(()),
            path: None,
        })
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    /// A file that exists but is invalid is an error.
    pub fn load(path: impl Into<PathBuf>) -> FraudResult<Self> {
        let path = path.into();
        let config = if path.exists() {
            read_file(&path)?
        } else {
            info!("Config file {} not found, using defaults", path.display());
            FraudConfig::default()
        };
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
            writer: Mutex::new(()),
            path: Some(path),
        })
    }

    /// The current config. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<FraudConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            // Writers only ever assign a fully built value, so the
            // snapshot behind a poisoned lock is still whole.
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole config.
    pub fn update(&self, config: FraudConfig) -> FraudResult<()> {
        let _writer = self.lock_writer();
        self.commit(config)
    }

    /// Apply `edit` to the latest config and commit the result.
    fn modify(&self, edit: impl FnOnce(&mut FraudConfig)) -> FraudResult<()> {
        let _writer = self.lock_writer();
        let mut next = (*self.snapshot()).clone();
        edit(&mut next);
        self.commit(next)
    }

    /// Validate, persist, swap. Caller holds the writer lock.
    fn commit(&self, config: FraudConfig) -> FraudResult<()> {
        config.validate()?;
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&config)?;
            std::fs::write(path, json).map_err(|e| {
                FraudError::Other(anyhow::anyhow!("Cannot write {}: {e}", path.display()))
            })?;
        }
        self.swap(config);
        Ok(())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guarded value is empty; a panicked writer left nothing half done.
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace all three risk thresholds together.
    pub fn update_thresholds(&self, thresholds: RiskThresholds) -> FraudResult<()> {
        self.modify(|next| next.risk_thresholds = thresholds)?;
        info!(
            "Risk thresholds updated: low={} medium={} high={}",
            thresholds.low, thresholds.medium, thresholds.high
        );
        Ok(())
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.snapshot().risk_thresholds
    }

    /// Enable, disable or re-weight a single heuristic.
    pub fn set_heuristic(&self, name: &str, settings: HeuristicSettings) -> FraudResult<()> {
        self.modify(|next| {
            next.heuristics.insert(name.to_string(), settings);
        })
    }

    pub fn set_velocity(&self, params: VelocityParams) -> FraudResult<()> {
        self.modify(|next| next.velocity = params)
    }

    pub fn weight(&self, name: &str) -> f64 {
        self.snapshot().weight(name)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.snapshot().is_enabled(name)
    }

    /// Re-read the backing file. On any error the current config stays.
    pub fn reload(&self) -> FraudResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _writer = self.lock_writer();
        match read_file(path) {
            Ok(config) => {
                self.swap(config);
                info!("Config reloaded from {}", path.display());
                Ok(())
            }
            Err(e) => {
                warn!("Config reload from {} rejected: {e}", path.display());
                Err(e)
            }
        }
    }

    fn swap(&self, config: FraudConfig) {
        let next = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

fn read_file(path: &std::path::Path) -> FraudResult<FraudConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        FraudError::Other(anyhow::anyhow!("Cannot read {}: {e}", path.display()))
    })?;
    let config: FraudConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristic::VELOCITY;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "fraudscore-{tag}-{}.json",
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn in_flight_snapshot_survives_update() {
        let manager = ConfigManager::new(FraudConfig::default()).unwrap();
        let before = manager.snapshot();

        manager
            .update_thresholds(RiskThresholds { low: 10.0, medium: 20.0, high: 30.0 })
            .unwrap();

        assert_eq!(before.risk_thresholds, RiskThresholds::default());
        assert_eq!(manager.thresholds().high, 30.0);
    }

    #[test]
    fn invalid_update_keeps_current() {
        let manager = ConfigManager::new(FraudConfig::default()).unwrap();
        let err = manager.update_thresholds(RiskThresholds { low: 50.0, medium: 40.0, high: 90.0 });
        assert!(err.is_err());
        assert_eq!(manager.thresholds(), RiskThresholds::default());
    }

    #[test]
    fn velocity_params_validated_on_set() {
        let manager = ConfigManager::new(FraudConfig::default()).unwrap();
        manager
            .set_velocity(VelocityParams { window_minutes: 10, max_transactions: 5 })
            .unwrap();
        assert_eq!(manager.snapshot().velocity.window_minutes, 10);

        let err = manager.set_velocity(VelocityParams { window_minutes: 0, max_transactions: 5 });
        assert!(matches!(err, Err(FraudError::InvalidConfig { .. })));
        assert_eq!(manager.snapshot().velocity.max_transactions, 5);
    }

    #[test]
    fn missing_file_uses_defaults_and_update_persists() {
        let path = temp_path("persist");
        let manager = ConfigManager::load(&path).unwrap();
        assert_eq!(*manager.snapshot(), FraudConfig::default());

        manager
            .set_heuristic(VELOCITY, HeuristicSettings::disabled(0.25))
            .unwrap();
        assert!(!manager.is_enabled(VELOCITY));

        let reopened = ConfigManager::load(&path).unwrap();
        assert!(!reopened.is_enabled(VELOCITY));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn concurrent_edits_are_all_kept() {
        let manager = ConfigManager::new(FraudConfig::default()).unwrap();
        let before = manager.snapshot().heuristics.len();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let manager = &manager;
                scope.spawn(move || {
                    for i in 0..50 {
                        manager
                            .set_heuristic(&format!("extra-{t}-{i}"), HeuristicSettings::enabled(0.1))
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(manager.snapshot().heuristics.len(), before + 200);
    }

    #[test]
    fn concurrent_edits_persist_the_final_config() {
        let path = temp_path("concurrent");
        let manager = ConfigManager::load(&path).unwrap();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let manager = &manager;
                scope.spawn(move || {
                    for i in 0..10 {
                        manager
                            .set_heuristic(&format!("extra-{t}-{i}"), HeuristicSettings::enabled(0.1))
                            .unwrap();
                    }
                });
            }
        });

        let reopened = ConfigManager::load(&path).unwrap();
        assert_eq!(*reopened.snapshot(), *manager.snapshot());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reload_rejects_broken_file() {
        let path = temp_path("reload");
        let manager = ConfigManager::load(&path).unwrap();
        manager.update(FraudConfig::default()).unwrap();

        std::fs::write(&path, "{ not json").unwrap();
        assert!(manager.reload().is_err());
        assert_eq!(*manager.snapshot(), FraudConfig::default());
        let _ = std::fs::remove_file(&path);
    }
}
