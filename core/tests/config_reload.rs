//! Config files on disk and hot reload while checks run.

use fraudscore_core::{
    config::{FraudConfig, HeuristicSettings, RiskThresholds},
    heuristic::{CARD_PATTERN, GEOGRAPHIC},
    transaction::CheckRequest,
    types::{Decision, Location},
    ConfigManager, FraudDetectionService, FraudStore,
};
use std::sync::Arc;

fn temp_config() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("fraudscore-config-{}.json", uuid::Uuid::new_v4()))
}

fn request(id: &str) -> CheckRequest {
    CheckRequest {
        transaction_id: id.into(),
        card_number: "4111111111111111".into(),
        amount: 10.0,
        currency: "USD".into(),
        user_id: "user-r".into(),
        ip_address: "192.0.2.50".into(),
        location: Some(Location { country: Some("US".into()), city: None }),
        timestamp: None,
    }
}

#[test]
fn shipped_config_matches_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/fraud_config.json");
    let config = FraudConfig::load(path).unwrap();
    assert_eq!(config, FraudConfig::default());
}

#[test]
fn load_reports_unreadable_path() {
    let err = FraudConfig::load("/definitely/not/here.json").unwrap_err();
    assert!(err.to_string().starts_with("Cannot read"));
}

#[tokio::test]
async fn reload_from_edited_file_changes_next_decision() {
    let path = temp_config();
    let mut config = FraudConfig { heuristic_timeout_ms: 2_000, deadline_ms: 5_000, ..FraudConfig::default() };
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

    let store = FraudStore::in_memory().unwrap();
    store.migrate().unwrap();
    let manager = Arc::new(ConfigManager::load(&path).unwrap());
    let service = FraudDetectionService::new(Arc::new(store), Arc::clone(&manager)).unwrap();

    let first = service.analyze_transaction(request("tx-r1")).await.unwrap();
    assert_eq!(first.decision, Decision::Allow);

    // Card pattern alone now carries a blocked BIN over the top.
    config.heuristics.insert(CARD_PATTERN.into(), HeuristicSettings::enabled(1.0));
    config.heuristics.insert(GEOGRAPHIC.into(), HeuristicSettings::disabled(0.2));
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    manager.reload().unwrap();

    let second = service.analyze_transaction(request("tx-r2")).await.unwrap();
    assert_eq!(second.decision, Decision::Block);
    assert_eq!(service.audit_trail("tx-r2").await.unwrap().len(), 4);

    let _ = std::fs::remove_file(&path);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_never_expose_partial_thresholds() {
    let manager = Arc::new(ConfigManager::new(FraudConfig::default()).unwrap());
    let a = RiskThresholds { low: 10.0, medium: 20.0, high: 30.0 };
    let b = RiskThresholds { low: 40.0, medium: 50.0, high: 90.0 };

    let writer = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            for i in 0..200 {
                manager.update_thresholds(if i % 2 == 0 { a } else { b }).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..500 {
        let seen = manager.thresholds();
        assert!(
            seen == a || seen == b || seen == RiskThresholds::default(),
            "torn thresholds {seen:?}"
        );
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}
