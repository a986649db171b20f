//! fraud-runner: headless driver for the fraud scoring service.
//!
//! Usage:
//!   fraud-runner --seed 12345 --count 500 --db run.db
//!   fraud-runner --config data/fraud_config.json --ipc-mode

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use fraudscore_core::{
    config::{HeuristicSettings, RiskThresholds},
    store::FraudStore,
    transaction::{CheckRequest, FraudCheckResult},
    types::{Decision, Location},
    ConfigManager, FraudDetectionService,
};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Check(CheckRequest),
    Status {
        transaction_id: String,
    },
    Audit {
        transaction_id: String,
    },
    History {
        user_id: String,
        #[serde(default = "default_history_limit")]
        limit: usize,
    },
    UpdateThresholds {
        low: f64,
        medium: f64,
        high: f64,
    },
    SetHeuristic {
        name: String,
        enabled: bool,
        weight: f64,
    },
    ReloadConfig,
    Metrics,
    Quit,
}

fn default_history_limit() -> usize {
    20
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let count = parse_arg(&args, "--count", 200usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str())
        .unwrap_or("./data/fraud_config.json");

    if !ipc_mode {
        println!("fraud-runner");
        println!("  seed:    {seed}");
        println!("  count:   {count}");
        println!("  db:      {db}");
        println!("  config:  {config_path}");
        println!();
    }

    let store = if db == ":memory:" {
        FraudStore::in_memory()?
    } else {
        FraudStore::open(db)?
    };
    store.migrate()?;
    let store = Arc::new(store);
    let config = Arc::new(ConfigManager::load(config_path)?);
    let service = FraudDetectionService::new(Arc::clone(&store), config)?;

    if ipc_mode {
        run_ipc_loop(&service).await?;
    } else {
        let outcomes = run_synthetic(&service, seed, count).await?;
        print_summary(&service, &store, &outcomes)?;
    }

    Ok(())
}

async fn run_ipc_loop(service: &FraudDetectionService) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match handle_command(service, cmd).await {
            Ok(value) => value,
            Err(e) => serde_json::json!({ "error": e.to_string() }),
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

async fn handle_command(
    service: &FraudDetectionService,
    cmd: IpcCommand,
) -> Result<serde_json::Value> {
    let value = match cmd {
        IpcCommand::Check(request) => {
            serde_json::to_value(service.analyze_transaction(request).await?)?
        }
        IpcCommand::Status { transaction_id } => {
            serde_json::to_value(service.transaction_status(&transaction_id).await?)?
        }
        IpcCommand::Audit { transaction_id } => {
            serde_json::to_value(service.audit_trail(&transaction_id).await?)?
        }
        IpcCommand::History { user_id, limit } => {
            serde_json::to_value(service.user_history(&user_id, limit).await?)?
        }
        IpcCommand::UpdateThresholds { low, medium, high } => {
            service
                .config()
                .update_thresholds(RiskThresholds { low, medium, high })?;
            serde_json::to_value(service.config().thresholds())?
        }
        IpcCommand::SetHeuristic { name, enabled, weight } => {
            service
                .config()
                .set_heuristic(&name, HeuristicSettings { enabled, weight })?;
            serde_json::to_value(&*service.config().snapshot())?
        }
        IpcCommand::ReloadConfig => {
            service.config().reload()?;
            serde_json::to_value(&*service.config().snapshot())?
        }
        IpcCommand::Metrics => serde_json::to_value(service.metrics())?,
        IpcCommand::Quit => serde_json::Value::Null,
    };
    Ok(value)
}

// ── Synthetic stream ───────────────────────────────────────────

const HOME_COUNTRIES: [&str; 5] = ["US", "GB", "DE", "FR", "CA"];
const TEST_CARD: &str = "4242424242424242";

struct Customer {
    user_id: String,
    card: String,
    ip_address: String,
    country: &'static str,
    typical_amount: f64,
}

fn generate_customers(rng: &mut Pcg64Mcg, n: usize) -> Vec<Customer> {
    (0..n)
        .map(|i| {
            let card: String = std::iter::once('5')
                .chain((0..15).map(|_| char::from(b'0' + rng.gen_range(0..10u8))))
                .collect();
            Customer {
                user_id: format!("user-{i:05}"),
                card,
                ip_address: format!(
                    "10.{}.{}.{}",
                    rng.gen_range(0..=255u8),
                    rng.gen_range(0..=255u8),
                    rng.gen_range(1..=254u8)
                ),
                country: HOME_COUNTRIES[rng.gen_range(0..HOME_COUNTRIES.len())],
                typical_amount: rng.gen_range(20.0..200.0),
            }
        })
        .collect()
}

/// Replay a seeded stream of mostly ordinary traffic with injected
/// outliers, test cards, travel, high-risk origins and card bursts.
async fn run_synthetic(
    service: &FraudDetectionService,
    seed: u64,
    count: usize,
) -> Result<Vec<FraudCheckResult>> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let customers = generate_customers(&mut rng, (count / 8).max(4));
    let mut clock: DateTime<Utc> = Utc::now() - Duration::seconds(count as i64 * 20);
    let mut outcomes = Vec::with_capacity(count);
    let mut n = 0usize;

    while n < count {
        let customer = &customers[rng.gen_range(0..customers.len())];
        clock += Duration::seconds(rng.gen_range(1..40));

        let mut amount = customer.typical_amount * rng.gen_range(0.7..1.3);
        if rng.gen_bool(0.03) {
            amount *= 8.0;
        }
        let card = if rng.gen_bool(0.02) { TEST_CARD } else { customer.card.as_str() };
        let country = if rng.gen_bool(0.01) {
            "IR"
        } else if rng.gen_bool(0.03) {
            HOME_COUNTRIES[rng.gen_range(0..HOME_COUNTRIES.len())]
        } else {
            customer.country
        };
        let burst = if rng.gen_bool(0.02) { 4 } else { 1 };

        for _ in 0..burst {
            if n >= count {
                break;
            }
            let transaction_id = format!("syn-{seed}-{n:06}");
            let request = CheckRequest {
                transaction_id: transaction_id.clone(),
                card_number: card.to_string(),
                amount: (amount * 100.0).round() / 100.0,
                currency: "USD".into(),
                user_id: customer.user_id.clone(),
                ip_address: customer.ip_address.clone(),
                location: Some(Location { country: Some(country.to_string()), city: None }),
                timestamp: Some(clock),
            };
            let result = service.analyze_transaction(request).await?;
            if result.decision != Decision::Allow {
                log::info!(
                    "{} {transaction_id} (score {:.2}): {}",
                    result.decision, result.fraud_score, result.reason
                );
            }
            outcomes.push(result);
            n += 1;
        }
    }
    Ok(outcomes)
}

fn print_summary(
    service: &FraudDetectionService,
    store: &FraudStore,
    outcomes: &[FraudCheckResult],
) -> Result<()> {
    let metrics = service.metrics();
    let max_score = outcomes.iter().map(|o| o.fraud_score).fold(0.0_f64, f64::max);

    println!("=== RUN SUMMARY ===");
    println!("  checks:         {}", metrics.total_checks);
    println!("  allowed:        {}", metrics.allowed);
    println!("  flagged:        {}", metrics.flagged);
    println!("  blocked:        {}", metrics.blocked);
    println!("  timeout review: {}", metrics.timeouts);
    println!("  avg score:      {:.2}", metrics.avg_score);
    println!("  max score:      {max_score:.2}");
    println!("  avg latency:    {:.2}ms", metrics.avg_latency_ms);

    println!();
    println!("=== STORE ===");
    println!("  database:       {}", store.path().unwrap_or(":memory:"));
    println!("  transactions:   {}", store.transaction_count()?);
    println!("  audit events:   {}", store.event_count()?);
    for decision in [Decision::Allow, Decision::Flag, Decision::Block] {
        println!("  {:<14}  {}", format!("{decision}:"), store.scored_count(decision)?);
    }
    Ok(())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
