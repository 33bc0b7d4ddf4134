//! Стресс-прогон против работающих инстансов сервиса.
//!
//! `STRESS_TARGETS=http://localhost:3000,http://localhost:3001 cargo run --bin stress`
//!
//! Пул события сбрасывается напрямую в базе (`DATABASE_URL`), после чего все
//! покупки идут через HTTP. Код выхода ненулевой, если нарушен хоть один инвариант.

use std::process::ExitCode;

use tracing::{error, info};

use ticket_allocator::{
    config::DatabaseConfig,
    database::Database,
    harness::{ConsistencyHarness, HarnessConfig},
    store::{AllocationLedger, PoolStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stress=info,ticket_allocator=info")),
        )
        .init();

    let harness_config = HarnessConfig::from_env()?;
    let db_config = DatabaseConfig::from_env()?;

    let db = Database::connect_with_retry(&db_config).await?;
    db.run_migrations().await?;
    let store = PoolStore::new(db.pool.clone());
    let ledger = AllocationLedger::new(db.pool.clone());

    info!(
        event_id = %harness_config.event_id,
        total = harness_config.total,
        quantity = harness_config.quantity,
        concurrency = harness_config.concurrency,
        targets = ?harness_config.targets,
        "Starting consistency run"
    );

    let harness = ConsistencyHarness::new(harness_config)?;
    let report = harness.run(&store, &ledger).await?;

    println!("\n{report}");

    if report.is_consistent() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!(violations = report.violations.len(), "Consistency violated");
        Ok(ExitCode::FAILURE)
    }
}
