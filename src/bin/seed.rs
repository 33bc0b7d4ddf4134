//! Засев базы демонстрационными событиями.
//!
//! `DATABASE_URL=postgres://... cargo run --bin seed`
//!
//! Повторный запуск возвращает события в исходное состояние. В конце печатается
//! сводка: счётчики пула против суммы диапазонов в журнале.

use std::process::ExitCode;

use tracing::{error, info};

use ticket_allocator::{
    config::DatabaseConfig,
    database::Database,
    seed::{check_events, seed_events, SeedTable, SEED_EVENTS},
    store::{AllocationLedger, PoolStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("seed=info,ticket_allocator=info")),
        )
        .init();

    let db_config = DatabaseConfig::from_env()?;
    let db = Database::connect_with_retry(&db_config).await?;
    db.run_migrations().await?;

    let store = PoolStore::new(db.pool.clone());
    let ledger = AllocationLedger::new(db.pool.clone());

    let pools = seed_events(&store, &SEED_EVENTS).await?;
    info!(events = pools.len(), "Seeding complete");

    let checks = check_events(&store, &ledger, &SEED_EVENTS).await?;
    println!("\n{}", SeedTable(&checks));

    if checks.iter().all(|c| c.is_consistent()) {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Seeded pools disagree with the ledger");
        Ok(ExitCode::FAILURE)
    }
}
