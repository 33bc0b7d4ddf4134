pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod harness;
pub mod models;
pub mod seed;
pub mod services;
pub mod store;

use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub store: store::PoolStore,
    pub ledger: store::AllocationLedger,
    pub allocator: services::Allocator,
    pub config: config::Config,
}

impl AppState {
    /// Подключается к базе (с пробой готовности) и применяет миграции.
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let db = database::Database::connect_with_retry(&config.database).await?;

        db.run_migrations().await?;

        Ok(Arc::new(Self::from_database(db, config)))
    }

    /// Собирает состояние поверх уже открытого пула соединений.
    pub fn from_database(db: database::Database, config: config::Config) -> Self {
        let store = store::PoolStore::new(db.pool.clone());
        let ledger = store::AllocationLedger::new(db.pool.clone());
        let allocator = services::Allocator::new(db.pool.clone(), config.database.lock_timeout_ms);

        Self {
            db,
            store,
            ledger,
            allocator,
            config,
        }
    }
}

/// Полный роутер сервиса с трассировкой запросов.
pub fn app(state: Arc<AppState>) -> Router {
    controllers::routes(&state)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
