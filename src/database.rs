use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::{info, warn};

use crate::config::DatabaseConfig;

#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;

        Ok(Database { pool })
    }

    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Database { pool }
    }

    /// Ждём готовности базы ограниченное число попыток (connect + SELECT 1).
    /// Это проба готовности при старте, к корректности резервов отношения не имеет.
    pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let mut attempt = 1;
        loop {
            let result = match Self::new(config).await {
                Ok(db) => db.ping().await.map(|_| db),
                Err(e) => Err(e),
            };

            match result {
                Ok(db) => {
                    info!(attempt, "Database is ready");
                    return Ok(db);
                }
                Err(e) if attempt < config.connect_retries => {
                    warn!(
                        attempt,
                        max_attempts = config.connect_retries,
                        error = %e,
                        "Waiting for database..."
                    );
                    tokio::time::sleep(config.connect_retry_interval()).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed");
        Ok(())
    }
}
