//! Хранилище пулов билетов.
//!
//! Строка `ticket_pools` - единственное разделяемое изменяемое состояние системы.
//! Меняет её только аллокатор (см. `services::allocator`), здесь только создание,
//! чтение, засев стенда и тестовый сброс.

pub mod ledger;

pub use ledger::AllocationLedger;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::models::{Pool, TicketRange};

const POOL_COLUMNS: &str = "event_id, total, available, next_ticket_number, created_at, updated_at";

#[derive(Clone)]
pub struct PoolStore {
    pool: PgPool,
}

impl PoolStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Создаёт пул с полным остатком и курсором на первом билете.
    pub async fn create(&self, event_id: &str, total: i64) -> Result<Pool, sqlx::Error> {
        let pool = sqlx::query_as::<_, Pool>(&format!(
            "INSERT INTO ticket_pools (event_id, total, available, next_ticket_number)
             VALUES ($1, $2, $2, 1)
             RETURNING {POOL_COLUMNS}"
        ))
        .bind(event_id)
        .bind(total)
        .fetch_one(&self.pool)
        .await?;

        info!(event_id, total, "Ticket pool created");
        Ok(pool)
    }

    pub async fn get(&self, event_id: &str) -> Result<Option<Pool>, sqlx::Error> {
        sqlx::query_as::<_, Pool>(&format!(
            "SELECT {POOL_COLUMNS} FROM ticket_pools WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn list(&self) -> Result<Vec<Pool>, sqlx::Error> {
        sqlx::query_as::<_, Pool>(&format!(
            "SELECT {POOL_COLUMNS} FROM ticket_pools ORDER BY event_id"
        ))
        .fetch_all(&self.pool)
        .await
    }

    /// Сброс события для стендов и стресс-тестов: удаляет все выдачи события и
    /// возвращает пул в исходное состояние (создаёт, если его не было).
    /// Путь покупки этот метод никогда не вызывает.
    pub async fn reset(&self, event_id: &str, total: i64) -> Result<Pool, sqlx::Error> {
        warn!(event_id, total, "RESET: restoring ticket pool");

        let mut tx = self.pool.begin().await?;

        // Сначала берём блокировку строки пула, чтобы резервы, идущие параллельно,
        // не вклинились между удалением журнала и сбросом счётчиков.
        sqlx::query("SELECT 1 FROM ticket_pools WHERE event_id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM ticket_allocations WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let pool = sqlx::query_as::<_, Pool>(&format!(
            "INSERT INTO ticket_pools (event_id, total, available, next_ticket_number)
             VALUES ($1, $2, $2, 1)
             ON CONFLICT (event_id) DO UPDATE
             SET total = EXCLUDED.total,
                 available = EXCLUDED.total,
                 next_ticket_number = 1,
                 updated_at = NOW()
             RETURNING {POOL_COLUMNS}"
        ))
        .bind(event_id)
        .bind(total)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(event_id, total, allocations_deleted = deleted, "RESET: ticket pool restored");
        Ok(pool)
    }

    /// Заводит пул с уже проданной частью `sold`: журнал получает выдачи по
    /// `batch` билетов подряд с первого номера, курсор встаёт на `sold + 1`.
    /// Всё в одной транзакции, прежние выдачи события удаляются.
    pub async fn seed(&self, event_id: &str, total: i64, sold: i64, batch: i64) -> Result<Pool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT 1 FROM ticket_pools WHERE event_id = $1 FOR UPDATE")
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM ticket_allocations WHERE event_id = $1")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        // sold > total или sold < 0 отвергнут CHECK-ограничения таблицы
        let pool = sqlx::query_as::<_, Pool>(&format!(
            "INSERT INTO ticket_pools (event_id, total, available, next_ticket_number)
             VALUES ($1, $2, $2 - $3, $3 + 1)
             ON CONFLICT (event_id) DO UPDATE
             SET total = EXCLUDED.total,
                 available = EXCLUDED.available,
                 next_ticket_number = EXCLUDED.next_ticket_number,
                 updated_at = NOW()
             RETURNING {POOL_COLUMNS}"
        ))
        .bind(event_id)
        .bind(total)
        .bind(sold)
        .fetch_one(&mut *tx)
        .await?;

        let batch = batch.max(1);
        let mut start = 1;
        let mut number = 1;
        while start <= sold {
            let end = (start + batch - 1).min(sold);
            let user_id = format!("user_{number}_{event_id}");
            AllocationLedger::append(&mut *tx, event_id, &user_id, TicketRange::new(start, end)).await?;
            start = end + 1;
            number += 1;
        }

        tx.commit().await?;

        info!(event_id, total, sold, allocations = number - 1, "Ticket pool seeded");
        Ok(pool)
    }
}
