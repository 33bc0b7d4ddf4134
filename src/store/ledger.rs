use sqlx::{PgConnection, PgPool};

use crate::models::{Allocation, TicketRange};

const ALLOCATION_COLUMNS: &str = "id, event_id, user_id, start_ticket, end_ticket, created_at";

/// Журнал выданных диапазонов. Только дописывание, без UPDATE и DELETE
/// (удаление есть лишь в тестовом сбросе `PoolStore::reset`).
#[derive(Clone)]
pub struct AllocationLedger {
    pool: PgPool,
}

impl AllocationLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Дописывает выдачу в рамках транзакции вызывающего. Отдельного коммита
    /// здесь нет: запись живёт или умирает вместе с изменением пула.
    pub async fn append(
        conn: &mut PgConnection,
        event_id: &str,
        user_id: &str,
        range: TicketRange,
    ) -> Result<Allocation, sqlx::Error> {
        sqlx::query_as::<_, Allocation>(&format!(
            "INSERT INTO ticket_allocations (event_id, user_id, start_ticket, end_ticket)
             VALUES ($1, $2, $3, $4)
             RETURNING {ALLOCATION_COLUMNS}"
        ))
        .bind(event_id)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_one(conn)
        .await
    }

    pub async fn list_by_event(&self, event_id: &str) -> Result<Vec<Allocation>, sqlx::Error> {
        sqlx::query_as::<_, Allocation>(&format!(
            "SELECT {ALLOCATION_COLUMNS}
             FROM ticket_allocations
             WHERE event_id = $1
             ORDER BY start_ticket, id"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Кто какие билеты держит: все выдачи пользователя по всем событиям.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<Allocation>, sqlx::Error> {
        sqlx::query_as::<_, Allocation>(&format!(
            "SELECT {ALLOCATION_COLUMNS}
             FROM ticket_allocations
             WHERE user_id = $1
             ORDER BY event_id, start_ticket"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }
}
