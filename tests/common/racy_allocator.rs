//! Заведомо неправильный аллокатор: чтение остатка, расчёт номеров в приложении
//! и запись отдельными операторами. Живёт только здесь, как негативная фикстура.
//!
//! Чтение и запись разнесены по отдельным методам, чтобы тест мог выстроить
//! гонку детерминированно: оба читают, потом оба пишут.

use sqlx::PgPool;

use ticket_allocator::models::TicketRange;

#[derive(Debug, Clone, Copy)]
pub struct Snapshot {
    pub total: i64,
    pub available: i64,
}

pub struct RacyAllocator {
    pool: PgPool,
}

impl RacyAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Шаг 1: прочитать остаток без блокировки.
    pub async fn read(&self, event_id: &str) -> Result<Option<Snapshot>, sqlx::Error> {
        let row = sqlx::query_as::<_, (i64, i64)>(
            "SELECT total, available FROM ticket_pools WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(total, available)| Snapshot { total, available }))
    }

    /// Шаг 2: проверить устаревший снимок, посчитать номера и записать.
    /// `Ok(None)` - снимок сказал, что билетов не хватает.
    pub async fn write(
        &self,
        event_id: &str,
        user_id: &str,
        quantity: i64,
        snapshot: Snapshot,
    ) -> Result<Option<TicketRange>, sqlx::Error> {
        if snapshot.available < quantity {
            return Ok(None);
        }

        let start = snapshot.total - snapshot.available + 1;
        let range = TicketRange::new(start, start + quantity - 1);

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO ticket_allocations (event_id, user_id, start_ticket, end_ticket)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(event_id)
        .bind(user_id)
        .bind(range.start)
        .bind(range.end)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE ticket_pools
             SET available = available - $2, next_ticket_number = next_ticket_number + $2
             WHERE event_id = $1",
        )
        .bind(event_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(range))
    }
}
