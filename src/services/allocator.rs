//! allocator.rs
//!
//! Атомарный резерв непрерывного диапазона номеров билетов.
//!
//! Вся проверка остатка, списание квоты, сдвиг курсора и запись в журнал
//! выполняются одной транзакцией вокруг одной строки `ticket_pools`:
//!
//! 1.  Условный `UPDATE ... WHERE available >= $qty RETURNING` - проверка и
//!     изменение одним оператором. Строка пула блокируется на запись, поэтому все
//!     резервы одного события проходят через неё строго по очереди, даже из
//!     разных процессов. Конкурент, дождавшийся блокировки, перечитывает строку
//!     и заново проверяет условие `available >= $qty`.
//! 2.  Если ни одна строка не обновилась, в той же транзакции выясняем, есть ли
//!     пул вообще (`EventNotFound` против `InsufficientQuota`), и откатываемся.
//! 3.  Диапазон дописывается в `ticket_allocations` в той же транзакции.
//!
//! Повторных попыток здесь нет, политика повторов принадлежит вызывающему.

use std::num::NonZeroU32;

use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use crate::error::AllocationError;
use crate::models::TicketRange;
use crate::store::AllocationLedger;

#[derive(Clone)]
pub struct Allocator {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl Allocator {
    pub fn new(pool: PgPool, lock_timeout_ms: u64) -> Self {
        Self { pool, lock_timeout_ms }
    }

    /// Резервирует `quantity` подряд идущих номеров для `user_id`.
    ///
    /// При любой ошибке транзакция откатывается целиком: ни пул, ни журнал не
    /// меняются.
    pub async fn reserve(
        &self,
        event_id: &str,
        user_id: &str,
        quantity: NonZeroU32,
    ) -> Result<TicketRange, AllocationError> {
        let quantity = i64::from(quantity.get());

        let result = self.reserve_in_tx(event_id, user_id, quantity).await;
        match &result {
            Ok(range) => info!(
                event_id,
                user_id,
                quantity,
                start_ticket = range.start,
                end_ticket = range.end,
                "Tickets reserved"
            ),
            Err(AllocationError::StoreUnavailable(e)) => {
                error!(event_id, user_id, quantity, error = ?e, "Reservation aborted by store failure")
            }
            Err(e @ AllocationError::InsufficientQuota { .. }) => {
                warn!(event_id, user_id, quantity, reason = %e, "Reservation refused")
            }
            Err(e) => debug!(event_id, user_id, quantity, reason = %e, "Reservation refused"),
        }
        result
    }

    async fn reserve_in_tx(
        &self,
        event_id: &str,
        user_id: &str,
        quantity: i64,
    ) -> Result<TicketRange, AllocationError> {
        let mut tx = self.pool.begin().await?;

        // Зависшее ожидание блокировки должно завершиться ошибкой и откатом,
        // а не держать соединение бесконечно.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await?;

        let reserved = sqlx::query_as::<_, (i64, i64)>(
            r#"
            UPDATE ticket_pools
            SET available = available - $2,
                next_ticket_number = next_ticket_number + $2,
                updated_at = NOW()
            WHERE event_id = $1
              AND available >= $2
            RETURNING next_ticket_number - $2 AS start_ticket,
                      next_ticket_number - 1  AS end_ticket
            "#,
        )
        .bind(event_id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((start, end)) = reserved else {
            // Ни одна строка не изменилась: различаем отсутствие пула и нехватку.
            let available = sqlx::query_scalar::<_, i64>(
                "SELECT available FROM ticket_pools WHERE event_id = $1",
            )
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?;

            tx.rollback().await?;

            return Err(match available {
                None => AllocationError::EventNotFound(event_id.to_string()),
                Some(available) => AllocationError::InsufficientQuota {
                    requested: quantity,
                    available,
                },
            });
        };

        let range = TicketRange::new(start, end);
        AllocationLedger::append(&mut *tx, event_id, user_id, range).await?;

        tx.commit().await?;
        Ok(range)
    }
}
