use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;

/// Пул билетов события: ёмкость, остаток и курсор следующего номера.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Pool {
    pub event_id: String,
    pub total: i64,
    pub available: i64,
    pub next_ticket_number: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("available {available} is outside [0, {total}]")]
    AvailableOutOfBounds { available: i64, total: i64 },

    #[error("next_ticket_number {0} is below 1")]
    CursorBelowOne(i64),

    #[error("consumed quota {consumed} does not match issued tickets {issued}")]
    CountersDisagree { consumed: i64, issued: i64 },
}

impl Pool {
    /// Сколько билетов уже выдано (по курсору).
    pub fn issued(&self) -> i64 {
        self.next_ticket_number - 1
    }

    /// Сколько квоты израсходовано (по остатку).
    pub fn consumed(&self) -> i64 {
        self.total - self.available
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.available < 0 || self.available > self.total {
            return Err(InvariantViolation::AvailableOutOfBounds {
                available: self.available,
                total: self.total,
            });
        }
        if self.next_ticket_number < 1 {
            return Err(InvariantViolation::CursorBelowOne(self.next_ticket_number));
        }
        if self.consumed() != self.issued() {
            return Err(InvariantViolation::CountersDisagree {
                consumed: self.consumed(),
                issued: self.issued(),
            });
        }
        Ok(())
    }
}
