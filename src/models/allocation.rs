use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::ops::RangeInclusive;

/// Непрерывный диапазон номеров билетов, обе границы включительно.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketRange {
    pub start: i64,
    pub end: i64,
}

impl TicketRange {
    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "empty ticket range {start}..={end}");
        Self { start, end }
    }

    pub fn len(&self) -> i64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, ticket: i64) -> bool {
        (self.start..=self.end).contains(&ticket)
    }

    pub fn overlaps(&self, other: &TicketRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Номера билетов по порядку.
    pub fn tickets(&self) -> RangeInclusive<i64> {
        self.start..=self.end
    }
}

/// Запись журнала выдач: один успешный резерв.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Allocation {
    pub id: i64,
    pub event_id: String,
    pub user_id: String,
    pub start_ticket: i64,
    pub end_ticket: i64,
    pub created_at: DateTime<Utc>,
}

impl Allocation {
    pub fn range(&self) -> TicketRange {
        TicketRange::new(self.start_ticket, self.end_ticket)
    }
}
