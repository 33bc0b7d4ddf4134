//! Засев стенда: шесть событий, часть из них уже частично распродана.
//!
//! Проданные билеты записываются в журнал партиями по `SEED_BATCH`, так что
//! после засева каждый пул согласован со своим журналом.

use std::fmt;

use tracing::info;

use crate::models::{Allocation, InvariantViolation, Pool};
use crate::store::{AllocationLedger, PoolStore};

pub const SEED_BATCH: i64 = 8;

#[derive(Debug, Clone, Copy)]
pub struct SeedEvent {
    pub event_id: &'static str,
    pub name: &'static str,
    pub total: i64,
    pub sold: i64,
}

pub const SEED_EVENTS: [SeedEvent; 6] = [
    SeedEvent { event_id: "EVENT001", name: "Summer Music Festival", total: 5000, sold: 200 },
    SeedEvent { event_id: "EVENT002", name: "Tech Conference 2024", total: 3000, sold: 80 },
    SeedEvent { event_id: "EVENT003", name: "Food & Wine Expo", total: 2500, sold: 160 },
    SeedEvent { event_id: "EVENT004", name: "Comedy Night", total: 1500, sold: 0 },
    SeedEvent { event_id: "EVENT005", name: "Art Gallery Opening", total: 2000, sold: 24 },
    SeedEvent { event_id: "EVENT006", name: "Rock Concert", total: 4000, sold: 800 },
];

/// Засевает все события, по транзакции на событие.
pub async fn seed_events(store: &PoolStore, events: &[SeedEvent]) -> Result<Vec<Pool>, sqlx::Error> {
    let mut pools = Vec::with_capacity(events.len());
    for event in events {
        info!(event_id = event.event_id, name = event.name, "Seeding event");
        pools.push(store.seed(event.event_id, event.total, event.sold, SEED_BATCH).await?);
    }
    Ok(pools)
}

/// Строка сводки по одному событию после засева.
#[derive(Debug, Clone)]
pub struct SeedCheck {
    pub event_id: String,
    pub total: i64,
    pub available: i64,
    pub issued: i64,
    pub ledger_tickets: i64,
    /// Журнал покрывает `1..=issued` без дыр и наложений.
    pub contiguous: bool,
    pub invariants: Result<(), InvariantViolation>,
}

impl SeedCheck {
    pub fn new(pool: &Pool, ledger: &[Allocation]) -> Self {
        let mut ranges: Vec<_> = ledger.iter().map(Allocation::range).collect();
        ranges.sort_by_key(|r| (r.start, r.end));

        let mut next = 1;
        let mut contiguous = true;
        for range in &ranges {
            if range.start != next {
                contiguous = false;
                break;
            }
            next = range.end + 1;
        }

        SeedCheck {
            event_id: pool.event_id.clone(),
            total: pool.total,
            available: pool.available,
            issued: pool.issued(),
            ledger_tickets: ranges.iter().map(|r| r.len()).sum(),
            contiguous: contiguous && next - 1 == pool.issued(),
            invariants: pool.check_invariants(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.invariants.is_ok() && self.contiguous && self.ledger_tickets == self.issued
    }
}

/// Читает финальное состояние каждого события и сверяет пул с журналом.
pub async fn check_events(
    store: &PoolStore,
    ledger: &AllocationLedger,
    events: &[SeedEvent],
) -> Result<Vec<SeedCheck>, sqlx::Error> {
    let mut checks = Vec::with_capacity(events.len());
    for event in events {
        let Some(pool) = store.get(event.event_id).await? else {
            continue;
        };
        let allocations = ledger.list_by_event(event.event_id).await?;
        checks.push(SeedCheck::new(&pool, &allocations));
    }
    Ok(checks)
}

/// Таблица сводки для вывода в консоль.
pub struct SeedTable<'a>(pub &'a [SeedCheck]);

impl fmt::Display for SeedTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<10} {:>7} {:>10} {:>7} {:>7}  STATUS",
            "EVENT", "TOTAL", "AVAILABLE", "ISSUED", "LEDGER"
        )?;
        for check in self.0 {
            let status = match &check.invariants {
                Err(violation) => format!("MISMATCH ({violation})"),
                Ok(()) if !check.is_consistent() => "MISMATCH (ledger)".to_string(),
                Ok(()) => "OK".to_string(),
            };
            writeln!(
                f,
                "{:<10} {:>7} {:>10} {:>7} {:>7}  {status}",
                check.event_id, check.total, check.available, check.issued, check.ledger_tickets
            )?;
        }
        Ok(())
    }
}
