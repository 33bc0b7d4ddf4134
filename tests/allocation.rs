//! Интеграционные тесты аллокатора, хранилища пулов и журнала на живом Postgres.
//!
//! Требуется Docker (testcontainers).

#![allow(clippy::expect_used)]

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::{qty, start_postgres};
use ticket_allocator::error::AllocationError;
use ticket_allocator::models::TicketRange;
use ticket_allocator::services::Allocator;
use ticket_allocator::store::{AllocationLedger, PoolStore};

struct Fixture {
    _db: common::TestDb,
    store: PoolStore,
    ledger: AllocationLedger,
    allocator: Allocator,
}

async fn fixture() -> Fixture {
    let db = start_postgres().await;
    let pool = db.db.pool.clone();
    Fixture {
        store: PoolStore::new(pool.clone()),
        ledger: AllocationLedger::new(pool.clone()),
        allocator: Allocator::new(pool, 5_000),
        _db: db,
    }
}

async fn counters(store: &PoolStore, event_id: &str) -> (i64, i64, i64) {
    let pool = store.get(event_id).await.expect("get failed").expect("pool missing");
    (pool.total, pool.available, pool.next_ticket_number)
}

/// Запускает `attempts` резервов одновременно, каждый в своей задаче.
async fn reserve_concurrently(
    allocator: &Allocator,
    event_id: &str,
    attempts: usize,
    quantity: u32,
) -> Vec<Result<TicketRange, AllocationError>> {
    let handles: Vec<_> = (0..attempts)
        .map(|i| {
            let allocator = allocator.clone();
            let event_id = event_id.to_string();
            tokio::spawn(async move {
                allocator
                    .reserve(&event_id, &format!("load_user_{i}"), qty(quantity))
                    .await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(attempts);
    for handle in handles {
        results.push(handle.await.expect("reservation task panicked"));
    }
    results
}

fn split(results: Vec<Result<TicketRange, AllocationError>>) -> (Vec<TicketRange>, Vec<AllocationError>) {
    let mut granted = Vec::new();
    let mut refused = Vec::new();
    for r in results {
        match r {
            Ok(range) => granted.push(range),
            Err(e) => refused.push(e),
        }
    }
    (granted, refused)
}

#[tokio::test]
async fn create_starts_with_full_quota_and_first_ticket() {
    let f = fixture().await;

    let pool = f.store.create("EVENT001", 5000).await.expect("create failed");

    assert_eq!(pool.total, 5000);
    assert_eq!(pool.available, 5000);
    assert_eq!(pool.next_ticket_number, 1);
    assert_eq!(pool.check_invariants(), Ok(()));
    assert!(f.store.create("EVENT001", 10).await.is_err(), "event ids are unique");
    assert_eq!(counters(&f.store, "EVENT001").await, (5000, 5000, 1));
}

#[tokio::test]
async fn sequential_reservations_are_contiguous() {
    let f = fixture().await;
    f.store.create("EVENT004", 24).await.expect("create failed");

    let first = f.allocator.reserve("EVENT004", "alice", qty(8)).await.expect("first");
    let second = f.allocator.reserve("EVENT004", "bob", qty(16)).await.expect("second");

    assert_eq!(first, TicketRange::new(1, 8));
    assert_eq!(second, TicketRange::new(9, 24));
    assert_eq!(counters(&f.store, "EVENT004").await, (24, 0, 25));

    let ledger = f.ledger.list_by_event("EVENT004").await.expect("ledger");
    let recorded: Vec<(String, TicketRange)> = ledger.iter().map(|a| (a.user_id.clone(), a.range())).collect();
    assert_eq!(
        recorded,
        vec![
            ("alice".to_string(), TicketRange::new(1, 8)),
            ("bob".to_string(), TicketRange::new(9, 24)),
        ]
    );
}

#[tokio::test]
async fn unknown_event_is_not_reported_as_exhaustion() {
    let f = fixture().await;

    let err = f.allocator.reserve("EVENT404", "alice", qty(8)).await.unwrap_err();

    assert!(matches!(err, AllocationError::EventNotFound(ref id) if id == "EVENT404"));
    assert!(f.store.get("EVENT404").await.expect("get").is_none());
    assert!(f.ledger.list_by_event("EVENT404").await.expect("ledger").is_empty());
}

#[tokio::test]
async fn insufficient_quota_leaves_state_untouched() {
    let f = fixture().await;
    f.store.create("EVENT005", 24).await.expect("create failed");
    f.allocator.reserve("EVENT005", "alice", qty(16)).await.expect("first");

    let err = f.allocator.reserve("EVENT005", "bob", qty(16)).await.unwrap_err();

    assert!(matches!(
        err,
        AllocationError::InsufficientQuota { requested: 16, available: 8 }
    ));
    assert_eq!(counters(&f.store, "EVENT005").await, (24, 8, 17));
    assert_eq!(f.ledger.list_by_event("EVENT005").await.expect("ledger").len(), 1);

    // остаток всё ещё можно выкупить точно
    let last = f.allocator.reserve("EVENT005", "bob", qty(8)).await.expect("last batch");
    assert_eq!(last, TicketRange::new(17, 24));
}

#[tokio::test]
async fn identical_requests_are_independent_purchases() {
    let f = fixture().await;
    f.store.create("EVENT002", 80).await.expect("create failed");

    let a = f.allocator.reserve("EVENT002", "alice", qty(8)).await.expect("first");
    let b = f.allocator.reserve("EVENT002", "alice", qty(8)).await.expect("second");

    assert_ne!(a, b);
    assert!(!a.overlaps(&b));
    assert_eq!(counters(&f.store, "EVENT002").await, (80, 64, 17));

    let held = f.ledger.list_by_user("alice").await.expect("ledger");
    assert_eq!(held.len(), 2);
}

#[tokio::test]
async fn two_racers_for_the_last_batch() {
    let f = fixture().await;
    f.store.create("EVENT004", 8).await.expect("create failed");

    let (granted, refused) = split(reserve_concurrently(&f.allocator, "EVENT004", 2, 8).await);

    assert_eq!(granted, vec![TicketRange::new(1, 8)]);
    assert_eq!(refused.len(), 1);
    assert!(matches!(refused[0], AllocationError::InsufficientQuota { .. }));
    assert_eq!(counters(&f.store, "EVENT004").await, (8, 0, 9));
}

#[tokio::test]
async fn fifty_racers_for_ten_batches() {
    let f = fixture().await;
    f.store.create("EVENT004", 80).await.expect("create failed");

    let (granted, refused) = split(reserve_concurrently(&f.allocator, "EVENT004", 50, 8).await);

    assert_eq!(granted.len(), 10);
    assert_eq!(refused.len(), 40);
    assert!(refused
        .iter()
        .all(|e| matches!(e, AllocationError::InsufficientQuota { .. })));

    let tickets: Vec<i64> = granted.iter().flat_map(|r| r.tickets()).collect();
    let unique: HashSet<i64> = tickets.iter().copied().collect();
    assert_eq!(tickets.len(), 80);
    assert_eq!(unique, (1..=80).collect::<HashSet<i64>>());

    let pool = f.store.get("EVENT004").await.expect("get").expect("pool");
    assert_eq!(pool.available, 0);
    assert_eq!(pool.check_invariants(), Ok(()));
}

#[tokio::test]
async fn one_more_racer_than_capacity_allows() {
    let f = fixture().await;
    // K = 12 партий по 16
    f.store.create("EVENT006", 12 * 16).await.expect("create failed");

    let (granted, refused) = split(reserve_concurrently(&f.allocator, "EVENT006", 13, 16).await);

    assert_eq!(granted.len(), 12);
    assert_eq!(refused.len(), 1);
    for (i, a) in granted.iter().enumerate() {
        for b in &granted[i + 1..] {
            assert!(!a.overlaps(b), "{a:?} overlaps {b:?}");
        }
    }
    assert_eq!(counters(&f.store, "EVENT006").await, (192, 0, 193));
}

#[tokio::test]
async fn ledger_agrees_with_pool_after_contention() {
    let f = fixture().await;
    f.store.create("EVENT003", 160).await.expect("create failed");

    let (granted, _) = split(reserve_concurrently(&f.allocator, "EVENT003", 30, 8).await);

    let ledger = f.ledger.list_by_event("EVENT003").await.expect("ledger");
    let mut from_ledger: Vec<TicketRange> = ledger.iter().map(|a| a.range()).collect();
    let mut from_callers = granted.clone();
    from_ledger.sort_by_key(|r| r.start);
    from_callers.sort_by_key(|r| r.start);

    assert_eq!(from_ledger, from_callers);
    // отсортированные диапазоны идут встык от первого билета
    let mut expected_start = 1;
    for range in &from_ledger {
        assert_eq!(range.start, expected_start);
        expected_start = range.end + 1;
    }
    let pool = f.store.get("EVENT003").await.expect("get").expect("pool");
    assert_eq!(pool.next_ticket_number, expected_start);
}

#[tokio::test]
async fn events_do_not_interfere() {
    let f = fixture().await;
    f.store.create("EVENT001", 40).await.expect("create failed");
    f.store.create("EVENT002", 40).await.expect("create failed");

    let (a, b) = tokio::join!(
        reserve_concurrently(&f.allocator, "EVENT001", 10, 8),
        reserve_concurrently(&f.allocator, "EVENT002", 10, 8),
    );
    let (granted_a, _) = split(a);
    let (granted_b, _) = split(b);

    assert_eq!(granted_a.len(), 5);
    assert_eq!(granted_b.len(), 5);
    assert_eq!(counters(&f.store, "EVENT001").await, (40, 0, 41));
    assert_eq!(counters(&f.store, "EVENT002").await, (40, 0, 41));
}

#[tokio::test]
async fn stuck_lock_aborts_instead_of_waiting_forever() {
    let f = fixture().await;
    f.store.create("EVENT004", 16).await.expect("create failed");
    let impatient = Allocator::new(f._db.db.pool.clone(), 200);

    // чужая транзакция держит строку пула
    let mut holder = f._db.db.pool.begin().await.expect("begin");
    sqlx::query("SELECT 1 FROM ticket_pools WHERE event_id = $1 FOR UPDATE")
        .bind("EVENT004")
        .execute(&mut *holder)
        .await
        .expect("lock row");

    let err = tokio::time::timeout(
        Duration::from_secs(10),
        impatient.reserve("EVENT004", "alice", qty(8)),
    )
    .await
    .expect("reserve must give up on its own")
    .unwrap_err();

    assert!(matches!(err, AllocationError::StoreUnavailable(_)));
    holder.rollback().await.expect("rollback");

    assert_eq!(counters(&f.store, "EVENT004").await, (16, 16, 1));
    assert!(f.ledger.list_by_event("EVENT004").await.expect("ledger").is_empty());

    let range = impatient.reserve("EVENT004", "alice", qty(8)).await.expect("after release");
    assert_eq!(range, TicketRange::new(1, 8));
}

#[tokio::test]
async fn reset_restores_pool_and_clears_ledger() {
    let f = fixture().await;
    f.store.create("EVENT004", 80).await.expect("create failed");
    reserve_concurrently(&f.allocator, "EVENT004", 5, 8).await;

    let pool = f.store.reset("EVENT004", 8).await.expect("reset");

    assert_eq!((pool.total, pool.available, pool.next_ticket_number), (8, 8, 1));
    assert!(f.ledger.list_by_event("EVENT004").await.expect("ledger").is_empty());

    // сброс несуществующего события создаёт пул
    let created = f.store.reset("EVENT999", 16).await.expect("reset creates");
    assert_eq!(created.available, 16);
}
