//! PostgreSQL ledger integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p ledger --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::CycleId;
use domain::{CycleStatus, RotationCycle, Track};
use ledger::{
    LedgerError, LedgerKey, LedgerOp, LedgerStore, LedgerTransaction, LedgerTransactionExt,
    PostgresLedgerStore, ProductLedgerRow, Reservation, TrackAssignment,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_ledger.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

const CYCLE: &str = "2024-05";

fn key(product: &str) -> LedgerKey {
    LedgerKey::new(CYCLE, product)
}

/// Fresh store with cleared tables and one active cycle.
async fn get_test_store() -> PostgresLedgerStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE product_ledger, track_assignments, tracks, rotation_cycles")
        .execute(&pool)
        .await
        .unwrap();

    let store = PostgresLedgerStore::new(pool);
    let now = Utc::now();
    store
        .upsert_cycle(&RotationCycle {
            id: CycleId::new(CYCLE),
            status: CycleStatus::Active,
            starts_at: now - Duration::days(10),
            ends_at: now + Duration::days(20),
            swap_opens_at: now - Duration::days(1),
            swap_closes_at: now + Duration::days(6),
        })
        .await
        .unwrap();
    store
}

async fn provision(store: &PostgresLedgerStore, product: &str, existing: i64, new: i64, swap: i64) {
    store
        .upsert_row(&ProductLedgerRow::new(key(product), existing, new, swap))
        .await
        .unwrap();
}

async fn counters(store: &PostgresLedgerStore, product: &str) -> (i64, i64, i64) {
    let row = store.get_row(&key(product)).await.unwrap().unwrap();
    (row.existing_sub_qty, row.new_sub_qty, row.swap_qty)
}

#[tokio::test]
#[serial]
async fn active_cycle_and_assignments() {
    let store = get_test_store().await;
    store
        .upsert_track(&Track::new("t1", "mystery").with_aliases(["thriller"]))
        .await
        .unwrap();
    store
        .assign_track(&TrackAssignment {
            cycle_id: CycleId::new(CYCLE),
            track: "mystery".to_string(),
            product_id: "prod-m".into(),
            variant_id: Some("var-m".into()),
        })
        .await
        .unwrap();

    let cycle = store.active_cycle().await.unwrap().unwrap();
    assert_eq!(cycle.id.as_str(), CYCLE);
    assert!(cycle.swap_window_state(Utc::now()).is_open());

    let assignment = store
        .track_assignment(&cycle.id, "mystery")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(assignment.product_id.as_str(), "prod-m");

    let tracks = store.tracks().await.unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].aliases, vec!["thriller".to_string()]);
}

#[tokio::test]
#[serial]
async fn reserve_swap_decrements_and_commits() {
    let store = get_test_store().await;
    provision(&store, "p1", 5, 5, 3).await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(tx.reserve_swap(&key("p1")).await.unwrap(), Reservation::Reserved);
    let receipt = tx.commit().await.unwrap();

    assert_eq!(counters(&store, "p1").await, (5, 5, 2));
    assert_eq!(receipt.deltas().len(), 1);
    assert_eq!(receipt.deltas()[0].op, LedgerOp::ReserveSwap);
}

#[tokio::test]
#[serial]
async fn reserve_swap_at_zero_is_out_of_stock() {
    let store = get_test_store().await;
    provision(&store, "p1", 5, 5, 0).await;

    let mut tx = store.begin().await.unwrap();
    assert_eq!(
        tx.reserve_swap(&key("p1")).await.unwrap(),
        Reservation::OutOfStock
    );
    tx.rollback().await.unwrap();

    assert_eq!(counters(&store, "p1").await, (5, 5, 0));
}

#[tokio::test]
#[serial]
async fn rollback_discards_mutations() {
    let store = get_test_store().await;
    provision(&store, "p1", 2, 2, 2).await;

    let mut tx = store.begin().await.unwrap();
    tx.convert_to_swap(&key("p1")).await.unwrap();
    tx.reserve_new_sub(&key("p1")).await.unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(counters(&store, "p1").await, (2, 2, 2));
}

#[tokio::test]
#[serial]
async fn bridge_back_guards_existing_pool() {
    let store = get_test_store().await;
    provision(&store, "p1", 1, 0, 0).await;

    let mut tx = store.begin().await.unwrap();
    tx.bridge_back(&key("p1")).await.unwrap();
    let err = tx.bridge_back(&key("p1")).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnexpectedRowCount { actual: 0, .. }));
    tx.rollback().await.unwrap();

    assert_eq!(counters(&store, "p1").await, (1, 0, 0));
}

#[tokio::test]
#[serial]
async fn release_on_missing_row_is_an_integrity_failure() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    assert!(tx.row(&key("ghost")).await.unwrap().is_none());
    let err = tx.release_swap(&key("ghost")).await.unwrap_err();
    assert!(matches!(err, LedgerError::UnexpectedRowCount { .. }));
}

#[tokio::test]
#[serial]
async fn retired_rows_are_not_mutated() {
    let store = get_test_store().await;
    let mut row = ProductLedgerRow::new(key("p1"), 1, 1, 1);
    row.active = false;
    store.upsert_row(&row).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert_eq!(
        tx.reserve_swap(&key("p1")).await.unwrap(),
        Reservation::OutOfStock
    );
    tx.commit().await.unwrap();
    assert_eq!(counters(&store, "p1").await, (1, 1, 1));
}

#[tokio::test]
#[serial]
async fn concurrent_reservations_serialize_on_row_lock() {
    let store = get_test_store().await;
    provision(&store, "p1", 0, 0, 3).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await.unwrap();
            let outcome = tx.reserve_swap(&key("p1")).await.unwrap();
            tx.commit().await.unwrap();
            outcome
        }));
    }

    let mut reserved = 0;
    for handle in handles {
        if handle.await.unwrap().is_reserved() {
            reserved += 1;
        }
    }

    assert_eq!(reserved, 3);
    assert_eq!(counters(&store, "p1").await, (0, 0, 0));
}
