//! End-to-end reconciliation pipeline tests
//!
//! Exercises the full path from commerce mirror rows to roster ledger
//! rows: resolution, classification, dates, group discounts, placeholder
//! displacement and the resumable discount migration.

use sqlx::SqlitePool;

use rollcall_common::db::models::{ActivityType, DateConfidence};
use rollcall_sync::commerce::{init_mirror_tables, CommerceStore};
use rollcall_sync::ledger;
use rollcall_sync::reconcile::Reconciler;
use rollcall_sync::session::{SyncKind, SyncSession, SyncState};

async fn setup_pool() -> SqlitePool {
    let pool = SqlitePool::connect("sqlite::memory:").await.expect("pool");
    rollcall_common::db::create_tables(&pool).await.expect("tables");
    init_mirror_tables(&pool).await.expect("mirror tables");
    pool
}

/// One published camp product with a single variant carrying the term
async fn seed_camp_catalog(pool: &SqlitePool) {
    sqlx::query(
        r#"
        INSERT INTO shop_products (id, name, status, attributes) VALUES
        (1, 'Summer Camp North', 'publish',
         '{"venue": "North Park", "region": "North", "activity-type": "Camp",
           "age-group": "U10", "season": "Summer 2025"}')
        "#,
    )
    .execute(pool)
    .await
    .expect("product");

    sqlx::query(
        r#"
        INSERT INTO shop_product_variants (id, product_id, status, attributes) VALUES
        (11, 1, 'publish',
         '{"camp-terms": "summer-week-1-july-7-11-5-days", "booking-type": "full week"}')
        "#,
    )
    .execute(pool)
    .await
    .expect("variant");
}

/// One paid order with three camp items for three different players
async fn seed_sibling_order(pool: &SqlitePool) {
    sqlx::query(
        r#"
        INSERT INTO shop_orders (id, status, created_at, billing_name, billing_email, coupon_lines)
        VALUES (100, 'processing', '2025-03-01T10:00:00+00:00',
                'Pat Martin', 'pat@example.com', '[]')
        "#,
    )
    .execute(pool)
    .await
    .expect("order");

    for (item_id, player, subtotal) in [(1001, "Ana Martin", 100.0), (1002, "Ben Martin", 80.0), (1003, "Cam Martin", 60.0)] {
        sqlx::query(
            "INSERT INTO shop_order_items (id, order_id, product_id, variant_id, name, attributes, subtotal, total)
             VALUES (?, 100, 1, 11, 'Summer Camp North', ?, ?, ?)",
        )
        .bind(item_id)
        .bind(format!(r#"{{"player-name": "{}"}}"#, player))
        .bind(subtotal)
        .bind(subtotal)
        .execute(pool)
        .await
        .expect("item");
    }
}

#[tokio::test]
async fn reconcile_builds_dated_classified_records() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;
    seed_sibling_order(&pool).await;

    let reconciler = Reconciler::new(pool.clone());
    let session = reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;

    assert_eq!(session.state, SyncState::Completed);
    assert_eq!(session.failure_count(), 0);
    assert_eq!(ledger::count_all(&pool).await.expect("count"), 3);

    let record = ledger::find_by_order_item(&pool, 1001)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(record.activity_type, ActivityType::Camp);
    assert_eq!(record.venue, "North Park");
    assert_eq!(record.region, "North");
    assert_eq!(record.season, "Summer 2025");
    assert_eq!(record.start_date.to_string(), "2025-07-07");
    assert_eq!(record.end_date.to_string(), "2025-07-11");
    assert_eq!(record.date_confidence, DateConfidence::Exact);
    assert_eq!(record.player_name, "Ana Martin");
}

#[tokio::test]
async fn camp_sibling_tiers_flow_through_the_pipeline() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;
    seed_sibling_order(&pool).await;

    let reconciler = Reconciler::new(pool.clone());
    reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;

    // 0% / 20% / 25% by price rank across the three siblings
    let expected = [(1001, 0.0), (1002, 16.0), (1003, 15.0)];
    for (item_id, discount) in expected {
        let record = ledger::find_by_order_item(&pool, item_id)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(record.discount_total, discount, "item {}", item_id);
    }

    // The same totals were written back onto the commerce line items
    let store = CommerceStore::new(pool.clone());
    let items = store.items_for_order(100).await.expect("items");
    let totals: Vec<f64> = items.iter().map(|i| i.discount_total.unwrap()).collect();
    assert_eq!(totals, vec![0.0, 16.0, 15.0]);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;
    seed_sibling_order(&pool).await;

    let reconciler = Reconciler::new(pool.clone());
    reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;
    let before = ledger::find_by_order_item(&pool, 1002)
        .await
        .expect("find")
        .expect("row");

    // Re-running the same pass changes nothing
    let second = reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;
    assert_eq!(second.state, SyncState::Completed);
    assert_eq!(ledger::count_all(&pool).await.expect("count"), 3);

    let after = ledger::find_by_order_item(&pool, 1002)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(after.discount_total, before.discount_total);
    assert_eq!(after.event_signature, before.event_signature);
    assert_eq!(after.start_date, before.start_date);
}

#[tokio::test]
async fn placeholder_is_displaced_by_real_booking() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;

    let reconciler = Reconciler::new(pool.clone());

    // Publishing the variant surfaces an empty roster
    let summary = reconciler.refresh_placeholders().await.expect("refresh");
    assert_eq!(summary.created, 1);
    assert_eq!(ledger::count_placeholders(&pool).await.expect("count"), 1);

    // Refreshing again updates rather than duplicates
    let summary = reconciler.refresh_placeholders().await.expect("refresh");
    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 1);
    assert_eq!(ledger::count_placeholders(&pool).await.expect("count"), 1);

    // A real booking with the same event signature displaces it
    seed_sibling_order(&pool).await;
    reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;

    assert_eq!(ledger::count_placeholders(&pool).await.expect("count"), 0);
    assert_eq!(ledger::count_all(&pool).await.expect("count"), 3);

    // And it cannot come back while the bookings exist
    let summary = reconciler.refresh_placeholders().await.expect("refresh");
    assert_eq!(summary.created, 0);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn rebuild_replaces_ledger_from_source() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;
    seed_sibling_order(&pool).await;

    let reconciler = Reconciler::new(pool.clone());
    reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;

    // Poison the ledger with a row whose product no longer exists
    let mut orphan = rollcall_common::db::models::RosterRecord::new();
    orphan.order_id = 9;
    orphan.order_item_id = 9999;
    orphan.event_signature = "orphan".to_string();
    ledger::upsert_record(&pool, &orphan).await.expect("orphan");
    assert_eq!(ledger::count_all(&pool).await.expect("count"), 4);

    let session = reconciler
        .run_rebuild(SyncSession::new(SyncKind::Rebuild))
        .await;
    assert_eq!(session.state, SyncState::Completed);

    // Orphan gone, the three real bookings rebuilt, placeholder displaced
    assert_eq!(ledger::count_all(&pool).await.expect("count"), 3);
    assert!(ledger::find_by_order_item(&pool, 9999)
        .await
        .expect("find")
        .is_none());
    assert_eq!(ledger::count_placeholders(&pool).await.expect("count"), 0);
}

#[tokio::test]
async fn discount_migration_is_resumable() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;
    seed_sibling_order(&pool).await;

    let reconciler = Reconciler::new(pool.clone());
    let store = CommerceStore::new(pool.clone());
    assert_eq!(store.unmigrated_order_count().await.expect("count"), 1);

    let first = reconciler
        .run_migration(SyncSession::new(SyncKind::MigrateDiscounts), 10)
        .await;
    assert_eq!(first.state, SyncState::Completed);
    assert!(first
        .progress
        .current_operation
        .contains("1 orders migrated"));
    assert_eq!(store.unmigrated_order_count().await.expect("count"), 0);

    // Second run over the same set migrates nothing
    let second = reconciler
        .run_migration(SyncSession::new(SyncKind::MigrateDiscounts), 10)
        .await;
    assert_eq!(second.state, SyncState::Completed);
    assert!(second
        .progress
        .current_operation
        .contains("0 orders migrated"));
}

#[tokio::test]
async fn unresolvable_items_keep_sentinels_and_never_fail_the_batch() {
    let pool = setup_pool().await;

    // Order item with no catalog backing and no date encodings at all
    sqlx::query(
        "INSERT INTO shop_orders (id, status, billing_email) VALUES (300, 'completed', 'x@example.com')",
    )
    .execute(&pool)
    .await
    .expect("order");
    sqlx::query(
        "INSERT INTO shop_order_items (id, order_id, product_id, variant_id, name, attributes, subtotal, total)
         VALUES (3001, 300, 0, 0, 'Mystery booking', '{}', 50, 50)",
    )
    .execute(&pool)
    .await
    .expect("item");

    let reconciler = Reconciler::new(pool.clone());
    let session = reconciler
        .run_reconcile(SyncSession::new(SyncKind::Reconcile), None)
        .await;

    assert_eq!(session.state, SyncState::Completed);
    assert_eq!(session.failure_count(), 0);

    let record = ledger::find_by_order_item(&pool, 3001)
        .await
        .expect("find")
        .expect("row");
    assert_eq!(record.activity_type, ActivityType::Unknown);
    assert_eq!(record.venue, "Unknown");
    assert_eq!(record.start_date.to_string(), "1970-01-01");
    assert!(!record.has_resolved_dates());
}

#[tokio::test]
async fn reconcile_by_explicit_order_ids_reports_missing_orders() {
    let pool = setup_pool().await;
    seed_camp_catalog(&pool).await;
    seed_sibling_order(&pool).await;

    let reconciler = Reconciler::new(pool.clone());
    let session = reconciler
        .run_reconcile(
            SyncSession::new(SyncKind::Reconcile),
            Some(vec![100, 404]),
        )
        .await;

    // The missing order is a recorded failure, not an abort
    assert_eq!(session.state, SyncState::Completed);
    assert_eq!(session.failure_count(), 1);
    assert_eq!(ledger::count_all(&pool).await.expect("count"), 3);
}
