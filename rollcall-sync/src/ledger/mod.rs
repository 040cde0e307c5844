//! Roster ledger writes
//!
//! The ledger holds one row per reconciled booking plus one placeholder
//! row per published-but-unbooked event. All writes are keyed so that
//! reconciliation passes are idempotent: re-running a pass updates rows in
//! place instead of duplicating them, and unique-index conflicts are
//! treated as "already processed" rather than errors.

pub mod signature;

pub use signature::event_signature;

use rollcall_common::db::models::RosterRecord;
use rollcall_common::{Error, Result};
use sqlx::{Sqlite, SqlitePool};
use tracing::{debug, info, warn};

/// What an upsert did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Row already covered by another write; nothing to do
    Skipped,
}

/// Result of a destructive full rebuild
#[derive(Debug, Clone, Copy)]
pub struct RebuildSummary {
    pub inserted: usize,
}

/// Insert or update the real booking row for `record.order_item_id`
pub async fn upsert_record(pool: &SqlitePool, record: &RosterRecord) -> Result<UpsertOutcome> {
    if record.is_placeholder || record.order_item_id == 0 {
        return Err(Error::InvalidInput(
            "upsert_record requires a real order item id".to_string(),
        ));
    }

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT guid FROM roster_records WHERE order_item_id = ? AND is_placeholder = 0",
    )
    .bind(record.order_item_id)
    .fetch_optional(pool)
    .await?;

    match existing {
        Some(guid) => {
            update_record(pool, &guid, record).await?;
            debug!(order_item_id = record.order_item_id, "Roster record updated");
            Ok(UpsertOutcome::Updated)
        }
        None => match insert_record(pool, record).await {
            Ok(()) => {
                debug!(order_item_id = record.order_item_id, "Roster record inserted");
                Ok(UpsertOutcome::Inserted)
            }
            Err(err) if is_unique_violation(&err) => {
                // Concurrent pass already wrote this item
                warn!(
                    order_item_id = record.order_item_id,
                    "Duplicate roster insert skipped (already processed)"
                );
                Ok(UpsertOutcome::Skipped)
            }
            Err(err) => Err(err),
        },
    }
}

/// Insert or update the placeholder row for `record.event_signature`.
///
/// A placeholder represents zero bookings; if a real booking with the same
/// signature already exists the placeholder is not (re)created.
pub async fn upsert_placeholder(pool: &SqlitePool, record: &RosterRecord) -> Result<UpsertOutcome> {
    let real_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM roster_records WHERE event_signature = ? AND is_placeholder = 0",
    )
    .bind(&record.event_signature)
    .fetch_one(pool)
    .await?;

    if real_count > 0 {
        debug!(
            signature = %record.event_signature,
            "Placeholder skipped, real bookings exist"
        );
        return Ok(UpsertOutcome::Skipped);
    }

    let existing: Option<String> = sqlx::query_scalar(
        "SELECT guid FROM roster_records WHERE event_signature = ? AND is_placeholder = 1",
    )
    .bind(&record.event_signature)
    .fetch_optional(pool)
    .await?;

    match existing {
        Some(guid) => {
            update_record(pool, &guid, record).await?;
            Ok(UpsertOutcome::Updated)
        }
        None => match insert_record(pool, record).await {
            Ok(()) => Ok(UpsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => {
                warn!(
                    signature = %record.event_signature,
                    "Duplicate placeholder insert skipped"
                );
                Ok(UpsertOutcome::Skipped)
            }
            Err(err) => Err(err),
        },
    }
}

/// Delete the placeholder carrying this signature, if any.
///
/// Called after a real booking is reconciled so attendance is never
/// double-counted against a phantom empty-roster row.
pub async fn delete_by_signature(pool: &SqlitePool, signature: &str) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM roster_records WHERE event_signature = ? AND is_placeholder = 1",
    )
    .bind(signature)
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        debug!(signature = %signature, "Placeholder removed, real booking arrived");
    }
    Ok(result.rows_affected())
}

/// Delete every ledger row originating from a removed product
pub async fn delete_by_product(pool: &SqlitePool, product_id: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM roster_records WHERE product_id = ?")
        .bind(product_id)
        .execute(pool)
        .await?;

    info!(
        product_id,
        deleted = result.rows_affected(),
        "Roster rows deleted for removed product"
    );
    Ok(result.rows_affected())
}

/// Destructive full rebuild: delete everything and repopulate in a single
/// transaction so readers only ever see the old or the fully rebuilt state
pub async fn rebuild_all(pool: &SqlitePool, records: &[RosterRecord]) -> Result<RebuildSummary> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM roster_records")
        .execute(&mut *tx)
        .await?;

    for record in records {
        insert_record(&mut *tx, record).await?;
    }

    tx.commit().await?;

    info!(inserted = records.len(), "Roster ledger rebuilt");
    Ok(RebuildSummary {
        inserted: records.len(),
    })
}

/// Update only the pricing fields of an already-reconciled row (used by
/// the discount back-fill migration)
pub async fn update_pricing(
    pool: &SqlitePool,
    order_item_id: i64,
    discount_total: f64,
    breakdown_json: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE roster_records
         SET discount_total = ?, discount_breakdown = ?, updated_at = CURRENT_TIMESTAMP
         WHERE order_item_id = ? AND is_placeholder = 0",
    )
    .bind(discount_total)
    .bind(breakdown_json)
    .bind(order_item_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load the real booking row for one order item
pub async fn find_by_order_item(
    pool: &SqlitePool,
    order_item_id: i64,
) -> Result<Option<RosterRecord>> {
    let row = sqlx::query(
        "SELECT * FROM roster_records WHERE order_item_id = ? AND is_placeholder = 0",
    )
    .bind(order_item_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(RosterRecord::from_row).transpose()
}

pub async fn count_all(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM roster_records")
        .fetch_one(pool)
        .await?)
}

pub async fn count_placeholders(pool: &SqlitePool) -> Result<i64> {
    Ok(
        sqlx::query_scalar("SELECT COUNT(*) FROM roster_records WHERE is_placeholder = 1")
            .fetch_one(pool)
            .await?,
    )
}

fn is_unique_violation(err: &Error) -> bool {
    matches!(
        err,
        Error::Database(sqlx::Error::Database(db))
            if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

/// Pre-serialized column values shared by insert and update
struct RecordValues {
    start_date: String,
    end_date: String,
    selected_days: String,
    discount_breakdown: String,
    order_date: Option<String>,
}

fn record_values(record: &RosterRecord) -> Result<RecordValues> {
    Ok(RecordValues {
        start_date: record.start_date.format("%Y-%m-%d").to_string(),
        end_date: record.end_date.format("%Y-%m-%d").to_string(),
        selected_days: serde_json::to_string(&record.selected_days)
            .map_err(|e| Error::Internal(format!("Failed to serialize selected days: {}", e)))?,
        discount_breakdown: serde_json::to_string(&record.discount_breakdown)
            .map_err(|e| Error::Internal(format!("Failed to serialize breakdown: {}", e)))?,
        order_date: record.order_date.map(|dt| dt.to_rfc3339()),
    })
}

async fn insert_record<'e, E>(executor: E, record: &RosterRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let values = record_values(record)?;

    sqlx::query(
        r#"
        INSERT INTO roster_records (
            guid, order_id, order_item_id, product_id, variant_id,
            event_signature, is_placeholder,
            player_name, player_age, player_gender,
            parent_name, parent_email, parent_phone,
            activity_type, activity_name, venue, region, age_group, season,
            booking_type, course_day, camp_term,
            start_date, end_date, date_confidence, selected_days,
            base_price, discount_total, final_price, reimbursement,
            discount_breakdown, order_status, order_date,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                  ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                  CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(record.guid.to_string())
    .bind(record.order_id)
    .bind(record.order_item_id)
    .bind(record.product_id)
    .bind(record.variant_id)
    .bind(&record.event_signature)
    .bind(record.is_placeholder as i64)
    .bind(&record.player_name)
    .bind(&record.player_age)
    .bind(&record.player_gender)
    .bind(&record.parent_name)
    .bind(&record.parent_email)
    .bind(&record.parent_phone)
    .bind(record.activity_type.label().to_string())
    .bind(&record.activity_name)
    .bind(&record.venue)
    .bind(&record.region)
    .bind(&record.age_group)
    .bind(&record.season)
    .bind(record.booking_type.label().to_string())
    .bind(&record.course_day)
    .bind(&record.camp_term)
    .bind(values.start_date)
    .bind(values.end_date)
    .bind(record.date_confidence.label())
    .bind(values.selected_days)
    .bind(record.base_price)
    .bind(record.discount_total)
    .bind(record.final_price)
    .bind(record.reimbursement)
    .bind(values.discount_breakdown)
    .bind(&record.order_status)
    .bind(values.order_date)
    .execute(executor)
    .await?;

    Ok(())
}

async fn update_record(pool: &SqlitePool, guid: &str, record: &RosterRecord) -> Result<()> {
    let values = record_values(record)?;

    sqlx::query(
        r#"
        UPDATE roster_records SET
            order_id = ?, order_item_id = ?, product_id = ?, variant_id = ?,
            event_signature = ?, is_placeholder = ?,
            player_name = ?, player_age = ?, player_gender = ?,
            parent_name = ?, parent_email = ?, parent_phone = ?,
            activity_type = ?, activity_name = ?, venue = ?, region = ?,
            age_group = ?, season = ?,
            booking_type = ?, course_day = ?, camp_term = ?,
            start_date = ?, end_date = ?, date_confidence = ?, selected_days = ?,
            base_price = ?, discount_total = ?, final_price = ?, reimbursement = ?,
            discount_breakdown = ?, order_status = ?, order_date = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE guid = ?
        "#,
    )
    .bind(record.order_id)
    .bind(record.order_item_id)
    .bind(record.product_id)
    .bind(record.variant_id)
    .bind(&record.event_signature)
    .bind(record.is_placeholder as i64)
    .bind(&record.player_name)
    .bind(&record.player_age)
    .bind(&record.player_gender)
    .bind(&record.parent_name)
    .bind(&record.parent_email)
    .bind(&record.parent_phone)
    .bind(record.activity_type.label().to_string())
    .bind(&record.activity_name)
    .bind(&record.venue)
    .bind(&record.region)
    .bind(&record.age_group)
    .bind(&record.season)
    .bind(record.booking_type.label().to_string())
    .bind(&record.course_day)
    .bind(&record.camp_term)
    .bind(values.start_date)
    .bind(values.end_date)
    .bind(record.date_confidence.label())
    .bind(values.selected_days)
    .bind(record.base_price)
    .bind(record.discount_total)
    .bind(record.final_price)
    .bind(record.reimbursement)
    .bind(values.discount_breakdown)
    .bind(&record.order_status)
    .bind(values.order_date)
    .bind(guid)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::db::create_tables;
    use rollcall_common::db::models::{ActivityType, BookingType};

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.expect("pool");
        create_tables(&pool).await.expect("tables");
        pool
    }

    fn real_record(order_item_id: i64) -> RosterRecord {
        let mut record = RosterRecord::new();
        record.order_id = 500;
        record.order_item_id = order_item_id;
        record.product_id = 42;
        record.player_name = "Ana Martin".to_string();
        record.activity_type = ActivityType::Camp;
        record.venue = "North Park".to_string();
        record.booking_type = BookingType::FullWeek;
        record.event_signature = event_signature(
            "North Park",
            "summer-week-1",
            "U10",
            "Summer 2025",
            "full week",
        );
        record.base_price = 100.0;
        record.final_price = 100.0;
        record
    }

    fn placeholder_record() -> RosterRecord {
        let mut record = RosterRecord::new();
        record.is_placeholder = true;
        record.product_id = 42;
        record.activity_type = ActivityType::Camp;
        record.venue = "North Park".to_string();
        record.event_signature = event_signature(
            "North Park",
            "summer-week-1",
            "U10",
            "Summer 2025",
            "full week",
        );
        record
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let pool = test_pool().await;
        let record = real_record(1001);

        assert_eq!(
            upsert_record(&pool, &record).await.expect("first"),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            upsert_record(&pool, &record).await.expect("second"),
            UpsertOutcome::Updated
        );

        assert_eq!(count_all(&pool).await.expect("count"), 1);

        let stored = find_by_order_item(&pool, 1001)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(stored.player_name, "Ana Martin");
        assert_eq!(stored.base_price, 100.0);
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let pool = test_pool().await;
        let mut record = real_record(1002);
        upsert_record(&pool, &record).await.expect("insert");

        record.venue = "South Field".to_string();
        record.final_price = 80.0;
        upsert_record(&pool, &record).await.expect("update");

        let stored = find_by_order_item(&pool, 1002)
            .await
            .expect("find")
            .expect("row");
        assert_eq!(stored.venue, "South Field");
        assert_eq!(stored.final_price, 80.0);
        assert_eq!(count_all(&pool).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_placeholder_lifecycle() {
        let pool = test_pool().await;

        // Publishing the variant creates a placeholder
        let placeholder = placeholder_record();
        assert_eq!(
            upsert_placeholder(&pool, &placeholder).await.expect("create"),
            UpsertOutcome::Inserted
        );
        assert_eq!(count_placeholders(&pool).await.expect("count"), 1);

        // Re-publishing updates it in place
        assert_eq!(
            upsert_placeholder(&pool, &placeholder).await.expect("again"),
            UpsertOutcome::Updated
        );
        assert_eq!(count_placeholders(&pool).await.expect("count"), 1);

        // A real booking with the same signature displaces it
        let real = real_record(1003);
        upsert_record(&pool, &real).await.expect("real");
        delete_by_signature(&pool, &real.event_signature)
            .await
            .expect("delete placeholder");

        assert_eq!(count_placeholders(&pool).await.expect("count"), 0);
        assert_eq!(count_all(&pool).await.expect("count"), 1);

        // And the placeholder cannot come back while the booking exists
        assert_eq!(
            upsert_placeholder(&pool, &placeholder).await.expect("blocked"),
            UpsertOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_delete_by_product() {
        let pool = test_pool().await;
        upsert_record(&pool, &real_record(1004)).await.expect("a");
        let mut other = real_record(1005);
        other.product_id = 99;
        other.event_signature = "other-signature".to_string();
        upsert_record(&pool, &other).await.expect("b");

        let deleted = delete_by_product(&pool, 42).await.expect("delete");
        assert_eq!(deleted, 1);
        assert_eq!(count_all(&pool).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_everything() {
        let pool = test_pool().await;
        upsert_record(&pool, &real_record(1006)).await.expect("old");

        let fresh = vec![real_record(2001), real_record(2002)];
        let summary = rebuild_all(&pool, &fresh).await.expect("rebuild");
        assert_eq!(summary.inserted, 2);

        assert_eq!(count_all(&pool).await.expect("count"), 2);
        assert!(find_by_order_item(&pool, 1006)
            .await
            .expect("find")
            .is_none());
    }
}
